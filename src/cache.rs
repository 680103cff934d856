//! The client cache: the closed set of table mirrors for this module.
//!
//! Unlike a generic SDK cache keyed by type, the table set here is fixed, so
//! each table gets a concrete field and deltas route through one exhaustive
//! match.

use crate::table::{RowDelta, TableCache};
use crate::types::{Entity, GameTick, Map, Message, Player, User};

/// A delta for one row in one of the replicated tables.
#[derive(Clone, Debug, PartialEq)]
pub enum TableDelta {
    User(RowDelta<User>),
    Player(RowDelta<Player>),
    Message(RowDelta<Message>),
    Map(RowDelta<Map>),
    Entity(RowDelta<Entity>),
    GameTick(RowDelta<GameTick>),
}

/// The local mirror of the subscribed subset of the remote database.
#[derive(Default)]
pub struct ClientCache {
    pub(crate) users: TableCache<User>,
    pub(crate) players: TableCache<Player>,
    pub(crate) messages: TableCache<Message>,
    pub(crate) maps: TableCache<Map>,
    pub(crate) entities: TableCache<Entity>,
    pub(crate) ticks: TableCache<GameTick>,
}

impl ClientCache {
    pub fn users(&self) -> &TableCache<User> {
        &self.users
    }

    pub fn players(&self) -> &TableCache<Player> {
        &self.players
    }

    pub fn messages(&self) -> &TableCache<Message> {
        &self.messages
    }

    pub fn maps(&self) -> &TableCache<Map> {
        &self.maps
    }

    pub fn entities(&self) -> &TableCache<Entity> {
        &self.entities
    }

    pub fn ticks(&self) -> &TableCache<GameTick> {
        &self.ticks
    }

    /// The mirror is rebuilt from scratch on every connection.
    pub(crate) fn clear_all(&mut self) {
        self.users.clear();
        self.players.clear();
        self.messages.clear();
        self.maps.clear();
        self.entities.clear();
        self.ticks.clear();
    }

    pub(crate) fn is_all_empty(&self) -> bool {
        self.users.is_empty()
            && self.players.is_empty()
            && self.messages.is_empty()
            && self.maps.is_empty()
            && self.entities.is_empty()
            && self.ticks.is_empty()
    }
}
