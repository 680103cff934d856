//! Row types for the replicated tables, and the value types they embed.
//!
//! Every row here is server-owned: the client never invents keys and never
//! fabricates rows outside of applied deltas. The shapes mirror the remote
//! schema one-to-one.

use std::fmt;
use std::hash::Hash;

use crate::identity::Identity;

/// Microseconds since the Unix epoch, as assigned by the server.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp {
    micros: i64,
}

impl Timestamp {
    pub const fn from_micros(micros: i64) -> Self {
        Timestamp { micros }
    }

    pub const fn to_micros(self) -> i64 {
        self.micros
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.micros)
    }
}

/// A continuous 2D position. Tile membership is derived by flooring each
/// axis independently, never by rounding.
#[derive(Clone, Copy, PartialEq, Debug, Default)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    pub const fn new(x: f64, y: f64) -> Self {
        Vec2 { x, y }
    }

    /// The tile this position occupies.
    pub fn tile(self) -> (i64, i64) {
        (self.x.floor() as i64, self.y.floor() as i64)
    }
}

/// What a single map cell is made of.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TileKind {
    Wall,
    Floor,
    Door,
    Water,
    Grass,
}

impl TileKind {
    pub fn from_raw(raw: u8) -> Option<Self> {
        Some(match raw {
            0 => TileKind::Wall,
            1 => TileKind::Floor,
            2 => TileKind::Door,
            3 => TileKind::Water,
            4 => TileKind::Grass,
            _ => return None,
        })
    }

    /// Whether an entity may stand on this tile. Only floors and doors are
    /// standable; grass and water are decoration the server rejects moves
    /// onto.
    pub fn is_walkable(self) -> bool {
        matches!(self, TileKind::Floor | TileKind::Door)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum MapKind {
    Town,
    Dungeon,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum EntityKind {
    Player,
    Npc,
    Monster,
    Item,
}

/// A row in one of the replicated tables: a declared key plus a table name
/// used for subscriptions and log messages.
pub trait TableRow: Clone + PartialEq + fmt::Debug {
    type Key: Clone + Eq + Hash + fmt::Debug;

    const TABLE: &'static str;

    fn key(&self) -> Self::Key;
}

/// One row per principal the server has ever seen. The row persists after
/// disconnect; only `online` toggles.
#[derive(Clone, PartialEq, Debug)]
pub struct User {
    pub identity: Identity,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
    pub online: bool,
}

impl TableRow for User {
    type Key = Identity;

    const TABLE: &'static str = "user";

    fn key(&self) -> Identity {
        self.identity
    }
}

/// Present only while a player session is active.
#[derive(Clone, PartialEq, Debug)]
pub struct Player {
    pub identity: Identity,
    pub name: String,
    /// The game object this player controls, once one has been created.
    pub entity_id: Option<u64>,
    pub current_map_id: Option<u64>,
}

impl TableRow for Player {
    type Key = Identity;

    const TABLE: &'static str = "player";

    fn key(&self) -> Identity {
        self.identity
    }
}

/// Immutable once inserted, except for deletion.
#[derive(Clone, PartialEq, Debug)]
pub struct Message {
    pub id: u64,
    pub sender: Identity,
    pub sent: Timestamp,
    pub text: String,
}

impl TableRow for Message {
    type Key = u64;

    const TABLE: &'static str = "message";

    fn key(&self) -> u64 {
        self.id
    }
}

/// A map and its tile grid. Immutable after creation; occupancy is derived
/// from entity positions and never stored here.
#[derive(Clone, PartialEq, Debug)]
pub struct Map {
    pub id: u64,
    pub name: String,
    pub width: u64,
    pub height: u64,
    /// Flattened row-major grid, `tiles[y * width + x]`, length `width * height`.
    pub tiles: Vec<TileKind>,
    pub kind: MapKind,
    pub is_starting_town: bool,
}

impl Map {
    /// The tile at `(x, y)`, or `None` when out of bounds.
    pub fn tile_at(&self, x: i64, y: i64) -> Option<TileKind> {
        if x < 0 || y < 0 || x as u64 >= self.width || y as u64 >= self.height {
            return None;
        }
        let index = y as u64 * self.width + x as u64;
        self.tiles.get(index as usize).copied()
    }

    /// Whether `(x, y)` is in bounds and standable.
    pub fn is_walkable(&self, x: i64, y: i64) -> bool {
        self.tile_at(x, y).is_some_and(TileKind::is_walkable)
    }
}

impl TableRow for Map {
    type Key = u64;

    const TABLE: &'static str = "map";

    fn key(&self) -> u64 {
        self.id
    }
}

/// A game object on some map. Position is continuous and mutable.
#[derive(Clone, PartialEq, Debug)]
pub struct Entity {
    pub id: u64,
    pub kind: EntityKind,
    pub position: Vec2,
}

impl TableRow for Entity {
    type Key = u64;

    const TABLE: &'static str = "entity";

    fn key(&self) -> u64 {
        self.id
    }
}

/// The server's heartbeat row, updated every simulation tick.
#[derive(Clone, PartialEq, Debug)]
pub struct GameTick {
    pub id: u64,
    pub last_tick_time: Timestamp,
}

impl TableRow for GameTick {
    type Key = u64;

    const TABLE: &'static str = "game_tick";

    fn key(&self) -> u64 {
        self.id
    }
}
