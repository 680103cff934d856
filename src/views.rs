//! Read-only projections derived from the table mirrors.
//!
//! Every function here is pure: recomputing it on an unchanged cache yields
//! identical output, and nothing here ever mutates a store.

use std::collections::HashMap;

use crate::cache::ClientCache;
use crate::identity::Identity;
use crate::table::TableCache;
use crate::types::{Entity, Map, Player, Timestamp, User};

/// One line of the chat transcript, ready for display.
#[derive(Clone, Debug, PartialEq)]
pub struct ChatLine {
    pub message_id: u64,
    pub sender: Identity,
    /// Resolved at derivation time; falls back to the abbreviated identity
    /// when the sender has no visible user row or never set a name.
    pub sender_name: String,
    pub sent: Timestamp,
    pub text: String,
}

/// A single online-state edge observed on a user row.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresenceTransition {
    Connected,
    Disconnected,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PresenceEvent {
    pub identity: Identity,
    pub name: String,
    pub transition: PresenceTransition,
}

/// Resolve a display name for `identity` against the user store.
///
/// Messages may be observed before the sender's user row exists (cross-table
/// ordering carries no guarantee), so absence is an expected case, not an
/// error.
pub fn resolve_name(users: &TableCache<User>, identity: &Identity) -> String {
    users
        .get(identity)
        .and_then(|user| user.name.clone())
        .unwrap_or_else(|| identity.to_abbreviated_hex())
}

/// The display name carried by a user row itself.
pub fn display_name(user: &User) -> String {
    user.name
        .clone()
        .unwrap_or_else(|| user.identity.to_abbreviated_hex())
}

/// All messages in display order: `sent` ascending, ties broken by arrival.
pub fn chat_transcript(cache: &ClientCache) -> Vec<ChatLine> {
    let mut messages: Vec<(u64, &crate::types::Message)> =
        cache.messages().iter_with_arrival().collect();
    messages.sort_by_key(|(arrival, message)| (message.sent, *arrival));
    messages
        .into_iter()
        .map(|(_, message)| ChatLine {
            message_id: message.id,
            sender: message.sender,
            sender_name: resolve_name(cache.users(), &message.sender),
            sent: message.sent,
            text: message.text.clone(),
        })
        .collect()
}

/// The presence edge described by a user update, if any.
///
/// Only `online` flips produce an event; inserts and updates that leave
/// `online` unchanged produce none.
pub fn presence_transition(old: &User, new: &User) -> Option<PresenceTransition> {
    match (old.online, new.online) {
        (false, true) => Some(PresenceTransition::Connected),
        (true, false) => Some(PresenceTransition::Disconnected),
        _ => None,
    }
}

/// Entities whose floored position equals `(x, y)`.
pub fn occupants_at(entities: &TableCache<Entity>, x: i64, y: i64) -> Vec<&Entity> {
    let mut occupants: Vec<&Entity> = entities
        .iter()
        .filter(|entity| entity.position.tile() == (x, y))
        .collect();
    occupants.sort_by_key(|entity| entity.id);
    occupants
}

/// Full occupancy index: tile coordinate to the ids of entities standing
/// there, built in one pass over the entity store.
pub fn occupancy_index(entities: &TableCache<Entity>) -> HashMap<(i64, i64), Vec<u64>> {
    let mut index: HashMap<(i64, i64), Vec<u64>> = HashMap::new();
    for entity in entities.iter() {
        index.entry(entity.position.tile()).or_default().push(entity.id);
    }
    for ids in index.values_mut() {
        ids.sort_unstable();
    }
    index
}

/// The player standing on `(x, y)`, joined through the entity link.
pub fn player_at<'a>(cache: &'a ClientCache, x: i64, y: i64) -> Option<&'a Player> {
    let occupants = occupants_at(cache.entities(), x, y);
    cache.players().iter().find(|player| {
        player
            .entity_id
            .is_some_and(|id| occupants.iter().any(|entity| entity.id == id))
    })
}

/// The map movement is validated against when the player has no map of
/// their own: the designated starting town, if one is visible.
pub fn starting_map(maps: &TableCache<Map>) -> Option<&Map> {
    maps.iter().find(|map| map.is_starting_town)
}
