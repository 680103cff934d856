//! A client-side mirror of a multiplayer tile-world's server state.
//!
//! The server holds the authoritative database; this crate maintains an
//! eventually consistent local replica of the subscribed tables, derives
//! display-ready views from it, and dispatches typed commands back to the
//! server. It is transport-agnostic: the network layer drives a
//! [`GameClient`] by feeding it lifecycle events, row deltas, and command
//! acknowledgements, and reads outbound [`ClientMessage`]s from the channel
//! it handed to [`GameClient::connect`].
//!
//! The replica is a cache, never an authority. Commands do not mutate it;
//! their effects arrive later as ordinary deltas, and redelivered deltas
//! apply idempotently so the mirror always converges on what the server
//! last said.

mod cache;
mod callbacks;
mod client;
mod commands;
mod error;
mod identity;
mod table;
mod types;
pub mod views;

pub use cache::{ClientCache, TableDelta};
pub use callbacks::{CallbackId, DbCallbacks, TableCallbacks};
pub use client::{GameClient, SessionState, SUBSCRIPTION_QUERIES};
pub use commands::{
    validate_message_text, validate_name, ClientMessage, Command, MAX_MESSAGE_LEN, MAX_NAME_LEN,
};
pub use error::{Error, Result};
pub use identity::Identity;
pub use table::{AppliedRow, RowDelta, TableCache};
pub use types::{
    Entity, EntityKind, GameTick, Map, MapKind, Message, Player, TableRow, TileKind, Timestamp,
    User, Vec2,
};
