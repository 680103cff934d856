//! The session object tying the mirrors, views, and dispatcher together.
//!
//! A [`GameClient`] is created per connection attempt and passed explicitly
//! to whatever needs it; there is no global connection singleton, so tests
//! can run several independent sessions side by side.
//!
//! All entry points take `&mut self`: the transport drives the client from
//! one logical thread, and only the delta entry points mutate the mirrors.
//! Row callbacks receive just the affected rows, so delta application can
//! never re-enter the mutation path.

use futures_channel::mpsc;

use crate::cache::{ClientCache, TableDelta};
use crate::callbacks::DbCallbacks;
use crate::commands::{
    validate_message_text, validate_name, AckCallback, ClientMessage, Command, CommandDispatcher,
};
use crate::error::{Error, Result};
use crate::identity::Identity;
use crate::table::AppliedRow;
use crate::types::{Entity, Map, Player, Timestamp, User, Vec2};
use crate::views::{self, ChatLine, PresenceEvent};

/// The queries issued when a connection is established, one per mirrored
/// table. The transport answers with a burst of insert deltas followed by
/// the applied signal.
pub const SUBSCRIPTION_QUERIES: [&str; 6] = [
    "SELECT * FROM user",
    "SELECT * FROM player",
    "SELECT * FROM message",
    "SELECT * FROM map",
    "SELECT * FROM entity",
    "SELECT * FROM game_tick",
];

/// Where the session currently stands.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum SessionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    /// A connection attempt failed. Retry policy belongs to the caller; the
    /// client never retries on its own.
    Failed,
}

impl SessionState {
    fn name(self) -> &'static str {
        match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::Connected => "connected",
            SessionState::Failed => "failed",
        }
    }
}

type OnConnectCallback = Box<dyn FnOnce(Identity, &str) + Send>;
type OnDisconnectCallback = Box<dyn FnOnce(Option<Error>) + Send>;

/// Correlates the connection's identity with its rows in the user and
/// player mirrors.
///
/// The "current self" is a derived pointer, never a copy: accessors resolve
/// the live row by key lookup, and the residency flags below are recomputed
/// on every delta touching those stores.
#[derive(Default)]
struct SelfTracker {
    identity: Option<Identity>,
    user_resident: bool,
    player_resident: bool,
}

impl SelfTracker {
    fn set_identity(&mut self, identity: Identity) {
        self.identity = Some(identity);
        self.user_resident = false;
        self.player_resident = false;
    }

    // Identity may rotate across reconnects, so nothing survives a
    // disconnect.
    fn clear(&mut self) {
        *self = SelfTracker::default();
    }

    fn refresh(&mut self, cache: &ClientCache) {
        let Some(identity) = self.identity else {
            return;
        };
        let user_now = cache.users().get(&identity).is_some();
        if user_now != self.user_resident {
            log::debug!(
                "self user row {}",
                if user_now { "appeared" } else { "disappeared" }
            );
            self.user_resident = user_now;
        }
        let player_now = cache.players().get(&identity).is_some();
        if player_now != self.player_resident {
            log::debug!(
                "self player row {}",
                if player_now { "appeared" } else { "disappeared" }
            );
            self.player_resident = player_now;
        }
    }
}

/// A live (or would-be) session against the server authority.
#[derive(Default)]
pub struct GameClient {
    state: SessionState,
    connect_error: Option<String>,
    cache: ClientCache,
    callbacks: DbCallbacks,
    dispatcher: CommandDispatcher,
    self_tracker: SelfTracker,
    presence: Vec<PresenceEvent>,
    /// True once the initial subscription snapshot has been applied.
    synchronized: bool,
    on_connect: Option<OnConnectCallback>,
    on_disconnect: Option<OnDisconnectCallback>,
}

impl GameClient {
    pub fn new() -> Self {
        GameClient::default()
    }

    // ------------------------------------------------------------------
    // Session lifecycle, driven by the transport.
    // ------------------------------------------------------------------

    /// Begin a connection attempt. `outbound` is the transport's channel;
    /// the client pushes [`ClientMessage`]s into it and drops it on
    /// disconnect.
    pub fn connect(&mut self, outbound: mpsc::UnboundedSender<ClientMessage>) -> Result<()> {
        match self.state {
            SessionState::Disconnected | SessionState::Failed => {
                self.state = SessionState::Connecting;
                self.connect_error = None;
                self.dispatcher.arm(outbound);
                log::debug!("connecting");
                Ok(())
            }
            state => Err(Error::InvalidSessionTransition {
                state: state.name(),
                event: "connect",
            }),
        }
    }

    /// The transport reports a successful connection, handing over the
    /// server-assigned identity and the reconnection token. Records the
    /// identity and issues the table subscriptions.
    pub fn connection_established(&mut self, identity: Identity, token: &str) -> Result<()> {
        if self.state != SessionState::Connecting {
            return Err(Error::InvalidSessionTransition {
                state: self.state.name(),
                event: "connection_established",
            });
        }
        self.state = SessionState::Connected;
        self.self_tracker.set_identity(identity);
        log::info!("connected as {}", identity.to_abbreviated_hex());

        self.dispatcher.send_raw(ClientMessage::Subscribe {
            queries: SUBSCRIPTION_QUERIES.iter().map(|q| q.to_string()).collect(),
        })?;

        if let Some(on_connect) = self.on_connect.take() {
            on_connect(identity, token);
        }
        Ok(())
    }

    /// The transport reports that the connection attempt failed. The error
    /// is kept for the caller to inspect; the client does not retry.
    pub fn connection_failed(&mut self, message: impl Into<String>) -> Result<()> {
        if self.state != SessionState::Connecting {
            return Err(Error::InvalidSessionTransition {
                state: self.state.name(),
                event: "connection_failed",
            });
        }
        let message = message.into();
        log::warn!("connection failed: {message}");
        self.state = SessionState::Failed;
        self.connect_error = Some(message.clone());
        self.dispatcher.disarm();
        if let Some(on_disconnect) = self.on_disconnect.take() {
            on_disconnect(Some(Error::ConnectFailed { message }));
        }
        Ok(())
    }

    /// The initial snapshot for the subscribed tables has been delivered.
    pub fn subscription_applied(&mut self) -> Result<()> {
        if self.state != SessionState::Connected {
            return Err(Error::InvalidSessionTransition {
                state: self.state.name(),
                event: "subscription_applied",
            });
        }
        self.synchronized = true;
        log::info!("client cache synchronized");
        Ok(())
    }

    /// Explicitly close the session.
    pub fn disconnect(&mut self) -> Result<()> {
        match self.state {
            SessionState::Connected | SessionState::Connecting => {
                self.reset(None);
                Ok(())
            }
            _ => Err(Error::AlreadyDisconnected),
        }
    }

    /// The transport lost the connection. Resets all replicated state; no
    /// stale rows, self pointers, or pending markers survive.
    pub fn transport_disconnected(&mut self) {
        if self.state == SessionState::Disconnected {
            return;
        }
        log::warn!("disconnected by transport");
        self.reset(Some(Error::Disconnected));
    }

    fn reset(&mut self, reason: Option<Error>) {
        self.state = SessionState::Disconnected;
        self.synchronized = false;
        self.cache.clear_all();
        self.self_tracker.clear();
        self.presence.clear();
        self.dispatcher.disarm();
        if let Some(on_disconnect) = self.on_disconnect.take() {
            on_disconnect(reason);
        }
    }

    /// Register a one-shot callback for the next successful connection.
    /// It receives the assigned identity and the reconnection token.
    pub fn on_connect(&mut self, callback: impl FnOnce(Identity, &str) + Send + 'static) {
        self.on_connect = Some(Box::new(callback));
    }

    /// Register a one-shot callback for the next disconnect. `None` means a
    /// normal, caller-initiated close.
    pub fn on_disconnect(&mut self, callback: impl FnOnce(Option<Error>) + Send + 'static) {
        self.on_disconnect = Some(Box::new(callback));
    }

    // ------------------------------------------------------------------
    // Delta application, driven by the transport.
    // ------------------------------------------------------------------

    /// Apply one delta to its table mirror, then notify the self tracker
    /// and the registered row callbacks. Deltas must be fed in delivery
    /// order per table; cross-table order carries no meaning here.
    pub fn apply(&mut self, delta: TableDelta) -> Result<()> {
        if self.state != SessionState::Connected {
            return Err(Error::NotConnected);
        }
        match delta {
            TableDelta::User(delta) => {
                let applied = self.cache.users.apply(delta);
                if let AppliedRow::Updated { old, new } = &applied {
                    if let Some(transition) = views::presence_transition(old, new) {
                        self.presence.push(PresenceEvent {
                            identity: new.identity,
                            name: views::display_name(new),
                            transition,
                        });
                    }
                }
                self.self_tracker.refresh(&self.cache);
                self.callbacks.users.invoke(&applied);
            }
            TableDelta::Player(delta) => {
                let applied = self.cache.players.apply(delta);
                self.self_tracker.refresh(&self.cache);
                self.callbacks.players.invoke(&applied);
            }
            TableDelta::Message(delta) => {
                let applied = self.cache.messages.apply(delta);
                self.callbacks.messages.invoke(&applied);
            }
            TableDelta::Map(delta) => {
                let applied = self.cache.maps.apply(delta);
                self.callbacks.maps.invoke(&applied);
            }
            TableDelta::Entity(delta) => {
                let applied = self.cache.entities.apply(delta);
                self.callbacks.entities.invoke(&applied);
            }
            TableDelta::GameTick(delta) => {
                let applied = self.cache.ticks.apply(delta);
                self.callbacks.ticks.invoke(&applied);
            }
        }
        Ok(())
    }

    /// The transport reports the outcome of a previously dispatched
    /// command. Clears any pending marker and runs the acknowledgement
    /// callback; no mirror is touched (effects arrive as deltas).
    pub fn command_result(
        &mut self,
        request_id: u32,
        result: std::result::Result<(), String>,
    ) -> Result<()> {
        self.dispatcher.complete(request_id, result)
    }

    /// The transport observed any client's invocation of `procedure`
    /// complete, ours or another's. Log-only: no mirror or dispatcher state
    /// is touched, since the visible effects arrive as ordinary deltas and
    /// our own requests resolve through [`GameClient::command_result`].
    pub fn command_observed(
        &self,
        procedure: &str,
        caller: Identity,
        result: std::result::Result<(), String>,
    ) {
        match result {
            Ok(()) => log::debug!(
                "`{procedure}` by {} committed",
                caller.to_abbreviated_hex()
            ),
            Err(message) => log::debug!(
                "`{procedure}` by {} rejected: {message}",
                caller.to_abbreviated_hex()
            ),
        }
    }

    // ------------------------------------------------------------------
    // Commands, driven by the consumer.
    // ------------------------------------------------------------------

    pub fn set_name(&mut self, name: &str) -> Result<u32> {
        let name = validate_name(name)?;
        self.call(Command::SetName { name }, None)
    }

    pub fn send_message(&mut self, text: &str) -> Result<u32> {
        let text = validate_message_text(text)?;
        self.call(Command::SendMessage { text }, None)
    }

    pub fn delete_message(&mut self, message_id: u64) -> Result<u32> {
        self.call(Command::DeleteMessage { message_id }, None)
    }

    pub fn move_player(&mut self, x: f64, y: f64) -> Result<u32> {
        self.call(Command::MovePlayer { x, y }, None)
    }

    pub fn create_player_entity(&mut self) -> Result<u32> {
        self.call(Command::CreatePlayerEntity, None)
    }

    /// Dispatch any command with an acknowledgement callback. The callback
    /// runs exactly once, on success and rejection alike, when
    /// [`GameClient::command_result`] resolves the request.
    pub fn call_with_ack(
        &mut self,
        command: Command,
        on_ack: impl FnOnce(std::result::Result<(), String>) + Send + 'static,
    ) -> Result<u32> {
        self.call(command, Some(Box::new(on_ack)))
    }

    fn call(&mut self, command: Command, on_ack: Option<AckCallback>) -> Result<u32> {
        if self.state != SessionState::Connected {
            return Err(Error::NotConnected);
        }
        self.validate(&command)?;
        self.dispatcher.dispatch(command, on_ack)
    }

    /// Local input validation. The server remains the final authority and
    /// may still reject anything that passes here.
    fn validate(&self, command: &Command) -> Result<()> {
        match command {
            Command::SetName { name } => {
                validate_name(name)?;
            }
            Command::SendMessage { text } => {
                validate_message_text(text)?;
            }
            Command::DeleteMessage { message_id } => {
                if self.dispatcher.is_delete_pending(*message_id) {
                    return Err(Error::DeletePending {
                        message_id: *message_id,
                    });
                }
            }
            Command::MovePlayer { x, y } => {
                let map = self.active_map().ok_or(Error::NoActiveMap)?;
                let (tile_x, tile_y) = Vec2::new(*x, *y).tile();
                if !map.is_walkable(tile_x, tile_y) {
                    return Err(Error::UnwalkableTile { x: *x, y: *y });
                }
            }
            Command::CreatePlayerEntity => {
                if self.self_player().is_some_and(|player| player.entity_id.is_some()) {
                    return Err(Error::EntityAlreadyPresent);
                }
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Reads.
    // ------------------------------------------------------------------

    pub fn session_state(&self) -> SessionState {
        self.state
    }

    /// The message of the most recent failed connection attempt, if any.
    pub fn connect_error(&self) -> Option<&str> {
        self.connect_error.as_deref()
    }

    /// True once the initial subscription snapshot has been applied in the
    /// current session.
    pub fn is_synchronized(&self) -> bool {
        self.synchronized
    }

    pub fn identity(&self) -> Option<Identity> {
        self.self_tracker.identity
    }

    pub fn db(&self) -> &ClientCache {
        &self.cache
    }

    /// Row-callback registries, one per table. Registration returns a
    /// [`crate::CallbackId`] for later deregistration.
    pub fn callbacks(&mut self) -> &mut DbCallbacks {
        &mut self.callbacks
    }

    /// Our row in the user mirror, if the server has replicated it.
    pub fn self_user(&self) -> Option<&User> {
        let identity = self.self_tracker.identity?;
        self.cache.users().get(&identity)
    }

    /// Our row in the player mirror. Absent outside an active player
    /// session.
    pub fn self_player(&self) -> Option<&Player> {
        let identity = self.self_tracker.identity?;
        self.cache.players().get(&identity)
    }

    /// The entity our player row links to, if both exist.
    pub fn self_entity(&self) -> Option<&Entity> {
        let entity_id = self.self_player()?.entity_id?;
        self.cache.entities().get(&entity_id)
    }

    pub fn self_position(&self) -> Option<Vec2> {
        self.self_entity().map(|entity| entity.position)
    }

    /// True when we have a player row but no linked entity yet: the signal
    /// that [`GameClient::create_player_entity`] should be attempted once.
    pub fn needs_player_entity(&self) -> bool {
        self.self_player().is_some_and(|player| player.entity_id.is_none())
    }

    /// The map movement is validated against: the player's current map, or
    /// the starting town when the player has none.
    pub fn active_map(&self) -> Option<&Map> {
        self.self_player()
            .and_then(|player| player.current_map_id)
            .and_then(|map_id| self.cache.maps().get(&map_id))
            .or_else(|| views::starting_map(self.cache.maps()))
    }

    pub fn chat_transcript(&self) -> Vec<ChatLine> {
        views::chat_transcript(&self.cache)
    }

    /// Presence transitions observed this session, oldest first.
    pub fn presence_log(&self) -> &[PresenceEvent] {
        &self.presence
    }

    pub fn occupants_at(&self, x: i64, y: i64) -> Vec<&Entity> {
        views::occupants_at(self.cache.entities(), x, y)
    }

    pub fn player_at(&self, x: i64, y: i64) -> Option<&Player> {
        views::player_at(&self.cache, x, y)
    }

    /// Whether a delete for `message_id` is currently in flight.
    pub fn is_delete_pending(&self, message_id: u64) -> bool {
        self.dispatcher.is_delete_pending(message_id)
    }

    /// The server's most recent heartbeat, for staleness indicators.
    pub fn last_server_tick(&self) -> Option<Timestamp> {
        self.cache.ticks().iter().map(|tick| tick.last_tick_time).max()
    }
}
