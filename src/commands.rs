//! Outward commands: typed user intents, local validation, and the
//! pending-state tracking that suppresses duplicate in-flight submissions.
//!
//! Dispatching a command never mutates a table mirror; all visible effects
//! arrive later as ordinary deltas. The dispatcher's only local state is the
//! in-flight bookkeeping needed to route acknowledgements and to reject a
//! duplicate request for a key that is already pending.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};

use futures_channel::mpsc;

use crate::error::{Error, Result};

/// Longest display name the client will submit.
pub const MAX_NAME_LEN: usize = 20;
/// Longest chat message the client will submit.
pub const MAX_MESSAGE_LEN: usize = 500;

/// A user intent submitted to the server authority.
///
/// A closed set: every variant is validated and dispatched through one
/// exhaustive match, and the server may still reject any of them.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    SetName { name: String },
    SendMessage { text: String },
    DeleteMessage { message_id: u64 },
    MovePlayer { x: f64, y: f64 },
    CreatePlayerEntity,
}

impl Command {
    /// The remote procedure this command invokes.
    pub fn procedure(&self) -> &'static str {
        match self {
            Command::SetName { .. } => "set_name",
            Command::SendMessage { .. } => "send_message",
            Command::DeleteMessage { .. } => "delete_message",
            Command::MovePlayer { .. } => "move_player",
            Command::CreatePlayerEntity => "create_player_entity",
        }
    }
}

/// A message pushed into the transport's outbound channel.
///
/// Encoding these for the wire is the transport's concern, not ours.
#[derive(Clone, Debug, PartialEq)]
pub enum ClientMessage {
    Subscribe { queries: Vec<String> },
    CallCommand { request_id: u32, command: Command },
}

/// One-shot acknowledgement callback for a dispatched command. `Err` carries
/// the server's rejection message.
pub type AckCallback = Box<dyn FnOnce(std::result::Result<(), String>) + Send>;

struct InFlight {
    command: Command,
    on_ack: Option<AckCallback>,
}

/// Tracks in-flight commands and owns the outbound channel while connected.
#[derive(Default)]
pub(crate) struct CommandDispatcher {
    /// `None` while disconnected; commands are rejected locally then.
    send: Option<mpsc::UnboundedSender<ClientMessage>>,
    in_flight: HashMap<u32, InFlight>,
    /// Message ids with a delete in flight. A second delete for a pending id
    /// is rejected locally without contacting the server.
    pending_deletes: HashSet<u64>,
}

impl CommandDispatcher {
    pub(crate) fn arm(&mut self, send: mpsc::UnboundedSender<ClientMessage>) {
        self.send = Some(send);
    }

    /// Drop the channel and all cross-session state. In-flight commands will
    /// never be acknowledged; their callbacks are dropped uncalled.
    pub(crate) fn disarm(&mut self) {
        self.send = None;
        self.in_flight.clear();
        self.pending_deletes.clear();
    }

    pub(crate) fn is_armed(&self) -> bool {
        self.send.is_some()
    }

    pub(crate) fn is_delete_pending(&self, message_id: u64) -> bool {
        self.pending_deletes.contains(&message_id)
    }

    /// Push a message that is not a command call, e.g. the initial subscribe.
    pub(crate) fn send_raw(&mut self, message: ClientMessage) -> Result<()> {
        let send = self.send.as_ref().ok_or(Error::NotConnected)?;
        if send.unbounded_send(message).is_err() {
            // Receiver gone: the transport died under us.
            self.disarm();
            return Err(Error::NotConnected);
        }
        Ok(())
    }

    /// Submit `command`, registering `on_ack` to run when the server
    /// acknowledges it. Returns the request id used on the wire.
    pub(crate) fn dispatch(&mut self, command: Command, on_ack: Option<AckCallback>) -> Result<u32> {
        if !self.is_armed() {
            return Err(Error::NotConnected);
        }
        if let Command::DeleteMessage { message_id } = &command {
            if !self.pending_deletes.insert(*message_id) {
                return Err(Error::DeletePending {
                    message_id: *message_id,
                });
            }
        }

        let request_id = next_request_id();
        log::debug!("dispatching `{}` as request {request_id}", command.procedure());

        let outcome = self.send_raw(ClientMessage::CallCommand {
            request_id,
            command: command.clone(),
        });
        if let Err(e) = outcome {
            // Nothing went out, so nothing is pending.
            if let Command::DeleteMessage { message_id } = &command {
                self.pending_deletes.remove(message_id);
            }
            return Err(e);
        }

        self.in_flight.insert(request_id, InFlight { command, on_ack });
        Ok(request_id)
    }

    /// Resolve the command behind `request_id`. Pending markers are cleared
    /// on success and failure alike; a rejected command must not wedge its
    /// key.
    pub(crate) fn complete(
        &mut self,
        request_id: u32,
        result: std::result::Result<(), String>,
    ) -> Result<()> {
        let in_flight = self
            .in_flight
            .remove(&request_id)
            .ok_or(Error::UnknownRequest { request_id })?;

        if let Command::DeleteMessage { message_id } = &in_flight.command {
            self.pending_deletes.remove(message_id);
        }
        match &result {
            Ok(()) => log::trace!("request {request_id} committed"),
            Err(message) => log::debug!(
                "request {request_id} (`{}`) rejected: {message}",
                in_flight.command.procedure()
            ),
        }
        if let Some(on_ack) = in_flight.on_ack {
            on_ack(result);
        }
        Ok(())
    }
}

/// Validate and normalize a requested display name.
pub fn validate_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() || name.chars().count() > MAX_NAME_LEN {
        return Err(Error::InvalidName);
    }
    Ok(name.to_owned())
}

/// Validate and normalize an outgoing chat message.
pub fn validate_message_text(text: &str) -> Result<String> {
    let text = text.trim();
    if text.is_empty() || text.chars().count() > MAX_MESSAGE_LEN {
        return Err(Error::InvalidMessage);
    }
    Ok(text.to_owned())
}

static NEXT_REQUEST_ID: AtomicU32 = AtomicU32::new(1);

fn next_request_id() -> u32 {
    NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn armed() -> (CommandDispatcher, mpsc::UnboundedReceiver<ClientMessage>) {
        let (send, recv) = mpsc::unbounded();
        let mut dispatcher = CommandDispatcher::default();
        dispatcher.arm(send);
        (dispatcher, recv)
    }

    fn sent_calls(recv: &mut mpsc::UnboundedReceiver<ClientMessage>) -> Vec<ClientMessage> {
        let mut out = Vec::new();
        while let Ok(Some(msg)) = recv.try_next() {
            out.push(msg);
        }
        out
    }

    #[test]
    fn duplicate_pending_delete_is_rejected_locally() {
        let (mut dispatcher, mut recv) = armed();

        let first = dispatcher
            .dispatch(Command::DeleteMessage { message_id: 42 }, None)
            .unwrap();
        let second = dispatcher.dispatch(Command::DeleteMessage { message_id: 42 }, None);
        assert_eq!(second, Err(Error::DeletePending { message_id: 42 }));

        // Only the first request went out.
        assert_eq!(sent_calls(&mut recv).len(), 1);

        // Once resolved, the same id dispatches normally again.
        dispatcher.complete(first, Err("not yours".into())).unwrap();
        dispatcher
            .dispatch(Command::DeleteMessage { message_id: 42 }, None)
            .unwrap();
        assert_eq!(sent_calls(&mut recv).len(), 1);
    }

    #[test]
    fn pending_clears_on_success_too() {
        let (mut dispatcher, _recv) = armed();
        let request = dispatcher
            .dispatch(Command::DeleteMessage { message_id: 7 }, None)
            .unwrap();
        assert!(dispatcher.is_delete_pending(7));

        dispatcher.complete(request, Ok(())).unwrap();
        assert!(!dispatcher.is_delete_pending(7));
    }

    #[test]
    fn distinct_keys_may_be_pending_concurrently() {
        let (mut dispatcher, mut recv) = armed();
        dispatcher
            .dispatch(Command::DeleteMessage { message_id: 1 }, None)
            .unwrap();
        dispatcher
            .dispatch(Command::DeleteMessage { message_id: 2 }, None)
            .unwrap();
        assert_eq!(sent_calls(&mut recv).len(), 2);
    }

    #[test]
    fn acknowledgement_reaches_the_callback() {
        let (mut dispatcher, _recv) = armed();
        let (ack_send, mut ack_recv) = mpsc::unbounded();
        let request = dispatcher
            .dispatch(
                Command::SetName { name: "ada".into() },
                Some(Box::new(move |result| {
                    ack_send.unbounded_send(result).unwrap();
                })),
            )
            .unwrap();

        dispatcher.complete(request, Err("name taken".into())).unwrap();
        assert_eq!(ack_recv.try_next().unwrap(), Some(Err("name taken".into())));
    }

    #[test]
    fn unknown_request_id_is_an_error() {
        let (mut dispatcher, _recv) = armed();
        assert_eq!(
            dispatcher.complete(999_999, Ok(())),
            Err(Error::UnknownRequest {
                request_id: 999_999
            })
        );
    }

    #[test]
    fn dispatch_while_disarmed_is_rejected() {
        let mut dispatcher = CommandDispatcher::default();
        assert_eq!(
            dispatcher.dispatch(Command::CreatePlayerEntity, None),
            Err(Error::NotConnected)
        );
    }

    #[test]
    fn disarm_clears_pending_markers() {
        let (mut dispatcher, _recv) = armed();
        dispatcher
            .dispatch(Command::DeleteMessage { message_id: 3 }, None)
            .unwrap();
        dispatcher.disarm();
        assert!(!dispatcher.is_delete_pending(3));
    }

    #[test]
    fn name_and_message_validation() {
        assert_eq!(validate_name("  ada  ").unwrap(), "ada");
        assert_eq!(validate_name("   "), Err(Error::InvalidName));
        assert_eq!(validate_name(&"x".repeat(21)), Err(Error::InvalidName));
        assert_eq!(validate_message_text(" hi "), Ok("hi".into()));
        assert_eq!(validate_message_text(""), Err(Error::InvalidMessage));
        assert_eq!(
            validate_message_text(&"y".repeat(501)),
            Err(Error::InvalidMessage)
        );
    }
}
