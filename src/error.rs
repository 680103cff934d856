use thiserror::Error;

use crate::commands::{MAX_MESSAGE_LEN, MAX_NAME_LEN};

#[derive(Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Error {
    #[error("Not connected to the server")]
    NotConnected,

    #[error("Connection to the server was lost")]
    Disconnected,

    #[error("Already disconnected in call to `GameClient::disconnect`")]
    AlreadyDisconnected,

    #[error("Unexpected session transition: cannot {event} while {state}")]
    InvalidSessionTransition {
        state: &'static str,
        event: &'static str,
    },

    #[error("Failed to connect: {message}")]
    ConnectFailed { message: String },

    #[error("Names must be 1 to {MAX_NAME_LEN} characters")]
    InvalidName,

    #[error("Messages must be 1 to {MAX_MESSAGE_LEN} characters")]
    InvalidMessage,

    #[error("A delete for message {message_id} is already pending")]
    DeletePending { message_id: u64 },

    #[error("Cannot move to ({x}, {y}): blocked or out of bounds")]
    UnwalkableTile { x: f64, y: f64 },

    #[error("No map is available to validate movement against")]
    NoActiveMap,

    #[error("Player already has an entity")]
    EntityAlreadyPresent,

    #[error("No acknowledgement expected for request id {request_id}")]
    UnknownRequest { request_id: u32 },
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disconnect_variants_describe_their_cause() {
        // `Disconnected` is only ever reported for transport loss; a normal
        // `disconnect()` reports no error at all.
        assert_eq!(Error::Disconnected.to_string(), "Connection to the server was lost");
        assert_eq!(
            Error::AlreadyDisconnected.to_string(),
            "Already disconnected in call to `GameClient::disconnect`"
        );
    }
}
