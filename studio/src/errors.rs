use thiserror::Error;

use crate::{ConnectionState, MessageKind};

/// Any error that can be raised while talking to (or as) Studio.
///
/// Every variant other than `Serialization` means the channel is no longer usable; the
/// caller has to establish a fresh connection.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("{0}")]
    GenericIO(#[from] std::io::Error),

    #[error("Unknown message kind 0x{0:02x}")]
    UnknownMessageKind(u8),

    #[error("Message payload of {0} bytes exceeds the maximum frame size")]
    PayloadTooLarge(usize),

    #[error("Expected {expected:?} while {state:?}, received {received:?}")]
    UnexpectedMessage {
        state: ConnectionState,
        expected: MessageKind,
        received: MessageKind,
    },

    #[error("Received {0:?}, which is not valid in this direction")]
    InvalidDirection(MessageKind),

    #[error("Failed to (de)serialize payload: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Failed to spawn thread: {0}")]
    ThreadSpawn(std::io::Error),

    #[error("The channel is disconnected")]
    Disconnected,
}
