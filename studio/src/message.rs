//! Framing for the Studio protocol.
//!
//! Every message on the wire is:
//!
//! ```text
//! [kind: u8][length: u32 little-endian][payload: length bytes]
//! ```
//!
//! There is no magic number or checksum; the stream is assumed reliable and in-order.

use std::io::{self, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::ChannelError;

/// Size of the fixed header in bytes.
pub const HEADER_SIZE: usize = 5;

/// Anything bigger than this is treated as a corrupt stream rather than allocated.
pub const MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// Message kinds. The numbering is shared with the Studio side and must never change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum MessageKind {
    // Connection
    EstablishConnection = 0x00,
    Wait = 0x01,
    Reset = 0x02,

    // Pure data transfer
    SendState = 0x10,
    SendPlayerData = 0x11,

    // Data transfer from Studio
    SendPath = 0x20,
    SendHotkeyPressed = 0x21,
    SendNewBindings = 0x22,
    ReloadBindings = 0x23,

    // Data transfer from the game
    SendCurrentBindings = 0x30,
}

/// A single framed message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub kind: MessageKind,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn new(kind: MessageKind, payload: Vec<u8>) -> Self {
        Self { kind, payload }
    }

    /// A message with no payload (handshake greetings, reload requests).
    pub fn empty(kind: MessageKind) -> Self {
        Self::new(kind, Vec::new())
    }

    /// A message carrying a UTF-8 string.
    pub fn text(kind: MessageKind, text: &str) -> Self {
        Self::new(kind, text.as_bytes().to_vec())
    }

    /// The payload as text. Invalid UTF-8 is replaced rather than rejected, since the
    /// text messages are purely informational.
    pub fn payload_text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }

    /// Length of the encoded frame.
    pub fn encoded_len(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }

    /// Encodes the full frame into a fresh buffer.
    pub fn encode(&self) -> Result<Vec<u8>, ChannelError> {
        let mut buffer = Vec::with_capacity(self.encoded_len());
        self.write_to(&mut buffer)?;
        Ok(buffer)
    }

    /// Writes the full frame. The caller is responsible for flushing.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<(), ChannelError> {
        if self.payload.len() > MAX_PAYLOAD {
            return Err(ChannelError::PayloadTooLarge(self.payload.len()));
        }

        writer.write_u8(self.kind.into())?;
        writer.write_u32::<LittleEndian>(self.payload.len() as u32)?;
        writer.write_all(&self.payload)?;
        Ok(())
    }

    /// Blocks until a full frame has been read.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self, ChannelError> {
        let raw_kind = reader.read_u8()?;
        let kind = MessageKind::try_from(raw_kind).map_err(|_| ChannelError::UnknownMessageKind(raw_kind))?;

        let length = reader.read_u32::<LittleEndian>()? as usize;
        if length > MAX_PAYLOAD {
            return Err(ChannelError::PayloadTooLarge(length));
        }

        let mut payload = vec![0u8; length];
        reader.read_exact(&mut payload)?;

        Ok(Self { kind, payload })
    }
}

/// Whether an error means the peer simply went away.
pub(crate) fn is_disconnect(error: &ChannelError) -> bool {
    match error {
        ChannelError::GenericIO(error) => matches!(
            error.kind(),
            io::ErrorKind::UnexpectedEof
                | io::ErrorKind::BrokenPipe
                | io::ErrorKind::ConnectionReset
                | io::ErrorKind::ConnectionAborted
        ),

        ChannelError::Disconnected => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn round_trip(message: &Message) -> Message {
        let bytes = message.encode().unwrap();
        assert_eq!(bytes.len(), message.encoded_len());
        Message::read_from(&mut Cursor::new(bytes)).unwrap()
    }

    #[test]
    fn test_round_trip_preserves_kind_and_payload() {
        let empty = Message::empty(MessageKind::EstablishConnection);
        assert_eq!(round_trip(&empty), empty);

        let single = Message::new(MessageKind::SendHotkeyPressed, vec![3]);
        assert_eq!(round_trip(&single), single);

        let large_payload: Vec<u8> = (0..64 * 1024).map(|i| (i % 251) as u8).collect();
        let large = Message::new(MessageKind::SendPlayerData, large_payload);
        assert_eq!(round_trip(&large), large);
    }

    #[test]
    fn test_header_layout() {
        let bytes = Message::text(MessageKind::SendPath, "ab").encode().unwrap();
        assert_eq!(bytes, vec![0x20, 2, 0, 0, 0, b'a', b'b']);
    }

    #[test]
    fn test_empty_state_decodes_to_empty_text() {
        let message = round_trip(&Message::empty(MessageKind::SendState));
        assert_eq!(message.kind, MessageKind::SendState);
        assert_eq!(message.payload_text(), "");
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        let bytes = vec![0x7f, 0, 0, 0, 0];
        let result = Message::read_from(&mut Cursor::new(bytes));
        assert!(matches!(result, Err(ChannelError::UnknownMessageKind(0x7f))));
    }

    #[test]
    fn test_oversized_length_is_rejected_before_allocating() {
        let mut bytes = vec![0x10];
        bytes.extend_from_slice(&u32::MAX.to_le_bytes());
        let result = Message::read_from(&mut Cursor::new(bytes));
        assert!(matches!(result, Err(ChannelError::PayloadTooLarge(_))));
    }

    #[test]
    fn test_truncated_frame_is_a_disconnect() {
        let bytes = vec![0x11, 10, 0, 0, 0, b'x'];
        let error = Message::read_from(&mut Cursor::new(bytes)).unwrap_err();
        assert!(is_disconnect(&error));
    }
}
