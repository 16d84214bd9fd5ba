//! The Studio protocol: a length-prefixed, typed message stream used to keep the
//! external editor informed of live playback and to receive hotkey bindings from it.
//!
//! Framing lives in [`message`]. [`StudioServer`] is the engine's end of a connection,
//! [`StudioClient`] is Studio's end. Both run a strict handshake, then hand reads off to
//! a background thread and write synchronously from the caller's thread.

mod channel;
pub use channel::{ConnectionState, Duplex};

mod client;
pub use client::{StudioClient, StudioView};

mod errors;
pub use errors::ChannelError;

pub mod message;
pub use message::{Message, MessageKind};

mod server;
pub use server::StudioServer;

mod types;
pub use types::{Bindings, HotkeyBinding, HotkeyId, StudioEvent, StudioInfo};
