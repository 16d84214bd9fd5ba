//! The side of the protocol embedded in the engine.

use std::net::TcpStream;
use std::sync::Arc;
use std::thread;

use tas_host_integrations::Log;

use crate::channel::{join_reader, log_reader_exit, spawn_reader, Channel};
use crate::{Bindings, ChannelError, ConnectionState, Duplex, HotkeyId, Message, MessageKind, StudioEvent, StudioInfo};

/// A live connection to Studio, owned by the engine.
///
/// Writes happen synchronously on the caller's thread; reads happen on a background
/// thread that only ever forwards [`StudioEvent`]s through the sink handed to
/// [`StudioServer::establish`]. Once the channel dies it stays dead, and the owner is
/// expected to drop it and establish a new one.
#[derive(Debug)]
pub struct StudioServer<S: Duplex = TcpStream> {
    channel: Arc<Channel<S>>,
    reader_thread: Option<thread::JoinHandle<()>>,
}

impl<S: Duplex> StudioServer<S> {
    /// Runs the handshake over `stream` and, on success, starts the read thread.
    ///
    /// The sequence is fixed: greet, send our script path, then block until Studio
    /// answers with its current bindings. Anything else ends in `Disconnected`.
    ///
    /// This blocks until the handshake finishes, so it should never be called from the
    /// host's tick thread.
    pub fn establish<F>(stream: S, script_path: &str, write_attempts: u32, mut on_event: F) -> Result<Self, ChannelError>
    where
        F: FnMut(StudioEvent) + Send + 'static,
    {
        let mut reader = stream.try_clone()?;
        let channel = Arc::new(Channel::new(stream, "server"));

        let bindings = match handshake(&channel, &mut reader, script_path, write_attempts) {
            Ok(bindings) => bindings,

            Err(error) => {
                tracing::warn!(target: Log::Studio, ?error, state = ?channel.state(), "Studio handshake failed");
                channel.mark_dead();
                return Err(error);
            },
        };

        on_event(StudioEvent::BindingsChanged(bindings));
        channel.advance(ConnectionState::Ready);

        tracing::info!(target: Log::Studio, "Studio connection established");

        let reader_channel = channel.clone();
        let reader_thread = spawn_reader("StudioComServerReader", move || {
            read_loop(reader, reader_channel, on_event);
        });

        let reader_thread = match reader_thread {
            Ok(handle) => handle,

            Err(error) => {
                channel.mark_dead();
                return Err(error);
            },
        };

        Ok(Self {
            channel,
            reader_thread: Some(reader_thread),
        })
    }

    pub fn state(&self) -> ConnectionState {
        self.channel.state()
    }

    pub fn is_alive(&self) -> bool {
        self.channel.is_alive()
    }

    /// Pushes a status snapshot. `guaranteed` retries transient failures; callers use it
    /// for snapshots that must not be lost (e.g. the tick a frame-step pause begins).
    pub fn send_state(&self, info: &StudioInfo, guaranteed: bool, write_attempts: u32) -> Result<(), ChannelError> {
        let message = Message::new(MessageKind::SendState, info.to_payload()?);

        if guaranteed {
            self.channel.write_guaranteed(&message, write_attempts)
        } else {
            self.channel.write(&message)
        }
    }

    pub fn send_player_data(&self, text: &str) -> Result<(), ChannelError> {
        self.channel.write(&Message::text(MessageKind::SendPlayerData, text))
    }

    pub fn send_current_bindings(&self, bindings: &Bindings) -> Result<(), ChannelError> {
        self.channel.write(&Message::new(MessageKind::SendCurrentBindings, bindings.to_payload()?))
    }

    pub fn send_hotkey_pressed(&self, hotkey: HotkeyId) -> Result<(), ChannelError> {
        self.channel.write(&Message::new(MessageKind::SendHotkeyPressed, vec![hotkey.into()]))
    }

    /// Asks Studio to refresh its view of the bindings.
    pub fn send_reload_bindings(&self) -> Result<(), ChannelError> {
        self.channel.write(&Message::empty(MessageKind::ReloadBindings))
    }
}

impl<S: Duplex> Drop for StudioServer<S> {
    fn drop(&mut self) {
        self.channel.mark_dead();
        join_reader(self.reader_thread.take());
    }
}

fn handshake<S: Duplex>(
    channel: &Channel<S>,
    reader: &mut S,
    script_path: &str,
    write_attempts: u32,
) -> Result<Bindings, ChannelError> {
    channel.write_guaranteed(&Message::empty(MessageKind::EstablishConnection), write_attempts)?;

    channel.write_guaranteed(&Message::text(MessageKind::SendPath, script_path), write_attempts)?;
    channel.advance(ConnectionState::AwaitingPathAck);

    // Studio consumes the path without answering it; its next message is the bindings.
    channel.advance(ConnectionState::AwaitingBindings);
    let message = Message::read_from(reader)?;

    if message.kind != MessageKind::SendCurrentBindings {
        return Err(ChannelError::UnexpectedMessage {
            state: channel.state(),
            expected: MessageKind::SendCurrentBindings,
            received: message.kind,
        });
    }

    Ok(Bindings::from_payload(&message.payload)?)
}

fn read_loop<S, F>(mut reader: S, channel: Arc<Channel<S>>, mut on_event: F)
where
    S: Duplex,
    F: FnMut(StudioEvent),
{
    loop {
        let result = Message::read_from(&mut reader).and_then(|message| dispatch(message, &mut on_event));

        if let Err(error) = result {
            log_reader_exit(&channel, &error);
            return;
        }
    }
}

fn dispatch<F>(message: Message, on_event: &mut F) -> Result<(), ChannelError>
where
    F: FnMut(StudioEvent),
{
    match message.kind {
        MessageKind::SendPath => {
            let path = message.payload_text();
            tracing::info!(target: Log::Studio, ?path, "Studio sent a new script path");
            on_event(StudioEvent::PathChanged(path));
        },

        MessageKind::SendCurrentBindings | MessageKind::SendNewBindings => {
            let bindings = Bindings::from_payload(&message.payload)?;
            tracing::info!(target: Log::Studio, slots = bindings.0.len(), "Studio sent bindings");
            on_event(StudioEvent::BindingsChanged(bindings));
        },

        // Studio may ping us while it is busy.
        MessageKind::Wait => {},

        kind => return Err(ChannelError::InvalidDirection(kind)),
    }

    Ok(())
}
