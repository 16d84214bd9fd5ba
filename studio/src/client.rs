//! The Studio side of the protocol. The editor itself is out of scope; this exists so
//! tools (and tests) can observe a running engine the same way Studio does.

use std::net::TcpStream;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use tas_host_integrations::Log;

use crate::channel::{join_reader, log_reader_exit, spawn_reader, Channel};
use crate::{Bindings, ChannelError, ConnectionState, Duplex, HotkeyId, Message, MessageKind, StudioInfo};

/// Everything the engine has told us so far.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StudioView {
    /// The script path sent during the handshake (or later).
    pub path: String,
    pub state: Option<StudioInfo>,
    pub states_received: usize,
    pub player_data: String,
    pub bindings: Option<Bindings>,
    pub hotkeys_pressed: Vec<HotkeyId>,
    pub reload_requests: usize,
}

#[derive(Debug)]
pub struct StudioClient<S: Duplex = TcpStream> {
    channel: Arc<Channel<S>>,
    view: Arc<Mutex<StudioView>>,
    reader_thread: Option<thread::JoinHandle<()>>,
}

impl<S: Duplex> StudioClient<S> {
    /// Mirrors [`crate::StudioServer::establish`]: consume the greeting, consume the
    /// path, answer with our bindings.
    pub fn establish(stream: S, bindings: &Bindings, write_attempts: u32) -> Result<Self, ChannelError> {
        let mut reader = stream.try_clone()?;
        let channel = Arc::new(Channel::new(stream, "client"));

        let path = match handshake(&channel, &mut reader, bindings, write_attempts) {
            Ok(path) => path,

            Err(error) => {
                tracing::warn!(target: Log::Studio, ?error, state = ?channel.state(), "Client handshake failed");
                channel.mark_dead();
                return Err(error);
            },
        };

        channel.advance(ConnectionState::Ready);

        let view = Arc::new(Mutex::new(StudioView {
            path,
            ..StudioView::default()
        }));

        let reader_channel = channel.clone();
        let reader_view = view.clone();
        let reader_thread = spawn_reader("StudioComClientReader", move || {
            read_loop(reader, reader_channel, reader_view);
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
            view,
            reader_thread: Some(reader_thread),
        })
    }

    pub fn state(&self) -> ConnectionState {
        self.channel.state()
    }

    pub fn is_alive(&self) -> bool {
        self.channel.is_alive()
    }

    /// A copy of everything received so far.
    pub fn view(&self) -> StudioView {
        self.view.lock().expect("Unable to acquire studio view lock").clone()
    }

    /// Polls the view until `predicate` holds or `timeout` passes.
    pub fn wait_for<F>(&self, timeout: Duration, predicate: F) -> bool
    where
        F: Fn(&StudioView) -> bool,
    {
        let deadline = Instant::now() + timeout;

        loop {
            if predicate(&self.view()) {
                return true;
            }

            if Instant::now() >= deadline {
                return false;
            }

            thread::sleep(Duration::from_millis(2));
        }
    }

    /// Points the engine at a different script.
    pub fn send_path(&self, path: &str) -> Result<(), ChannelError> {
        self.channel.write(&Message::text(MessageKind::SendPath, path))
    }

    pub fn send_new_bindings(&self, bindings: &Bindings) -> Result<(), ChannelError> {
        self.channel.write(&Message::new(MessageKind::SendNewBindings, bindings.to_payload()?))
    }
}

impl<S: Duplex> Drop for StudioClient<S> {
    fn drop(&mut self) {
        self.channel.mark_dead();
        join_reader(self.reader_thread.take());
    }
}

fn expect_kind<S: Duplex>(channel: &Channel<S>, message: &Message, expected: MessageKind) -> Result<(), ChannelError> {
    if message.kind != expected {
        return Err(ChannelError::UnexpectedMessage {
            state: channel.state(),
            expected,
            received: message.kind,
        });
    }

    Ok(())
}

fn handshake<S: Duplex>(
    channel: &Channel<S>,
    reader: &mut S,
    bindings: &Bindings,
    write_attempts: u32,
) -> Result<String, ChannelError> {
    let greeting = Message::read_from(reader)?;
    expect_kind(channel, &greeting, MessageKind::EstablishConnection)?;

    channel.advance(ConnectionState::AwaitingPathAck);
    let path = Message::read_from(reader)?;
    expect_kind(channel, &path, MessageKind::SendPath)?;

    channel.advance(ConnectionState::AwaitingBindings);
    channel.write_guaranteed(
        &Message::new(MessageKind::SendCurrentBindings, bindings.to_payload()?),
        write_attempts,
    )?;

    Ok(path.payload_text())
}

fn read_loop<S: Duplex>(mut reader: S, channel: Arc<Channel<S>>, view: Arc<Mutex<StudioView>>) {
    loop {
        let result = Message::read_from(&mut reader).and_then(|message| record(message, &view));

        if let Err(error) = result {
            log_reader_exit(&channel, &error);
            return;
        }
    }
}

fn record(message: Message, view: &Mutex<StudioView>) -> Result<(), ChannelError> {
    let mut view = view.lock().expect("Unable to acquire studio view lock");

    match message.kind {
        MessageKind::SendState => {
            view.state = Some(StudioInfo::from_payload(&message.payload)?);
            view.states_received += 1;
        },

        MessageKind::SendPlayerData => view.player_data = message.payload_text(),
        MessageKind::SendPath => view.path = message.payload_text(),
        MessageKind::SendCurrentBindings => view.bindings = Some(Bindings::from_payload(&message.payload)?),

        MessageKind::SendHotkeyPressed => {
            let raw = message.payload.first().copied().unwrap_or(u8::MAX);
            match HotkeyId::try_from(raw) {
                Ok(hotkey) => view.hotkeys_pressed.push(hotkey),
                Err(_) => tracing::warn!(target: Log::Studio, raw, "Unknown hotkey id"),
            }
        },

        MessageKind::ReloadBindings => view.reload_requests += 1,
        MessageKind::Wait | MessageKind::Reset => {},

        kind => return Err(ChannelError::InvalidDirection(kind)),
    }

    Ok(())
}
