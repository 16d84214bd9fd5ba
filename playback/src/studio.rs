//! The engine's side of the Studio link: what the manager needs from a connection, and
//! the background listener that produces connections.

use std::fmt;
use std::io::ErrorKind;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use tas_host_integrations::Log;
use tas_studio_com::{ChannelError, Duplex, HotkeyId, StudioInfo, StudioServer};

use crate::actions::ActionSender;
use crate::errors::EngineError;

/// A live, handshaken connection to Studio.
pub trait StudioLink: Send + fmt::Debug {
    fn is_alive(&self) -> bool;
    fn send_state(&self, info: &StudioInfo, guaranteed: bool, write_attempts: u32) -> Result<(), ChannelError>;
    fn send_hotkey_pressed(&self, hotkey: HotkeyId) -> Result<(), ChannelError>;
}

impl<S: Duplex + fmt::Debug> StudioLink for StudioServer<S> {
    fn is_alive(&self) -> bool {
        StudioServer::is_alive(self)
    }

    fn send_state(&self, info: &StudioInfo, guaranteed: bool, write_attempts: u32) -> Result<(), ChannelError> {
        StudioServer::send_state(self, info, guaranteed, write_attempts)
    }

    fn send_hotkey_pressed(&self, hotkey: HotkeyId) -> Result<(), ChannelError> {
        StudioServer::send_hotkey_pressed(self, hotkey)
    }
}

const ACCEPT_POLL: Duration = Duration::from_millis(50);

/// Listens for Studio on a background thread.
///
/// Each accepted connection is handshaken on its own short-lived thread, so neither
/// the tick thread nor the listener ever waits on a slow peer. A ready connection is
/// handed to the manager through its action queue, replacing any previous one.
#[derive(Debug)]
pub struct StudioAcceptor {
    should_listen: Arc<AtomicBool>,
    script_path: Arc<Mutex<String>>,
    local_addr: SocketAddr,
    listener_thread: Option<thread::JoinHandle<()>>,
}

impl StudioAcceptor {
    pub fn start(
        address: &str,
        script_path: String,
        write_attempts: u32,
        actions: ActionSender,
    ) -> Result<Self, EngineError> {
        let bind_error = |source| EngineError::StudioBind {
            address: address.to_string(),
            source,
        };

        let listener = TcpListener::bind(address).map_err(bind_error)?;
        listener.set_nonblocking(true).map_err(bind_error)?;
        let local_addr = listener.local_addr().map_err(bind_error)?;

        let should_listen = Arc::new(AtomicBool::new(true));
        let script_path = Arc::new(Mutex::new(script_path));

        let listener_thread = {
            let should_listen = should_listen.clone();
            let script_path = script_path.clone();

            thread::Builder::new()
                .name("StudioComListenerThread".into())
                .spawn(move || listen(listener, should_listen, script_path, write_attempts, actions))
                .map_err(EngineError::ThreadSpawn)?
        };

        tracing::info!(target: Log::Studio, %local_addr, "Listening for Studio");

        Ok(Self {
            should_listen,
            script_path,
            local_addr,
            listener_thread: Some(listener_thread),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The path announced to the next Studio that connects.
    pub fn set_script_path(&self, path: &str) {
        *self.script_path.lock().expect("Unable to acquire studio path lock") = path.to_string();
    }
}

impl Drop for StudioAcceptor {
    fn drop(&mut self) {
        self.should_listen.store(false, Ordering::Relaxed);

        if let Some(listener_thread) = self.listener_thread.take() {
            if let Err(error) = listener_thread.join() {
                tracing::error!(target: Log::Studio, ?error, "Studio listener thread join failure");
            }
        }
    }
}

fn listen(
    listener: TcpListener,
    should_listen: Arc<AtomicBool>,
    script_path: Arc<Mutex<String>>,
    write_attempts: u32,
    actions: ActionSender,
) {
    while should_listen.load(Ordering::Relaxed) {
        match listener.accept() {
            Ok((stream, peer)) => {
                tracing::info!(target: Log::Studio, %peer, "Studio connecting");

                let path = script_path.lock().expect("Unable to acquire studio path lock").clone();
                let actions = actions.clone();

                let spawned = thread::Builder::new()
                    .name("StudioComHandshakeThread".into())
                    .spawn(move || handshake(stream, path, write_attempts, actions));

                if let Err(error) = spawned {
                    tracing::error!(target: Log::Studio, ?error, "Unable to spawn Studio handshake thread");
                }
            },

            Err(error) if error.kind() == ErrorKind::WouldBlock => thread::sleep(ACCEPT_POLL),

            Err(error) => {
                tracing::warn!(target: Log::Studio, ?error, "Studio accept failed");
                thread::sleep(ACCEPT_POLL);
            },
        }
    }
}

fn handshake(stream: TcpStream, script_path: String, write_attempts: u32, actions: ActionSender) {
    // Accepted sockets can inherit the listener's non-blocking mode.
    if let Err(error) = stream.set_nonblocking(false) {
        tracing::warn!(target: Log::Studio, ?error, "Unable to configure Studio socket");
        return;
    }

    let events = actions.clone();
    let server = StudioServer::establish(stream, &script_path, write_attempts, move |event| {
        events.send(move |manager| manager.handle_studio_event(event));
    });

    match server {
        Ok(server) => {
            if !actions.send(move |manager| manager.attach_studio(server)) {
                tracing::debug!(target: Log::Studio, "Manager is gone; dropping Studio connection");
            }
        },

        Err(error) => tracing::warn!(target: Log::Studio, ?error, "Studio handshake failed"),
    }
}
