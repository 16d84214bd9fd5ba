use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use tas_host_integrations::Log;

use crate::{ChannelError, Message};

/// How long to back off between attempts of a guaranteed write.
const RETRY_BACKOFF: Duration = Duration::from_millis(5);

/// A bidirectional byte stream that can be split into a read half and a write half.
pub trait Duplex: Read + Write + Send + Sized + 'static {
    /// Returns a second handle to the same underlying stream.
    fn try_clone(&self) -> io::Result<Self>;

    /// Closes both directions, unblocking any reader on another handle.
    fn shutdown(&self) -> io::Result<()>;
}

impl Duplex for TcpStream {
    fn try_clone(&self) -> io::Result<Self> {
        TcpStream::try_clone(self)
    }

    fn shutdown(&self) -> io::Result<()> {
        TcpStream::shutdown(self, Shutdown::Both)
    }
}

#[cfg(unix)]
impl Duplex for std::os::unix::net::UnixStream {
    fn try_clone(&self) -> io::Result<Self> {
        std::os::unix::net::UnixStream::try_clone(self)
    }

    fn shutdown(&self) -> io::Result<()> {
        std::os::unix::net::UnixStream::shutdown(self, Shutdown::Both)
    }
}

/// Handshake progress of a connection. Any failure drops back to `Disconnected`, and a
/// disconnected channel never comes back; the caller establishes a new one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Disconnected = 0,
    Connecting = 1,
    AwaitingPathAck = 2,
    AwaitingBindings = 3,
    Ready = 4,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Connecting,
            2 => Self::AwaitingPathAck,
            3 => Self::AwaitingBindings,
            4 => Self::Ready,
            _ => Self::Disconnected,
        }
    }
}

/// The write half of a connection plus the state shared with its read thread.
#[derive(Debug)]
pub(crate) struct Channel<S: Duplex> {
    writer: Mutex<S>,
    state: AtomicU8,
    role: &'static str,
}

impl<S: Duplex> Channel<S> {
    pub(crate) fn new(writer: S, role: &'static str) -> Self {
        Self {
            writer: Mutex::new(writer),
            state: AtomicU8::new(ConnectionState::Connecting as u8),
            role,
        }
    }

    pub(crate) fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Moves the handshake forward. Has no effect once the channel is dead.
    pub(crate) fn advance(&self, next: ConnectionState) {
        let _ = self.state.fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
            (current != ConnectionState::Disconnected as u8).then_some(next as u8)
        });
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.state() != ConnectionState::Disconnected
    }

    /// Marks the channel dead and closes the stream so the read thread unblocks.
    pub(crate) fn mark_dead(&self) {
        let previous = self.state.swap(ConnectionState::Disconnected as u8, Ordering::AcqRel);
        if previous == ConnectionState::Disconnected as u8 {
            return;
        }

        tracing::info!(target: Log::Studio, role = self.role, "Channel disconnected");

        let writer = self.writer.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Err(error) = writer.shutdown() {
            tracing::debug!(target: Log::Studio, ?error, "Stream shutdown failed");
        }
    }

    /// Best-effort write. Any failure kills the channel; there is no retry.
    pub(crate) fn write(&self, message: &Message) -> Result<(), ChannelError> {
        if !self.is_alive() {
            return Err(ChannelError::Disconnected);
        }

        let frame = message.encode()?;

        if let Err(error) = self.write_frame(&frame) {
            tracing::warn!(target: Log::Studio, role = self.role, kind = ?message.kind, ?error, "Write failed");
            self.mark_dead();
            return Err(error.into());
        }

        Ok(())
    }

    /// Write that retries transient failures up to `attempts` times before giving up and
    /// killing the channel.
    pub(crate) fn write_guaranteed(&self, message: &Message, attempts: u32) -> Result<(), ChannelError> {
        if !self.is_alive() {
            return Err(ChannelError::Disconnected);
        }

        let frame = message.encode()?;
        let attempts = attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;

            match self.write_frame(&frame) {
                Ok(()) => return Ok(()),

                Err(error) if attempt < attempts && is_transient(&error) => {
                    tracing::debug!(target: Log::Studio, attempt, ?error, "Retrying write");
                    thread::sleep(RETRY_BACKOFF);
                },

                Err(error) => {
                    tracing::warn!(
                        target: Log::Studio,
                        role = self.role,
                        kind = ?message.kind,
                        attempt,
                        ?error,
                        "Guaranteed write failed"
                    );
                    self.mark_dead();
                    return Err(error.into());
                },
            }
        }
    }

    fn write_frame(&self, frame: &[u8]) -> io::Result<()> {
        let mut writer = self.writer.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        writer.write_all(frame)?;
        writer.flush()
    }
}

/// Failures worth retrying without corrupting framing (nothing was consumed).
fn is_transient(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}

/// Spawns a named background reader that runs until `body` returns.
pub(crate) fn spawn_reader<F>(name: &str, body: F) -> Result<thread::JoinHandle<()>, ChannelError>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new()
        .name(name.into())
        .spawn(body)
        .map_err(ChannelError::ThreadSpawn)
}

/// Releases a reader thread, logging if it panicked.
pub(crate) fn join_reader(handle: Option<thread::JoinHandle<()>>) {
    if let Some(handle) = handle {
        if let Err(error) = handle.join() {
            tracing::error!(target: Log::Studio, ?error, "Studio reader thread join failure");
        }
    }
}

/// Shared by both roles: keeps the channel state in sync when the reader ends.
pub(crate) fn log_reader_exit<S: Duplex>(channel: &Arc<Channel<S>>, error: &ChannelError) {
    if crate::message::is_disconnect(error) || !channel.is_alive() {
        tracing::info!(target: Log::Studio, role = channel.role, "Peer closed the connection");
    } else {
        tracing::error!(target: Log::Studio, role = channel.role, ?error, "Read loop failed");
    }

    channel.mark_dead();
}
