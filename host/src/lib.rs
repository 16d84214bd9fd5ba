//! Shims for calling back into the host game, along with the log targets that every
//! other crate in this workspace tags its events with.
//!
//! The replay engine never reaches into the host directly. Everything it needs (scene
//! queries, running an update, native input devices) goes through the [`Host`] trait,
//! which the embedding side implements once and hands to the engine on every tick.

mod host;
pub use host::{GameInfo, Host, Scene};

pub mod input;

pub mod logger;

/// Log targets. Passed as `target:` to the `tracing` macros so the host log sink can
/// route events per subsystem.
///
/// ```no_run
/// use tas_host_integrations::Log;
///
/// tracing::info!(target: Log::Playback, "Starting run");
/// ```
#[derive(Debug)]
pub struct Log;

#[allow(non_upper_case_globals)]
impl Log {
    /// The playback manager and its state machine.
    pub const Playback: &'static str = "tas::playback";

    /// Script parsing and command execution.
    pub const Commands: &'static str = "tas::commands";

    /// Input injection and hotkey sampling.
    pub const Input: &'static str = "tas::input";

    /// The Studio IPC link.
    pub const Studio: &'static str = "tas::studio";

    /// Anything reported by or about the host itself.
    pub const Host: &'static str = "tas::host";
}
