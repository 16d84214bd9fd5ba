//! Deterministic, frame-accurate replay of TAS scripts into a running game.
//!
//! The host calls [`Manager::engine_update`] in place of its own update once per
//! native tick and [`Manager::update`] is driven from there, once per host update.
//! Everything the engine needs from the game goes through
//! [`tas_host_integrations::Host`].

pub mod actions;
pub mod commands;
pub mod config;
pub mod controller;
pub mod errors;
pub mod hooks;
pub mod hotkeys;
pub mod input;
pub mod parser;
pub mod speed;
pub mod state;
pub mod studio;
pub mod types;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use tas_host_integrations::input::GamePadState;
use tas_host_integrations::{Host, Log, Scene};
use tas_studio_com::{HotkeyId, StudioEvent, StudioInfo};

use crate::{
    actions::{ActionSender, MainThreadActions},
    commands::{CommandRegistry, CommandSignals},
    config::{FileScriptSource, ScriptSource, TasSettings},
    controller::InputController,
    errors::EngineError,
    hooks::RunHooks,
    hotkeys::Hotkeys,
    speed::{STATUS_THROTTLE, ULTRA_FAST_FORWARD_SPEED},
    state::{PlaybackStates, RunRequest, States},
    studio::{StudioAcceptor, StudioLink},
};

/// Savestates are not supported, so Studio never gets a savestate marker line.
const NO_SAVE_STATE_LINE: i32 = -1;

/// Owns a run from start to finish: the parsed script, the playback state machine,
/// hotkeys, and the Studio link.
///
/// Must be created on, and only ever ticked from, the host's update thread. Other
/// threads reach it through [`Manager::main_thread_sender`].
#[derive(Debug)]
pub struct Manager {
    settings: TasSettings,
    controller: InputController,
    states: PlaybackStates,
    hotkeys: Hotkeys,
    hooks: RunHooks,
    actions: MainThreadActions,
    studio: Option<Box<dyn StudioLink>>,
    acceptor: Option<StudioAcceptor>,
    frame_loops: f32,
    signals: CommandSignals,
}

impl Manager {
    pub fn new(settings: TasSettings) -> Self {
        Self::builder().with_settings(settings).build()
    }

    /// Loads settings from a TOML file (missing is fine) and uses scripts on disk.
    pub fn from_settings_file(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let settings = TasSettings::load(path.as_ref())?;
        tracing::info!(target: Log::Playback, script = ?settings.script_path, "Starting TAS manager");

        Ok(Self::new(settings))
    }

    pub fn builder() -> ManagerBuilder {
        ManagerBuilder::default()
    }

    pub fn settings(&self) -> &TasSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut TasSettings {
        &mut self.settings
    }

    pub fn states(&self) -> PlaybackStates {
        self.states
    }

    pub fn controller(&self) -> &InputController {
        &self.controller
    }

    pub fn hotkeys(&self) -> &Hotkeys {
        &self.hotkeys
    }

    pub fn hooks_mut(&mut self) -> &mut RunHooks {
        &mut self.hooks
    }

    pub fn is_running(&self) -> bool {
        self.states.is_enabled()
    }

    /// Host updates per outer tick, fractional below normal speed.
    pub fn frame_loops(&self) -> f32 {
        self.frame_loops
    }

    pub fn slow_forwarding(&self) -> bool {
        self.frame_loops < 1.0
    }

    pub fn ultra_fast_forwarding(&self) -> bool {
        self.is_running() && self.frame_loops >= ULTRA_FAST_FORWARD_SPEED
    }

    /// Whether the current host update must not advance the script: paused, or a
    /// sub-1 speed is between frames.
    pub fn skip_frame(&self, frame_counter: u64) -> bool {
        self.states.is_frame_stepping() || speed::skip_slow_forward_frame(frame_counter, self.frame_loops)
    }

    pub fn main_thread_sender(&self) -> ActionSender {
        self.actions.sender()
    }

    /// Runs `action` right away when called on the tick thread, otherwise at the start
    /// of the next tick.
    pub fn add_main_thread_action<F>(&mut self, action: F)
    where
        F: FnOnce(&mut Manager) + Send + 'static,
    {
        if self.actions.is_owner_thread() {
            action(self);
        } else {
            self.actions.push(Box::new(action));
        }
    }

    fn execute_main_thread_actions(&mut self) {
        loop {
            let pending = self.actions.take_pending();
            if pending.is_empty() {
                return;
            }

            for action in pending {
                action(self);
            }
        }
    }

    /// One host update, driven from [`Manager::engine_update`]: sample hotkeys,
    /// resolve speed and state, and play the next frame if nothing holds it back.
    pub fn update(&mut self, host: &mut dyn Host) {
        if !self.settings.enabled {
            host.poll_devices();
            return;
        }

        if !self.is_running() && host.is_active() {
            host.poll_devices();
        }

        self.states = self.states.begin_tick();
        self.execute_main_thread_actions();

        self.hotkeys.update(host);
        self.forward_hotkey_presses();

        self.handle_frame_rates();
        self.check_to_enable(host);
        self.states = self.states.frame_stepping(&self.hotkeys, host.frame_counter());

        if self.is_running() {
            if !self.skip_frame(host.frame_counter()) {
                self.advance(host);
            }
        } else if !host.is_active() {
            input::release_devices(host.devices());
            host.update_virtual_inputs();
        }

        self.send_state_to_studio(host);
    }

    /// The outer host tick, called in place of the host's native update.
    ///
    /// At integer speeds of two or more the host is updated that many times back to
    /// back, with its base update deferred to a single call afterwards. Each of those
    /// host updates consumes one script frame, so a script plays identically at any
    /// speed. An autosave with hazards ends the batch after the current update and
    /// the deferred base update is dropped for that tick.
    pub fn engine_update(&mut self, host: &mut dyn Host) {
        if !self.settings.enabled || !self.is_running() || self.slow_forwarding() {
            self.host_update(host, false);
            return;
        }

        let mut loops = self.frame_loops as usize;
        let mut defer_base_update = loops >= 2;

        let mut index = 0;
        while index < loops {
            self.host_update(host, defer_base_update);
            index += 1;

            if loops > 1 && host.is_autosaving_with_hazards() {
                // Cutting the batch also drops the deferred base update.
                tracing::debug!(target: Log::Playback, "Autosave in progress; limiting batch to one update");
                defer_base_update = false;
                loops = 1;
            }
        }

        if defer_base_update {
            host.update_base();
        }
    }

    fn host_update(&mut self, host: &mut dyn Host, skip_base_update: bool) {
        host.begin_update();
        self.update(host);

        // Frame stepping freezes the scene, except while loading, so loads complete.
        let frozen = self.settings.enabled && self.skip_frame(host.frame_counter()) && !host.is_loading();
        if !frozen {
            host.update_scene();
        }

        if !skip_base_update {
            host.update_base();
        }
    }

    fn advance(&mut self, host: &mut dyn Host) {
        if let Err(error) = self.controller.refresh_inputs(false, &mut self.settings) {
            tracing::warn!(target: Log::Playback, ?error, "Unable to reload script");
        }

        let advanced = self.controller.advance_frame(&mut self.settings, &mut self.signals);

        if let Some(frame) = advanced.frame {
            input::apply_input_frame(&frame, host.devices());
            host.update_virtual_inputs();
        }

        let stop_requested = self.apply_command_signals(host);

        if self.controller.is_break() && self.controller.can_playback() {
            tracing::info!(target: Log::Playback, frame = self.controller.current_frame_in_tas(), "Breakpoint reached");
            self.states = self.states.force_frame_step_next();
            self.frame_loops = 1.0;
        }

        if !advanced.can_playback || stop_requested {
            self.disable_run(host);
        } else if self.settings.disallow_unsafe_input
            && self.controller.current_frame_in_tas() > 1
            && unsafe_to_drive(host)
        {
            tracing::warn!(target: Log::Playback, scene = ?host.scene(), "Unsafe input; stopping run");
            self.disable_run(host);
        }
    }

    fn apply_command_signals(&mut self, host: &mut dyn Host) -> bool {
        let signals = std::mem::take(&mut self.signals);

        for words in &signals.console {
            host.run_console_command(words);
        }

        signals.stop_run
    }

    fn handle_frame_rates(&mut self) {
        let script_speed = self
            .controller
            .has_fast_forward()
            .then(|| self.controller.fast_forward_speed());

        self.frame_loops = speed::resolve_frame_loops(&self.states, script_speed, &self.hotkeys, &self.settings);
    }

    fn check_to_enable(&mut self, host: &mut dyn Host) {
        let (states, request) = self.states.check_to_enable(&self.hotkeys);
        self.states = states;

        match request {
            Some(RunRequest::Restart) => {
                self.disable_run(host);
                self.enable_run(host);
            },

            Some(RunRequest::Enable) => self.enable_run(host),
            Some(RunRequest::Disable) => self.disable_run(host),
            None => {},
        }
    }

    /// Starts a run from the first frame. Does nothing while the game is still
    /// booting.
    pub fn enable_run(&mut self, host: &mut dyn Host) {
        if host.scene() == Scene::GameLoader {
            tracing::debug!(target: Log::Playback, "Game is still loading; not starting run");
            return;
        }

        self.states.current.insert(States::ENABLE);
        self.states.current.remove(States::FRAME_STEP);
        self.states.next.remove(States::ENABLE);

        self.hooks.invoke_enable();

        if let Err(error) = self.controller.refresh_inputs(true, &mut self.settings) {
            tracing::error!(target: Log::Playback, ?error, "Unable to load script");
        }

        tracing::info!(
            target: Log::Playback,
            path = ?self.controller.path(),
            frames = self.controller.total_frames(),
            "Run started"
        );
    }

    /// Ends the run and releases anything playback was holding. Safe to call when no
    /// run is active.
    pub fn disable_run(&mut self, host: &mut dyn Host) {
        let was_running = self.is_running();
        self.states = PlaybackStates::default();

        let devices = host.devices();
        if devices.gamepad_attached {
            devices.gamepad.current = GamePadState::default();
        }

        self.hooks.invoke_disable();
        self.controller.stop();

        if was_running {
            tracing::info!(target: Log::Playback, "Run stopped");
        }
    }

    /// Ends the run on the next tick.
    pub fn disable_run_later(&mut self) {
        self.states.next.insert(States::DISABLE);
    }

    fn forward_hotkey_presses(&self) {
        let Some(studio) = &self.studio else {
            return;
        };

        for id in [HotkeyId::FrameAdvance, HotkeyId::PauseResume] {
            if self.hotkeys.get(id).pressed() {
                if let Err(error) = studio.send_hotkey_pressed(id) {
                    tracing::debug!(target: Log::Studio, ?error, ?id, "Unable to forward hotkey");
                }
            }
        }
    }

    /// The status snapshot Studio would receive right now.
    pub fn studio_info(&self, host: &dyn Host) -> StudioInfo {
        let game = host.game_info();

        let current_line_suffix = match self.controller.current_input() {
            Some(frame) => format!("{}/{}", self.controller.current_frame_in_input(), frame.frames),
            None => String::new(),
        };

        StudioInfo {
            current_line: self
                .controller
                .studio_line()
                .map_or(-1, |line| i32::try_from(line).unwrap_or(i32::MAX)),
            current_line_suffix,
            current_frame_in_tas: self.controller.current_frame_in_tas(),
            total_frames: self.controller.total_frames(),
            save_state_line: NO_SAVE_STATE_LINE,
            states: self.states.current.bits(),
            game_info: game.status,
            level_name: game.level_name,
            chapter_time: game.chapter_time,
        }
    }

    fn send_state_to_studio(&mut self, host: &dyn Host) {
        let Some(studio) = &self.studio else {
            return;
        };

        if !studio.is_alive() {
            tracing::info!(target: Log::Studio, "Studio disconnected");
            self.studio = None;
            return;
        }

        if self.ultra_fast_forwarding() && host.frame_counter() % STATUS_THROTTLE > 0 {
            return;
        }

        let info = self.studio_info(host);
        let guaranteed = self.states.should_force_state(&self.hotkeys);

        if let Err(error) = studio.send_state(&info, guaranteed, self.settings.status_retry_attempts) {
            tracing::debug!(target: Log::Studio, ?error, "Unable to send state");
        }
    }

    pub fn studio_connected(&self) -> bool {
        self.studio.as_ref().is_some_and(|studio| studio.is_alive())
    }

    /// Uses `link` for status from now on, replacing any previous connection.
    pub fn attach_studio(&mut self, link: impl StudioLink + 'static) {
        tracing::info!(target: Log::Studio, "Studio attached");
        self.studio = Some(Box::new(link));
    }

    /// Applies something Studio told us.
    pub fn handle_studio_event(&mut self, event: StudioEvent) {
        match event {
            StudioEvent::PathChanged(path) => {
                if let Some(acceptor) = &self.acceptor {
                    acceptor.set_script_path(&path);
                }

                let path = PathBuf::from(path);
                self.controller.set_path(path.clone());
                self.settings.script_path = path;
            },

            StudioEvent::BindingsChanged(bindings) => {
                self.hotkeys.apply_bindings(&bindings);
                self.settings.bindings = bindings;
            },
        }
    }

    /// Starts listening for Studio on the configured address. Returns the bound
    /// address, or `None` when the link is turned off.
    pub fn listen_for_studio(&mut self) -> Result<Option<SocketAddr>, EngineError> {
        let Some(address) = self.settings.studio_address.clone() else {
            tracing::info!(target: Log::Studio, "Studio link disabled");
            return Ok(None);
        };

        // Release the old listener first so the address can be reused.
        self.acceptor = None;

        let acceptor = StudioAcceptor::start(
            &address,
            self.settings.script_path.display().to_string(),
            self.settings.status_retry_attempts,
            self.actions.sender(),
        )?;

        let local_addr = acceptor.local_addr();
        self.acceptor = Some(acceptor);

        Ok(Some(local_addr))
    }
}

/// Whether the host is somewhere playback must never drive.
fn unsafe_to_drive(host: &dyn Host) -> bool {
    match host.scene() {
        Scene::Level => host.is_unsafe_menu_open(),
        Scene::LevelLoader | Scene::LevelExit => false,
        Scene::GameLoader | Scene::Other => true,
    }
}

#[derive(Default)]
pub struct ManagerBuilder {
    settings: Option<TasSettings>,
    source: Option<Box<dyn ScriptSource + Send + Sync>>,
    registry: Option<CommandRegistry>,
}

impl ManagerBuilder {
    pub fn with_settings(mut self, settings: TasSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    pub fn with_script_source(mut self, source: impl ScriptSource + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn with_registry(mut self, registry: CommandRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn build(self) -> Manager {
        let settings = self.settings.unwrap_or_default();

        let controller = InputController::from_parts(
            settings.script_path.clone(),
            self.source.unwrap_or_else(|| Box::new(FileScriptSource)),
            self.registry.unwrap_or_else(CommandRegistry::builtin),
        );

        Manager {
            hotkeys: Hotkeys::from_bindings(&settings.bindings),
            settings,
            controller,
            states: PlaybackStates::default(),
            hooks: RunHooks::default(),
            actions: MainThreadActions::new(),
            studio: None,
            acceptor: None,
            frame_loops: 1.0,
            signals: CommandSignals::default(),
        }
    }
}
