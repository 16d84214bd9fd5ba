use crate::input::{InputDevices, Key};

/// The coarse scene the host is currently in. The engine only cares about a handful of
/// them; everything else is `Other`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Scene {
    /// Actively playing a level.
    Level,

    /// Loading into a level.
    LevelLoader,

    /// Exiting a level.
    LevelExit,

    /// The boot loader. Runs cannot be started while this is active.
    GameLoader,

    /// Menus, overworld, credits, etc.
    #[default]
    Other,
}

/// Free-form game status shown by Studio alongside the playback position.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GameInfo {
    pub status: String,
    pub level_name: String,
    pub chapter_time: String,
}

/// Everything the replay engine needs from the host game.
///
/// The host calls into the engine from its own update loop and passes itself in; the
/// engine then drives the host back through these methods. This replaces patching the
/// host's update loop: the host cooperates by splitting one native update into
/// "scene update" and "base update" so that batching during fast-forward can skip and
/// re-run them explicitly.
pub trait Host {
    /// The scene currently active.
    fn scene(&self) -> Scene;

    /// Whether the host is in a loading phase where a frame-step freeze must not apply.
    fn is_loading(&self) -> bool;

    /// Whether the host window has focus.
    fn is_active(&self) -> bool;

    /// Monotonic host update counter. Advanced by the host in [`Host::begin_update`].
    fn frame_counter(&self) -> u64;

    /// Raw keyboard state, read directly from the device and never from the injected
    /// input state.
    fn is_key_down(&self, key: Key) -> bool;

    /// Raw right thumbstick X deflection in `[-1, 1]`.
    fn right_stick_x(&self) -> f32;

    /// The native input state that the host's game logic reads from.
    fn devices(&mut self) -> &mut InputDevices;

    /// Marks the start of one host update, batched or not. Hosts bump their frame
    /// counter here.
    fn begin_update(&mut self) {}

    /// Runs the host's own device polling (used when no run is active).
    fn poll_devices(&mut self);

    /// Re-derives the host's virtual/combined inputs from the native device state.
    fn update_virtual_inputs(&mut self);

    /// One update of the active scene (entities, physics, timers).
    fn update_scene(&mut self);

    /// The host's base per-tick update (framework components, audio, etc).
    fn update_base(&mut self);

    /// Whether the host is autosaving while entities that cannot tolerate batched
    /// updates are present in the scene.
    fn is_autosaving_with_hazards(&self) -> bool;

    /// Whether a menu is open that playback must never drive (options, mod settings).
    fn is_unsafe_menu_open(&self) -> bool {
        false
    }

    /// Hands a `Console` command's words over to the host console.
    fn run_console_command(&mut self, args: &[String]) {
        tracing::warn!(target: crate::Log::Host, ?args, "Host has no console; ignoring command");
    }

    /// Status text for Studio.
    fn game_info(&self) -> GameInfo {
        GameInfo::default()
    }
}
