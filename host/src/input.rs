//! Host-native input device state.
//!
//! These mirror what the host's game logic reads every frame. Each device keeps the
//! previous and current state so that "just pressed" checks on the host side keep
//! working whether the state came from real hardware or from a replayed script.

/// A host key code. The exact numbering is whatever the host's keyboard API uses.
pub type Key = u32;

bitflags::bitflags! {
    /// Gamepad buttons, bound to the host's actions one-to-one while a run is active.
    ///
    /// These values are part of the replay format and must never be renumbered.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct Buttons: u32 {
        const UP = 1 << 0;
        const DOWN = 1 << 1;
        const LEFT = 1 << 2;
        const RIGHT = 1 << 3;
        const CONFIRM = 1 << 4;
        const JUMP = 1 << 5;
        const ALT_JUMP = 1 << 6;
        const DASH = 1 << 7;
        const ALT_DASH = 1 << 8;
        const TALK = 1 << 9;
        const MENU_CANCEL = 1 << 10;
        const GRAB = 1 << 11;
        const PAUSE = 1 << 12;
        const QUICK_RESTART = 1 << 13;
        const JOURNAL = 1 << 14;
        const DEMO_DASH = 1 << 15;
        const ALT_DEMO_DASH = 1 << 16;
    }
}

/// Four-way digital pad.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DPad {
    pub up: bool,
    pub down: bool,
    pub left: bool,
    pub right: bool,
}

/// A single analog stick, each axis in `[-1, 1]`; positive Y is up.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Stick {
    pub x: f32,
    pub y: f32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct GamePadState {
    pub buttons: Buttons,
    pub dpad: DPad,
    pub left_stick: Stick,
    pub right_stick: Stick,
    pub left_trigger: f32,
    pub right_trigger: f32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KeyboardState {
    pub pressed: Vec<Key>,
}

impl KeyboardState {
    pub fn with_keys(keys: &[Key]) -> Self {
        Self { pressed: keys.to_vec() }
    }

    pub fn is_down(&self, key: Key) -> bool {
        self.pressed.contains(&key)
    }
}

/// Previous/current pair for a device.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DeviceState<T> {
    pub previous: T,
    pub current: T,
}

impl<T: Default> DeviceState<T> {
    /// Shifts `current` into `previous` and installs `next`.
    pub fn push(&mut self, next: T) {
        self.previous = std::mem::replace(&mut self.current, next);
    }

    /// Shifts `current` into `previous` and leaves a released state behind.
    pub fn release(&mut self) {
        self.push(T::default());
    }
}

/// The host device set the engine writes into.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InputDevices {
    pub gamepad: DeviceState<GamePadState>,
    pub keyboard: DeviceState<KeyboardState>,
    pub mouse_buttons: DeviceState<u8>,

    /// Whether a physical gamepad is attached. Only attached pads get reset when a run
    /// ends.
    pub gamepad_attached: bool,

    /// The keyboard key the host treats as "confirm" while a run is active.
    pub confirm_key: Key,
}
