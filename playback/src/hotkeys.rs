use tas_host_integrations::Host;
use tas_host_integrations::input::Key;
use tas_studio_com::{Bindings, HotkeyId};

/// One hotkey slot, sampled once per tick.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Hotkey {
    /// Every key in the chord has to be held. An empty chord never triggers.
    pub keys: Vec<Key>,
    pub check: bool,
    pub last_check: bool,
}

impl Hotkey {
    pub fn new(keys: Vec<Key>) -> Self {
        Self {
            keys,
            ..Self::default()
        }
    }

    /// Shifts the previous sample and records `down` as the current one.
    pub fn update(&mut self, down: bool) {
        self.last_check = self.check;
        self.check = down;
    }

    /// Samples the chord through `is_down`.
    pub fn sample(&mut self, is_down: impl Fn(Key) -> bool) {
        let down = !self.keys.is_empty() && self.keys.iter().all(|key| is_down(*key));
        self.update(down);
    }

    pub fn pressed(&self) -> bool {
        self.check && !self.last_check
    }

    pub fn released(&self) -> bool {
        !self.check && self.last_check
    }
}

/// Every hotkey the playback state machine reads, plus the raw right stick.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Hotkeys {
    pub start_stop: Hotkey,
    pub restart: Hotkey,
    pub fast_forward: Hotkey,
    pub frame_advance: Hotkey,
    pub pause_resume: Hotkey,
    pub slow_forward: Hotkey,

    /// Right thumbstick X axis, used for analog speed control while a run is active.
    pub right_stick_x: f32,
}

impl Hotkeys {
    pub fn from_bindings(bindings: &Bindings) -> Self {
        let mut hotkeys = Self::default();
        hotkeys.apply_bindings(bindings);
        hotkeys
    }

    /// Replaces every chord with the one in `bindings`. Sampled state is kept.
    pub fn apply_bindings(&mut self, bindings: &Bindings) {
        for id in HotkeyId::ALL {
            self.get_mut(id).keys = bindings.keys(id).to_vec();
        }
    }

    pub fn get(&self, id: HotkeyId) -> &Hotkey {
        match id {
            HotkeyId::StartStop => &self.start_stop,
            HotkeyId::Restart => &self.restart,
            HotkeyId::FastForward => &self.fast_forward,
            HotkeyId::FrameAdvance => &self.frame_advance,
            HotkeyId::PauseResume => &self.pause_resume,
            HotkeyId::SlowForward => &self.slow_forward,
        }
    }

    pub fn get_mut(&mut self, id: HotkeyId) -> &mut Hotkey {
        match id {
            HotkeyId::StartStop => &mut self.start_stop,
            HotkeyId::Restart => &mut self.restart,
            HotkeyId::FastForward => &mut self.fast_forward,
            HotkeyId::FrameAdvance => &mut self.frame_advance,
            HotkeyId::PauseResume => &mut self.pause_resume,
            HotkeyId::SlowForward => &mut self.slow_forward,
        }
    }

    /// Samples the raw keyboard. The injected input state is never consulted, so a
    /// script cannot trigger its own hotkeys.
    pub fn update(&mut self, host: &dyn Host) {
        for id in HotkeyId::ALL {
            self.get_mut(id).sample(|key| host.is_key_down(key));
        }

        self.right_stick_x = host.right_stick_x();
    }

    /// Records a sample for one slot without touching the keyboard.
    pub fn set_down(&mut self, id: HotkeyId, down: bool) {
        self.get_mut(id).update(down);
    }
}
