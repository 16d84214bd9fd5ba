//! The playback state machine.
//!
//! Three snapshots are kept: `last` (the previous tick), `current`, and `next` (what
//! will be applied on a later tick). Every transition takes the snapshots by value and
//! returns the new ones, so the manager is the only place that stores them.

use crate::hotkeys::Hotkeys;

bitflags::bitflags! {
    /// Playback flags. The raw bits are reported to Studio.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct States: u8 {
        const ENABLE = 1 << 0;
        const FRAME_STEP = 1 << 2;
        const DISABLE = 1 << 3;
    }
}

/// A run-level change the manager has to carry out.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunRequest {
    Enable,
    Disable,
    Restart,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PlaybackStates {
    pub last: States,
    pub current: States,
    pub next: States,
}

impl PlaybackStates {
    pub fn is_enabled(&self) -> bool {
        self.current.contains(States::ENABLE)
    }

    pub fn is_frame_stepping(&self) -> bool {
        self.current.contains(States::FRAME_STEP)
    }

    pub fn begin_tick(self) -> Self {
        Self { last: self.current, ..self }
    }

    /// Start/stop and restart.
    ///
    /// Holding start/stop only arms the toggle; it is applied on the first tick the
    /// key is no longer held. A released restart key restarts immediately.
    pub fn check_to_enable(mut self, hotkeys: &Hotkeys) -> (Self, Option<RunRequest>) {
        if hotkeys.restart.released() {
            return (self, Some(RunRequest::Restart));
        }

        if hotkeys.start_stop.check {
            if self.is_enabled() {
                self.next.insert(States::DISABLE);
            } else {
                self.next.insert(States::ENABLE);
            }

            return (self, None);
        }

        if self.next.contains(States::ENABLE) {
            return (self, Some(RunRequest::Enable));
        }

        if self.next.contains(States::DISABLE) {
            return (self, Some(RunRequest::Disable));
        }

        (self, None)
    }

    /// Frame advance, pause/resume and stepping through with fast-forward held.
    pub fn frame_stepping(mut self, hotkeys: &Hotkeys, frame_counter: u64) -> Self {
        if !self.is_enabled() {
            return self;
        }

        // Both are ignored while start/stop is held.
        let frame_advance = hotkeys.frame_advance.check && !hotkeys.start_stop.check;
        let pause = hotkeys.pause_resume.check && !hotkeys.start_stop.check;

        if self.next.contains(States::FRAME_STEP) {
            self.current.insert(States::FRAME_STEP);
            self.next.remove(States::FRAME_STEP);
        }

        if frame_advance && !hotkeys.frame_advance.last_check {
            if self.is_frame_stepping() {
                // Let exactly one frame through and pause again on the next tick.
                self.current.remove(States::FRAME_STEP);
                self.next.insert(States::FRAME_STEP);
            } else {
                self.current.insert(States::FRAME_STEP);
                self.next.remove(States::FRAME_STEP);
            }
        } else if pause && !hotkeys.pause_resume.last_check {
            if self.is_frame_stepping() {
                self.current.remove(States::FRAME_STEP);
            } else {
                self.current.insert(States::FRAME_STEP);
            }

            self.next.remove(States::FRAME_STEP);
        } else if self.last.contains(States::FRAME_STEP)
            && self.is_frame_stepping()
            && (hotkeys.fast_forward.check || (hotkeys.slow_forward.check && frame_counter % 10 == 0))
        {
            self.current.remove(States::FRAME_STEP);
            self.next.insert(States::FRAME_STEP);
        }

        self
    }

    /// Pause on the next tick, as a breakpoint does when it is reached.
    pub fn force_frame_step_next(mut self) -> Self {
        self.next.insert(States::FRAME_STEP);
        self
    }

    /// Whether this tick's status must reach Studio: a pause is about to begin and
    /// nothing is holding the game in continuous stepping.
    pub fn should_force_state(&self, hotkeys: &Hotkeys) -> bool {
        self.next.contains(States::FRAME_STEP) && !hotkeys.fast_forward.check && !hotkeys.slow_forward.check
    }
}
