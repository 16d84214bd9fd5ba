//! Playback speed: how many host updates to run per outer tick.

use crate::config::TasSettings;
use crate::hotkeys::Hotkeys;
use crate::state::{PlaybackStates, States};

/// Slowest speed the right stick can select: one frame per second.
pub const MIN_SPEED: f32 = 1.0 / 60.0;

/// Speed of a fast-forward target or breakpoint that does not name one.
pub const DEFAULT_FAST_FORWARD_SPEED: f32 = 400.0;

/// At or above this speed, status pushes to Studio are throttled.
pub const ULTRA_FAST_FORWARD_SPEED: f32 = 100.0;

/// While ultra fast-forwarding, only ticks whose counter is a multiple of this push
/// status.
pub const STATUS_THROTTLE: u64 = 23;

/// Resolves this tick's speed.
///
/// The script's fast-forward target sets the base speed. The first of these that
/// applies replaces it: the fast-forward hotkey, the slow-forward hotkey, a right
/// stick push worth at least two frames, then a right stick pull below normal speed.
///
/// Speed only changes while a run is playing (enabled, and not stepping now or on
/// the next tick). Otherwise the game runs at normal speed.
pub fn resolve_frame_loops(
    states: &PlaybackStates,
    script_speed: Option<f32>,
    hotkeys: &Hotkeys,
    settings: &TasSettings,
) -> f32 {
    let playing = states.current.contains(States::ENABLE)
        && !states.current.contains(States::FRAME_STEP)
        && !states.next.contains(States::FRAME_STEP);

    if !playing {
        return 1.0;
    }

    let script_speed = script_speed.unwrap_or(1.0);
    let stick = hotkeys.right_stick_x;
    let fast = (stick * settings.fast_forward_speed as f32).round();
    let slow = (1.0 + stick) * settings.slow_forward_speed;

    if hotkeys.fast_forward.check {
        settings.fast_forward_speed as f32
    } else if hotkeys.slow_forward.check {
        settings.slow_forward_speed
    } else if fast >= 2.0 {
        fast
    } else if stick < 0.0 && slow <= 0.9 {
        slow.max(MIN_SPEED)
    } else {
        script_speed
    }
}

/// Whether a sub-1 speed skips this tick.
///
/// Treats `frame_loops` as a fractional accumulator: a tick advances exactly when
/// `counter * frame_loops` crosses an integer, so over `n` ticks starting at counter
/// zero the run advances `floor(n * frame_loops)` frames.
pub fn skip_slow_forward_frame(frame_counter: u64, frame_loops: f32) -> bool {
    if frame_loops >= 1.0 {
        return false;
    }

    let speed = frame_loops as f64;
    let counter = frame_counter as f64;

    ((counter + 1.0) * speed).floor() == (counter * speed).floor()
}
