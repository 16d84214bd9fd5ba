//! Writes replayed input into the host's native device state.

use tas_host_integrations::input::{Buttons, DPad, GamePadState, InputDevices, KeyboardState};

use crate::types::{Actions, InputFrame};

/// Action to the gamepad buttons it presses. Several actions press more than one
/// button so that menus read them too. Confirm only ever reaches the keyboard.
const BUTTONS: [(Actions, Buttons); 14] = [
    (Actions::JUMP, Buttons::JUMP.union(Buttons::CONFIRM)),
    (Actions::JUMP2, Buttons::ALT_JUMP),
    (Actions::DEMO_DASH, Buttons::DEMO_DASH),
    (Actions::DEMO_DASH2, Buttons::ALT_DEMO_DASH),
    (Actions::DASH, Buttons::DASH.union(Buttons::TALK).union(Buttons::MENU_CANCEL)),
    (Actions::DASH2, Buttons::ALT_DASH.union(Buttons::MENU_CANCEL)),
    (Actions::GRAB, Buttons::GRAB),
    (Actions::START, Buttons::PAUSE),
    (Actions::RESTART, Buttons::QUICK_RESTART),
    (Actions::UP, Buttons::UP),
    (Actions::DOWN, Buttons::DOWN),
    (Actions::LEFT, Buttons::LEFT),
    (Actions::RIGHT, Buttons::RIGHT),
    (Actions::JOURNAL, Buttons::JOURNAL.union(Buttons::TALK)),
];

pub fn native_buttons(actions: Actions) -> Buttons {
    BUTTONS
        .iter()
        .filter(|(action, _)| actions.contains(*action))
        .fold(Buttons::empty(), |buttons, (_, button)| buttons | *button)
}

/// The full pad state for one frame. A feather frame drives the left stick and
/// leaves the d-pad released; anything else drives the d-pad.
pub fn gamepad_state(frame: &InputFrame) -> GamePadState {
    let mut state = GamePadState {
        buttons: native_buttons(frame.actions),
        ..GamePadState::default()
    };

    if frame.has_actions(Actions::FEATHER) {
        state.left_stick = frame.angle_vector();
    } else {
        state.dpad = DPad {
            up: frame.has_actions(Actions::UP),
            down: frame.has_actions(Actions::DOWN),
            left: frame.has_actions(Actions::LEFT),
            right: frame.has_actions(Actions::RIGHT),
        };
    }

    if frame.has_actions(Actions::JOURNAL) {
        state.left_trigger = 1.0;
    }

    state
}

/// Replaces the host's pad and keyboard state with this frame's.
///
/// Both devices shift their current state into `previous` first, so "just pressed"
/// checks on the host side see the frame boundary.
pub fn apply_input_frame(frame: &InputFrame, devices: &mut InputDevices) {
    devices.gamepad.push(gamepad_state(frame));

    let keyboard = if frame.has_actions(Actions::CONFIRM) {
        KeyboardState::with_keys(&[devices.confirm_key])
    } else {
        KeyboardState::default()
    };
    devices.keyboard.push(keyboard);
}

/// Releases everything, for when no run is active and the window has lost focus.
pub fn release_devices(devices: &mut InputDevices) {
    devices.keyboard.release();
    devices.mouse_buttons.release();
    devices.gamepad.release();
}
