use std::fmt;

use tas_host_integrations::input::Stick;

bitflags::bitflags! {
    /// The actions a single input frame can hold.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct Actions: u32 {
        const LEFT = 1 << 0;
        const RIGHT = 1 << 1;
        const UP = 1 << 2;
        const DOWN = 1 << 3;
        const JUMP = 1 << 4;
        const DASH = 1 << 5;
        const GRAB = 1 << 6;
        const START = 1 << 7;
        const RESTART = 1 << 8;
        const FEATHER = 1 << 9;
        const JOURNAL = 1 << 10;
        const JUMP2 = 1 << 11;
        const DASH2 = 1 << 12;
        const CONFIRM = 1 << 13;
        const DEMO_DASH = 1 << 14;
        const DEMO_DASH2 = 1 << 15;
    }
}

/// Single-letter codes and word names, in the order they are printed.
const ACTION_CODES: [(char, &str, Actions); 16] = [
    ('L', "Left", Actions::LEFT),
    ('R', "Right", Actions::RIGHT),
    ('U', "Up", Actions::UP),
    ('D', "Down", Actions::DOWN),
    ('J', "Jump", Actions::JUMP),
    ('K', "Jump2", Actions::JUMP2),
    ('X', "Dash", Actions::DASH),
    ('C', "Dash2", Actions::DASH2),
    ('Z', "DemoDash", Actions::DEMO_DASH),
    ('V', "DemoDash2", Actions::DEMO_DASH2),
    ('G', "Grab", Actions::GRAB),
    ('S', "Start", Actions::START),
    ('Q', "Restart", Actions::RESTART),
    ('N', "Journal", Actions::JOURNAL),
    ('O', "Confirm", Actions::CONFIRM),
    ('F', "Feather", Actions::FEATHER),
];

impl Actions {
    /// Looks up a single-letter code, ignoring case.
    pub fn from_code(code: char) -> Option<Actions> {
        let code = code.to_ascii_uppercase();

        ACTION_CODES
            .iter()
            .find(|(candidate, _, _)| *candidate == code)
            .map(|(_, _, action)| *action)
    }

    /// Looks up a word name such as `Jump2`, ignoring case.
    pub fn from_word(name: &str) -> Option<Actions> {
        ACTION_CODES
            .iter()
            .find(|(_, candidate, _)| candidate.eq_ignore_ascii_case(name))
            .map(|(_, _, action)| *action)
    }

    /// The letter code for a single action.
    pub fn code(self) -> Option<char> {
        ACTION_CODES
            .iter()
            .find(|(_, _, action)| *action == self)
            .map(|(code, _, _)| *code)
    }
}

/// One line of input: a set of actions held for `frames` consecutive frames.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InputFrame {
    pub actions: Actions,
    pub frames: u32,

    /// The Studio line this input came from.
    pub studio_line: usize,

    /// Feather direction in degrees, 0 being up and increasing clockwise.
    pub angle: f32,
    pub magnitude: f32,
}

impl Default for InputFrame {
    fn default() -> Self {
        Self {
            actions: Actions::empty(),
            frames: 1,
            studio_line: 0,
            angle: 0.0,
            magnitude: 1.0,
        }
    }
}

impl InputFrame {
    pub fn has_actions(&self, actions: Actions) -> bool {
        self.actions.contains(actions)
    }

    /// The analog stick position for a feather input.
    pub fn angle_vector(&self) -> Stick {
        let radians = self.angle.to_radians();

        Stick {
            x: radians.sin() * self.magnitude,
            y: radians.cos() * self.magnitude,
        }
    }
}

impl fmt::Display for InputFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>4}", self.frames)?;

        for (code, _, action) in ACTION_CODES {
            if action == Actions::FEATHER || !self.actions.contains(action) {
                continue;
            }

            write!(f, ",{code}")?;
        }

        if self.actions.contains(Actions::FEATHER) {
            write!(f, ",F,{}", self.angle)?;

            if self.magnitude != 1.0 {
                write!(f, ",{}", self.magnitude)?;
            }
        }

        Ok(())
    }
}

/// Fast-forward target. Playback runs at `speed` until the target frame is reached,
/// and breakpoints additionally stop there.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FastForward {
    pub frame: usize,
    pub speed: f32,
    pub force_stop: bool,
    pub studio_line: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_and_names_agree() {
        for (code, name, action) in ACTION_CODES {
            assert_eq!(Actions::from_code(code), Some(action));
            assert_eq!(Actions::from_code(code.to_ascii_lowercase()), Some(action));
            assert_eq!(Actions::from_word(name), Some(action));
            assert_eq!(action.code(), Some(code));
        }

        assert_eq!(Actions::from_word("jump2"), Some(Actions::JUMP2));
        assert_eq!(Actions::from_code('?'), None);
        assert_eq!((Actions::JUMP | Actions::DASH).code(), None);
    }

    #[test]
    fn test_display_uses_native_form() {
        let frame = InputFrame {
            actions: Actions::RIGHT | Actions::JUMP | Actions::DASH,
            frames: 15,
            ..InputFrame::default()
        };
        assert_eq!(frame.to_string(), "  15,R,J,X");

        let feather = InputFrame {
            actions: Actions::FEATHER,
            frames: 3,
            angle: 90.0,
            magnitude: 0.5,
            ..InputFrame::default()
        };
        assert_eq!(feather.to_string(), "   3,F,90,0.5");
    }

    #[test]
    fn test_angle_vector_points_clockwise_from_up() {
        let mut frame = InputFrame {
            actions: Actions::FEATHER,
            ..InputFrame::default()
        };

        let up = frame.angle_vector();
        assert!(up.x.abs() < 1e-6 && (up.y - 1.0).abs() < 1e-6);

        frame.angle = 90.0;
        frame.magnitude = 0.5;
        let right = frame.angle_vector();
        assert!((right.x - 0.5).abs() < 1e-6 && right.y.abs() < 1e-6);
    }
}
