use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};

use tas_host_integrations::input::Key;

/// A snapshot of live playback state pushed to Studio every eligible tick.
///
/// This is serialized to a single JSON line for `SendState`; it is always sent whole.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudioInfo {
    /// Studio line of the input frame last played, or `-1` before the first frame.
    #[serde(rename = "currentLine")]
    pub current_line: i32,

    /// Human-readable position inside that line's repeat count, e.g. `3/10`.
    #[serde(rename = "currentLineSuffix")]
    pub current_line_suffix: String,

    #[serde(rename = "currentFrameInTas")]
    pub current_frame_in_tas: usize,

    #[serde(rename = "totalFrames")]
    pub total_frames: usize,

    /// Line to highlight as a savestate marker, or `-1`.
    #[serde(rename = "saveStateLine")]
    pub save_state_line: i32,

    /// Raw playback state bits.
    #[serde(rename = "tasStates")]
    pub states: u8,

    #[serde(rename = "gameInfo")]
    pub game_info: String,

    #[serde(rename = "levelName")]
    pub level_name: String,

    #[serde(rename = "chapterTime")]
    pub chapter_time: String,
}

impl StudioInfo {
    pub fn to_payload(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Decodes a `SendState` payload. An empty payload is a valid, empty status.
    pub fn from_payload(payload: &[u8]) -> Result<Self, serde_json::Error> {
        if payload.is_empty() {
            return Ok(Self::default());
        }

        serde_json::from_slice(payload)
    }
}

/// Hotkey slots whose bindings are shared with Studio.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize_repr, Deserialize_repr, IntoPrimitive, TryFromPrimitive,
)]
#[repr(u8)]
pub enum HotkeyId {
    StartStop = 0,
    Restart = 1,
    FastForward = 2,
    FrameAdvance = 3,
    PauseResume = 4,
    SlowForward = 5,
}

impl HotkeyId {
    pub const ALL: [HotkeyId; 6] = [
        HotkeyId::StartStop,
        HotkeyId::Restart,
        HotkeyId::FastForward,
        HotkeyId::FrameAdvance,
        HotkeyId::PauseResume,
        HotkeyId::SlowForward,
    ];
}

/// The keys bound to one hotkey slot. Every key in the list has to be held.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HotkeyBinding {
    pub hotkey: HotkeyId,
    pub keys: Vec<Key>,
}

/// The full set of hotkey bindings, one entry per slot, as exchanged with Studio.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Bindings(pub Vec<HotkeyBinding>);

impl Bindings {
    pub fn keys(&self, hotkey: HotkeyId) -> &[Key] {
        self.0
            .iter()
            .find(|binding| binding.hotkey == hotkey)
            .map(|binding| binding.keys.as_slice())
            .unwrap_or(&[])
    }

    /// Replaces (or adds) the keys for a slot.
    pub fn set(&mut self, hotkey: HotkeyId, keys: Vec<Key>) {
        match self.0.iter_mut().find(|binding| binding.hotkey == hotkey) {
            Some(binding) => binding.keys = keys,
            None => self.0.push(HotkeyBinding { hotkey, keys }),
        }
    }

    pub fn to_payload(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_payload(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }
}

/// Inbound events the server's read thread hands to the engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StudioEvent {
    /// Studio switched to editing a different script.
    PathChanged(String),

    /// Studio sent a fresh set of bindings.
    BindingsChanged(Bindings),
}
