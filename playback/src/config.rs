use std::collections::HashMap;
use std::env;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use tas_host_integrations::Log;
use tas_studio_com::{Bindings, HotkeyId};

use crate::errors::EngineError;

/// Engine settings, loaded once at startup and then adjusted at runtime by Studio
/// (bindings, script path) and by parse-time commands (`disallow_unsafe_input`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TasSettings {
    /// Master switch. When off, every tick calls straight through to the host.
    pub enabled: bool,

    /// Speed while the fast-forward hotkey is held.
    pub fast_forward_speed: u32,

    /// Speed while the slow-forward hotkey is held.
    pub slow_forward_speed: f32,

    /// Where to listen for Studio. `None` keeps the engine offline.
    pub studio_address: Option<String>,

    pub script_path: PathBuf,
    pub bindings: Bindings,

    /// How many times a guaranteed Studio write is retried.
    pub status_retry_attempts: u32,

    /// Whether runs end when the game leaves a level or opens a menu playback must not
    /// drive. Reset on every parse and toggled by `Safe` / `Unsafe`.
    #[serde(skip)]
    pub disallow_unsafe_input: bool,
}

impl Default for TasSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            fast_forward_speed: 10,
            slow_forward_speed: 0.1,
            studio_address: Some("127.0.0.1:32270".into()),
            script_path: PathBuf::from("Celeste.tas"),
            bindings: default_bindings(),
            status_retry_attempts: 3,
            disallow_unsafe_input: true,
        }
    }
}

/// Key codes of the stock bindings.
pub fn default_bindings() -> Bindings {
    let mut bindings = Bindings::default();

    bindings.set(HotkeyId::StartStop, vec![163]);
    bindings.set(HotkeyId::Restart, vec![187]);
    bindings.set(HotkeyId::FastForward, vec![161]);
    bindings.set(HotkeyId::FrameAdvance, vec![219]);
    bindings.set(HotkeyId::PauseResume, vec![221]);
    bindings.set(HotkeyId::SlowForward, vec![220]);

    bindings
}

/// The on-disk shape. Anything left out keeps its default.
#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    enabled: Option<bool>,
    fast_forward_speed: Option<u32>,
    slow_forward_speed: Option<f32>,
    studio_address: Option<String>,
    script_path: Option<PathBuf>,
    bindings: Option<Bindings>,
    status_retry_attempts: Option<u32>,
}

impl TasSettings {
    /// Merges a settings file over these values. Values in `file` take precedence.
    fn merge(self, file: SettingsFile) -> Self {
        // An empty address in the file explicitly turns the Studio link off.
        let studio_address = match file.studio_address {
            Some(address) if address.trim().is_empty() => None,
            Some(address) => Some(address),
            None => self.studio_address,
        };

        Self {
            enabled: file.enabled.unwrap_or(self.enabled),
            fast_forward_speed: file.fast_forward_speed.unwrap_or(self.fast_forward_speed),
            slow_forward_speed: file.slow_forward_speed.unwrap_or(self.slow_forward_speed),
            studio_address,
            script_path: file.script_path.unwrap_or(self.script_path),
            bindings: file.bindings.unwrap_or(self.bindings),
            status_retry_attempts: file.status_retry_attempts.unwrap_or(self.status_retry_attempts),
            disallow_unsafe_input: self.disallow_unsafe_input,
        }
    }

    /// Values from the environment take precedence over everything else.
    fn apply_env(mut self) -> Self {
        if let Ok(address) = env::var("TAS_STUDIO_ADDRESS") {
            self.studio_address = (!address.trim().is_empty()).then_some(address);
        }

        if let Ok(path) = env::var("TAS_SCRIPT_PATH") {
            self.script_path = PathBuf::from(path);
        }

        self
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, EngineError> {
        let file: SettingsFile = toml::from_str(contents)?;
        Ok(Self::default().merge(file))
    }

    /// Loads settings from a TOML file, falling back to defaults when it does not
    /// exist, then applies environment overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let path = path.as_ref();

        let settings = match fs::read_to_string(path) {
            Ok(contents) => Self::from_toml_str(&contents)?,

            Err(error) if error.kind() == ErrorKind::NotFound => {
                tracing::info!(target: Log::Playback, ?path, "No settings file found, using defaults");
                Self::default()
            },

            Err(source) => {
                return Err(EngineError::SettingsIo {
                    path: path.to_path_buf(),
                    source,
                });
            },
        };

        Ok(settings.apply_env())
    }
}

/// Where script text comes from.
pub trait ScriptSource: std::fmt::Debug {
    fn read(&self, path: &Path) -> Result<String, EngineError>;

    /// Last modification time, if the source can tell. Sources that cannot are
    /// re-read and compared by checksum on every refresh.
    fn modified(&self, path: &Path) -> Option<SystemTime>;
}

/// Reads scripts off disk every time they are needed, so editing the file is enough
/// to change what plays.
#[derive(Clone, Debug, Default)]
pub struct FileScriptSource;

impl ScriptSource for FileScriptSource {
    fn read(&self, path: &Path) -> Result<String, EngineError> {
        fs::read_to_string(path).map_err(|source| EngineError::ScriptIo {
            path: path.to_path_buf(),
            source,
        })
    }

    fn modified(&self, path: &Path) -> Option<SystemTime> {
        fs::metadata(path).and_then(|metadata| metadata.modified()).ok()
    }
}

/// Scripts held in memory, for hosts that keep the text themselves. Clones share the
/// same storage.
#[derive(Clone, Debug, Default)]
pub struct MemoryScriptSource {
    scripts: Arc<Mutex<HashMap<PathBuf, String>>>,
}

impl MemoryScriptSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_script(self, path: impl Into<PathBuf>, text: impl Into<String>) -> Self {
        self.set(path, text);
        self
    }

    pub fn set(&self, path: impl Into<PathBuf>, text: impl Into<String>) {
        self.scripts
            .lock()
            .expect("Unable to acquire script source lock")
            .insert(path.into(), text.into());
    }
}

impl ScriptSource for MemoryScriptSource {
    fn read(&self, path: &Path) -> Result<String, EngineError> {
        let scripts = self.scripts.lock().expect("Unable to acquire script source lock");

        scripts.get(path).cloned().ok_or_else(|| EngineError::ScriptIo {
            path: path.to_path_buf(),
            source: ErrorKind::NotFound.into(),
        })
    }

    fn modified(&self, _path: &Path) -> Option<SystemTime> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_values_override_defaults() {
        let settings = TasSettings::from_toml_str(
            r#"
            fast_forward_speed = 20
            script_path = "runs/1a.tas"

            [[bindings]]
            hotkey = 3
            keys = [80]
            "#,
        )
        .unwrap();

        assert_eq!(settings.fast_forward_speed, 20);
        assert_eq!(settings.script_path, PathBuf::from("runs/1a.tas"));
        assert_eq!(settings.bindings.keys(HotkeyId::FrameAdvance), &[80]);

        // Untouched fields keep their defaults.
        assert_eq!(settings.slow_forward_speed, 0.1);
        assert_eq!(settings.studio_address.as_deref(), Some("127.0.0.1:32270"));
        assert!(settings.disallow_unsafe_input);
    }

    #[test]
    fn test_empty_address_disables_studio() {
        let settings = TasSettings::from_toml_str(r#"studio_address = """#).unwrap();
        assert_eq!(settings.studio_address, None);
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = TasSettings::load(dir.path().join("missing.toml")).unwrap();

        assert_eq!(settings.fast_forward_speed, TasSettings::default().fast_forward_speed);
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        fs::write(&path, "fast_forward_speed = \"fast\"").unwrap();

        assert!(matches!(TasSettings::load(&path), Err(EngineError::SettingsParse(_))));
    }

    #[test]
    fn test_memory_source_shares_storage_between_clones() {
        let source = MemoryScriptSource::new();
        let clone = source.clone();
        clone.set("a.tas", "1,R");

        assert_eq!(source.read(Path::new("a.tas")).unwrap(), "1,R");
        assert!(matches!(source.read(Path::new("b.tas")), Err(EngineError::ScriptIo { .. })));
    }
}
