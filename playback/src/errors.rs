use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading settings or scripts.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("settings io error: {path:?}: {source}")]
    SettingsIo { path: PathBuf, source: std::io::Error },

    #[error("settings parse error: {0}")]
    SettingsParse(#[from] toml::de::Error),

    #[error("script io error: {path:?}: {source}")]
    ScriptIo { path: PathBuf, source: std::io::Error },

    #[error("script {0:?} includes itself")]
    IncludeCycle(PathBuf),

    #[error("script includes nest deeper than {0} levels")]
    IncludeTooDeep(usize),

    #[error("unable to bind the Studio listener on {address}: {source}")]
    StudioBind { address: String, source: std::io::Error },

    #[error("Failed to spawn thread: {0}")]
    ThreadSpawn(std::io::Error),
}

/// Errors from a command's handler, either while binding its arguments or while running.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("missing argument: {0}")]
    MissingArgument(&'static str),

    #[error("invalid argument {value:?} for {name}")]
    InvalidArgument { name: &'static str, value: String },

    #[error("command {0:?} is already registered to a different handler")]
    Duplicate(String),

    #[error("{0}")]
    Failed(String),
}

/// A single script line that could not be turned into input or a command. Parsing
/// always continues with the next line.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("line {line}: unknown command {name:?}")]
    UnknownCommand { name: String, line: usize },

    #[error("line {line}: {reason}: {text:?}")]
    Malformed { line: usize, text: String, reason: &'static str },

    #[error("line {line}: command {name:?} failed: {source}")]
    Handler {
        name: String,
        line: usize,
        #[source]
        source: CommandError,
    },
}
