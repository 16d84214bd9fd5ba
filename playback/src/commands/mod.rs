//! Script commands: the registry that maps names to handlers, the line tokenizer, and
//! the bound [`Command`] values the controller schedules against frames.
//!
//! A handler never runs against global state. Binding a command coerces its string
//! arguments into a closure, and that closure later runs against an explicit
//! [`CommandContext`] holding everything a command is allowed to touch.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use regex::Regex;

use tas_host_integrations::Log;

use crate::config::TasSettings;
use crate::errors::{CommandError, ParseError};
use crate::types::FastForward;

mod builtin;
pub(crate) use builtin::schedule_fast_forward;

/// When a command runs: once while the script is parsed, or when playback reaches the
/// frame it was written before.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecuteTiming {
    Parse,
    Playback,
}

/// A command with its arguments already coerced, waiting to run.
pub type BoundCall = Arc<dyn Fn(&mut CommandContext<'_>) -> Result<(), CommandError> + Send + Sync>;

/// Wraps a closure as a [`BoundCall`].
pub fn bound_call<F>(call: F) -> BoundCall
where
    F: Fn(&mut CommandContext<'_>) -> Result<(), CommandError> + Send + Sync + 'static,
{
    Arc::new(call)
}

/// The closed set of handler shapes. Each receives the raw string arguments plus the
/// extra location data its variant names, and returns the bound call.
#[derive(Clone, Copy)]
pub enum Handler {
    Args(fn(&[String]) -> Result<BoundCall, CommandError>),
    ArgsLine(fn(&[String], usize) -> Result<BoundCall, CommandError>),
    ArgsLinePath(fn(&[String], usize, &Path) -> Result<BoundCall, CommandError>),
    ArgsLinePathFileLine(fn(&[String], usize, &Path, usize) -> Result<BoundCall, CommandError>),
}

impl Handler {
    fn bind(&self, args: &[String], studio_line: usize, file_path: &Path, file_line: usize) -> Result<BoundCall, CommandError> {
        match self {
            Handler::Args(handler) => handler(args),
            Handler::ArgsLine(handler) => handler(args, studio_line),
            Handler::ArgsLinePath(handler) => handler(args, studio_line, file_path),
            Handler::ArgsLinePathFileLine(handler) => handler(args, studio_line, file_path, file_line),
        }
    }

    fn same_as(&self, other: &Handler) -> bool {
        use std::ptr::fn_addr_eq;

        match (self, other) {
            (Handler::Args(a), Handler::Args(b)) => fn_addr_eq(*a, *b),
            (Handler::ArgsLine(a), Handler::ArgsLine(b)) => fn_addr_eq(*a, *b),
            (Handler::ArgsLinePath(a), Handler::ArgsLinePath(b)) => fn_addr_eq(*a, *b),
            (Handler::ArgsLinePathFileLine(a), Handler::ArgsLinePathFileLine(b)) => fn_addr_eq(*a, *b),
            _ => false,
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shape = match self {
            Handler::Args(_) => "Args",
            Handler::ArgsLine(_) => "ArgsLine",
            Handler::ArgsLinePath(_) => "ArgsLinePath",
            Handler::ArgsLinePathFileLine(_) => "ArgsLinePathFileLine",
        };

        f.write_str(shape)
    }
}

/// Static registration metadata for one command.
#[derive(Clone, Copy, Debug)]
pub struct CommandInfo {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub timing: ExecuteTiming,
    pub handler: Handler,
}

impl CommandInfo {
    fn same_as(&self, other: &CommandInfo) -> bool {
        self.name == other.name
            && self.aliases == other.aliases
            && self.timing == other.timing
            && self.handler.same_as(&other.handler)
    }

    fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        std::iter::once(self.name).chain(self.aliases.iter().copied())
    }
}

/// A file pulled in by `Read`, inlined where the command appears.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Include {
    pub path: PathBuf,

    /// First line to read, as a label (`#name`) or a 1-based line number.
    pub start: Option<String>,

    /// Where to stop: before this label, or after this 1-based line number.
    pub end: Option<String>,

    /// Every line inlined from the file reports this Studio line.
    pub studio_line: usize,
}

/// Requests a command leaves behind for whoever owns the outside world.
#[derive(Debug, Default)]
pub struct CommandSignals {
    /// Words for the host console, one entry per `Console` command.
    pub console: Vec<Vec<String>>,
    pub includes: Vec<Include>,
    pub stop_run: bool,
}

impl CommandSignals {
    pub fn is_empty(&self) -> bool {
        self.console.is_empty() && self.includes.is_empty() && !self.stop_run
    }
}

/// Everything a running command may read or change.
pub struct CommandContext<'a> {
    pub settings: &'a mut TasSettings,

    /// The frame the command is scheduled before.
    pub frame: usize,

    pub fast_forwards: &'a mut BTreeMap<usize, FastForward>,
    pub signals: &'a mut CommandSignals,
}

/// A parsed command line, bound to the frame it runs before.
#[derive(Clone)]
pub struct Command {
    pub frame: usize,
    pub file_path: PathBuf,
    pub file_line: usize,
    pub studio_line: usize,
    pub args: Vec<String>,
    pub info: CommandInfo,
    call: BoundCall,
}

impl Command {
    pub fn invoke(&self, ctx: &mut CommandContext<'_>) -> Result<(), CommandError> {
        ctx.frame = self.frame;
        (self.call)(ctx)
    }

    pub fn is(&self, name: &str) -> bool {
        self.info.names().any(|candidate| candidate.eq_ignore_ascii_case(name))
    }

    /// The command as it would appear in a script.
    pub fn line_text(&self) -> String {
        std::iter::once(self.info.name)
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.info.name)
            .field("args", &self.args)
            .field("frame", &self.frame)
            .field("studio_line", &self.studio_line)
            .finish_non_exhaustive()
    }
}

static SPACE_SEPARATED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^,]+?\s+[^,]").expect("Unable to compile the separator check"));

/// Tokenizes a command or input line.
///
/// A line whose first separator is whitespace splits on whitespace runs; anything
/// else splits on commas. Tokens are trimmed either way.
pub fn split(line: &str) -> Vec<String> {
    let line = line.trim();

    let tokens: Vec<&str> = if SPACE_SEPARATED.is_match(line) {
        line.split_whitespace().collect()
    } else {
        line.split(',').collect()
    };

    tokens.into_iter().map(|token| token.trim().to_string()).collect()
}

/// Maps command names (and aliases) to their handlers.
#[derive(Clone, Debug, Default)]
pub struct CommandRegistry {
    commands: Vec<CommandInfo>,
}

impl CommandRegistry {
    /// The built-in command set.
    pub fn builtin() -> Self {
        let mut registry = Self::default();

        for info in builtin::COMMANDS {
            if let Err(error) = registry.register(*info) {
                tracing::error!(target: Log::Commands, ?error, "Built-in command failed to register");
            }
        }

        registry
    }

    /// Adds a command. Registering an identical command again is a no-op. Any other
    /// registration that claims an existing name or alias is rejected, even for the
    /// same handler.
    pub fn register(&mut self, info: CommandInfo) -> Result<(), CommandError> {
        let mut registered = false;

        for name in info.names() {
            if let Some(existing) = self.find(name) {
                if !existing.same_as(&info) {
                    return Err(CommandError::Duplicate(name.to_string()));
                }

                registered = true;
            }
        }

        if !registered {
            self.commands.push(info);
        }

        Ok(())
    }

    /// Exact match on a name or alias first, then a case-insensitive one.
    pub fn find(&self, name: &str) -> Option<&CommandInfo> {
        self.commands
            .iter()
            .find(|info| info.names().any(|candidate| candidate == name))
            .or_else(|| {
                self.commands
                    .iter()
                    .find(|info| info.names().any(|candidate| candidate.eq_ignore_ascii_case(name)))
            })
    }

    pub fn iter(&self) -> impl Iterator<Item = &CommandInfo> {
        self.commands.iter()
    }

    /// Parses one command line scheduled before `frame`.
    ///
    /// Lines that are empty or do not start with a letter are not commands and yield
    /// `Ok(None)`. Parse-timing commands run right away against `ctx`; every command
    /// is returned for the caller to schedule.
    pub fn parse(
        &self,
        line: &str,
        frame: usize,
        file_path: &Path,
        file_line: usize,
        studio_line: usize,
        ctx: &mut CommandContext<'_>,
    ) -> Result<Option<Command>, ParseError> {
        if !line.chars().next().is_some_and(char::is_alphabetic) {
            return Ok(None);
        }

        let mut tokens = split(line);
        let name = tokens.remove(0);

        let Some(info) = self.find(&name) else {
            return Err(ParseError::UnknownCommand { name, line: studio_line });
        };

        let handler_error = |source| ParseError::Handler {
            name: info.name.to_string(),
            line: studio_line,
            source,
        };

        let call = info
            .handler
            .bind(&tokens, studio_line, file_path, file_line)
            .map_err(handler_error)?;

        let command = Command {
            frame,
            file_path: file_path.to_path_buf(),
            file_line,
            studio_line,
            args: tokens,
            info: *info,
            call,
        };

        if info.timing == ExecuteTiming::Parse {
            command.invoke(ctx).map_err(handler_error)?;
        }

        tracing::trace!(target: Log::Commands, name = info.name, frame, studio_line, "Parsed command");
        Ok(Some(command))
    }
}
