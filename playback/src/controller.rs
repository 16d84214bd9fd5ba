//! The parsed script and the playback cursor through it.

use std::collections::BTreeMap;
use std::ops::Bound::{Excluded, Unbounded};
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use xxhash_rust::xxh3::Xxh3;

use tas_host_integrations::Log;

use crate::commands::{schedule_fast_forward, Command, CommandContext, CommandRegistry, CommandSignals, ExecuteTiming, Include};
use crate::config::{FileScriptSource, ScriptSource, TasSettings};
use crate::errors::EngineError;
use crate::parser::{self, ParsedLine};
use crate::types::{FastForward, InputFrame};

/// How deep `Read` may nest.
pub const MAX_INCLUDE_DEPTH: usize = 16;

/// The outcome of one [`InputController::advance_frame`] call.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Advance {
    /// The input to apply this frame, if one was played.
    pub frame: Option<InputFrame>,

    /// Whether there was anything left to play when the call began.
    pub can_playback: bool,
}

#[derive(Debug)]
pub struct InputController {
    source: Box<dyn ScriptSource + Send + Sync>,
    registry: CommandRegistry,
    path: PathBuf,

    inputs: Vec<InputFrame>,

    /// Expanded frame index at which each entry of `inputs` begins.
    starts: Vec<usize>,
    total_frames: usize,

    commands: BTreeMap<usize, Vec<Command>>,
    fast_forwards: BTreeMap<usize, FastForward>,

    current_frame_in_tas: usize,

    /// Index into `inputs` of the frame played last.
    previous: Option<usize>,

    /// Every file read by the last parse, in read order, with its timestamp then.
    sources: Vec<(PathBuf, Option<SystemTime>)>,
    checksum: Option<u64>,
    needs_reload: bool,
}

impl InputController {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_source(path, FileScriptSource, CommandRegistry::builtin())
    }

    pub fn with_source(
        path: impl Into<PathBuf>,
        source: impl ScriptSource + Send + Sync + 'static,
        registry: CommandRegistry,
    ) -> Self {
        Self::from_parts(path.into(), Box::new(source), registry)
    }

    pub(crate) fn from_parts(path: PathBuf, source: Box<dyn ScriptSource + Send + Sync>, registry: CommandRegistry) -> Self {
        Self {
            source,
            registry,
            path,
            inputs: Vec::new(),
            starts: Vec::new(),
            total_frames: 0,
            commands: BTreeMap::new(),
            fast_forwards: BTreeMap::new(),
            current_frame_in_tas: 0,
            previous: None,
            sources: Vec::new(),
            checksum: None,
            needs_reload: true,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Points at a different script. It is parsed on the next refresh.
    pub fn set_path(&mut self, path: impl Into<PathBuf>) {
        self.path = path.into();
        self.needs_reload = true;
    }

    /// Forces the next refresh to re-read the script.
    pub fn mark_dirty(&mut self) {
        self.needs_reload = true;
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    pub fn inputs(&self) -> &[InputFrame] {
        &self.inputs
    }

    pub fn commands(&self) -> &BTreeMap<usize, Vec<Command>> {
        &self.commands
    }

    pub fn fast_forwards(&self) -> &BTreeMap<usize, FastForward> {
        &self.fast_forwards
    }

    /// Number of frames in the script, with every repeat expanded.
    pub fn total_frames(&self) -> usize {
        self.total_frames
    }

    pub fn current_frame_in_tas(&self) -> usize {
        self.current_frame_in_tas
    }

    pub fn can_playback(&self) -> bool {
        self.current_frame_in_tas < self.total_frames
    }

    /// The input line played last.
    pub fn current_input(&self) -> Option<&InputFrame> {
        self.previous.and_then(|index| self.inputs.get(index))
    }

    /// How many frames of the current input line have played, counting this one.
    pub fn current_frame_in_input(&self) -> usize {
        self.previous
            .and_then(|index| self.starts.get(index))
            .map(|start| self.current_frame_in_tas - start)
            .unwrap_or(0)
    }

    pub fn studio_line(&self) -> Option<usize> {
        self.current_input().map(|frame| frame.studio_line)
    }

    /// Whether a breakpoint sits at the cursor.
    pub fn is_break(&self) -> bool {
        self.fast_forwards
            .get(&self.current_frame_in_tas)
            .is_some_and(|target| target.force_stop)
    }

    /// The first fast-forward target strictly ahead of the cursor.
    pub fn next_fast_forward(&self) -> Option<&FastForward> {
        self.fast_forwards
            .range((Excluded(self.current_frame_in_tas), Unbounded))
            .next()
            .map(|(_, target)| target)
    }

    pub fn has_fast_forward(&self) -> bool {
        self.next_fast_forward().is_some()
    }

    pub fn fast_forward_speed(&self) -> f32 {
        self.next_fast_forward().map(|target| target.speed).unwrap_or(1.0)
    }

    /// Re-reads the script and re-parses it if needed.
    ///
    /// `from_scratch` always re-parses and rewinds to the first frame. Otherwise the
    /// script is only re-parsed when its contents changed; the cursor is kept and
    /// clamped to the new length. Returns whether a parse happened.
    pub fn refresh_inputs(&mut self, from_scratch: bool, settings: &mut TasSettings) -> Result<bool, EngineError> {
        if !from_scratch && self.checksum.is_some() {
            if !self.needs_reload && !self.sources_touched() {
                return Ok(false);
            }

            if self.fingerprint()? == self.checksum {
                self.needs_reload = false;
                self.restamp_sources();
                return Ok(false);
            }
        }

        let cursor = if from_scratch { 0 } else { self.current_frame_in_tas };

        self.parse_script(settings)?;
        self.current_frame_in_tas = cursor.min(self.total_frames);
        self.previous = self
            .current_frame_in_tas
            .checked_sub(1)
            .and_then(|frame| self.input_index(frame));

        tracing::info!(
            target: Log::Commands,
            path = ?self.path,
            inputs = self.inputs.len(),
            frames = self.total_frames,
            from_scratch,
            "Parsed script"
        );

        Ok(true)
    }

    /// Plays the frame at the cursor.
    ///
    /// Playback-timing commands scheduled before that frame run first, in the order
    /// they were written; then the cursor moves past it.
    pub fn advance_frame(&mut self, settings: &mut TasSettings, signals: &mut CommandSignals) -> Advance {
        let can_playback = self.can_playback();

        if !can_playback {
            return Advance {
                frame: None,
                can_playback,
            };
        }

        let frame = self.current_frame_in_tas;

        if let Some(commands) = self.commands.get(&frame) {
            for command in commands.iter().filter(|command| command.info.timing == ExecuteTiming::Playback) {
                let mut ctx = CommandContext {
                    settings: &mut *settings,
                    frame,
                    fast_forwards: &mut self.fast_forwards,
                    signals: &mut *signals,
                };

                if let Err(error) = command.invoke(&mut ctx) {
                    tracing::error!(
                        target: Log::Commands,
                        ?error,
                        command = command.info.name,
                        line = command.studio_line,
                        "Command failed"
                    );
                }
            }
        }

        let index = self.input_index(frame);
        self.previous = index;
        self.current_frame_in_tas += 1;

        Advance {
            frame: index.map(|index| self.inputs[index]),
            can_playback,
        }
    }

    /// Drops everything parsed and rewinds. Calling it twice is the same as once.
    pub fn stop(&mut self) {
        self.clear_parsed();
        self.current_frame_in_tas = 0;
        self.previous = None;
        self.checksum = None;
        self.needs_reload = true;
    }

    fn clear_parsed(&mut self) {
        self.inputs.clear();
        self.starts.clear();
        self.total_frames = 0;
        self.commands.clear();
        self.fast_forwards.clear();
        self.sources.clear();
    }

    fn input_index(&self, frame: usize) -> Option<usize> {
        if frame >= self.total_frames {
            return None;
        }

        match self.starts.binary_search(&frame) {
            Ok(index) => Some(index),
            Err(0) => None,
            Err(index) => Some(index - 1),
        }
    }

    fn push_input(&mut self, frame: InputFrame) {
        self.starts.push(self.total_frames);
        self.total_frames += frame.frames as usize;
        self.inputs.push(frame);
    }

    fn sources_touched(&self) -> bool {
        self.sources
            .iter()
            .any(|(path, stamp)| stamp.is_none() || self.source.modified(path) != *stamp)
    }

    fn restamp_sources(&mut self) {
        let source = &self.source;

        for (path, stamp) in &mut self.sources {
            *stamp = source.modified(path);
        }
    }

    /// Hashes every previously read source the same way the parse did.
    fn fingerprint(&self) -> Result<Option<u64>, EngineError> {
        let mut hasher = Xxh3::new();

        for (path, _) in &self.sources {
            let text = match self.source.read(path) {
                Ok(text) => Some(text),
                Err(error) if path == &self.path => return Err(error),
                Err(_) => None,
            };

            hash_source(&mut hasher, text.as_deref());
        }

        Ok(Some(hasher.digest()))
    }

    fn read_tracked(&mut self, path: &Path, hasher: &mut Xxh3) -> Result<String, EngineError> {
        let text = self.source.read(path);

        self.sources.push((path.to_path_buf(), self.source.modified(path)));
        hash_source(hasher, text.as_deref().ok());

        text
    }

    fn parse_script(&mut self, settings: &mut TasSettings) -> Result<(), EngineError> {
        self.clear_parsed();
        self.checksum = None;
        settings.disallow_unsafe_input = true;

        let mut hasher = Xxh3::new();
        let path = self.path.clone();
        let text = self.read_tracked(&path, &mut hasher)?;

        let mut visiting = vec![path.clone()];
        let lines = text.lines().count();
        self.parse_text(&path, &text, 0..lines, None, settings, &mut visiting, &mut hasher);

        self.checksum = Some(hasher.digest());
        self.needs_reload = false;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn parse_text(
        &mut self,
        file: &Path,
        text: &str,
        range: Range<usize>,
        studio_line_override: Option<usize>,
        settings: &mut TasSettings,
        visiting: &mut Vec<PathBuf>,
        hasher: &mut Xxh3,
    ) {
        for (index, line) in text.lines().enumerate().skip(range.start).take(range.len()) {
            let studio_line = studio_line_override.unwrap_or(index);

            match parser::parse_line(line, studio_line) {
                Ok(ParsedLine::Empty) => {},
                Ok(ParsedLine::Input(frame)) => self.push_input(frame),

                Ok(ParsedLine::Breakpoint { speed }) => {
                    schedule_fast_forward(&mut self.fast_forwards, self.total_frames, speed, true, studio_line);
                },

                Ok(ParsedLine::Command) => {
                    let includes = self.parse_command(line.trim(), file, index + 1, studio_line, settings);

                    for include in includes {
                        self.parse_include(include, settings, visiting, hasher);
                    }
                },

                Err(error) => {
                    tracing::warn!(target: Log::Commands, ?error, file = ?file, "Skipping line");
                },
            }
        }
    }

    /// Parses and schedules one command line, returning any files it asked to read.
    fn parse_command(
        &mut self,
        line: &str,
        file: &Path,
        file_line: usize,
        studio_line: usize,
        settings: &mut TasSettings,
    ) -> Vec<Include> {
        let frame = self.total_frames;
        let mut signals = CommandSignals::default();

        let mut ctx = CommandContext {
            settings: &mut *settings,
            frame,
            fast_forwards: &mut self.fast_forwards,
            signals: &mut signals,
        };

        match self.registry.parse(line, frame, file, file_line, studio_line, &mut ctx) {
            Ok(Some(command)) => self.commands.entry(frame).or_default().push(command),
            Ok(None) => {},

            // Unknown commands and bad arguments only cost their own line.
            Err(error) => tracing::warn!(target: Log::Commands, ?error, file = ?file, "Skipping command"),
        }

        signals.includes
    }

    fn parse_include(
        &mut self,
        include: Include,
        settings: &mut TasSettings,
        visiting: &mut Vec<PathBuf>,
        hasher: &mut Xxh3,
    ) {
        if visiting.len() > MAX_INCLUDE_DEPTH {
            let error = EngineError::IncludeTooDeep(MAX_INCLUDE_DEPTH);
            tracing::error!(target: Log::Commands, ?error, line = include.studio_line, "Skipping Read");
            return;
        }

        if visiting.contains(&include.path) {
            let error = EngineError::IncludeCycle(include.path);
            tracing::error!(target: Log::Commands, ?error, line = include.studio_line, "Skipping Read");
            return;
        }

        let text = match self.read_tracked(&include.path, hasher) {
            Ok(text) => text,

            Err(error) => {
                tracing::error!(target: Log::Commands, ?error, line = include.studio_line, "Skipping Read");
                return;
            },
        };

        let Some(range) = include_range(&text, &include) else {
            tracing::error!(
                target: Log::Commands,
                path = ?include.path,
                start = ?include.start,
                end = ?include.end,
                "Read range not found"
            );
            return;
        };

        visiting.push(include.path.clone());
        self.parse_text(&include.path, &text, range, Some(include.studio_line), settings, visiting, hasher);
        visiting.pop();
    }
}

fn hash_source(hasher: &mut Xxh3, text: Option<&str>) {
    match text {
        Some(text) => hasher.update(text.as_bytes()),
        None => hasher.update(&[0xFF]),
    }

    hasher.update(&[0]);
}

fn find_label(text: &str, label: &str) -> Option<usize> {
    text.lines().position(|line| {
        line.trim()
            .strip_prefix('#')
            .is_some_and(|name| name.trim() == label)
    })
}

/// Lines of `text` selected by a `Read`. A start label is included (it is a comment);
/// an end label is excluded. Numbers are 1-based and inclusive on both ends.
fn include_range(text: &str, include: &Include) -> Option<Range<usize>> {
    let lines = text.lines().count();

    let start = match include.start.as_deref() {
        None => 0,
        Some(start) => match start.parse::<usize>() {
            Ok(number) => number.saturating_sub(1),
            Err(_) => find_label(text, start)?,
        },
    };

    let end = match include.end.as_deref() {
        None => lines,
        Some(end) => match end.parse::<usize>() {
            Ok(number) => number.min(lines),
            Err(_) => find_label(text, end)?,
        },
    };

    (start <= end).then_some(start..end)
}
