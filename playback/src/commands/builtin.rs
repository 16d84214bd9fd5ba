use std::collections::BTreeMap;
use std::path::Path;

use crate::errors::CommandError;
use crate::speed::{DEFAULT_FAST_FORWARD_SPEED, MIN_SPEED};
use crate::types::FastForward;

use super::{bound_call, BoundCall, CommandInfo, ExecuteTiming, Handler, Include};

pub(super) const COMMANDS: &[CommandInfo] = &[
    CommandInfo {
        name: "Unsafe",
        aliases: &[],
        timing: ExecuteTiming::Parse,
        handler: Handler::Args(allow_unsafe),
    },
    CommandInfo {
        name: "Safe",
        aliases: &["EnforceLegal"],
        timing: ExecuteTiming::Parse,
        handler: Handler::Args(enforce_safe),
    },
    CommandInfo {
        name: "FastForward",
        aliases: &["FF"],
        timing: ExecuteTiming::Parse,
        handler: Handler::ArgsLine(fast_forward),
    },
    CommandInfo {
        name: "Breakpoint",
        aliases: &[],
        timing: ExecuteTiming::Parse,
        handler: Handler::ArgsLine(breakpoint),
    },
    CommandInfo {
        name: "Console",
        aliases: &[],
        timing: ExecuteTiming::Playback,
        handler: Handler::ArgsLine(console),
    },
    CommandInfo {
        name: "Read",
        aliases: &[],
        timing: ExecuteTiming::Parse,
        handler: Handler::ArgsLinePathFileLine(read),
    },
    CommandInfo {
        name: "StopRun",
        aliases: &[],
        timing: ExecuteTiming::Playback,
        handler: Handler::Args(stop_run),
    },
];

fn allow_unsafe(_args: &[String]) -> Result<BoundCall, CommandError> {
    Ok(bound_call(|ctx| {
        ctx.settings.disallow_unsafe_input = false;
        Ok(())
    }))
}

fn enforce_safe(_args: &[String]) -> Result<BoundCall, CommandError> {
    Ok(bound_call(|ctx| {
        ctx.settings.disallow_unsafe_input = true;
        Ok(())
    }))
}

fn parse_speed(args: &[String]) -> Result<Option<f32>, CommandError> {
    let Some(raw) = args.first().filter(|raw| !raw.is_empty()) else {
        return Ok(None);
    };

    match raw.parse::<f32>() {
        Ok(speed) if speed.is_finite() && speed > 0.0 => Ok(Some(speed.max(MIN_SPEED))),
        _ => Err(CommandError::InvalidArgument {
            name: "speed",
            value: raw.clone(),
        }),
    }
}

/// Schedules a fast-forward target at the frame the command appears before. An
/// earlier target at the same frame wins.
pub(crate) fn schedule_fast_forward(
    fast_forwards: &mut BTreeMap<usize, FastForward>,
    frame: usize,
    speed: Option<f32>,
    force_stop: bool,
    studio_line: usize,
) {
    fast_forwards.entry(frame).or_insert(FastForward {
        frame,
        speed: speed.unwrap_or(DEFAULT_FAST_FORWARD_SPEED),
        force_stop,
        studio_line,
    });
}

fn fast_forward(args: &[String], studio_line: usize) -> Result<BoundCall, CommandError> {
    let speed = parse_speed(args)?;

    Ok(bound_call(move |ctx| {
        schedule_fast_forward(ctx.fast_forwards, ctx.frame, speed, false, studio_line);
        Ok(())
    }))
}

fn breakpoint(args: &[String], studio_line: usize) -> Result<BoundCall, CommandError> {
    let speed = parse_speed(args)?;

    Ok(bound_call(move |ctx| {
        schedule_fast_forward(ctx.fast_forwards, ctx.frame, speed, true, studio_line);
        Ok(())
    }))
}

fn console(args: &[String], _studio_line: usize) -> Result<BoundCall, CommandError> {
    let words: Vec<String> = args.iter().filter(|word| !word.is_empty()).cloned().collect();

    if words.is_empty() {
        return Err(CommandError::MissingArgument("console command"));
    }

    Ok(bound_call(move |ctx| {
        ctx.signals.console.push(words.clone());
        Ok(())
    }))
}

fn read(args: &[String], studio_line: usize, file_path: &Path, _file_line: usize) -> Result<BoundCall, CommandError> {
    let Some(target) = args.first().filter(|target| !target.is_empty()) else {
        return Err(CommandError::MissingArgument("file path"));
    };

    let path = match file_path.parent() {
        Some(parent) => parent.join(target),
        None => target.into(),
    };

    let include = Include {
        path,
        start: args.get(1).filter(|arg| !arg.is_empty()).cloned(),
        end: args.get(2).filter(|arg| !arg.is_empty()).cloned(),
        studio_line,
    };

    Ok(bound_call(move |ctx| {
        ctx.signals.includes.push(include.clone());
        Ok(())
    }))
}

fn stop_run(_args: &[String]) -> Result<BoundCall, CommandError> {
    Ok(bound_call(|ctx| {
        ctx.signals.stop_run = true;
        Ok(())
    }))
}
