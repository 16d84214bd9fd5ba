//! Classifies script lines and parses the input ones.

use crate::commands;
use crate::errors::ParseError;
use crate::types::{Actions, InputFrame};

/// What a single script line turned out to be.
#[derive(Clone, Debug, PartialEq)]
pub enum ParsedLine {
    /// Blank lines and `#` comments.
    Empty,

    Input(InputFrame),

    /// A `***` line, optionally followed by a fast-forward speed.
    Breakpoint { speed: Option<f32> },

    /// Anything else starting with a letter. The command registry takes it from here.
    Command,
}

pub fn parse_line(line: &str, studio_line: usize) -> Result<ParsedLine, ParseError> {
    let trimmed = line.trim();

    let Some(first) = trimmed.chars().next() else {
        return Ok(ParsedLine::Empty);
    };

    if first == '#' {
        return Ok(ParsedLine::Empty);
    }

    if let Some(rest) = trimmed.strip_prefix("***") {
        let rest = rest.trim();

        // Suffixes other than a speed (e.g. savestate markers) are accepted but
        // carry no meaning here.
        let speed = rest.parse::<f32>().ok().filter(|speed| speed.is_finite() && *speed > 0.0);
        return Ok(ParsedLine::Breakpoint { speed });
    }

    if first.is_ascii_digit() {
        return parse_native(trimmed, studio_line).map(ParsedLine::Input);
    }

    if !first.is_alphabetic() {
        return Err(malformed(studio_line, trimmed, "unrecognized line"));
    }

    let tokens = commands::split(trimmed);
    if tokens.first().and_then(|name| Actions::from_word(name)).is_some() {
        return parse_named(&tokens, trimmed, studio_line).map(ParsedLine::Input);
    }

    Ok(ParsedLine::Command)
}

fn malformed(line: usize, text: &str, reason: &'static str) -> ParseError {
    ParseError::Malformed {
        line,
        text: text.to_string(),
        reason,
    }
}

fn parse_frames(token: &str, line: usize, text: &str) -> Result<u32, ParseError> {
    match token.parse::<u32>() {
        Ok(0) => Err(malformed(line, text, "frame count must be positive")),
        Ok(frames) => Ok(frames),
        Err(_) => Err(malformed(line, text, "invalid frame count")),
    }
}

fn parse_float(token: &str) -> Option<f32> {
    token.parse::<f32>().ok().filter(|value| value.is_finite())
}

/// `  15,R,J` or `   3,F,90,0.5`.
fn parse_native(text: &str, line: usize) -> Result<InputFrame, ParseError> {
    let mut tokens = text.split(',').map(str::trim);

    let frames = parse_frames(tokens.next().unwrap_or_default(), line, text)?;
    let mut frame = InputFrame {
        frames,
        studio_line: line,
        ..InputFrame::default()
    };

    let mut tokens = tokens.filter(|token| !token.is_empty()).peekable();

    while let Some(token) = tokens.next() {
        for code in token.chars() {
            let action = Actions::from_code(code).ok_or_else(|| malformed(line, text, "unknown action code"))?;
            frame.actions |= action;
        }

        if frame.actions.contains(Actions::FEATHER) && token.eq_ignore_ascii_case("f") {
            if let Some(angle) = tokens.peek().and_then(|token| parse_float(token)) {
                frame.angle = angle;
                tokens.next();

                if let Some(magnitude) = tokens.peek().and_then(|token| parse_float(token)) {
                    frame.magnitude = magnitude.clamp(0.0, 1.0);
                    tokens.next();
                }
            }
        }
    }

    Ok(frame)
}

/// `Jump, 1`, `Right 3`, `Feather 45 2`, `Jump2`.
fn parse_named(tokens: &[String], text: &str, line: usize) -> Result<InputFrame, ParseError> {
    let mut frame = InputFrame {
        studio_line: line,
        ..InputFrame::default()
    };

    let mut frames = None;
    let mut awaiting_angle = false;

    for token in tokens.iter().filter(|token| !token.is_empty()) {
        if let Some(action) = Actions::from_word(token) {
            frame.actions |= action;
            awaiting_angle = action == Actions::FEATHER;
            continue;
        }

        if awaiting_angle {
            if let Some(angle) = parse_float(token) {
                frame.angle = angle;
                awaiting_angle = false;
                continue;
            }
        }

        if frames.is_some() {
            return Err(malformed(line, text, "more than one frame count"));
        }

        frames = Some(parse_frames(token, line, text)?);
        awaiting_angle = false;
    }

    frame.frames = frames.unwrap_or(1);
    Ok(frame)
}
