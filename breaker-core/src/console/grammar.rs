//! Operator console grammar.
//!
//! One command per line: a keyword followed by space separated arguments.
//! Commands that configure something print the current value when their
//! arguments are omitted.

use core::time::Duration;

use winnow::ascii::{dec_uint, space0, space1};
use winnow::combinator::{alt, eof, opt, preceded, separated_pair};
use winnow::error::ContextError;
use winnow::prelude::*;

use super::ConsoleError;
use crate::config::{ClosedStateMode, CurvePoint, CurvePoints, ModulationConfig};

/// Recovery policy supplied on the command line.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RecoveryArgs {
    pub enabled: bool,
    pub attempts: u16,
    pub delay: Duration,
    pub reset_timeout: Duration,
}

/// Parsed console command.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ConsoleCommand {
    Open,
    Close,
    Status,
    /// Show (`None`) or replace the curve points.
    Points(Option<CurvePoints>),
    Limit(Option<u8>),
    Recovery(Option<RecoveryArgs>),
    Mode(Option<ClosedStateMode>),
    Modulation(Option<ModulationConfig>),
    Log,
    Help,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Keyword {
    Open,
    Close,
    Status,
    Points,
    Limit,
    Recovery,
    Mode,
    Modulation,
    Log,
    Help,
}

/// Parses a single console line.
///
/// # Errors
///
/// [`ConsoleError::Syntax`] for malformed input and
/// [`ConsoleError::TooManyPoints`] when a curve does not fit.
pub fn parse_command(line: &str) -> Result<ConsoleCommand, ConsoleError> {
    let mut input = line.trim();
    let keyword = keyword
        .parse_next(&mut input)
        .map_err(|_: ContextError| ConsoleError::Syntax)?;

    let command = match keyword {
        Keyword::Open => ConsoleCommand::Open,
        Keyword::Close => ConsoleCommand::Close,
        Keyword::Status => ConsoleCommand::Status,
        Keyword::Log => ConsoleCommand::Log,
        Keyword::Help => ConsoleCommand::Help,
        Keyword::Points => ConsoleCommand::Points(points(&mut input)?),
        Keyword::Limit => ConsoleCommand::Limit(
            opt(preceded(space1, dec_uint))
                .parse_next(&mut input)
                .map_err(syntax)?,
        ),
        Keyword::Recovery => ConsoleCommand::Recovery(
            opt(preceded(space1, recovery_args))
                .parse_next(&mut input)
                .map_err(syntax)?,
        ),
        Keyword::Mode => ConsoleCommand::Mode(
            opt(preceded(space1, closed_state_mode))
                .parse_next(&mut input)
                .map_err(syntax)?,
        ),
        Keyword::Modulation => ConsoleCommand::Modulation(
            opt(preceded(space1, modulation_args))
                .parse_next(&mut input)
                .map_err(syntax)?,
        ),
    };

    (space0, eof).parse_next(&mut input).map_err(syntax)?;
    Ok(command)
}

fn syntax(_: ContextError) -> ConsoleError {
    ConsoleError::Syntax
}

fn keyword(input: &mut &str) -> Result<Keyword, ContextError> {
    let keyword = alt((
        "open".value(Keyword::Open),
        "close".value(Keyword::Close),
        "status".value(Keyword::Status),
        "points".value(Keyword::Points),
        "limit".value(Keyword::Limit),
        "recovery".value(Keyword::Recovery),
        // Longest first: "mode" is a prefix of "modulation".
        "modulation".value(Keyword::Modulation),
        "mode".value(Keyword::Mode),
        "log".value(Keyword::Log),
        "help".value(Keyword::Help),
    ))
    .parse_next(input)?;

    // Reject keywords glued to their arguments, e.g. "limit60".
    alt((space1, eof)).parse_peek(*input)?;
    Ok(keyword)
}

fn points(input: &mut &str) -> Result<Option<CurvePoints>, ConsoleError> {
    let mut points = CurvePoints::new();
    while let Some((current_ma, duration_ms)) =
        opt(preceded(space1, separated_pair(dec_uint, ':', dec_uint)))
            .parse_next(input)
            .map_err(syntax)?
    {
        points
            .push(CurvePoint::new(current_ma, duration_ms))
            .map_err(|_| ConsoleError::TooManyPoints)?;
    }

    Ok(if points.is_empty() { None } else { Some(points) })
}

fn recovery_args(input: &mut &str) -> Result<RecoveryArgs, ContextError> {
    let enabled = alt(("on".value(true), "off".value(false))).parse_next(input)?;
    let attempts = preceded(space1, dec_uint).parse_next(input)?;
    let delay_ms: u32 = preceded(space1, dec_uint).parse_next(input)?;
    let reset_ms: u32 = preceded(space1, dec_uint).parse_next(input)?;

    Ok(RecoveryArgs {
        enabled,
        attempts,
        delay: Duration::from_millis(u64::from(delay_ms)),
        reset_timeout: Duration::from_millis(u64::from(reset_ms)),
    })
}

fn closed_state_mode(input: &mut &str) -> Result<ClosedStateMode, ContextError> {
    alt((
        "none".value(ClosedStateMode::None),
        "modulation".value(ClosedStateMode::ModulationControl),
    ))
    .parse_next(input)
}

fn modulation_args(input: &mut &str) -> Result<ModulationConfig, ContextError> {
    let (closed, period) = separated_pair(dec_uint, space1, dec_uint).parse_next(input)?;
    Ok(ModulationConfig::new(closed, period))
}
