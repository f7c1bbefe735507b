//! Line-oriented operator console shared by the emulator and the firmware UART.

pub mod grammar;

use core::fmt::{self, Write};
use core::str;

use heapless::Vec;

pub use grammar::{ConsoleCommand, RecoveryArgs, parse_command};

use crate::config::store::ConfigStore;
use crate::config::RecoveryConfig;
use crate::measurement::MeasurementProvider;
use crate::switch::SwitchDriver;
use crate::timer::MonotonicInstant;
use crate::trip_curve::{TripCurve, TripCurveError};
use crate::zero_crossing::ZeroCrossingSource;

/// Maximum number of bytes accepted on a single console line.
pub const MAX_LINE_LEN: usize = 160;

/// Help text, one line per command.
pub const HELP_LINES: [&str; 10] = [
    "open                                   open the breaker",
    "close                                  close the breaker",
    "status                                 state, cause and readings",
    "points [<mA>:<ms> ...]                 show or replace the trip curve",
    "limit [<n>]                            show or set the hardware limit",
    "recovery [on|off <n> <delay-ms> <reset-ms>]  show or set recovery",
    "mode [none|modulation]                 show or set the closed-state mode",
    "modulation [<closed> <period>]         show or set modulation zero-crossings",
    "log                                    replay telemetry",
    "help                                   this text",
];

/// Errors surfaced by the console.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConsoleError {
    /// The line does not parse.
    Syntax,
    /// The curve has more points than can be stored.
    TooManyPoints,
    /// Input exceeded [`MAX_LINE_LEN`].
    LineOverflow,
    /// Non UTF-8 bytes in the line buffer.
    InvalidUtf8,
    /// The breaker rejected the command.
    Rejected(TripCurveError),
    /// Writing the response failed.
    Output,
}

impl fmt::Display for ConsoleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsoleError::Syntax => f.write_str("syntax error, try `help`"),
            ConsoleError::TooManyPoints => f.write_str("too many points"),
            ConsoleError::LineOverflow => f.write_str("line too long"),
            ConsoleError::InvalidUtf8 => f.write_str("invalid utf-8"),
            ConsoleError::Rejected(err) => write!(f, "rejected: {err}"),
            ConsoleError::Output => f.write_str("output error"),
        }
    }
}

impl From<TripCurveError> for ConsoleError {
    fn from(value: TripCurveError) -> Self {
        ConsoleError::Rejected(value)
    }
}

impl From<fmt::Error> for ConsoleError {
    fn from(_: fmt::Error) -> Self {
        ConsoleError::Output
    }
}

/// Result of feeding a byte into a [`LineBuffer`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LineStatus {
    Pending,
    /// A terminator arrived; read the line with [`LineBuffer::line`].
    Complete,
}

/// Assembles console lines from a byte stream.
#[derive(Clone, Debug, Default)]
pub struct LineBuffer {
    buffer: Vec<u8, MAX_LINE_LEN>,
    complete: bool,
}

impl LineBuffer {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            buffer: Vec::new(),
            complete: false,
        }
    }

    /// Feeds a single byte. Backspace and delete edit the pending line.
    ///
    /// # Errors
    ///
    /// [`ConsoleError::LineOverflow`] when the line does not fit; the partial
    /// line is discarded.
    pub fn push(&mut self, byte: u8) -> Result<LineStatus, ConsoleError> {
        if self.complete {
            self.clear();
        }

        match byte {
            b'\r' | b'\n' => {
                if self.buffer.is_empty() {
                    return Ok(LineStatus::Pending);
                }
                self.complete = true;
                Ok(LineStatus::Complete)
            }
            0x08 | 0x7f => {
                self.buffer.pop();
                Ok(LineStatus::Pending)
            }
            value => self.buffer.push(value).map(|()| LineStatus::Pending).map_err(|_| {
                self.buffer.clear();
                ConsoleError::LineOverflow
            }),
        }
    }

    /// The completed line.
    ///
    /// # Errors
    ///
    /// [`ConsoleError::InvalidUtf8`] when the bytes are not UTF-8.
    pub fn line(&self) -> Result<&str, ConsoleError> {
        str::from_utf8(&self.buffer).map_err(|_| ConsoleError::InvalidUtf8)
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
        self.complete = false;
    }
}

/// Runs `command` against `curve`, writing the response lines to `out`.
///
/// # Errors
///
/// [`ConsoleError::Rejected`] when the breaker refuses the command and
/// [`ConsoleError::Output`] when `out` fails.
pub fn execute<I, S, Z, M, C, W>(
    curve: &mut TripCurve<I, S, Z, M, C>,
    command: &ConsoleCommand,
    now: I,
    out: &mut W,
) -> Result<(), ConsoleError>
where
    I: MonotonicInstant,
    S: SwitchDriver,
    Z: ZeroCrossingSource,
    M: MeasurementProvider,
    C: ConfigStore,
    W: Write,
{
    match command {
        ConsoleCommand::Open => {
            curve.open(now)?;
            writeln!(out, "ok {}", curve.state())?;
        }
        ConsoleCommand::Close => {
            curve.close(now)?;
            writeln!(out, "ok {}", curve.state())?;
        }
        ConsoleCommand::Status => write_status(curve, out)?,
        ConsoleCommand::Points(None) => {
            for (index, point) in curve.points()?.iter().enumerate() {
                writeln!(
                    out,
                    "{index:>2} {} mA {} ms",
                    point.current_ma, point.duration_ms
                )?;
            }
        }
        ConsoleCommand::Points(Some(points)) => {
            curve.set_points(points)?;
            writeln!(out, "ok {} points", points.len())?;
        }
        ConsoleCommand::Limit(None) => writeln!(out, "limit {}", curve.hardware_limit()?)?,
        ConsoleCommand::Limit(Some(limit)) => {
            curve.set_hardware_limit(*limit)?;
            writeln!(out, "ok limit {limit}")?;
        }
        ConsoleCommand::Recovery(None) => write_recovery(&curve.recovery_config()?, out)?,
        ConsoleCommand::Recovery(Some(args)) => {
            let config = RecoveryConfig {
                recovery_enabled: args.enabled,
                recovery_attempts: args.attempts,
                recovery_delay: args.delay,
                recovery_reset_timeout: args.reset_timeout,
                ..curve.recovery_config()?
            };
            curve.set_recovery_config(config)?;
            write_recovery(&config, out)?;
        }
        ConsoleCommand::Mode(None) => {
            writeln!(out, "mode {}", curve.recovery_config()?.closed_state_mode)?;
        }
        ConsoleCommand::Mode(Some(mode)) => {
            let config = RecoveryConfig {
                closed_state_mode: *mode,
                ..curve.recovery_config()?
            };
            curve.set_recovery_config(config)?;
            writeln!(out, "ok mode {mode}")?;
        }
        ConsoleCommand::Modulation(None) => {
            let config = curve.modulation_config()?;
            writeln!(
                out,
                "modulation closed={} period={} state={}",
                config.zero_crossings_while_closed,
                config.zero_crossings_period,
                curve.msm().modulation().state()
            )?;
        }
        ConsoleCommand::Modulation(Some(config)) => {
            curve.set_modulation_config(*config)?;
            writeln!(
                out,
                "ok modulation closed={} period={}",
                config.zero_crossings_while_closed, config.zero_crossings_period
            )?;
        }
        ConsoleCommand::Log => {
            for record in curve.telemetry().oldest_first() {
                writeln!(out, "#{} {}", record.id, record.event)?;
            }
        }
        ConsoleCommand::Help => {
            for line in HELP_LINES {
                writeln!(out, "{line}")?;
            }
        }
    }
    Ok(())
}

fn write_status<I, S, Z, M, C, W>(
    curve: &TripCurve<I, S, Z, M, C>,
    out: &mut W,
) -> Result<(), ConsoleError>
where
    I: MonotonicInstant,
    S: SwitchDriver,
    Z: ZeroCrossingSource,
    M: MeasurementProvider,
    C: ConfigStore,
    W: Write,
{
    let msm = curve.msm();
    writeln!(
        out,
        "state={} cause={} phase={}",
        curve.state(),
        curve.cause(),
        msm.state()
    )?;
    writeln!(
        out,
        "supply={} frequency={} mHz voltage={} mV current={} mA",
        if msm.is_ac_supply() { "ac" } else { "dc" },
        curve.supply_frequency_mhz(),
        curve.measurement().voltage_rms_mv(),
        curve.measurement().current_rms_ma()
    )?;
    writeln!(
        out,
        "recovery={}/{} mode={} switch={}",
        msm.recovery_remaining(),
        msm.config().attempt_budget(),
        msm.config().closed_state_mode,
        if curve.switch().is_on() { "on" } else { "off" }
    )?;
    Ok(())
}

fn write_recovery<W>(config: &RecoveryConfig, out: &mut W) -> Result<(), ConsoleError>
where
    W: Write,
{
    writeln!(
        out,
        "recovery {} attempts={} delay={} ms reset={} ms",
        if config.recovery_enabled { "on" } else { "off" },
        config.recovery_attempts,
        config.recovery_delay.as_millis(),
        config.recovery_reset_timeout.as_millis()
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assembles_lines_with_editing() {
        let mut line = LineBuffer::new();
        for byte in b"opex\x08n" {
            assert_eq!(line.push(*byte), Ok(LineStatus::Pending));
        }
        assert_eq!(line.push(b'\r'), Ok(LineStatus::Complete));
        assert_eq!(line.line(), Ok("open"));

        // Next byte starts a fresh line; the stray '\n' of "\r\n" is skipped.
        assert_eq!(line.push(b'\n'), Ok(LineStatus::Pending));
        assert_eq!(line.line(), Ok(""));
    }

    #[test]
    fn overflow_discards_line() {
        let mut line = LineBuffer::new();
        for _ in 0..MAX_LINE_LEN {
            line.push(b'a').unwrap();
        }
        assert_eq!(line.push(b'a'), Err(ConsoleError::LineOverflow));
        assert_eq!(line.line(), Ok(""));
    }
}
