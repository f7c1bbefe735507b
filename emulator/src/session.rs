use std::fmt::Write as _;
use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::time::Duration;

use breaker_core::config::store::{FramedStore, RamStorage};
use breaker_core::console::{self, ConsoleCommand};
use breaker_core::measurement::TemperatureSensor;
use breaker_core::queue::BreakerInput;
use breaker_core::switch::PowerStageTemperatures;
use breaker_core::{TripCurve, TripCurveError};
use winnow::ascii::{dec_int, dec_uint, space0, space1};
use winnow::combinator::{alt, eof, preceded, separated_pair};
use winnow::error::ContextError;
use winnow::prelude::*;

use crate::sim::{InjectedFault, SimInstant, SimMeasurement, SimSwitch, SimZeroCrossing};

/// Bytes of simulated EEPROM backing the configuration records.
const STORE_LEN: usize = 256;

pub const SIM_HELP_LINES: &[&str] = &[
    "advance <ms>                           run virtual time forward",
    "supply ac|dc                           select the mains supply",
    "zc <n>                                 inject zero-crossings now",
    "current <mA>                           set the load current",
    "temp in|out <C>                        set a power stage temperature",
    "trip ocp|otp|uvp|test                  fire the switch protection latch",
];

pub type EmulatedBreaker = TripCurve<
    SimInstant,
    SimSwitch,
    SimZeroCrossing,
    SimMeasurement,
    FramedStore<RamStorage<STORE_LEN>>,
>;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TranscriptProfile {
    Cycle,
    Recovery,
    Curve,
}

impl TranscriptProfile {
    pub fn log_path(self) -> &'static str {
        match self {
            TranscriptProfile::Cycle => "transcripts/emulator-cycle.log",
            TranscriptProfile::Recovery => "transcripts/emulator-recovery.log",
            TranscriptProfile::Curve => "transcripts/emulator-curve.log",
        }
    }

    pub fn header(self) -> &'static str {
        match self {
            TranscriptProfile::Cycle => "Breaker emulator close/open transcript",
            TranscriptProfile::Recovery => "Breaker emulator recovery transcript",
            TranscriptProfile::Curve => "Breaker emulator trip curve transcript",
        }
    }

    pub fn from_tag(tag: &str) -> Result<Self, String> {
        if tag.eq_ignore_ascii_case("cycle") {
            Ok(Self::Cycle)
        } else if tag.eq_ignore_ascii_case("recovery") {
            Ok(Self::Recovery)
        } else if tag.eq_ignore_ascii_case("curve") {
            Ok(Self::Curve)
        } else {
            Err(format!("Unknown transcript profile `{tag}`"))
        }
    }
}

/// Emulator-only commands driving the simulated hardware.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum SimCommand {
    Advance(Duration),
    Supply { ac: bool },
    ZeroCrossings(u32),
    Current(u32),
    Temperature {
        sensor: TemperatureSensor,
        celsius: i32,
    },
    Trip(InjectedFault),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum SimKeyword {
    Advance,
    Supply,
    Zc,
    Current,
    Temp,
    Trip,
}

pub struct Session {
    breaker: EmulatedBreaker,
    now: SimInstant,
    transcript: TranscriptLogger,
}

impl Session {
    pub fn new(profile: TranscriptProfile) -> io::Result<Self> {
        let transcript = TranscriptLogger::new(profile)?;
        let mut breaker = TripCurve::new(
            SimSwitch::new(),
            SimZeroCrossing::new(),
            SimMeasurement::new(),
            FramedStore::new(RamStorage::new(), 0),
        );
        breaker.init(SimInstant::ZERO).map_err(into_io)?;

        Ok(Self {
            breaker,
            now: SimInstant::ZERO,
            transcript,
        })
    }

    pub fn handle_command(&mut self, line: &str) -> io::Result<Vec<String>> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(Vec::new());
        }

        let elapsed = self.now.since_start();
        self.transcript
            .append_line(elapsed, TranscriptRole::Host, trimmed)?;

        let mut lines = Vec::new();
        let outcome = match parse_sim_command(trimmed) {
            Ok(Some(command)) => self.run_sim(command, &mut lines),
            Ok(None) => self.run_console(trimmed, &mut lines),
            Err(_) => {
                lines.push("ERR syntax error, try `help`".to_string());
                Ok(())
            }
        };
        if let Err(err) = outcome {
            lines.push(format!("ERR {err}"));
        }

        let elapsed = self.now.since_start();
        self.record_output(elapsed, &lines)?;
        Ok(lines)
    }

    /// Runs virtual time forward by `elapsed` without operator input.
    ///
    /// Returns the notifications raised on the way.
    pub fn run_for(&mut self, elapsed: Duration) -> io::Result<Vec<String>> {
        let mut lines = Vec::new();
        let target = self.now + elapsed;
        self.advance_to(target, &mut lines).map_err(into_io)?;
        let at = self.now.since_start();
        self.record_output(at, &lines)?;
        Ok(lines)
    }

    fn run_console(&mut self, line: &str, lines: &mut Vec<String>) -> Result<(), TripCurveError> {
        let command = match console::parse_command(line) {
            Ok(command) => command,
            Err(err) => {
                lines.push(format!("ERR {err}"));
                return Ok(());
            }
        };

        let mut output = String::new();
        let result = console::execute(&mut self.breaker, &command, self.now, &mut output);
        lines.extend(output.lines().map(str::to_string));
        if let Err(err) = result {
            lines.push(format!("ERR {err}"));
        }
        if command == ConsoleCommand::Help {
            lines.extend(SIM_HELP_LINES.iter().map(|line| (*line).to_string()));
        }

        self.settle(lines)
    }

    fn run_sim(&mut self, command: SimCommand, lines: &mut Vec<String>) -> Result<(), TripCurveError> {
        match command {
            SimCommand::Advance(duration) => {
                let target = self.now + duration;
                self.advance_to(target, lines)?;
                lines.push(format!(
                    "ok t=+{} ms {}",
                    self.now.since_start().as_millis(),
                    self.breaker.state()
                ));
            }
            SimCommand::Supply { ac } => {
                self.breaker.zero_crossing_mut().set_ac(ac, self.now);
                lines.push(format!("ok supply {}", if ac { "ac" } else { "dc" }));
            }
            SimCommand::ZeroCrossings(count) => {
                for _ in 0..count {
                    self.breaker
                        .handle_input(BreakerInput::ZeroCrossing, self.now)?;
                    self.settle(lines)?;
                }
                lines.push(format!("ok {count} crossings"));
            }
            SimCommand::Current(current_ma) => {
                self.breaker.measurement_mut().current_ma = current_ma;
                lines.push(format!("ok current {current_ma} mA"));
            }
            SimCommand::Temperature { sensor, celsius } => {
                let measurement = self.breaker.measurement_mut();
                match sensor {
                    TemperatureSensor::PowerIn => measurement.temperatures.input_c = celsius,
                    TemperatureSensor::PowerOut => measurement.temperatures.output_c = celsius,
                }
                let temperatures: PowerStageTemperatures = measurement.temperatures;
                self.breaker.switch_mut().set_temperatures(temperatures);
                lines.push(format!("ok temp {sensor:?} {celsius} C"));
            }
            SimCommand::Trip(fault) => {
                if self.breaker.switch_mut().inject(fault) {
                    lines.push(format!("ok latch {fault:?}"));
                } else {
                    lines.push("ERR switch already open".to_string());
                }
                self.settle(lines)?;
            }
        }
        Ok(())
    }

    /// Delivers crossings and deadlines in time order up to `target`.
    fn advance_to(&mut self, target: SimInstant, lines: &mut Vec<String>) -> Result<(), TripCurveError> {
        loop {
            let crossing = self
                .breaker
                .zero_crossing()
                .next_crossing()
                .filter(|at| *at <= target);
            let deadline = self.breaker.next_deadline().filter(|at| *at <= target);
            let next = match (crossing, deadline) {
                (Some(crossing), Some(deadline)) => crossing.min(deadline),
                (Some(at), None) | (None, Some(at)) => at,
                (None, None) => break,
            };

            self.now = next;
            if crossing == Some(next) {
                self.breaker.zero_crossing_mut().advance_past(next);
                self.breaker
                    .handle_input(BreakerInput::ZeroCrossing, next)?;
            }
            self.breaker.poll(next)?;
            self.settle(lines)?;
        }

        self.now = target;
        self.breaker.poll(target)?;
        self.settle(lines)
    }

    /// Feeds pending switch edges back and reports notifications.
    fn settle(&mut self, lines: &mut Vec<String>) -> Result<(), TripCurveError> {
        while let Some(edge) = self.breaker.switch_mut().next_edge() {
            self.breaker.handle_input(edge, self.now)?;
        }
        while let Some(notification) = self.breaker.dispatch_notification() {
            let mut line = String::new();
            let _ = write!(
                line,
                "! t=+{} ms {} {}",
                self.now.since_start().as_millis(),
                notification.state,
                notification.cause
            );
            lines.push(line);
        }
        Ok(())
    }

    fn record_output(&mut self, elapsed: Duration, lines: &[String]) -> io::Result<()> {
        for line in lines {
            self.transcript
                .append_line(elapsed, TranscriptRole::Emulator, line)?;
        }
        Ok(())
    }
}

fn into_io(err: TripCurveError) -> io::Error {
    io::Error::other(err.to_string())
}

/// Parses an emulator command; `Ok(None)` hands the line to the breaker console.
fn parse_sim_command(line: &str) -> Result<Option<SimCommand>, ContextError> {
    let mut input = line.trim();
    let Ok(keyword) = sim_keyword(&mut input) else {
        return Ok(None);
    };

    let command = match keyword {
        SimKeyword::Advance => {
            let millis: u64 = preceded(space1, dec_uint).parse_next(&mut input)?;
            SimCommand::Advance(Duration::from_millis(millis))
        }
        SimKeyword::Supply => SimCommand::Supply {
            ac: preceded(space1, alt(("ac".value(true), "dc".value(false))))
                .parse_next(&mut input)?,
        },
        SimKeyword::Zc => SimCommand::ZeroCrossings(preceded(space1, dec_uint).parse_next(&mut input)?),
        SimKeyword::Current => SimCommand::Current(preceded(space1, dec_uint).parse_next(&mut input)?),
        SimKeyword::Temp => {
            let (sensor, celsius) =
                preceded(space1, separated_pair(temperature_sensor, space1, dec_int))
                    .parse_next(&mut input)?;
            SimCommand::Temperature { sensor, celsius }
        }
        SimKeyword::Trip => SimCommand::Trip(preceded(space1, injected_fault).parse_next(&mut input)?),
    };

    (space0, eof).parse_next(&mut input)?;
    Ok(Some(command))
}

fn sim_keyword(input: &mut &str) -> Result<SimKeyword, ContextError> {
    let keyword = alt((
        "advance".value(SimKeyword::Advance),
        "supply".value(SimKeyword::Supply),
        "zc".value(SimKeyword::Zc),
        "current".value(SimKeyword::Current),
        "temp".value(SimKeyword::Temp),
        "trip".value(SimKeyword::Trip),
    ))
    .parse_next(input)?;
    alt((space1, eof)).parse_peek(*input)?;
    Ok(keyword)
}

fn temperature_sensor(input: &mut &str) -> Result<TemperatureSensor, ContextError> {
    alt((
        "in".value(TemperatureSensor::PowerIn),
        "out".value(TemperatureSensor::PowerOut),
    ))
    .parse_next(input)
}

fn injected_fault(input: &mut &str) -> Result<InjectedFault, ContextError> {
    alt((
        "ocp".value(InjectedFault::OverCurrent),
        "otp".value(InjectedFault::OverTemperature),
        "uvp".value(InjectedFault::Undervoltage),
        "test".value(InjectedFault::SelfTest),
    ))
    .parse_next(input)
}

struct TranscriptLogger {
    writer: BufWriter<std::fs::File>,
}

impl TranscriptLogger {
    fn new(profile: TranscriptProfile) -> io::Result<Self> {
        let path = Path::new(profile.log_path());
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        let mut logger = Self {
            writer: BufWriter::new(file),
        };

        logger.write_header(profile)?;
        Ok(logger)
    }

    fn write_header(&mut self, profile: TranscriptProfile) -> io::Result<()> {
        writeln!(self.writer, "# {}", profile.header())?;
        writeln!(
            self.writer,
            "# Timestamps are milliseconds of virtual time since session start"
        )?;
        writeln!(self.writer)?;
        self.writer.flush()
    }

    fn append_line(
        &mut self,
        elapsed: Duration,
        role: TranscriptRole,
        line: &str,
    ) -> io::Result<()> {
        writeln!(
            self.writer,
            "[+{:>6} ms] {} {}",
            elapsed.as_millis(),
            role.prefix(),
            line
        )?;
        self.writer.flush()
    }
}

enum TranscriptRole {
    Host,
    Emulator,
}

impl TranscriptRole {
    fn prefix(&self) -> &'static str {
        match self {
            TranscriptRole::Host => "HOST>",
            TranscriptRole::Emulator => "EMU <",
        }
    }
}
