//! UART console plumbing between the serial task and the breaker task.
//!
//! The serial task assembles lines and hands them over; the breaker task
//! runs them against the facade and returns the rendered reply, so console
//! commands are serialized with every other breaker input.

use core::fmt::Write;

use embassy_sync::channel::Channel;
use heapless::String;

use breaker_core::config::store::ConfigStore;
use breaker_core::console::{self, ConsoleCommand, MAX_LINE_LEN};
use breaker_core::measurement::MeasurementProvider;
use breaker_core::switch::SwitchDriver;
use breaker_core::timer::MonotonicInstant;
use breaker_core::trip_curve::TripCurve;
use breaker_core::zero_crossing::ZeroCrossingSource;

use crate::input::BreakerMutex;
use crate::intent::SwitchIntent;

/// Room for the longest reply (a full telemetry replay).
pub const REPLY_CAPACITY: usize = 2048;

pub type ConsoleLine = String<MAX_LINE_LEN>;
pub type ConsoleReply = String<REPLY_CAPACITY>;

pub type LineChannel = Channel<BreakerMutex, ConsoleLine, 1>;
pub type ReplyChannel = Channel<BreakerMutex, ConsoleReply, 1>;

/// Reply to a console line plus the operator intent it expressed.
pub struct Response {
    pub reply: ConsoleReply,
    pub intent: Option<SwitchIntent>,
}

/// Parses and runs `line` against `curve`.
///
/// Failures are rendered into the reply as `ERR` lines. A reply that does
/// not fit is cut short and marked.
pub fn respond<I, S, Z, M, C>(curve: &mut TripCurve<I, S, Z, M, C>, line: &str, now: I) -> Response
where
    I: MonotonicInstant,
    S: SwitchDriver,
    Z: ZeroCrossingSource,
    M: MeasurementProvider,
    C: ConfigStore,
{
    let mut reply = ConsoleReply::new();
    let command = match console::parse_command(line) {
        Ok(command) => command,
        Err(err) => {
            let _ = writeln!(reply, "ERR {err}");
            return Response {
                reply,
                intent: None,
            };
        }
    };

    let intent = match console::execute(curve, &command, now, &mut reply) {
        Ok(()) => match command {
            ConsoleCommand::Open => Some(SwitchIntent::Open),
            ConsoleCommand::Close => Some(SwitchIntent::Closed),
            _ => None,
        },
        Err(console::ConsoleError::Output) => {
            truncate_for_marker(&mut reply);
            let _ = reply.push_str("...\n");
            None
        }
        Err(err) => {
            let _ = writeln!(reply, "ERR {err}");
            None
        }
    };

    Response { reply, intent }
}

fn truncate_for_marker(reply: &mut ConsoleReply) {
    let keep = REPLY_CAPACITY - 4;
    if reply.len() > keep {
        let mut cut = keep;
        while !reply.is_char_boundary(cut) {
            cut -= 1;
        }
        reply.truncate(cut);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use breaker_core::config::store::{FramedStore, RamStorage};
    use breaker_core::measurement::NoopMeasurement;
    use breaker_core::switch::NoopSwitchDriver;
    use breaker_core::zero_crossing::NoopZeroCrossingSource;
    use embassy_time::Instant;

    use crate::clock::FirmwareInstant;

    type Breaker = TripCurve<
        FirmwareInstant,
        NoopSwitchDriver,
        NoopZeroCrossingSource,
        NoopMeasurement,
        FramedStore<RamStorage<256>>,
    >;

    fn at(millis: u64) -> FirmwareInstant {
        FirmwareInstant::from(Instant::from_millis(millis))
    }

    fn breaker() -> Breaker {
        let mut breaker = TripCurve::new(
            NoopSwitchDriver::new(),
            NoopZeroCrossingSource::new(),
            NoopMeasurement::new(),
            FramedStore::new(RamStorage::new(), 0),
        );
        breaker.init(at(0)).expect("init succeeds");
        breaker
    }

    #[test]
    fn commands_render_replies() {
        let mut breaker = breaker();
        let response = respond(&mut breaker, "limit 42", at(1));
        assert_eq!(response.reply.as_str(), "ok limit 42\n");
        assert_eq!(response.intent, None);
        assert_eq!(breaker.hardware_limit(), Ok(42));
    }

    #[test]
    fn open_and_close_carry_intent() {
        let mut breaker = breaker();
        let response = respond(&mut breaker, "close", at(1));
        assert_eq!(response.intent, Some(SwitchIntent::Closed));
        let response = respond(&mut breaker, "open", at(2));
        assert_eq!(response.intent, Some(SwitchIntent::Open));
    }

    #[test]
    fn failures_are_reported_inline() {
        let mut breaker = breaker();
        let response = respond(&mut breaker, "frobnicate", at(1));
        assert!(response.reply.starts_with("ERR "));

        let response = respond(&mut breaker, "modulation 5 2", at(1));
        assert!(response.reply.starts_with("ERR rejected"));
        assert_eq!(response.intent, None);
    }
}
