mod session;
mod sim;

use std::env;
use std::io::{self, BufRead, Write};
use std::process;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use session::{Session, TranscriptProfile};

/// Wall-clock slice after which the simulated mains catches up.
const REALTIME_STEP: Duration = Duration::from_millis(20);

const USAGE: &str = "Usage: breaker-emulator [cycle|recovery|curve] [--paused]";

/// Command-line options of the interactive emulator.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
struct Options {
    profile: TranscriptProfile,
    /// Virtual time follows the wall clock; `--paused` leaves it to `advance`.
    realtime: bool,
}

impl Options {
    fn from_args<I>(args: I) -> Result<Self, String>
    where
        I: IntoIterator<Item = String>,
    {
        let mut options = Self {
            profile: TranscriptProfile::Cycle,
            realtime: true,
        };
        for arg in args {
            match arg.as_str() {
                "--paused" => options.realtime = false,
                "--realtime" => options.realtime = true,
                tag => {
                    let tag = tag.strip_prefix("--profile=").unwrap_or(tag);
                    options.profile = TranscriptProfile::from_tag(tag)?;
                }
            }
        }
        Ok(options)
    }
}

fn main() -> io::Result<()> {
    let options = Options::from_args(env::args().skip(1)).unwrap_or_else(|err| {
        eprintln!("{err}");
        eprintln!("{USAGE}");
        process::exit(2);
    });

    let mut session = Session::new(options.profile)?;
    let operator = spawn_line_reader();
    let stdout = io::stdout();
    let mut out = stdout.lock();

    writeln!(
        out,
        "Breaker emulator, {} virtual time. `help` lists commands, `quit` leaves.",
        if options.realtime { "real-time" } else { "paused" }
    )?;
    prompt(&mut out)?;

    let mut caught_up = Instant::now();
    loop {
        let received = if options.realtime {
            operator.recv_timeout(REALTIME_STEP)
        } else {
            operator.recv().map_err(|_| RecvTimeoutError::Disconnected)
        };

        if options.realtime {
            let elapsed = caught_up.elapsed();
            caught_up += elapsed;
            let raised = session.run_for(elapsed)?;
            if !raised.is_empty() {
                writeln!(out)?;
                print_lines(&mut out, &raised)?;
                prompt(&mut out)?;
            }
        }

        match received {
            Ok(line) => match line.trim() {
                "" => prompt(&mut out)?,
                "quit" | "exit" => {
                    writeln!(out, "Emulator stopped.")?;
                    break;
                }
                command => {
                    let replies = session.handle_command(command)?;
                    print_lines(&mut out, &replies)?;
                    prompt(&mut out)?;
                }
            },
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                writeln!(out)?;
                break;
            }
        }
    }

    Ok(())
}

/// Reads operator lines on a separate thread so virtual time keeps running.
fn spawn_line_reader() -> Receiver<String> {
    let (sender, receiver) = mpsc::channel();
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if sender.send(line).is_err() {
                break;
            }
        }
    });
    receiver
}

fn prompt(out: &mut impl Write) -> io::Result<()> {
    write!(out, "> ")?;
    out.flush()
}

fn print_lines(out: &mut impl Write, lines: &[String]) -> io::Result<()> {
    for line in lines {
        writeln!(out, "{line}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Options, String> {
        Options::from_args(args.iter().map(|arg| (*arg).to_string()))
    }

    #[test]
    fn defaults_to_realtime_cycle() {
        assert_eq!(
            parse(&[]),
            Ok(Options {
                profile: TranscriptProfile::Cycle,
                realtime: true,
            })
        );
    }

    #[test]
    fn accepts_profile_and_paused_in_any_order() {
        let expected = Ok(Options {
            profile: TranscriptProfile::Curve,
            realtime: false,
        });
        assert_eq!(parse(&["--paused", "curve"]), expected);
        assert_eq!(parse(&["--profile=curve", "--paused"]), expected);
    }

    #[test]
    fn rejects_unknown_profile() {
        assert!(parse(&["surge"]).is_err());
    }
}
