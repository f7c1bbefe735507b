use std::io;

#[allow(dead_code)]
#[path = "../session.rs"]
mod session;
#[allow(dead_code)]
#[path = "../sim.rs"]
mod sim;

use session::{Session, TranscriptProfile};

fn main() -> io::Result<()> {
    record_profile(TranscriptProfile::Cycle)?;
    record_profile(TranscriptProfile::Recovery)?;
    record_profile(TranscriptProfile::Curve)?;
    Ok(())
}

fn record_profile(profile: TranscriptProfile) -> io::Result<()> {
    let mut session = Session::new(profile)?;
    let script: &[&str] = match profile {
        TranscriptProfile::Cycle => &[
            "status",
            "close",
            "advance 250",
            "status",
            "open",
            "advance 20",
            "supply dc",
            "close",
            "advance 250",
            "status",
            "open",
            "log",
        ],
        TranscriptProfile::Recovery => &[
            "recovery on 2 1000 60000",
            "supply dc",
            "close",
            "advance 250",
            "trip ocp",
            "status",
            "advance 1000",
            "trip ocp",
            "advance 1000",
            "trip ocp",
            "status",
            "close",
            "temp in 90",
            "advance 250",
            "status",
            "temp in 25",
            "open",
            "log",
        ],
        TranscriptProfile::Curve => &[
            "points 1000:500 5000:200",
            "points",
            "close",
            "advance 250",
            "current 2000",
            "advance 400",
            "status",
            "advance 200",
            "status",
            "current 0",
            "close",
            "advance 250",
            "current 6000",
            "advance 300",
            "log",
        ],
    };

    for line in script {
        session.handle_command(line)?;
    }
    Ok(())
}
