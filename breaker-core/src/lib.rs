#![no_std]

// Decision logic of the electronic circuit breaker.
//
// This crate stays portable across MCU firmware and host tooling by avoiding the
// Rust standard library. Hardware is reached only through the collaborator
// traits in `switch`, `zero_crossing`, `measurement` and `config::store`.

#[macro_use]
mod fmt;

pub mod config;
pub mod console;
pub mod csom;
pub mod event;
pub mod measurement;
pub mod monitor;
pub mod msm;
pub mod queue;
pub mod switch;
pub mod telemetry;
pub mod timer;
pub mod trip_curve;
pub mod zero_crossing;

pub use trip_curve::{TripCause, TripCurve, TripCurveError, TripNotification, TripState};
