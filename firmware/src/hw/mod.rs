//! STM32G0 drivers behind the breaker collaborator traits.

pub mod flash;
pub mod switch;
