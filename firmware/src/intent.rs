//! Operator open/close intent kept across power cycles.
//!
//! The intent is a one-byte record in the configuration store, placed right
//! after the breaker configuration records. Only operator commands update it;
//! protective trips leave it untouched.

use breaker_core::config::store::{ConfigStore, StoreError};
use breaker_core::queue::BreakerInput;

/// Record offset inside the configuration store.
pub const INTENT_OFFSET: u32 = 200;

/// Last lever position requested by the operator.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub enum SwitchIntent {
    #[default]
    Open,
    Closed,
}

impl SwitchIntent {
    const fn to_raw(self) -> u8 {
        match self {
            SwitchIntent::Open => 0,
            SwitchIntent::Closed => 1,
        }
    }

    /// Intent expressed by an operator input, if it is a command.
    pub const fn from_input(input: BreakerInput) -> Option<Self> {
        match input {
            BreakerInput::Open => Some(SwitchIntent::Open),
            BreakerInput::Close => Some(SwitchIntent::Closed),
            BreakerInput::ZeroCrossing | BreakerInput::SwitchChanged { .. } => None,
        }
    }

    /// Command that restores this intent.
    pub const fn input(self) -> BreakerInput {
        match self {
            SwitchIntent::Open => BreakerInput::Open,
            SwitchIntent::Closed => BreakerInput::Close,
        }
    }
}

/// Reads the stored intent; a missing or damaged record means open.
pub fn load<C: ConfigStore>(store: &mut C) -> SwitchIntent {
    let mut raw = [0u8; 1];
    match store.load(INTENT_OFFSET, &mut raw) {
        Ok(()) if raw[0] == SwitchIntent::Closed.to_raw() => SwitchIntent::Closed,
        _ => SwitchIntent::Open,
    }
}

/// Writes `intent` unless the store already holds it.
///
/// # Errors
///
/// Propagates the store failure.
pub fn save<C: ConfigStore>(store: &mut C, intent: SwitchIntent) -> Result<(), StoreError> {
    let mut raw = [0u8; 1];
    if store.load(INTENT_OFFSET, &mut raw).is_ok() && raw[0] == intent.to_raw() {
        return Ok(());
    }
    store.store(INTENT_OFFSET, &[intent.to_raw()])
}
