//! tunables for the optimizer that the domain spec leaves as open
//! questions rather than fixed constants.

use std::fs;

use serde::Deserialize;

use crate::error::CoreError;

/// default per-person total cap (constraint family 5) when
/// `delta_scaled_cap` is off.
pub const DEFAULT_MAX_PER_PERSON: u32 = 7;

/// the cold-start boost samples its jitter factor `k` from this range.
pub const COLD_START_JITTER_RANGE: (f64, f64) = (0.9, 1.1);

/// a person is "cold" for a duty when their actual average is below this
/// fraction of their ideal average.
pub const COLD_START_THRESHOLD: f64 = 0.05;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// hard cap on slots per person per month (constraint family 5).
    pub max_per_person: u32,

    /// historical variant: scale the per-person cap down from
    /// `max_per_person` based on average positive delta, per
    /// `1 / (1 + avg_positive_delta)`, clamped to `[1, 5]`. disabled by
    /// default; the active design uses the constant cap.
    pub delta_scaled_cap: bool,

    /// seed for the cold-start jitter RNG. `None` draws from the system
    /// RNG; set this for deterministic tests.
    pub cold_start_seed: Option<u64>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            max_per_person: DEFAULT_MAX_PER_PERSON,
            delta_scaled_cap: false,
            cold_start_seed: None,
        }
    }
}

impl CoreConfig {
    pub fn load(path: &str) -> Result<Self, CoreError> {
        let content = fs::read_to_string(path)
            .map_err(|e| CoreError::PersistenceError(format!("reading config {path}: {e}")))?;
        toml::from_str(&content)
            .map_err(|e| CoreError::PersistenceError(format!("parsing config {path}: {e}")))
    }
}
