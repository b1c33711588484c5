//! error taxonomy surfaced by the scheduler core

use thiserror::Error;

use crate::keys::{PersonKey, SlotKey};

/// every way a call into this crate can fail.
///
/// the core never panics on bad input; callers get one of these back and
/// decide how to surface it (HTTP status, CLI exit code, ...).
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid slot key {key:?}: {reason}")]
    InvalidSlotKey { key: String, reason: String },

    #[error("unknown person {key}")]
    UnknownPerson { key: PersonKey },

    #[error("locked slot {slot} does not belong to the expanded month")]
    SlotNotInMonth { slot: SlotKey },

    #[error("no stats available for person {person} on duty {duty}")]
    MissingStats { person: String, duty: String },

    #[error("the optimizer could not find a feasible assignment")]
    Infeasible,

    #[error("the solver terminated without an optimal solution: {code}")]
    SolverFailure { code: String },

    #[error("repository rejected a write: {0}")]
    PersistenceError(String),
}
