use ulid::Ulid;

use crate::model::{ConflictInfo, ReservationStatus};
use crate::store::StoreError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Missing or malformed villa id, date or guest field. Never retried.
    InvalidInput(String),
    LimitExceeded(&'static str),
    NotFound(Ulid),
    AlreadyExists(Ulid),
    /// The requested stay overlaps these blocking reservations.
    Conflict(Vec<ConflictInfo>),
    InvalidTransition {
        id: Ulid,
        from: ReservationStatus,
        to: ReservationStatus,
    },
    StoreUnavailable(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::NotFound(id) => write!(f, "reservation not found: {id}"),
            EngineError::AlreadyExists(id) => write!(f, "reservation already exists: {id}"),
            EngineError::Conflict(conflicts) => {
                write!(f, "stay conflicts with {} existing reservation(s)", conflicts.len())
            }
            EngineError::InvalidTransition { id, from, to } => {
                write!(f, "reservation {id} cannot move from {from} to {to}")
            }
            EngineError::StoreUnavailable(msg) => write!(f, "reservation store unavailable: {msg}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Unavailable(msg) => EngineError::StoreUnavailable(msg),
            StoreError::NotFound(id) => EngineError::NotFound(id),
            StoreError::AlreadyExists(id) => EngineError::AlreadyExists(id),
        }
    }
}
