//! Reservation storage behind the availability engine.
//!
//! The engine only ever talks to [`ReservationStore`]; it is handed an
//! `Arc<dyn ReservationStore>` at construction, so tests can swap in doubles.

mod durable;
mod memory;

pub use durable::WalStore;
pub use memory::InMemoryStore;

use async_trait::async_trait;
use ulid::Ulid;

use crate::model::{Reservation, ReservationStatus, Stay, VillaId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The backing store could not be reached or failed to persist.
    Unavailable(String),
    NotFound(Ulid),
    AlreadyExists(Ulid),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Unavailable(msg) => write!(f, "store unavailable: {msg}"),
            StoreError::NotFound(id) => write!(f, "reservation not found: {id}"),
            StoreError::AlreadyExists(id) => write!(f, "reservation already exists: {id}"),
        }
    }
}

impl std::error::Error for StoreError {}

#[async_trait]
pub trait ReservationStore: Send + Sync {
    /// Reservations of `villa_id` whose status is in `statuses` and whose stay
    /// overlaps `window`, ordered by check-in.
    async fn find_overlapping(
        &self,
        villa_id: &VillaId,
        statuses: &[ReservationStatus],
        window: &Stay,
    ) -> Result<Vec<Reservation>, StoreError>;

    async fn get(&self, id: Ulid) -> Result<Option<Reservation>, StoreError>;

    /// Every reservation of the villa regardless of status, ordered by check-in.
    async fn list_for_villa(&self, villa_id: &VillaId) -> Result<Vec<Reservation>, StoreError>;

    async fn insert(&self, reservation: Reservation) -> Result<(), StoreError>;

    /// Overwrite the status and return the updated reservation. Transition
    /// rules are the caller's business.
    async fn set_status(&self, id: Ulid, status: ReservationStatus) -> Result<Reservation, StoreError>;
}
