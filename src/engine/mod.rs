mod calendar;
mod conflict;
mod error;
mod mutations;
mod queries;

pub use calendar::{booked_dates, horizon_window, parse_horizon_months};
pub use conflict::{AvailabilityQuery, find_conflicts, parse_date, parse_villa_id, validate_stay};
pub use error::EngineError;
pub use mutations::NewReservation;

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::warn;

use crate::limits::DEFAULT_HORIZON_MONTHS;
use crate::model::VillaId;
use crate::notify::NotifyHub;
use crate::observability::STORE_ERRORS_TOTAL;
use crate::store::{ReservationStore, StoreError};

/// Behaviour switches set at deployment time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Policy {
    /// Answer "available" when the store is unreachable during a conflict
    /// check. Only for non-production deployments; never applies to writes.
    pub fail_open_on_store_error: bool,
    pub default_horizon_months: u32,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            fail_open_on_store_error: false,
            default_horizon_months: DEFAULT_HORIZON_MONTHS,
        }
    }
}

/// The availability engine. Reads and writes go through the injected store;
/// check-then-insert and status changes are serialized per villa.
pub struct Engine {
    store: Arc<dyn ReservationStore>,
    policy: Policy,
    pub notify: Arc<NotifyHub>,
    villa_locks: DashMap<VillaId, Arc<Mutex<()>>>,
}

impl Engine {
    pub fn new(store: Arc<dyn ReservationStore>, policy: Policy, notify: Arc<NotifyHub>) -> Self {
        Self {
            store,
            policy,
            notify,
            villa_locks: DashMap::new(),
        }
    }

    fn villa_lock(&self, villa_id: &VillaId) -> Arc<Mutex<()>> {
        self.villa_locks.entry(villa_id.clone()).or_default().value().clone()
    }

    /// Drop lock entries nobody is holding or waiting on.
    pub fn prune_villa_locks(&self) {
        self.villa_locks.retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    pub fn villa_lock_count(&self) -> usize {
        self.villa_locks.len()
    }

    /// Count and log store failures before handing them to the caller.
    fn store_failure(&self, operation: &'static str, e: StoreError) -> EngineError {
        if let StoreError::Unavailable(ref msg) = e {
            metrics::counter!(STORE_ERRORS_TOTAL, "operation" => operation).increment(1);
            warn!("{operation}: reservation store unavailable: {msg}");
        }
        e.into()
    }
}
