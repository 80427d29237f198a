use std::time::Instant;

use chrono::NaiveDate;
use tracing::{debug, warn};
use ulid::Ulid;

use crate::model::*;
use crate::observability::{AVAILABILITY_CHECKS_TOTAL, OPERATION_DURATION_SECONDS};
use crate::store::StoreError;

use super::calendar::{booked_dates, horizon_window, today};
use super::conflict::{find_conflicts, validate_stay, validate_villa_id};
use super::{Engine, EngineError};

impl Engine {
    /// Does `stay` collide with a pending or confirmed reservation of the villa?
    ///
    /// Read-only. If the store is unreachable this fails with
    /// `StoreUnavailable`, unless the fail-open policy is set, in which case
    /// the stay is reported available and the report is flagged `failed_open`.
    pub async fn check_conflict(&self, villa_id: &VillaId, stay: Stay) -> Result<ConflictReport, EngineError> {
        let started = Instant::now();
        validate_villa_id(villa_id)?;
        let stay = validate_stay(stay.check_in, stay.check_out)?;

        let (outcome, result) = match self.store.find_overlapping(villa_id, &BLOCKING_STATUSES, &stay).await {
            Ok(candidates) => {
                let report = ConflictReport::from_conflicts(find_conflicts(&candidates, &stay));
                let outcome = if report.available { "available" } else { "conflict" };
                (outcome, Ok(report))
            }
            Err(StoreError::Unavailable(msg)) if self.policy.fail_open_on_store_error => {
                warn!(
                    "check_conflict: store unavailable ({msg}); failing open for villa {villa_id} {}..{}",
                    stay.check_in, stay.check_out
                );
                ("fail_open", Ok(ConflictReport::assumed_available()))
            }
            Err(e) => ("error", Err(self.store_failure("check_conflict", e))),
        };

        metrics::counter!(AVAILABILITY_CHECKS_TOTAL, "outcome" => outcome).increment(1);
        metrics::histogram!(OPERATION_DURATION_SECONDS, "operation" => "check_conflict", "outcome" => outcome)
            .record(started.elapsed().as_secs_f64());
        if let Ok(ref report) = result {
            debug!(
                "check_conflict villa={villa_id} {}..{} -> {outcome} ({} conflicts)",
                stay.check_in,
                stay.check_out,
                report.conflicting_bookings.len()
            );
        }
        result
    }

    /// Booked dates of the villa from today over `horizon_months` (policy
    /// default when `None`).
    pub async fn list_booked_dates(
        &self,
        villa_id: &VillaId,
        horizon_months: Option<u32>,
    ) -> Result<Vec<BookedDate>, EngineError> {
        self.list_booked_dates_at(villa_id, horizon_months, today()).await
    }

    /// `list_booked_dates` with an explicit "today".
    pub async fn list_booked_dates_at(
        &self,
        villa_id: &VillaId,
        horizon_months: Option<u32>,
        today: NaiveDate,
    ) -> Result<Vec<BookedDate>, EngineError> {
        let started = Instant::now();
        validate_villa_id(villa_id)?;
        let months = horizon_months.unwrap_or(self.policy.default_horizon_months);
        let window = horizon_window(today, months)?;

        let candidates = self
            .store
            .find_overlapping(villa_id, &BLOCKING_STATUSES, &window)
            .await
            .map_err(|e| self.store_failure("list_booked_dates", e))?;
        let booked = booked_dates(&candidates, &window);

        metrics::histogram!(OPERATION_DURATION_SECONDS, "operation" => "list_booked_dates")
            .record(started.elapsed().as_secs_f64());
        Ok(booked)
    }

    pub async fn get_reservation(&self, id: Ulid) -> Result<Reservation, EngineError> {
        self.store
            .get(id)
            .await
            .map_err(|e| self.store_failure("get_reservation", e))?
            .ok_or(EngineError::NotFound(id))
    }

    /// All reservations of the villa, any status. Staff view: includes guest data.
    pub async fn list_reservations(&self, villa_id: &VillaId) -> Result<Vec<Reservation>, EngineError> {
        validate_villa_id(villa_id)?;
        self.store
            .list_for_villa(villa_id)
            .await
            .map_err(|e| self.store_failure("list_reservations", e))
    }
}
