use std::time::Instant;

use chrono::Utc;
use tracing::info;
use ulid::Ulid;

use crate::model::*;
use crate::notify::{ChangeKind, Notification};
use crate::observability::{
    OPERATION_DURATION_SECONDS, RESERVATION_CONFLICTS_TOTAL, RESERVATIONS_CREATED_TOTAL, STATUS_TRANSITIONS_TOTAL,
};

use super::conflict::{find_conflicts, validate_guest, validate_reference, validate_stay, validate_villa_id};
use super::{Engine, EngineError};

/// A booking submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReservation {
    pub villa_id: VillaId,
    pub stay: Stay,
    pub guest: Guest,
    /// Caller-supplied booking reference; derived from the id when `None`.
    pub reference: Option<String>,
}

impl Engine {
    /// Record a `pending` reservation if the stay is free.
    ///
    /// The conflict check and the insert run under the villa's lock, so two
    /// overlapping submissions can't both succeed. A store outage always fails
    /// here, whatever the fail-open policy says.
    pub async fn create_reservation(&self, new: NewReservation) -> Result<Reservation, EngineError> {
        let started = Instant::now();
        validate_villa_id(&new.villa_id)?;
        let stay = validate_stay(new.stay.check_in, new.stay.check_out)?;
        validate_guest(&new.guest)?;
        if let Some(ref reference) = new.reference {
            validate_reference(reference)?;
        }

        let lock = self.villa_lock(&new.villa_id);
        let _guard = lock.lock().await;

        let candidates = self
            .store
            .find_overlapping(&new.villa_id, &BLOCKING_STATUSES, &stay)
            .await
            .map_err(|e| self.store_failure("create_reservation", e))?;
        let conflicts = find_conflicts(&candidates, &stay);
        if !conflicts.is_empty() {
            metrics::counter!(RESERVATION_CONFLICTS_TOTAL).increment(1);
            info!(
                "rejected booking for villa {} {}..{}: {} conflicts",
                new.villa_id,
                stay.check_in,
                stay.check_out,
                conflicts.len()
            );
            return Err(EngineError::Conflict(conflicts));
        }

        let id = Ulid::new();
        let reservation = Reservation {
            id,
            reference: new
                .reference
                .map(|r| r.trim().to_string())
                .unwrap_or_else(|| Reservation::default_reference(&id)),
            villa_id: new.villa_id,
            stay,
            status: ReservationStatus::Pending,
            guest: Guest {
                name: new.guest.name.trim().to_string(),
                email: new.guest.email.trim().to_string(),
                phone: new.guest.phone.map(|p| p.trim().to_string()).filter(|p| !p.is_empty()),
            },
            created_at: Utc::now(),
        };
        self.store
            .insert(reservation.clone())
            .await
            .map_err(|e| self.store_failure("create_reservation", e))?;

        self.notify.send(Notification::new(ChangeKind::Created, &reservation));
        metrics::counter!(RESERVATIONS_CREATED_TOTAL).increment(1);
        metrics::histogram!(OPERATION_DURATION_SECONDS, "operation" => "create_reservation")
            .record(started.elapsed().as_secs_f64());
        info!(
            "reservation {} ({}) created for villa {} {}..{}",
            reservation.id, reservation.reference, reservation.villa_id, stay.check_in, stay.check_out
        );
        Ok(reservation)
    }

    /// Payment succeeded.
    pub async fn confirm_reservation(&self, id: Ulid) -> Result<Reservation, EngineError> {
        self.transition(id, ReservationStatus::Confirmed).await
    }

    pub async fn cancel_reservation(&self, id: Ulid) -> Result<Reservation, EngineError> {
        self.transition(id, ReservationStatus::Cancelled).await
    }

    /// The stay is over.
    pub async fn complete_reservation(&self, id: Ulid) -> Result<Reservation, EngineError> {
        self.transition(id, ReservationStatus::Completed).await
    }

    async fn transition(&self, id: Ulid, to: ReservationStatus) -> Result<Reservation, EngineError> {
        let villa_id = self.get_reservation(id).await?.villa_id;
        let lock = self.villa_lock(&villa_id);
        let _guard = lock.lock().await;

        // Re-read under the lock; another transition may have landed meanwhile.
        let current = self.get_reservation(id).await?;
        if !current.status.can_transition_to(to) {
            return Err(EngineError::InvalidTransition {
                id,
                from: current.status,
                to,
            });
        }

        let updated = self
            .store
            .set_status(id, to)
            .await
            .map_err(|e| self.store_failure("transition", e))?;

        self.notify.send(Notification::new(ChangeKind::StatusChanged, &updated));
        metrics::counter!(STATUS_TRANSITIONS_TOTAL, "status" => to.as_str()).increment(1);
        info!("reservation {id} ({}) {} -> {to}", updated.reference, current.status);
        Ok(updated)
    }
}
