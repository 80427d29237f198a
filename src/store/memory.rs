use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use ulid::Ulid;

use crate::model::*;

use super::{ReservationStore, StoreError};

/// Process-local reservation store: one sorted calendar per villa plus an
/// id → villa index.
pub struct InMemoryStore {
    villas: DashMap<VillaId, VillaCalendar>,
    by_id: DashMap<Ulid, VillaId>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            villas: DashMap::new(),
            by_id: DashMap::new(),
        }
    }

    pub fn reservation_count(&self) -> usize {
        self.by_id.len()
    }

    pub fn villa_count(&self) -> usize {
        self.villas.len()
    }

    pub fn contains(&self, id: &Ulid) -> bool {
        self.by_id.contains_key(id)
    }

    pub fn get_reservation(&self, id: &Ulid) -> Option<Reservation> {
        let villa_id = self.by_id.get(id)?.value().clone();
        self.villas.get(&villa_id)?.get(id).cloned()
    }

    /// Every reservation, villas in id order, each villa by check-in.
    pub fn snapshot(&self) -> Vec<Reservation> {
        let mut villa_ids: Vec<VillaId> = self.villas.iter().map(|e| e.key().clone()).collect();
        villa_ids.sort();
        villa_ids
            .iter()
            .filter_map(|v| self.villas.get(v).map(|cal| cal.reservations.clone()))
            .flatten()
            .collect()
    }

    /// Apply one log event and return the reservation it touched.
    pub fn apply(&self, event: &Event) -> Result<Reservation, StoreError> {
        match event {
            Event::ReservationCreated { reservation } => {
                match self.by_id.entry(reservation.id) {
                    Entry::Occupied(_) => return Err(StoreError::AlreadyExists(reservation.id)),
                    Entry::Vacant(slot) => {
                        slot.insert(reservation.villa_id.clone());
                    }
                }
                self.villas
                    .entry(reservation.villa_id.clone())
                    .or_insert_with(|| VillaCalendar::new(reservation.villa_id.clone()))
                    .insert(reservation.clone());
                Ok(reservation.clone())
            }
            Event::StatusChanged { id, villa_id, status } => {
                let mut calendar = self.villas.get_mut(villa_id).ok_or(StoreError::NotFound(*id))?;
                let reservation = calendar.get_mut(id).ok_or(StoreError::NotFound(*id))?;
                reservation.status = *status;
                Ok(reservation.clone())
            }
        }
    }
}

#[async_trait]
impl ReservationStore for InMemoryStore {
    async fn find_overlapping(
        &self,
        villa_id: &VillaId,
        statuses: &[ReservationStatus],
        window: &Stay,
    ) -> Result<Vec<Reservation>, StoreError> {
        Ok(self
            .villas
            .get(villa_id)
            .map(|calendar| {
                calendar
                    .overlapping(window)
                    .filter(|r| statuses.contains(&r.status))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn get(&self, id: Ulid) -> Result<Option<Reservation>, StoreError> {
        Ok(self.get_reservation(&id))
    }

    async fn list_for_villa(&self, villa_id: &VillaId) -> Result<Vec<Reservation>, StoreError> {
        Ok(self
            .villas
            .get(villa_id)
            .map(|calendar| calendar.reservations.clone())
            .unwrap_or_default())
    }

    async fn insert(&self, reservation: Reservation) -> Result<(), StoreError> {
        self.apply(&Event::ReservationCreated { reservation }).map(|_| ())
    }

    async fn set_status(&self, id: Ulid, status: ReservationStatus) -> Result<Reservation, StoreError> {
        let villa_id = self
            .by_id
            .get(&id)
            .map(|e| e.value().clone())
            .ok_or(StoreError::NotFound(id))?;
        self.apply(&Event::StatusChanged { id, villa_id, status })
    }
}
