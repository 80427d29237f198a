use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Opaque villa identifier as handed to us by the listing side.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VillaId(String);

impl VillaId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VillaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Half-open date range `[check_in, check_out)`. The checkout day is free,
/// so one stay can end on the day the next begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Stay {
    #[serde(rename = "checkInDate")]
    pub check_in: NaiveDate,
    #[serde(rename = "checkOutDate")]
    pub check_out: NaiveDate,
}

impl Stay {
    pub fn new(check_in: NaiveDate, check_out: NaiveDate) -> Self {
        debug_assert!(check_in < check_out, "Stay check-in must be before check-out");
        Self { check_in, check_out }
    }

    pub fn nights(&self) -> i64 {
        (self.check_out - self.check_in).num_days()
    }

    pub fn overlaps(&self, other: &Stay) -> bool {
        self.check_in < other.check_out && other.check_in < self.check_out
    }

    /// Overlap of two stays, if any.
    pub fn intersect(&self, other: &Stay) -> Option<Stay> {
        let start = self.check_in.max(other.check_in);
        let end = self.check_out.min(other.check_out);
        (start < end).then(|| Stay::new(start, end))
    }

    /// Every occupied night, i.e. each date in `[check_in, check_out)`.
    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + use<> {
        let end = self.check_out;
        self.check_in.iter_days().take_while(move |d| *d < end)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservationStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
}

/// The statuses that occupy a villa. Conflict checks and the booked-dates
/// calendar both filter on this set and nothing else.
pub const BLOCKING_STATUSES: [ReservationStatus; 2] =
    [ReservationStatus::Pending, ReservationStatus::Confirmed];

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Pending => "pending",
            ReservationStatus::Confirmed => "confirmed",
            ReservationStatus::Cancelled => "cancelled",
            ReservationStatus::Completed => "completed",
        }
    }

    pub fn is_blocking(&self) -> bool {
        BLOCKING_STATUSES.contains(self)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ReservationStatus::Cancelled | ReservationStatus::Completed)
    }

    pub fn can_transition_to(&self, next: ReservationStatus) -> bool {
        use ReservationStatus::*;
        if self.is_terminal() {
            return false;
        }
        matches!(
            (self, next),
            (Pending, Confirmed) | (Pending, Cancelled) | (Confirmed, Cancelled) | (Confirmed, Completed)
        )
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guest {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reservation {
    pub id: Ulid,
    pub villa_id: VillaId,
    pub reference: String,
    pub stay: Stay,
    pub status: ReservationStatus,
    pub guest: Guest,
    pub created_at: DateTime<Utc>,
}

impl Reservation {
    /// Reference derived from the random tail of the id.
    pub fn default_reference(id: &Ulid) -> String {
        let s = id.to_string();
        format!("VB-{}", &s[s.len() - 10..])
    }
}

/// All reservations of one villa, sorted by check-in date.
#[derive(Debug, Clone)]
pub struct VillaCalendar {
    pub villa_id: VillaId,
    pub reservations: Vec<Reservation>,
}

impl VillaCalendar {
    pub fn new(villa_id: VillaId) -> Self {
        Self {
            villa_id,
            reservations: Vec::new(),
        }
    }

    /// Insert maintaining sort order by check-in.
    pub fn insert(&mut self, reservation: Reservation) {
        let pos = self
            .reservations
            .partition_point(|r| r.stay.check_in <= reservation.stay.check_in);
        self.reservations.insert(pos, reservation);
    }

    pub fn get(&self, id: &Ulid) -> Option<&Reservation> {
        self.reservations.iter().find(|r| r.id == *id)
    }

    pub fn get_mut(&mut self, id: &Ulid) -> Option<&mut Reservation> {
        self.reservations.iter_mut().find(|r| r.id == *id)
    }

    /// Reservations whose stay overlaps `window`. Everything at or past the
    /// partition point checks in on or after `window.check_out` and can't overlap.
    pub fn overlapping(&self, window: &Stay) -> impl Iterator<Item = &Reservation> {
        let right_bound = self
            .reservations
            .partition_point(|r| r.stay.check_in < window.check_out);
        let window = *window;
        self.reservations[..right_bound]
            .iter()
            .filter(move |r| r.stay.check_out > window.check_in)
    }
}

/// WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    ReservationCreated {
        reservation: Reservation,
    },
    StatusChanged {
        id: Ulid,
        villa_id: VillaId,
        status: ReservationStatus,
    },
}

impl Event {
    pub fn villa_id(&self) -> &VillaId {
        match self {
            Event::ReservationCreated { reservation } => &reservation.villa_id,
            Event::StatusChanged { villa_id, .. } => villa_id,
        }
    }
}

// ── Query result types ───────────────────────────────────────────

/// What a caller may learn about a reservation that blocks its query.
/// No guest data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictInfo {
    pub check_in_date: NaiveDate,
    pub check_out_date: NaiveDate,
    pub reference: String,
    pub status: ReservationStatus,
}

impl From<&Reservation> for ConflictInfo {
    fn from(r: &Reservation) -> Self {
        Self {
            check_in_date: r.stay.check_in,
            check_out_date: r.stay.check_out,
            reference: r.reference.clone(),
            status: r.status,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictReport {
    pub available: bool,
    pub conflicting_bookings: Vec<ConflictInfo>,
    /// Set when the store could not be reached and policy answered "available".
    #[serde(skip)]
    pub failed_open: bool,
}

impl ConflictReport {
    pub fn from_conflicts(conflicting_bookings: Vec<ConflictInfo>) -> Self {
        Self {
            available: conflicting_bookings.is_empty(),
            conflicting_bookings,
            failed_open: false,
        }
    }

    pub fn assumed_available() -> Self {
        Self {
            available: true,
            conflicting_bookings: Vec::new(),
            failed_open: true,
        }
    }
}

/// Calendar tag of a booked day. Ordered by restrictiveness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DayStatus {
    Pending,
    Confirmed,
}

impl DayStatus {
    pub fn from_status(status: ReservationStatus) -> Option<Self> {
        match status {
            ReservationStatus::Pending => Some(DayStatus::Pending),
            ReservationStatus::Confirmed => Some(DayStatus::Confirmed),
            ReservationStatus::Cancelled | ReservationStatus::Completed => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookedDate {
    pub date: NaiveDate,
    pub status: DayStatus,
}
