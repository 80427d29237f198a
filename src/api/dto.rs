use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::engine::{AvailabilityQuery, EngineError, NewReservation, parse_date, parse_villa_id, validate_stay};
use crate::model::{BookedDate, Guest, Reservation, ReservationStatus, Stay, VillaId};

fn required<'a>(field: &str, value: &'a Option<String>) -> Result<&'a str, EngineError> {
    value
        .as_deref()
        .ok_or_else(|| EngineError::InvalidInput(format!("{field} is required")))
}

/// Body of `POST /api/bookings/check-availability`. Fields are optional here
/// so a missing one surfaces as an input error rather than a decode failure.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckAvailabilityRequest {
    pub villa_id: Option<String>,
    pub check_in_date: Option<String>,
    pub check_out_date: Option<String>,
}

impl CheckAvailabilityRequest {
    pub fn into_query(self) -> Result<AvailabilityQuery, EngineError> {
        AvailabilityQuery::parse(
            required("villaId", &self.villa_id)?,
            required("checkInDate", &self.check_in_date)?,
            required("checkOutDate", &self.check_out_date)?,
        )
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookingRequest {
    pub villa_id: Option<String>,
    pub check_in_date: Option<String>,
    pub check_out_date: Option<String>,
    pub guest_name: Option<String>,
    pub guest_email: Option<String>,
    pub guest_phone: Option<String>,
    pub reference: Option<String>,
}

impl CreateBookingRequest {
    pub fn into_new_reservation(self) -> Result<NewReservation, EngineError> {
        let villa_id = parse_villa_id(required("villaId", &self.villa_id)?)?;
        let check_in = parse_date("checkInDate", required("checkInDate", &self.check_in_date)?)?;
        let check_out = parse_date("checkOutDate", required("checkOutDate", &self.check_out_date)?)?;
        let stay = validate_stay(check_in, check_out)?;
        let guest = Guest {
            name: required("guestName", &self.guest_name)?.to_string(),
            email: required("guestEmail", &self.guest_email)?.to_string(),
            phone: self.guest_phone,
        };
        Ok(NewReservation {
            villa_id,
            stay,
            guest,
            reference: self.reference,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookedDatesParams {
    pub horizon_months: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookedDatesResponse {
    pub booked_dates: Vec<BookedDate>,
}

/// A reservation as returned over HTTP, with the stay dates inlined.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingView {
    pub id: Ulid,
    pub villa_id: VillaId,
    pub reference: String,
    #[serde(flatten)]
    pub stay: Stay,
    pub nights: i64,
    pub status: ReservationStatus,
    pub guest: Guest,
    pub created_at: DateTime<Utc>,
}

impl From<Reservation> for BookingView {
    fn from(r: Reservation) -> Self {
        Self {
            nights: r.stay.nights(),
            id: r.id,
            villa_id: r.villa_id,
            reference: r.reference,
            stay: r.stay,
            status: r.status,
            guest: r.guest,
            created_at: r.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BookingsResponse {
    pub bookings: Vec<BookingView>,
}
