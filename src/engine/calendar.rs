use std::collections::BTreeMap;

use chrono::{Months, NaiveDate, Utc};

use crate::limits::*;
use crate::model::*;

use super::EngineError;

pub(crate) fn today() -> NaiveDate {
    Utc::now().date_naive()
}

pub fn parse_horizon_months(raw: &str) -> Result<u32, EngineError> {
    let months: u32 = raw
        .trim()
        .parse()
        .map_err(|_| EngineError::InvalidInput("horizonMonths must be a positive integer".into()))?;
    validate_horizon(months)?;
    Ok(months)
}

pub(crate) fn validate_horizon(months: u32) -> Result<(), EngineError> {
    if months == 0 {
        return Err(EngineError::InvalidInput("horizonMonths must be a positive integer".into()));
    }
    if months > MAX_HORIZON_MONTHS {
        return Err(EngineError::LimitExceeded("horizonMonths too large"));
    }
    Ok(())
}

/// `[today, today + months)`, with calendar-month arithmetic (Jan 31 + 1 month = Feb 28/29).
pub fn horizon_window(today: NaiveDate, months: u32) -> Result<Stay, EngineError> {
    validate_horizon(months)?;
    let end = today
        .checked_add_months(Months::new(months))
        .ok_or(EngineError::LimitExceeded("horizon beyond calendar range"))?;
    Ok(Stay::new(today, end))
}

/// One entry per occupied date inside `window`, in date order. Where blocking
/// reservations overlap on a date, the most restrictive status wins.
pub fn booked_dates(reservations: &[Reservation], window: &Stay) -> Vec<BookedDate> {
    let mut days: BTreeMap<NaiveDate, DayStatus> = BTreeMap::new();
    for reservation in reservations {
        let Some(tag) = DayStatus::from_status(reservation.status) else {
            continue;
        };
        let Some(clipped) = reservation.stay.intersect(window) else {
            continue;
        };
        for date in clipped.dates() {
            days.entry(date)
                .and_modify(|existing| *existing = (*existing).max(tag))
                .or_insert(tag);
        }
    }
    days.into_iter()
        .map(|(date, status)| BookedDate { date, status })
        .collect()
}
