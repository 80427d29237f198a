use chrono::{DateTime, Datelike, NaiveDate};

use crate::limits::*;
use crate::model::*;

use super::EngineError;

/// A parsed, validated conflict query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailabilityQuery {
    pub villa_id: VillaId,
    pub stay: Stay,
}

impl AvailabilityQuery {
    pub fn parse(villa_id: &str, check_in: &str, check_out: &str) -> Result<Self, EngineError> {
        let villa_id = parse_villa_id(villa_id)?;
        let check_in = parse_date("checkInDate", check_in)?;
        let check_out = parse_date("checkOutDate", check_out)?;
        let stay = validate_stay(check_in, check_out)?;
        Ok(Self { villa_id, stay })
    }
}

pub fn parse_villa_id(raw: &str) -> Result<VillaId, EngineError> {
    let villa_id = VillaId::new(raw.trim());
    validate_villa_id(&villa_id)?;
    Ok(villa_id)
}

pub(crate) fn validate_villa_id(villa_id: &VillaId) -> Result<(), EngineError> {
    let s = villa_id.as_str();
    if s.trim().is_empty() {
        return Err(EngineError::InvalidInput("villaId is required".into()));
    }
    if s.len() > MAX_VILLA_ID_LEN {
        return Err(EngineError::LimitExceeded("villaId too long"));
    }
    if s.chars().any(char::is_control) {
        return Err(EngineError::InvalidInput("villaId contains control characters".into()));
    }
    Ok(())
}

/// Accepts `YYYY-MM-DD`, or an RFC 3339 timestamp whose date part is used.
pub fn parse_date(field: &str, raw: &str) -> Result<NaiveDate, EngineError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(EngineError::InvalidInput(format!("{field} is required")));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| DateTime::parse_from_rfc3339(raw).map(|dt| dt.date_naive()))
        .map_err(|_| EngineError::InvalidInput(format!("{field} must be a date in YYYY-MM-DD form")))?;
    validate_date(field, date)?;
    Ok(date)
}

fn validate_date(field: &str, date: NaiveDate) -> Result<(), EngineError> {
    if !(MIN_VALID_YEAR..=MAX_VALID_YEAR).contains(&date.year()) {
        return Err(EngineError::InvalidInput(format!(
            "{field} must fall between {MIN_VALID_YEAR} and {MAX_VALID_YEAR}"
        )));
    }
    Ok(())
}

pub fn validate_stay(check_in: NaiveDate, check_out: NaiveDate) -> Result<Stay, EngineError> {
    validate_date("checkInDate", check_in)?;
    validate_date("checkOutDate", check_out)?;
    if check_out <= check_in {
        return Err(EngineError::InvalidInput("checkOutDate must be after checkInDate".into()));
    }
    let stay = Stay::new(check_in, check_out);
    if stay.nights() > MAX_STAY_NIGHTS {
        return Err(EngineError::LimitExceeded("stay too long"));
    }
    Ok(stay)
}

pub(crate) fn validate_guest(guest: &Guest) -> Result<(), EngineError> {
    if guest.name.trim().is_empty() {
        return Err(EngineError::InvalidInput("guest name is required".into()));
    }
    if guest.email.trim().is_empty() {
        return Err(EngineError::InvalidInput("guest email is required".into()));
    }
    let email = guest.email.trim();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => {}
        _ => return Err(EngineError::InvalidInput("guest email is malformed".into())),
    }
    let phone_len = guest.phone.as_ref().map_or(0, String::len);
    if guest.name.len() > MAX_GUEST_FIELD_LEN || email.len() > MAX_GUEST_FIELD_LEN || phone_len > MAX_GUEST_FIELD_LEN {
        return Err(EngineError::LimitExceeded("guest field too long"));
    }
    Ok(())
}

pub(crate) fn validate_reference(reference: &str) -> Result<(), EngineError> {
    if reference.trim().is_empty() {
        return Err(EngineError::InvalidInput("reference must not be blank".into()));
    }
    if reference.len() > MAX_REFERENCE_LEN {
        return Err(EngineError::LimitExceeded("reference too long"));
    }
    Ok(())
}

/// Blocking reservations among `candidates` that overlap `stay`. The store is
/// trusted to narrow the candidates, not to have applied either rule.
pub fn find_conflicts(candidates: &[Reservation], stay: &Stay) -> Vec<ConflictInfo> {
    candidates
        .iter()
        .filter(|r| r.status.is_blocking() && r.stay.overlaps(stay))
        .map(ConflictInfo::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use ulid::Ulid;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn reservation(check_in: &str, check_out: &str, status: ReservationStatus) -> Reservation {
        let id = Ulid::new();
        Reservation {
            id,
            villa_id: VillaId::new("V1"),
            reference: Reservation::default_reference(&id),
            stay: Stay::new(d(check_in), d(check_out)),
            status,
            guest: Guest {
                name: "Guest".into(),
                email: "guest@example.com".into(),
                phone: None,
            },
            created_at: Utc::now(),
        }
    }

    #[test]
    fn query_parse_ok() {
        let q = AvailabilityQuery::parse(" V1 ", "2025-06-10", "2025-06-15").unwrap();
        assert_eq!(q.villa_id, VillaId::new("V1"));
        assert_eq!(q.stay, Stay::new(d("2025-06-10"), d("2025-06-15")));
    }

    #[test]
    fn query_parse_accepts_timestamps() {
        let q = AvailabilityQuery::parse("V1", "2025-06-10T14:00:00Z", "2025-06-15T10:00:00+02:00").unwrap();
        assert_eq!(q.stay, Stay::new(d("2025-06-10"), d("2025-06-15")));
    }

    #[test]
    fn query_parse_rejects_missing_fields() {
        assert!(matches!(
            AvailabilityQuery::parse("", "2025-06-10", "2025-06-15"),
            Err(EngineError::InvalidInput(msg)) if msg.contains("villaId")
        ));
        assert!(matches!(
            AvailabilityQuery::parse("V1", "  ", "2025-06-15"),
            Err(EngineError::InvalidInput(msg)) if msg.contains("checkInDate")
        ));
        assert!(matches!(
            AvailabilityQuery::parse("V1", "2025-06-10", ""),
            Err(EngineError::InvalidInput(msg)) if msg.contains("checkOutDate")
        ));
    }

    #[test]
    fn query_parse_rejects_garbage_dates() {
        assert!(matches!(
            AvailabilityQuery::parse("V1", "10/06/2025", "2025-06-15"),
            Err(EngineError::InvalidInput(_))
        ));
        assert!(matches!(
            AvailabilityQuery::parse("V1", "2025-02-30", "2025-03-02"),
            Err(EngineError::InvalidInput(_))
        ));
    }

    #[test]
    fn stay_must_be_forward() {
        assert!(matches!(
            validate_stay(d("2025-06-15"), d("2025-06-15")),
            Err(EngineError::InvalidInput(_))
        ));
        assert!(matches!(
            validate_stay(d("2025-06-15"), d("2025-06-10")),
            Err(EngineError::InvalidInput(_))
        ));
        assert!(validate_stay(d("2025-06-15"), d("2025-06-16")).is_ok());
    }

    #[test]
    fn stay_limits() {
        assert_eq!(
            validate_stay(d("2025-01-01"), d("2026-06-01")),
            Err(EngineError::LimitExceeded("stay too long"))
        );
        assert!(matches!(
            validate_stay(d("1999-12-30"), d("2000-01-02")),
            Err(EngineError::InvalidInput(_))
        ));
    }

    #[test]
    fn villa_id_limits() {
        let long = "v".repeat(MAX_VILLA_ID_LEN + 1);
        assert_eq!(parse_villa_id(&long), Err(EngineError::LimitExceeded("villaId too long")));
        assert!(matches!(parse_villa_id("villa\n1"), Err(EngineError::InvalidInput(_))));
    }

    #[test]
    fn guest_validation() {
        let mut guest = Guest {
            name: "Ana".into(),
            email: "ana@example.com".into(),
            phone: None,
        };
        assert!(validate_guest(&guest).is_ok());
        guest.email = "ana.example.com".into();
        assert!(matches!(validate_guest(&guest), Err(EngineError::InvalidInput(_))));
        guest.email = "ana@example.com".into();
        guest.name = " ".into();
        assert!(matches!(validate_guest(&guest), Err(EngineError::InvalidInput(_))));
    }

    #[test]
    fn conflicts_use_half_open_overlap() {
        let existing = vec![reservation("2025-06-10", "2025-06-15", ReservationStatus::Confirmed)];
        assert_eq!(find_conflicts(&existing, &Stay::new(d("2025-06-12"), d("2025-06-18"))).len(), 1);
        assert_eq!(find_conflicts(&existing, &Stay::new(d("2025-06-05"), d("2025-06-11"))).len(), 1);
        assert_eq!(find_conflicts(&existing, &Stay::new(d("2025-06-11"), d("2025-06-12"))).len(), 1);
        assert!(find_conflicts(&existing, &Stay::new(d("2025-06-15"), d("2025-06-20"))).is_empty());
        assert!(find_conflicts(&existing, &Stay::new(d("2025-06-05"), d("2025-06-10"))).is_empty());
    }

    #[test]
    fn conflicts_ignore_non_blocking_statuses() {
        let existing = vec![
            reservation("2025-06-10", "2025-06-15", ReservationStatus::Cancelled),
            reservation("2025-06-10", "2025-06-15", ReservationStatus::Completed),
            reservation("2025-06-10", "2025-06-15", ReservationStatus::Pending),
        ];
        let conflicts = find_conflicts(&existing, &Stay::new(d("2025-06-12"), d("2025-06-13")));
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].status, ReservationStatus::Pending);
        assert_eq!(conflicts[0].reference, existing[2].reference);
    }
}
