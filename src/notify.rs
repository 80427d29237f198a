use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::model::{Reservation, ReservationStatus, Stay, VillaId};

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ChangeKind {
    Created,
    StatusChanged,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Created => "created",
            ChangeKind::StatusChanged => "statusChanged",
        }
    }
}

/// A reservation change as published to villa subscribers. Carries no guest data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub kind: ChangeKind,
    pub reservation_id: Ulid,
    pub villa_id: VillaId,
    pub reference: String,
    #[serde(flatten)]
    pub stay: Stay,
    pub status: ReservationStatus,
}

impl Notification {
    pub fn new(kind: ChangeKind, reservation: &Reservation) -> Self {
        Self {
            kind,
            reservation_id: reservation.id,
            villa_id: reservation.villa_id.clone(),
            reference: reservation.reference.clone(),
            stay: reservation.stay,
            status: reservation.status,
        }
    }
}

/// Per-villa broadcast of reservation changes.
pub struct NotifyHub {
    channels: DashMap<VillaId, broadcast::Sender<Notification>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to a villa's changes, creating its channel on first use.
    pub fn subscribe(&self, villa_id: &VillaId) -> broadcast::Receiver<Notification> {
        self.channels
            .entry(villa_id.clone())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// No-op if nobody is listening.
    pub fn send(&self, notification: Notification) {
        if let Some(sender) = self.channels.get(&notification.villa_id) {
            let _ = sender.send(notification);
        }
    }

    /// Drop channels whose subscribers have all gone away.
    pub fn prune(&self) {
        self.channels.retain(|_, sender| sender.receiver_count() > 0);
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use crate::model::Guest;

    fn reservation(villa: &str) -> Reservation {
        let id = Ulid::new();
        Reservation {
            id,
            villa_id: VillaId::new(villa),
            reference: Reservation::default_reference(&id),
            stay: Stay::new(
                NaiveDate::from_ymd_opt(2025, 6, 10).unwrap(),
                NaiveDate::from_ymd_opt(2025, 6, 15).unwrap(),
            ),
            status: ReservationStatus::Pending,
            guest: Guest {
                name: "Private Person".into(),
                email: "private@example.com".into(),
                phone: None,
            },
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn subscribe_and_receive() {
        let hub = NotifyHub::new();
        let r = reservation("V1");
        let mut rx = hub.subscribe(&r.villa_id);

        hub.send(Notification::new(ChangeKind::Created, &r));

        let received = rx.recv().await.unwrap();
        assert_eq!(received.reservation_id, r.id);
        assert_eq!(received.kind, ChangeKind::Created);
    }

    #[tokio::test]
    async fn other_villas_not_delivered() {
        let hub = NotifyHub::new();
        let mut rx = hub.subscribe(&VillaId::new("V2"));
        hub.send(Notification::new(ChangeKind::Created, &reservation("V1")));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn send_without_subscribers_is_noop() {
        let hub = NotifyHub::new();
        hub.send(Notification::new(ChangeKind::StatusChanged, &reservation("V1")));
        assert_eq!(hub.channel_count(), 0);
    }

    #[test]
    fn prune_drops_idle_channels() {
        let hub = NotifyHub::new();
        let rx = hub.subscribe(&VillaId::new("V1"));
        let _kept = hub.subscribe(&VillaId::new("V2"));
        drop(rx);
        hub.prune();
        assert_eq!(hub.channel_count(), 1);
    }

    #[test]
    fn payload_has_no_guest_data() {
        let json = serde_json::to_string(&Notification::new(ChangeKind::Created, &reservation("V1"))).unwrap();
        assert!(json.contains("\"checkInDate\":\"2025-06-10\""));
        assert!(json.contains("\"kind\":\"created\""));
        assert!(!json.contains("private@example.com"));
        assert!(!json.contains("Private Person"));
    }
}
