use std::io;
use std::path::Path;

use async_trait::async_trait;
use tokio::sync::{RwLock, mpsc, oneshot};
use tracing::{info, warn};
use ulid::Ulid;

use crate::model::*;
use crate::observability::{WAL_FLUSH_BATCH_SIZE, WAL_FLUSH_DURATION_SECONDS};
use crate::wal::{LogFile, Wal};

use super::{InMemoryStore, ReservationStore, StoreError};

enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

type PendingAppend = (Event, oneshot::Sender<io::Result<()>>);

/// Owns the WAL. Appends that queue up while one is being written are
/// flushed together with a single fsync.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let (event, response) = match cmd {
            WalCommand::Append { event, response } => (event, response),
            other => {
                handle_non_append(&mut wal, other);
                continue;
            }
        };

        let mut batch = vec![(event, response)];
        let mut deferred = None;
        while let Ok(next) = rx.try_recv() {
            match next {
                WalCommand::Append { event, response } => batch.push((event, response)),
                other => {
                    deferred = Some(other);
                    break;
                }
            }
        }

        commit_batch(&mut wal, &mut batch);
        if let Some(other) = deferred {
            handle_non_append(&mut wal, other);
        }
    }
}

/// Write one batch and answer every caller with the shared outcome. A batch
/// is all or nothing: on failure none of its entries remain in the log.
fn commit_batch<F: LogFile>(wal: &mut Wal<F>, batch: &mut Vec<PendingAppend>) {
    metrics::histogram!(WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let started = std::time::Instant::now();

    let staged = batch.iter().try_for_each(|(event, _)| wal.append_buffered(event));
    let result = match staged {
        Ok(()) => wal.flush_sync(),
        Err(e) => {
            wal.discard_pending();
            Err(e)
        }
    };
    metrics::histogram!(WAL_FLUSH_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
    if let Err(ref e) = result {
        warn!("WAL batch of {} rejected (log poisoned: {}): {e}", batch.len(), wal.is_poisoned());
    }

    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events).and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!("appends are batched by the writer loop"),
    }
}

/// Durable store: the in-memory index, rebuilt from the WAL at startup and
/// kept in step with it afterwards. Every write hits the log before memory.
pub struct WalStore {
    memory: InMemoryStore,
    wal_tx: mpsc::Sender<WalCommand>,
    /// Writers hold this shared; compaction holds it exclusively so nothing is
    /// appended between taking the snapshot and swapping the file.
    compact_gate: RwLock<()>,
}

impl WalStore {
    /// Replay `path` and start the background writer. Must run inside a tokio runtime.
    pub fn open(path: &Path) -> io::Result<Self> {
        let (wal, events) = Wal::recover(path)?;
        let memory = InMemoryStore::new();
        for event in &events {
            if let Err(e) = memory.apply(event) {
                warn!("replay: skipping event for villa {}: {e}", event.villa_id());
            }
        }
        info!(
            "replayed {} events: {} reservations across {} villas",
            events.len(),
            memory.reservation_count(),
            memory.villa_count()
        );

        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        Ok(Self {
            memory,
            wal_tx,
            compact_gate: RwLock::new(()),
        })
    }

    pub fn reservation_count(&self) -> usize {
        self.memory.reservation_count()
    }

    async fn wal_append(&self, event: &Event) -> Result<(), StoreError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| StoreError::Unavailable("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| StoreError::Unavailable("WAL writer dropped response".into()))?
            .map_err(|e| StoreError::Unavailable(format!("WAL write failed: {e}")))
    }

    async fn persist_and_apply(&self, event: Event) -> Result<Reservation, StoreError> {
        self.wal_append(&event).await?;
        self.memory.apply(&event)
    }

    /// Rewrite the log as one creation event per reservation, carrying its current status.
    pub async fn compact(&self) -> Result<(), StoreError> {
        let _gate = self.compact_gate.write().await;
        let events: Vec<Event> = self
            .memory
            .snapshot()
            .into_iter()
            .map(|reservation| Event::ReservationCreated { reservation })
            .collect();

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| StoreError::Unavailable("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| StoreError::Unavailable("WAL writer dropped response".into()))?
            .map_err(|e| StoreError::Unavailable(format!("WAL compaction failed: {e}")))
    }

    pub async fn appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

#[async_trait]
impl ReservationStore for WalStore {
    async fn find_overlapping(
        &self,
        villa_id: &VillaId,
        statuses: &[ReservationStatus],
        window: &Stay,
    ) -> Result<Vec<Reservation>, StoreError> {
        self.memory.find_overlapping(villa_id, statuses, window).await
    }

    async fn get(&self, id: Ulid) -> Result<Option<Reservation>, StoreError> {
        self.memory.get(id).await
    }

    async fn list_for_villa(&self, villa_id: &VillaId) -> Result<Vec<Reservation>, StoreError> {
        self.memory.list_for_villa(villa_id).await
    }

    async fn insert(&self, reservation: Reservation) -> Result<(), StoreError> {
        let _gate = self.compact_gate.read().await;
        if self.memory.contains(&reservation.id) {
            return Err(StoreError::AlreadyExists(reservation.id));
        }
        self.persist_and_apply(Event::ReservationCreated { reservation }).await.map(|_| ())
    }

    async fn set_status(&self, id: Ulid, status: ReservationStatus) -> Result<Reservation, StoreError> {
        let _gate = self.compact_gate.read().await;
        let current = self.memory.get_reservation(&id).ok_or(StoreError::NotFound(id))?;
        self.persist_and_apply(Event::StatusChanged {
            id,
            villa_id: current.villa_id,
            status,
        })
        .await
    }
}
