use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use chrono::{Days, NaiveDate};
use ulid::Ulid;

use villabook::engine::{Engine, EngineError, NewReservation, Policy};
use villabook::model::{Guest, Stay, VillaId};
use villabook::notify::NotifyHub;
use villabook::store::WalStore;

fn base_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2030, 1, 1).unwrap()
}

/// Stay of `nights` starting `offset` days after the base date.
fn stay(offset: u64, nights: u64) -> Stay {
    let check_in = base_date() + Days::new(offset);
    Stay::new(check_in, check_in + Days::new(nights))
}

fn booking(villa: &VillaId, stay: Stay) -> NewReservation {
    NewReservation {
        villa_id: villa.clone(),
        stay,
        guest: Guest {
            name: "Bench Guest".into(),
            email: "bench@example.com".into(),
            phone: None,
        },
        reference: None,
    }
}

fn open_engine(name: &str) -> Arc<Engine> {
    let dir = std::env::temp_dir().join(format!("villabook_bench_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    let store = Arc::new(WalStore::open(&dir.join(name)).unwrap());
    Arc::new(Engine::new(store, Policy::default(), Arc::new(NotifyHub::new())))
}

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = ((sorted.len() as f64) * p / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn print_latency(label: &str, latencies: &mut [Duration]) {
    latencies.sort();
    let total: Duration = latencies.iter().sum();
    let avg = total / latencies.len() as u32;
    println!("  {label}:");
    println!(
        "    n={}, avg={:.2}ms, p50={:.2}ms, p95={:.2}ms, p99={:.2}ms, max={:.2}ms",
        latencies.len(),
        avg.as_secs_f64() * 1000.0,
        percentile(latencies, 50.0).as_secs_f64() * 1000.0,
        percentile(latencies, 95.0).as_secs_f64() * 1000.0,
        percentile(latencies, 99.0).as_secs_f64() * 1000.0,
        latencies.last().unwrap().as_secs_f64() * 1000.0,
    );
}

async fn phase1_sequential() {
    let engine = open_engine("sequential.wal");
    let villa = VillaId::new("seq-villa");

    let n = 2000;
    let mut latencies = Vec::with_capacity(n);
    let start = Instant::now();

    for i in 0..n {
        let t = Instant::now();
        engine.create_reservation(booking(&villa, stay(i as u64 * 2, 2))).await.unwrap();
        latencies.push(t.elapsed());
    }

    let elapsed = start.elapsed();
    let ops = n as f64 / elapsed.as_secs_f64();
    println!("  {n} bookings in {:.2}s = {ops:.0} ops/sec", elapsed.as_secs_f64());
    print_latency("create latency", &mut latencies);
}

async fn phase2_concurrent() {
    let engine = open_engine("concurrent.wal");
    let n_tasks = 10;
    let n_per_task = 200;

    let start = Instant::now();
    let mut handles = Vec::new();

    for i in 0..n_tasks {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            let villa = VillaId::new(format!("villa-{i}"));
            for j in 0..n_per_task {
                engine.create_reservation(booking(&villa, stay(j * 3, 3))).await.unwrap();
            }
        }));
    }

    for h in handles {
        h.await.unwrap();
    }

    let elapsed = start.elapsed();
    let total = n_tasks * n_per_task;
    let ops = total as f64 / elapsed.as_secs_f64();
    println!(
        "  {n_tasks} villas x {n_per_task} bookings = {total} total in {:.2}s = {ops:.0} ops/sec",
        elapsed.as_secs_f64()
    );
}

async fn phase3_checks_under_load() {
    let engine = open_engine("checks.wal");
    let hot = VillaId::new("hot-villa");
    for i in 0..200 {
        engine.create_reservation(booking(&hot, stay(i * 4, 2))).await.unwrap();
    }

    let stop = Arc::new(AtomicBool::new(false));
    let mut writer_handles = Vec::new();
    for w in 0..5 {
        let engine = engine.clone();
        let stop = stop.clone();
        writer_handles.push(tokio::spawn(async move {
            let villa = VillaId::new(format!("writer-{w}"));
            let mut i = 0u64;
            while !stop.load(Ordering::Relaxed) && i < 10_000 {
                let _ = engine.create_reservation(booking(&villa, stay(i, 1))).await;
                i += 1;
            }
        }));
    }

    let n_readers = 10;
    let reads_per_reader = 500;
    let mut reader_handles = Vec::new();

    for r in 0..n_readers {
        let engine = engine.clone();
        let hot = hot.clone();
        reader_handles.push(tokio::spawn(async move {
            let mut latencies = Vec::with_capacity(reads_per_reader);
            for k in 0..reads_per_reader {
                let t = Instant::now();
                engine
                    .check_conflict(&hot, stay(((r * reads_per_reader + k) % 800) as u64, 3))
                    .await
                    .unwrap();
                latencies.push(t.elapsed());
            }
            latencies
        }));
    }

    let mut all_latencies = Vec::new();
    for h in reader_handles {
        all_latencies.extend(h.await.unwrap());
    }

    stop.store(true, Ordering::Relaxed);
    for h in writer_handles {
        let _ = h.await;
    }

    print_latency("conflict check", &mut all_latencies);

    let mut calendar = Vec::with_capacity(200);
    for _ in 0..200 {
        let t = Instant::now();
        engine.list_booked_dates(&hot, Some(24)).await.unwrap();
        calendar.push(t.elapsed());
    }
    print_latency("booked dates (24 months)", &mut calendar);
}

async fn phase4_contention() {
    let engine = open_engine("contention.wal");
    let villa = VillaId::new("contested");
    let rounds = 50;
    let racers = 20;

    let accepted = Arc::new(AtomicUsize::new(0));
    let rejected = Arc::new(AtomicUsize::new(0));
    let start = Instant::now();

    for round in 0..rounds {
        let mut handles = Vec::new();
        for _ in 0..racers {
            let engine = engine.clone();
            let villa = villa.clone();
            let accepted = accepted.clone();
            let rejected = rejected.clone();
            handles.push(tokio::spawn(async move {
                match engine.create_reservation(booking(&villa, stay(round * 7, 5))).await {
                    Ok(_) => accepted.fetch_add(1, Ordering::Relaxed),
                    Err(EngineError::Conflict(_)) => rejected.fetch_add(1, Ordering::Relaxed),
                    Err(e) => panic!("unexpected error: {e}"),
                };
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
    }

    let ok = accepted.load(Ordering::Relaxed);
    let conflicts = rejected.load(Ordering::Relaxed);
    println!(
        "  {rounds} rounds x {racers} racers: {ok} accepted, {conflicts} rejected in {:.2}s",
        start.elapsed().as_secs_f64()
    );
    assert_eq!(ok, rounds as usize, "exactly one booking per contested stay");
}

#[tokio::main]
async fn main() {
    println!("=== villabook stress benchmark ===\n");

    println!("[phase 1] sequential booking throughput");
    phase1_sequential().await;

    println!("\n[phase 2] concurrent booking throughput across villas");
    phase2_concurrent().await;

    println!("\n[phase 3] read latency under write load");
    phase3_checks_under_load().await;

    println!("\n[phase 4] contended bookings on one villa");
    phase4_contention().await;

    println!("\n=== benchmark complete ===");
}
