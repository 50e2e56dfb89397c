use std::sync::Arc;
use std::time::{Duration, Instant};

use weekbook::api::InMemoryBackend;
use weekbook::engine::{merge, Engine, FetchRound, RegionFragment};
use weekbook::model::*;

const YEAR: i32 = 2026;

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
        "    n={}, avg={:.3}ms, p50={:.3}ms, p95={:.3}ms, p99={:.3}ms, max={:.3}ms",
        latencies.len(),
        avg.as_secs_f64() * 1000.0,
        percentile(latencies, 50.0).as_secs_f64() * 1000.0,
        percentile(latencies, 95.0).as_secs_f64() * 1000.0,
        percentile(latencies, 99.0).as_secs_f64() * 1000.0,
        latencies.last().map_or(0.0, |d| d.as_secs_f64() * 1000.0),
    );
}

/// Every third cell taken, a third of those with a visible holder.
fn synthetic_round(regions: u32, me: &str) -> FetchRound {
    let own = (1..=52u8)
        .step_by(4)
        .enumerate()
        .map(|(i, week)| Booking {
            id: i as BookingId + 1,
            region: (i as RegionId % regions) + 1,
            region_name: None,
            year: YEAR,
            week,
            owner: me.to_string(),
            created_at: None,
        })
        .collect();
    let fragments = (1..=regions)
        .map(|region| RegionFragment {
            region,
            weeks: Some(
                (1..=53u32)
                    .map(|week| {
                        let taken = (region + week) % 3 == 0;
                        WeekStatus {
                            week,
                            is_available: !taken,
                            booked_by: (taken && week % 2 == 0)
                                .then(|| RawBookedBy::Email(format!("d{}@x.com", region % 17))),
                        }
                    })
                    .collect(),
            ),
        })
        .collect();
    FetchRound::Director {
        own: Ok(own),
        regions: fragments,
    }
}

fn bench_merge(regions: u32, iterations: usize) {
    let caller = Caller::director("me@x.com");
    let round = synthetic_round(regions, &caller.email);
    let mut latencies = Vec::with_capacity(iterations);
    let mut cells = 0;
    for _ in 0..iterations {
        let start = Instant::now();
        let merged = merge(&round, &caller, YEAR);
        latencies.push(start.elapsed());
        cells = merged.availability.len();
    }
    println!("  {regions} regions, {cells} occupied cells");
    print_latency("merge", &mut latencies);
}

async fn bench_reconcile(regions: u32, iterations: usize) {
    let backend = InMemoryBackend::new(
        (1..=regions)
            .map(|id| Region {
                id,
                name: format!("Region {id}"),
            })
            .collect(),
    );
    for week in 1..=52u8 {
        let owner = Caller::director(format!("d{}@x.com", week % 9));
        let region = (week as RegionId * 7) % regions + 1;
        if let Err(e) = backend
            .create(&owner, &NewBooking { region, year: YEAR, week })
            .await
        {
            eprintln!("seed booking (region {region}, week {week}) failed: {e}");
        }
    }

    let caller = Caller::director("me@x.com");
    let engine = Engine::new(Arc::new(backend.session(caller.clone())), caller, YEAR);
    if let Err(e) = engine.load_regions().await {
        eprintln!("load_regions failed: {e}");
        return;
    }
    let mut latencies = Vec::with_capacity(iterations);
    for _ in 0..iterations {
        let start = Instant::now();
        if let Err(e) = engine.reconcile().await {
            eprintln!("reconcile failed: {e}");
            return;
        }
        latencies.push(start.elapsed());
    }
    println!("  {regions} regions, in-process backend");
    print_latency("reconcile", &mut latencies);
}

#[tokio::main]
async fn main() {
    println!("=== weekbook merge benchmark ===\n");

    println!("[merge]");
    for regions in [14, 64, 256] {
        bench_merge(regions, 500);
    }

    println!("\n[reconcile]");
    for regions in [14, 64] {
        bench_reconcile(regions, 100).await;
    }
}
