use std::str::FromStr;
use std::sync::Arc;

use tracing::info;

use weekbook::api::{BookingApi, HttpBookingApi, InMemoryBackend};
use weekbook::config::Config;
use weekbook::engine::{coverage_band, Engine};
use weekbook::grid::Grid;
use weekbook::model::{BookingChanges, RegionId};

const USAGE: &str = "usage: weekbook [show [REGION] | book REGION WEEK | move BOOKING REGION WEEK | cancel BOOKING | coverage]";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env();
    weekbook::observability::init(config.metrics_port)?;

    let caller = config.caller();
    let api: Arc<dyn BookingApi> = match &config.api_url {
        Some(url) => Arc::new(HttpBookingApi::new(url, config.token.clone(), config.timeout)?),
        None => {
            info!("WEEKBOOK_API_URL not set, using the in-process demo backend");
            Arc::new(InMemoryBackend::demo(config.year).await.session(caller.clone()))
        }
    };
    info!(
        "weekbook as {} ({}), year {}",
        caller.email,
        if caller.is_admin { "admin" } else { "director" },
        config.year
    );

    let engine = Engine::new(api, caller, config.year);
    engine.load_regions().await?;
    engine.reconcile().await?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        None | Some("show") => {
            let filter = args.get(1).map(|s| parse::<RegionId>(s, "region")).transpose()?;
            print_grid(&engine, filter).await;
        }
        Some("book") => {
            let region = parse(arg(&args, 1)?, "region")?;
            let week = parse(arg(&args, 2)?, "week")?;
            let booking = engine.create(region, week).await?;
            println!("booked #{} (region {region}, week {week})", booking.id);
            print_grid(&engine, None).await;
        }
        Some("move") => {
            let id = parse(arg(&args, 1)?, "booking")?;
            let changes = BookingChanges {
                region: Some(parse(arg(&args, 2)?, "region")?),
                week: Some(parse(arg(&args, 3)?, "week")?),
                ..Default::default()
            };
            let booking = engine.update(id, changes).await?;
            println!("moved #{id} to region {}, week {}", booking.region, booking.week);
            print_grid(&engine, None).await;
        }
        Some("cancel") => {
            let id = parse(arg(&args, 1)?, "booking")?;
            engine.delete(id).await?;
            println!("cancelled #{id}");
            print_grid(&engine, None).await;
        }
        Some("coverage") => print_coverage(&engine).await?,
        Some(other) => return Err(format!("unknown command {other:?}\n{USAGE}").into()),
    }
    Ok(())
}

fn arg(args: &[String], i: usize) -> Result<&str, String> {
    args.get(i).map(String::as_str).ok_or_else(|| USAGE.to_string())
}

fn parse<T: FromStr>(s: &str, what: &str) -> Result<T, String> {
    s.parse().map_err(|_| format!("invalid {what}: {s:?}"))
}

async fn print_grid(engine: &Engine, filter: Option<RegionId>) {
    let snapshot = engine.snapshot();
    let regions = engine.regions().await;
    let grid = Grid::build(&snapshot, &regions, engine.caller(), filter);

    println!("{} - {} regions", grid.year, grid.rows.len());
    if let Some(error) = &snapshot.bookings_error {
        println!("!! your bookings could not be loaded ({error}); weekly locks are not shown");
    }
    print!("{}", grid.render());
    println!("legend: . free  # yours  x taken  - week already booked  @ booked");
    println!(
        "{} booked, {} free, occupancy {:.1}%",
        grid.stats.booked, grid.stats.available, grid.stats.occupancy_rate
    );
    if !engine.caller().is_admin {
        for b in snapshot.bookings.iter().filter(|b| b.year == grid.year) {
            let name = b.region_name.as_deref().unwrap_or("?");
            println!("  #{} {} - {}", b.id, name, weekbook::calendar::week_label(b.year, b.week));
        }
    }
}

async fn print_coverage(engine: &Engine) -> Result<(), Box<dyn std::error::Error>> {
    let snapshot = engine.snapshot();
    let cov = snapshot.coverage;
    println!(
        "coverage: {}/{} regions ({:.2}%, {:?})",
        cov.distinct_regions_count,
        cov.total_regions,
        cov.coverage_rate,
        coverage_band(cov.coverage_rate)
    );
    if let Some(fleet) = &snapshot.fleet {
        for (director, rec) in &fleet.per_director {
            println!(
                "  {director}: {}/{} ({:.2}%)",
                rec.distinct_regions_count, rec.total_regions, rec.coverage_rate
            );
        }
        println!("  average of directors: {:.2}%", fleet.average_rate);
    }
    for check in engine.verify_coverage().await? {
        if !check.agrees {
            println!(
                "  {} differs from the backend: {:.2}% locally, {:.2}% reported",
                check.user, check.local.coverage_rate, check.remote.coverage_rate
            );
        }
    }
    Ok(())
}
