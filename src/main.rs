use anyhow::Context;
use clap::{Parser, Subcommand};
use curbside::config::Config;
use curbside::constants::USER_ID_HEADER;
use curbside::domain::{Category, Condition, ListingLocation};
use curbside::engine::Engine;
use curbside::events::log_events;
use curbside::geo::{GeoPoint, EARTH_RADIUS_M};
use curbside::lifecycle::SweepReport;
use curbside::monitor::{
    HttpDiscoveryClient, InMemoryGeofences, LocationMonitor, MonitorEvent, MonitorRuntime,
    QueryOptions,
};
use curbside::{logging, metrics, server};
use rand::seq::SliceRandom;
use rand::Rng;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "curbside")]
#[command(about = "Curbside furniture discovery and listing lifecycle service")]
#[command(version)]
struct Cli {
    /// Path to a TOML config file (defaults to ./curbside.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API with the background TTL sweeper
    Serve,
    /// Trigger one TTL sweep on a running server
    SweepOnce {
        #[arg(long)]
        base_url: Option<String>,
    },
    /// Post random demo listings around a point to a running server
    Seed {
        #[arg(long, default_value_t = 25)]
        count: usize,
        #[arg(long, default_value_t = 37.7749)]
        lat: f64,
        #[arg(long, default_value_t = -122.4194)]
        lon: f64,
        /// Listings are scattered uniformly within this distance
        #[arg(long, default_value_t = 2_000.0)]
        spread_m: f64,
        #[arg(long)]
        base_url: Option<String>,
    },
    /// Walk a simulated user north and print the nearby results it sees
    Simulate {
        #[arg(long)]
        base_url: Option<String>,
        #[arg(long, default_value_t = 37.7749)]
        lat: f64,
        #[arg(long, default_value_t = -122.4194)]
        lon: f64,
        #[arg(long, default_value_t = 1_000.0)]
        radius_m: f64,
        #[arg(long, default_value_t = 10)]
        steps: u32,
        #[arg(long, default_value_t = 150.0)]
        step_m: f64,
        #[arg(long, default_value_t = 500)]
        interval_ms: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let _log_guard = logging::init_logging();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref()).context("loading configuration")?;

    match cli.command {
        Commands::Serve => serve(config).await,
        Commands::SweepOnce { base_url } => {
            let base = base_url.unwrap_or_else(|| config.monitor.base_url.clone());
            let report: SweepReport = reqwest::Client::new()
                .post(format!("{}/admin/sweep", base.trim_end_matches('/')))
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;
            println!(
                "🧹 Sweep: examined {}, expired {}, conflicts {}, failures {}",
                report.examined, report.expired, report.conflicts, report.failures
            );
            Ok(())
        }
        Commands::Seed { count, lat, lon, spread_m, base_url } => {
            let base = base_url.unwrap_or_else(|| config.monitor.base_url.clone());
            seed(&base, GeoPoint::new(lat, lon)?, count, spread_m).await
        }
        Commands::Simulate { base_url, lat, lon, radius_m, steps, step_m, interval_ms } => {
            let base = base_url.unwrap_or_else(|| config.monitor.base_url.clone());
            let walk = Walk {
                start: GeoPoint::new(lat, lon)?,
                radius_m,
                steps,
                step_m,
                interval: Duration::from_millis(interval_ms),
            };
            simulate(&config, &base, walk).await
        }
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    metrics::init_metrics();

    let engine = Engine::in_memory(&config)?;
    engine.lifecycle.rebuild_index().await?;
    tokio::spawn(log_events(engine.events.subscribe()));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = engine
        .lifecycle
        .clone()
        .spawn_sweeper(config.lifecycle.sweep_interval(), shutdown_rx);

    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port)
        .parse()
        .with_context(|| format!("invalid bind address {}:{}", config.server.bind, config.server.port))?;

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for ctrl-c");
        }
        info!("Shutdown requested");
    };
    let served = server::start_server(engine.app_state(), addr, shutdown).await;

    let _ = shutdown_tx.send(true);
    if let Err(e) = sweeper.await {
        warn!(error = %e, "Sweeper task ended abnormally");
    }
    served
}

/// Uniformly random point within `spread_m` of `center`.
fn scatter(rng: &mut impl Rng, center: GeoPoint, spread_m: f64) -> GeoPoint {
    let distance = spread_m * rng.gen::<f64>().sqrt();
    let bearing = rng.gen_range(0.0..std::f64::consts::TAU);
    let dlat = (distance * bearing.cos() / EARTH_RADIUS_M).to_degrees();
    let dlon = (distance * bearing.sin() / (EARTH_RADIUS_M * center.latitude.to_radians().cos()))
        .to_degrees();
    GeoPoint {
        latitude: (center.latitude + dlat).clamp(-90.0, 90.0),
        longitude: (center.longitude + dlon + 180.0).rem_euclid(360.0) - 180.0,
    }
}

async fn seed(base_url: &str, center: GeoPoint, count: usize, spread_m: f64) -> anyhow::Result<()> {
    const TITLES: [&str; 8] = [
        "Oak dresser",
        "Mid-century armchair",
        "IKEA bookshelf",
        "Floor lamp",
        "Patio chairs (2)",
        "Writing desk",
        "Queen bed frame",
        "Coffee table",
    ];
    const CONDITIONS: [Condition; 4] = [Condition::LikeNew, Condition::Good, Condition::Fair, Condition::Worn];

    let bodies: Vec<(String, serde_json::Value)> = {
        let mut rng = rand::thread_rng();
        (0..count)
            .map(|i| {
                let title = TITLES.choose(&mut rng).copied().unwrap_or("Chair");
                let category = Category::ALL.choose(&mut rng).copied().unwrap_or(Category::Other);
                let condition = CONDITIONS.choose(&mut rng).copied().unwrap_or(Condition::Good);
                let point = scatter(&mut rng, center, spread_m);
                let finder = format!("seed-finder-{}", rng.gen_range(1..=5));
                let body = serde_json::json!({
                    "title": title,
                    "category": category,
                    "condition": condition,
                    "location": ListingLocation { point, address: format!("Seed block {i}") },
                    "aiTags": [category.as_str()],
                    "confidenceScore": 0.9,
                });
                (finder, body)
            })
            .collect()
    };

    let client = reqwest::Client::new();
    let url = format!("{}/listings", base_url.trim_end_matches('/'));
    let mut created = 0usize;
    for (finder, body) in bodies {
        let resp = client.post(&url).header(USER_ID_HEADER, finder).json(&body).send().await?;
        if resp.status().is_success() {
            created += 1;
        } else {
            warn!(status = %resp.status(), "Seed listing rejected");
        }
    }

    println!("🪑 Seeded {created}/{count} listings within {spread_m} m of ({}, {})", center.latitude, center.longitude);
    Ok(())
}

struct Walk {
    start: GeoPoint,
    radius_m: f64,
    steps: u32,
    step_m: f64,
    interval: Duration,
}

async fn simulate(config: &Config, base_url: &str, walk: Walk) -> anyhow::Result<()> {
    let options = QueryOptions::from(&config.monitor);
    let client = Arc::new(HttpDiscoveryClient::new(base_url, options.timeout)?);
    let geofences = Arc::new(InMemoryGeofences::new());
    let monitor = LocationMonitor::new(geofences.clone(), walk.radius_m, config.monitor.refresh_fraction)?;
    let handle = MonitorRuntime::new(monitor, client)
        .with_options(options)
        .with_software_geofences(geofences)
        .spawn();

    let mut updates = handle.subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(event) = updates.recv().await {
            match event {
                MonitorEvent::Updated(update) => println!(
                    "📍 gen {} at ({:.5}, {:.5}) r={} m: {} nearby",
                    update.generation,
                    update.center.latitude,
                    update.center.longitude,
                    update.radius_m,
                    update.page.total
                ),
                MonitorEvent::QueryFailed { generation, error } => {
                    println!("⚠️  gen {generation} failed: {error}")
                }
            }
        }
    });

    handle.start(Some(walk.start)).await?;
    let step_deg = (walk.step_m / EARTH_RADIUS_M).to_degrees();
    for step in 1..=walk.steps {
        tokio::time::sleep(walk.interval).await;
        let lat = (walk.start.latitude + step_deg * f64::from(step)).min(90.0);
        handle.location(GeoPoint::new(lat, walk.start.longitude)?).await?;
    }
    tokio::time::sleep(walk.interval).await;

    handle.shutdown().await;
    let _ = printer.await;
    Ok(())
}
