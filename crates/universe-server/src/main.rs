//! Universe world server entry point.
//!
//! Loads the configuration, builds the land database and loader, and runs
//! the fixed-rate simulation loop. Clients are simulated in-process with
//! `--bots`; a socket transport would feed the same inbound queue.
//!
//! Run with: `cargo run -p universe-server -- --bots 4 --ticks 600`

mod bots;

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use tracing::{error, info};
use universe_config::{CliArgs, Config, StorageBackend, StorageConfig, default_config_dir};
use universe_land::{
    BiomeGenerator, DatabaseError, FileDatabase, LandDatabase, LandLoader, MemoryDatabase,
    TerrainGenerator,
};
use universe_multiplayer::{GameServer, ServerTickSchedule};

use crate::bots::BotFleet;

/// Bot walking speed in world units per tick.
const BOT_SPEED: f64 = 0.25;

/// Opens the configured land store.
fn open_database(storage: &StorageConfig) -> Result<Arc<dyn LandDatabase>, DatabaseError> {
    Ok(match storage.backend {
        StorageBackend::Memory => Arc::new(MemoryDatabase::new()),
        StorageBackend::File => Arc::new(FileDatabase::open(&storage.path)?),
    })
}

fn load_config(args: &CliArgs) -> (Config, std::path::PathBuf) {
    let config_dir = args.config.clone().unwrap_or_else(default_config_dir);
    let mut config = match Config::load_or_create(&config_dir) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config from {}: {e}", config_dir.display());
            eprintln!("Continuing with defaults");
            Config::default()
        }
    };
    config.apply_cli_overrides(args);
    (config, config_dir)
}

/// Per-second counters.
#[derive(Default)]
struct Stats {
    ticks: u64,
    envelopes: usize,
    slowest: Duration,
}

fn report(server: &GameServer, fleet: &BotFleet, schedule: &ServerTickSchedule, stats: &Stats) {
    info!(
        tick = server.tick_count(),
        ticks = stats.ticks,
        envelopes = stats.envelopes,
        slowest_us = stats.slowest.as_micros() as u64,
        connections = server.connection_count(),
        actors = server.actors().len(),
        loaded_lands = server.lands().loaded_coords().count(),
        loading_lands = server.lands().loading_coords().count(),
        dropped_ticks = schedule.dropped_ticks(),
        bot_drift = fleet.max_prediction_error(),
        "server stats"
    );
}

fn run(config: &Config, config_dir: &Path, max_ticks: Option<u64>, bot_count: u32) {
    let database = match open_database(&config.storage) {
        Ok(database) => database,
        Err(e) => {
            error!(error = %e, "failed to open land database");
            std::process::exit(1);
        }
    };
    let generator: Arc<dyn TerrainGenerator> = Arc::new(BiomeGenerator::default());

    let loader = if config.generation.worker_threads > 0 {
        match LandLoader::new(
            Arc::clone(&database),
            Arc::clone(&generator),
            config.generation.worker_threads,
            config.generation.max_in_flight,
        ) {
            Ok(loader) => Some(loader),
            Err(e) => {
                error!(error = %e, "failed to start land loader, loading in-tick");
                None
            }
        }
    } else {
        None
    };

    let mut server = GameServer::new(config, database, generator, loader);
    let inbound = server.inbound();
    let mut fleet = BotFleet::connect(
        &inbound,
        bot_count,
        BOT_SPEED,
        config.server.max_move_per_input,
    );

    info!(
        config_dir = %config_dir.display(),
        tick_rate = config.server.tick_rate,
        bots = fleet.len(),
        "server running"
    );

    let mut schedule = ServerTickSchedule::with_tick_rate(config.server.tick_rate);
    let mut stats = Stats::default();
    let mut last = Instant::now();
    let mut last_report = last;

    'running: loop {
        let now = Instant::now();
        let due = schedule.accumulate(now - last);
        last = now;

        for _ in 0..due {
            fleet.drive(&inbound);
            let started = Instant::now();
            let out = server.tick();
            stats.slowest = stats.slowest.max(started.elapsed());
            stats.ticks += 1;
            stats.envelopes += out.len();
            fleet.deliver(&out);

            if max_ticks.is_some_and(|max| server.tick_count() >= max) {
                break 'running;
            }
        }

        if now.duration_since(last_report) >= Duration::from_secs(1) {
            report(&server, &fleet, &schedule, &stats);
            stats = Stats::default();
            last_report = now;
        }

        std::thread::sleep(schedule.until_next());
    }

    fleet.disconnect_all(&inbound);
    server.tick();
    report(&server, &fleet, &schedule, &stats);
    info!(ticks = server.tick_count(), "server stopped");
}

fn main() {
    let args = CliArgs::parse();
    let (config, config_dir) = load_config(&args);
    if let Err(e) = config.validate() {
        eprintln!("Refusing to start: {e}");
        std::process::exit(1);
    }

    universe_log::init_logging(
        Some(&config_dir.join("logs")),
        config.debug.log_to_file,
        Some(&config),
    );
    info!("Universe server");
    info!(
        seed = config.world.seed,
        view_radius = config.world.view_radius,
        storage = ?config.storage.backend,
        workers = config.generation.worker_threads,
        "configuration"
    );

    run(&config, &config_dir, args.ticks, args.bots);
}

#[cfg(test)]
mod tests {
    use universe_land::{LandCoord, fetch_or_generate};

    use super::*;

    #[test]
    fn test_file_backend_persists_lands() {
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageConfig {
            backend: StorageBackend::File,
            path: dir.path().join("lands"),
        };
        let database = open_database(&storage).unwrap();
        let generator = BiomeGenerator::default();
        let coord = LandCoord::new(2, -1);
        let first = fetch_or_generate(database.as_ref(), &generator, coord, 7).unwrap();

        let reopened = open_database(&storage).unwrap();
        assert!(reopened.get(&coord.storage_key()).unwrap().is_some());
        let again = fetch_or_generate(reopened.as_ref(), &generator, coord, 7).unwrap();
        assert_eq!(first, again);
    }

    #[test]
    fn test_memory_backend_starts_empty() {
        let storage = StorageConfig {
            backend: StorageBackend::Memory,
            ..StorageConfig::default()
        };
        let database = open_database(&storage).unwrap();
        assert!(database.get("land.0.0").unwrap().is_none());
    }

    #[test]
    fn test_config_dir_override_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let args = CliArgs::parse_from([
            "universe-server",
            "--config",
            dir.path().to_str().unwrap(),
            "--memory-storage",
            "--seed",
            "9",
        ]);
        let (config, config_dir) = load_config(&args);
        assert_eq!(config_dir, dir.path());
        assert!(dir.path().join("config.ron").exists());
        assert_eq!(config.world.seed, 9);
        assert_eq!(config.storage.backend, StorageBackend::Memory);
    }
}
