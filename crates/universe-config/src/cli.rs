//! Command-line argument parsing for the Universe server.

use std::path::PathBuf;

use clap::Parser;

use crate::{Config, StorageBackend};

/// Universe server command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug, Default)]
#[command(name = "universe-server", about = "Authoritative Universe world server")]
pub struct CliArgs {
    /// World seed.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Simulation tick rate in Hz.
    #[arg(long)]
    pub tick_rate: Option<u32>,

    /// View radius in lands.
    #[arg(long)]
    pub view_radius: Option<u32>,

    /// Directory for persisted lands (selects the file backend).
    #[arg(long)]
    pub storage_path: Option<PathBuf>,

    /// Keep lands in memory only.
    #[arg(long)]
    pub memory_storage: bool,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Stop after this many ticks instead of running forever.
    #[arg(long)]
    pub ticks: Option<u64>,

    /// Number of in-process simulated clients to connect.
    #[arg(long, default_value_t = 0)]
    pub bots: u32,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(seed) = args.seed {
            self.world.seed = seed;
        }
        if let Some(rate) = args.tick_rate {
            self.server.tick_rate = rate;
        }
        if let Some(radius) = args.view_radius {
            self.world.view_radius = radius;
        }
        if let Some(ref path) = args.storage_path {
            self.storage.backend = StorageBackend::File;
            self.storage.path = path.clone();
        }
        if args.memory_storage {
            self.storage.backend = StorageBackend::Memory;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_override() {
        let mut config = Config::default();
        let args = CliArgs {
            seed: Some(99),
            view_radius: Some(2),
            memory_storage: true,
            ..Default::default()
        };
        config.apply_cli_overrides(&args);
        assert_eq!(config.world.seed, 99);
        assert_eq!(config.world.view_radius, 2);
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        // Non-overridden fields retain defaults
        assert_eq!(config.server.tick_rate, 20);
    }

    #[test]
    fn test_storage_path_selects_file_backend() {
        let mut config = Config::default();
        config.storage.backend = StorageBackend::Memory;
        let args = CliArgs {
            storage_path: Some(PathBuf::from("/srv/lands")),
            ..Default::default()
        };
        config.apply_cli_overrides(&args);
        assert_eq!(config.storage.backend, StorageBackend::File);
        assert_eq!(config.storage.path, PathBuf::from("/srv/lands"));
    }

    #[test]
    fn test_cli_no_override() {
        let original = Config::default();
        let mut config = Config::default();
        config.apply_cli_overrides(&CliArgs::default());
        assert_eq!(config, original);
    }

    #[test]
    fn test_parse_from_args() {
        let args = CliArgs::parse_from(["universe-server", "--seed", "5", "--ticks", "100"]);
        assert_eq!(args.seed, Some(5));
        assert_eq!(args.ticks, Some(100));
        assert_eq!(args.bots, 0);
    }
}
