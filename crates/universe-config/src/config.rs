//! Configuration structs with sensible defaults and RON persistence.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// File name of the persisted configuration inside a config directory.
const CONFIG_FILE: &str = "config.ron";

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// World generation and layout settings.
    pub world: WorldConfig,
    /// Simulation loop and session settings.
    pub server: ServerConfig,
    /// Land persistence settings.
    pub storage: StorageConfig,
    /// Off-thread land generation settings.
    pub generation: GenerationConfig,
    /// Debug/development settings.
    pub debug: DebugConfig,
}

/// World configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WorldConfig {
    /// Seed fed to the terrain generator. Same seed, same lands.
    pub seed: u64,
    /// Radius in lands around a viewer's land that is kept in use.
    pub view_radius: u32,
    /// X coordinate where new players appear.
    pub spawn_x: f64,
    /// Y coordinate where new players appear.
    pub spawn_y: f64,
}

/// Simulation loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Fixed simulation rate in Hz.
    pub tick_rate: u32,
    /// Maximum number of logged-in players.
    pub max_players: u32,
    /// Longest movement a single client input may request, in world units.
    pub max_move_per_input: f64,
    /// Unload lands that no viewer uses any more.
    pub unload_unused_lands: bool,
}

/// Which key-value store backs land persistence.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum StorageBackend {
    /// Process-local map, lost on exit.
    Memory,
    /// One file per key below [`StorageConfig::path`].
    File,
}

/// Land persistence configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    /// Storage backend.
    pub backend: StorageBackend,
    /// Directory used by the file backend.
    pub path: PathBuf,
}

/// Off-thread generation configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GenerationConfig {
    /// Worker threads for land loading. `0` loads synchronously inside the tick.
    pub worker_threads: usize,
    /// Maximum number of queued or running land loads.
    pub max_in_flight: usize,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
    /// Also write JSON logs to a file next to the config.
    pub log_to_file: bool,
}

// --- Default implementations ---

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            seed: 1,
            view_radius: 1,
            spawn_x: 0.0,
            spawn_y: 0.0,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            tick_rate: 20,
            max_players: 32,
            max_move_per_input: 1.0,
            unload_unused_lands: true,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::File,
            path: PathBuf::from("world"),
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            worker_threads: num_cpus::get().saturating_sub(2).max(1),
            max_in_flight: 64,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_to_file: false,
        }
    }
}

/// Platform config directory for the server, e.g. `~/.config/universe`.
///
/// Falls back to `./universe-config` when the platform has no config dir.
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join("universe"))
        .unwrap_or_else(|| PathBuf::from("universe-config"))
}

// --- Load / Save / Reload ---

fn read_config(path: &Path) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let config: Config = ron::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    config.validate()?;
    Ok(config)
}

impl Config {
    /// Reads `config.ron` from `config_dir`, writing the defaults there first
    /// if the file does not exist.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let path = config_dir.join(CONFIG_FILE);
        if !path.exists() {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Wrote default server config to {}", path.display());
            return Ok(config);
        }
        let config = read_config(&path)?;
        log::info!(
            "Server config {} (seed {}, {} Hz)",
            path.display(),
            config.world.seed,
            config.server.tick_rate
        );
        Ok(config)
    }

    /// Writes `config.ron` into `config_dir`, creating the directory.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(|source| ConfigError::Write {
            path: config_dir.to_path_buf(),
            source,
        })?;
        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(2)
            .struct_names(false);
        let text = ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::Serialize)?;
        let path = config_dir.join(CONFIG_FILE);
        std::fs::write(&path, text).map_err(|source| ConfigError::Write { path, source })
    }

    /// Re-reads `config.ron`. `Ok(None)` when nothing changed.
    ///
    /// World settings only take effect for a new server; callers decide what
    /// a running server picks up.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let fresh = read_config(&config_dir.join(CONFIG_FILE))?;
        if fresh == *self {
            return Ok(None);
        }
        if fresh.world != self.world {
            log::warn!("World settings changed on disk; they apply after a restart");
        }
        Ok(Some(fresh))
    }

    /// Rejects settings the server cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.tick_rate == 0 {
            return Err(ConfigError::Invalid {
                field: "server.tick_rate",
                reason: "must be at least 1",
            });
        }
        let max_move = self.server.max_move_per_input;
        if !max_move.is_finite() || max_move <= 0.0 {
            return Err(ConfigError::Invalid {
                field: "server.max_move_per_input",
                reason: "must be a positive distance",
            });
        }
        if !self.world.spawn_x.is_finite() || !self.world.spawn_y.is_finite() {
            return Err(ConfigError::Invalid {
                field: "world.spawn",
                reason: "must be finite",
            });
        }
        if self.generation.worker_threads > 0 && self.generation.max_in_flight == 0 {
            return Err(ConfigError::Invalid {
                field: "generation.max_in_flight",
                reason: "must be at least 1 when workers are enabled",
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid_and_readable() {
        let config = Config::default();
        config.validate().unwrap();
        let text = ron::ser::to_string_pretty(&config, ron::ser::PrettyConfig::new()).unwrap();
        assert!(text.contains("view_radius: 1"));
        assert!(text.contains("unload_unused_lands: true"));
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: Config = ron::from_str("(world: (seed: 7), server: (max_players: 2))").unwrap();
        assert_eq!(config.world.seed, 7);
        assert_eq!(config.world.view_radius, 1);
        assert_eq!(config.server.max_players, 2);
        assert_eq!(config.server.tick_rate, 20);
        assert_eq!(config.storage, StorageConfig::default());
    }

    #[test]
    fn test_unknown_keys_are_tolerated() {
        let config: Config = ron::from_str("(retired_option: 3, storage: (backend: Memory))").unwrap();
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.storage.path, PathBuf::from("world"));
    }

    #[test]
    fn test_first_run_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config, Config::default());
        assert!(dir.path().join(CONFIG_FILE).exists());

        let mut edited = config.clone();
        edited.world.seed = 1234;
        edited.storage.backend = StorageBackend::Memory;
        edited.save(dir.path()).unwrap();
        assert_eq!(Config::load_or_create(dir.path()).unwrap(), edited);
    }

    #[test]
    fn test_reload_reports_only_changes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        config.save(dir.path()).unwrap();
        assert!(config.reload(dir.path()).unwrap().is_none());

        let mut edited = config.clone();
        edited.server.unload_unused_lands = false;
        edited.save(dir.path()).unwrap();
        let fresh = config.reload(dir.path()).unwrap().unwrap();
        assert!(!fresh.server.unload_unused_lands);
    }

    #[test]
    fn test_parse_error_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "(world: [oops").unwrap();
        let err = Config::load_or_create(dir.path()).unwrap_err();
        assert!(matches!(&err, ConfigError::Parse { path, .. } if path.ends_with(CONFIG_FILE)));
        assert!(err.to_string().contains(CONFIG_FILE));
    }

    #[test]
    fn test_unusable_settings_are_rejected() {
        let mut config = Config::default();
        config.server.tick_rate = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "server.tick_rate", .. })
        ));

        let mut config = Config::default();
        config.server.max_move_per_input = f64::NAN;
        assert!(config.validate().is_err());

        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "(server: (max_move_per_input: -1.0))").unwrap();
        assert!(matches!(
            Config::load_or_create(dir.path()),
            Err(ConfigError::Invalid { field: "server.max_move_per_input", .. })
        ));
    }

    #[test]
    fn test_generation_defaults_to_at_least_one_worker() {
        assert!(GenerationConfig::default().worker_threads >= 1);
    }
}
