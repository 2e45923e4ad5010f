//! Configuration for the Universe world server.
//!
//! Settings persist to disk as a RON file, accept CLI overrides via clap,
//! and tolerate missing or unknown fields so older files keep loading.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{
    Config, DebugConfig, GenerationConfig, ServerConfig, StorageBackend, StorageConfig,
    WorldConfig, default_config_dir,
};
pub use error::ConfigError;
