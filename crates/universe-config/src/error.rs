//! Configuration error types.

use std::path::PathBuf;

/// Errors raised while reading, writing or checking `config.ron`.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file exists but could not be read.
    #[error("cannot read {}: {source}", path.display())]
    Read {
        /// File being read.
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The directory or file could not be written.
    #[error("cannot write {}: {source}", path.display())]
    Write {
        /// File or directory being written.
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid RON for [`Config`](crate::Config).
    #[error("cannot parse {}: {source}", path.display())]
    Parse {
        /// File being parsed.
        path: PathBuf,
        #[source]
        source: ron::error::SpannedError,
    },

    /// RON serialization failed.
    #[error("cannot serialize config: {0}")]
    Serialize(#[source] ron::Error),

    /// A setting parsed but is outside its usable range.
    #[error("invalid setting {field}: {reason}")]
    Invalid {
        /// Dotted setting name, e.g. `server.tick_rate`.
        field: &'static str,
        /// What is wrong with it.
        reason: &'static str,
    },
}
