//! Error types for land loading and persistence.

use crate::coord::LandCoord;
use crate::database::DatabaseError;
use crate::store::LandState;

/// Errors produced by the land store and its collaborators.
#[derive(Debug, thiserror::Error)]
pub enum LandError {
    /// No land record exists for the coordinate.
    #[error("land {0} not found")]
    NotFound(LandCoord),

    /// The land is not in a state that allows the operation.
    #[error("land {coord} is {state:?}")]
    InvalidState {
        /// Land the operation targeted.
        coord: LandCoord,
        /// State the land was in.
        state: LandState,
    },

    /// A load finished after it was superseded or cancelled.
    #[error("load of land {0} was cancelled")]
    Cancelled(LandCoord),

    /// The load queue is full; retry on a later tick.
    #[error("load queue full, land {0} not queued")]
    QueueFull(LandCoord),

    /// The persistence collaborator failed.
    #[error(transparent)]
    Database(#[from] DatabaseError),

    /// The stored terrain payload could not be encoded or decoded.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Terrain was decoded or produced for a land but does not fit it.
    #[error("terrain for land {coord} rejected: {reason}")]
    Malformed {
        /// Land being loaded.
        coord: LandCoord,
        /// What is wrong with the terrain.
        reason: &'static str,
    },

    /// A loader worker thread could not be started.
    #[error("failed to spawn land worker: {0}")]
    WorkerSpawn(#[source] std::io::Error),
}

/// Terrain payload encoding failures.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// postcard (de)serialization failed.
    #[error("terrain serialization failed: {0}")]
    Postcard(#[from] postcard::Error),

    /// LZ4 decompression failed.
    #[error("terrain decompression failed: {0}")]
    Lz4(#[from] lz4_flex::block::DecompressError),
}
