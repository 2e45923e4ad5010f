//! Error types for the server driver and the wire envelope.

use universe_actor::ActorError;
use universe_land::LandError;

use crate::messages::ConnId;

/// Reasons an inbound message could not be applied.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The connection is not known to the server.
    #[error("unknown connection {0}")]
    UnknownConnection(ConnId),

    /// The connection has not logged in yet.
    #[error("connection {0} has no actor")]
    NotLoggedIn(ConnId),

    /// The connection already controls an actor.
    #[error("connection {0} is already logged in")]
    AlreadyLoggedIn(ConnId),

    /// `max_players` viewers are already connected.
    #[error("server full ({max} players)")]
    ServerFull {
        /// Configured limit.
        max: u32,
    },

    /// A single movement input exceeded the per-input limit.
    #[error("move too fast: distance {distance:.3} > max {max:.3}")]
    MoveTooFast {
        /// Requested movement length.
        distance: f64,
        /// Allowed maximum.
        max: f64,
    },

    /// The entity store rejected the operation.
    #[error(transparent)]
    Actor(#[from] ActorError),

    /// The land store rejected the operation.
    #[error(transparent)]
    Land(#[from] LandError),
}

/// Errors decoding a versioned protocol payload.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// The payload was empty (no version byte).
    #[error("empty payload")]
    EmptyPayload,

    /// The version byte does not match [`PROTOCOL_VERSION`](crate::PROTOCOL_VERSION).
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    /// postcard (de)serialization failed.
    #[error("wire serialization error: {0}")]
    Postcard(#[from] postcard::Error),
}
