//! Protocol messages exchanged between the server core and its clients.
//!
//! The core produces and consumes these as plain values; transports that
//! want bytes can use [`encode`] and [`decode`], which write a protocol
//! version byte followed by the postcard body.

use std::fmt;

use glam::DVec2;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use universe_actor::{ActorEvent, ActorId, AttachKey, ConstructOptions, Direction, RunningState};
use universe_land::{LandCoord, LandData};

use crate::error::WireError;

/// Current wire-protocol version. Prepended to every encoded message.
pub const PROTOCOL_VERSION: u8 = 1;

/// Transport connection handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnId(pub u64);

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Client → server
// ---------------------------------------------------------------------------

/// Messages a client sends.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ClientMessage {
    /// Request a player actor.
    Login {
        /// Display name for the new actor.
        name: String,
    },
    /// Move the controlled actor by `delta`.
    Move {
        /// Client-assigned input sequence number.
        seq: u64,
        /// Requested displacement.
        delta: DVec2,
    },
    /// Change running state and facing.
    SetWalkState {
        /// New running state.
        running: RunningState,
        /// New facing.
        direction: Direction,
    },
    /// Begin using the held item.
    StartUsing,
    /// Stop using the held item.
    EndUsing,
}

// ---------------------------------------------------------------------------
// Server → client
// ---------------------------------------------------------------------------

/// Messages the server sends to specific connections.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ServerMessage {
    /// The connection now controls `actor`.
    LoginAcknowledged {
        /// Assigned actor.
        actor: ActorId,
    },
    /// An actor became visible.
    ActorAdded {
        /// Actor id.
        id: ActorId,
        /// Construct-time fields.
        options: ConstructOptions,
    },
    /// An actor is no longer visible.
    ActorRemoved {
        /// Actor id.
        id: ActorId,
    },
    /// Authoritative position update.
    NewPosition {
        /// Actor id.
        id: ActorId,
        /// Position.
        pos: DVec2,
        /// Motion.
        motion: DVec2,
    },
    /// Running state or facing changed.
    WalkStateChanged {
        /// Actor id.
        id: ActorId,
        /// Running state.
        running: RunningState,
        /// Facing.
        direction: Direction,
    },
    /// `child` attached under `target`.
    AttachmentSet {
        /// Parent.
        target: ActorId,
        /// Slot.
        key: AttachKey,
        /// Child.
        child: ActorId,
    },
    /// `child` detached from `target`.
    AttachmentRemoved {
        /// Parent.
        target: ActorId,
        /// Slot.
        key: AttachKey,
        /// Child.
        child: ActorId,
    },
    /// An actor took damage.
    Damaged {
        /// Actor id.
        id: ActorId,
        /// Remaining health.
        health: u32,
    },
    /// Using started or ended.
    UsingToggled {
        /// Actor id.
        id: ActorId,
        /// `true` on start.
        started: bool,
        /// Ticks spent using.
        use_tick: u64,
    },
    /// Rotation changed.
    RotationSet {
        /// Actor id.
        id: ActorId,
        /// Rotation in `[0, 2π)`.
        rotation: f64,
    },
    /// Terrain of a land the viewer uses.
    LandLoaded {
        /// Terrain snapshot.
        data: LandData,
    },
    /// The viewer no longer uses this land.
    LandUnloaded {
        /// Land coordinate.
        coord: LandCoord,
    },
    /// Inputs up to `seq` were processed; authoritative state follows.
    InputAck {
        /// Last processed input sequence.
        seq: u64,
        /// Position after processing.
        pos: DVec2,
        /// Motion after processing.
        motion: DVec2,
    },
}

impl ServerMessage {
    /// Per-tick update message for an actor event.
    ///
    /// `None` for lifecycle events, which are routed through the spawn
    /// bookkeeping instead, and for land crossings, which are internal.
    pub fn from_update(event: &ActorEvent) -> Option<Self> {
        let message = match *event {
            ActorEvent::NewPosition { id, pos, motion, .. } => {
                ServerMessage::NewPosition { id, pos, motion }
            }
            ActorEvent::WalkStateChanged {
                id,
                running,
                direction,
            } => ServerMessage::WalkStateChanged {
                id,
                running,
                direction,
            },
            ActorEvent::AttachmentSet { target, key, child } => {
                ServerMessage::AttachmentSet { target, key, child }
            }
            ActorEvent::AttachmentRemoved { target, key, child } => {
                ServerMessage::AttachmentRemoved { target, key, child }
            }
            ActorEvent::Damaged { id, health, .. } => ServerMessage::Damaged { id, health },
            ActorEvent::UsingToggled {
                id,
                started,
                use_tick,
            } => ServerMessage::UsingToggled {
                id,
                started,
                use_tick,
            },
            ActorEvent::RotationSet { id, rotation } => ServerMessage::RotationSet { id, rotation },
            ActorEvent::Added { .. } | ActorEvent::Removed { .. } | ActorEvent::CrossedLand { .. } => {
                return None;
            }
        };
        Some(message)
    }
}

/// A message addressed to one connection.
#[derive(Clone, Debug, PartialEq)]
pub struct Envelope {
    /// Recipient.
    pub conn: ConnId,
    /// Payload.
    pub message: ServerMessage,
}

impl Envelope {
    /// Addresses `message` to `conn`.
    pub fn new(conn: ConnId, message: ServerMessage) -> Self {
        Self { conn, message }
    }
}

// ---------------------------------------------------------------------------
// Wire helpers
// ---------------------------------------------------------------------------

/// Encodes a message as `[version: u8] [postcard body]`.
pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>, WireError> {
    let body = postcard::to_allocvec(message)?;
    let mut out = Vec::with_capacity(1 + body.len());
    out.push(PROTOCOL_VERSION);
    out.extend_from_slice(&body);
    Ok(out)
}

/// Decodes a payload produced by [`encode`].
pub fn decode<T: DeserializeOwned>(data: &[u8]) -> Result<T, WireError> {
    let (&version, body) = data.split_first().ok_or(WireError::EmptyPayload)?;
    if version != PROTOCOL_VERSION {
        return Err(WireError::UnsupportedVersion(version));
    }
    Ok(postcard::from_bytes(body)?)
}
