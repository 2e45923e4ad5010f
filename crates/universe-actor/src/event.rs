//! Events emitted by the entity store.

use glam::DVec2;
use universe_land::{ActorId, LandCoord};

use crate::kind::{AttachKey, Direction, RunningState};

/// A change to actor state, delivered on the store's event channel.
#[derive(Clone, Debug, PartialEq)]
pub enum ActorEvent {
    /// A new actor exists.
    Added {
        /// New actor.
        id: ActorId,
    },
    /// An actor was despawned.
    Removed {
        /// Removed actor.
        id: ActorId,
    },
    /// Position changed since the last sweep.
    NewPosition {
        /// Moved actor.
        id: ActorId,
        /// Position after the move.
        pos: DVec2,
        /// Motion at sweep time.
        motion: DVec2,
        /// `true` when only client input moved the actor this tick.
        control_moved: bool,
    },
    /// Running state or facing changed.
    WalkStateChanged {
        /// Actor.
        id: ActorId,
        /// New running state.
        running: RunningState,
        /// New facing.
        direction: Direction,
    },
    /// `child` was attached under `target` at `key`.
    AttachmentSet {
        /// Parent.
        target: ActorId,
        /// Slot.
        key: AttachKey,
        /// Child.
        child: ActorId,
    },
    /// `child` was detached from `target` at `key`.
    AttachmentRemoved {
        /// Parent.
        target: ActorId,
        /// Slot.
        key: AttachKey,
        /// Former child.
        child: ActorId,
    },
    /// The actor took damage.
    Damaged {
        /// Damaged actor.
        id: ActorId,
        /// Health after the hit.
        health: u32,
        /// Knockback motion applied.
        knockback: DVec2,
    },
    /// Using started or ended.
    UsingToggled {
        /// Actor.
        id: ActorId,
        /// `true` on start, `false` on end.
        started: bool,
        /// Ticks spent using; zero on start.
        use_tick: u64,
    },
    /// Rotation changed.
    RotationSet {
        /// Actor.
        id: ActorId,
        /// New rotation in `[0, 2π)`.
        rotation: f64,
    },
    /// The actor's position moved into a different land.
    CrossedLand {
        /// Actor.
        id: ActorId,
        /// Previous land.
        from: LandCoord,
        /// New land.
        to: LandCoord,
    },
}

impl ActorEvent {
    /// The actor this event is about; the parent for attachment events.
    pub fn subject(&self) -> ActorId {
        match self {
            ActorEvent::Added { id }
            | ActorEvent::Removed { id }
            | ActorEvent::NewPosition { id, .. }
            | ActorEvent::WalkStateChanged { id, .. }
            | ActorEvent::Damaged { id, .. }
            | ActorEvent::UsingToggled { id, .. }
            | ActorEvent::RotationSet { id, .. }
            | ActorEvent::CrossedLand { id, .. } => *id,
            ActorEvent::AttachmentSet { target, .. } | ActorEvent::AttachmentRemoved { target, .. } => {
                *target
            }
        }
    }
}
