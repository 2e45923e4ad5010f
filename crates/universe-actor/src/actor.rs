//! The actor record and its spawn parameters.

use std::collections::BTreeMap;

use glam::DVec2;
use universe_land::{ActorId, LandCoord};

use crate::kind::{ActorKind, AttachKey, Direction, RunningState};

/// Dirty-flag bit: position changed by simulation (motion decay, attachment).
pub const MOVE_DIRTY: u8 = 0b0000_0001;
/// Dirty-flag bit: position changed by a controlling client's input.
pub const CONTROL_MOVE_DIRTY: u8 = 0b0000_0010;
/// Dirty-flag bit: running state or direction changed.
pub const WALK_DIRTY: u8 = 0b0000_0100;

/// Both position dirty bits.
pub(crate) const ANY_MOVE_DIRTY: u8 = MOVE_DIRTY | CONTROL_MOVE_DIRTY;

/// Parameters for [`ActorStore::spawn`](crate::ActorStore::spawn).
#[derive(Clone, Debug)]
pub struct ActorInit {
    /// Kind of actor to create.
    pub kind: ActorKind,
    /// Initial position.
    pub pos: DVec2,
    /// Display name; defaults to the kind's name.
    pub name: Option<String>,
    /// Bounding box override; defaults to the kind's box.
    pub bounding: Option<[f64; 4]>,
}

impl ActorInit {
    /// Spawn parameters with kind defaults.
    pub fn new(kind: ActorKind, pos: DVec2) -> Self {
        Self {
            kind,
            pos,
            name: None,
            bounding: None,
        }
    }

    /// Sets the display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Overrides the bounding box.
    pub fn with_bounding(mut self, bounding: [f64; 4]) -> Self {
        self.bounding = Some(bounding);
        self
    }
}

/// One simulated entity. Read-only outside the store.
#[derive(Clone, Debug)]
pub struct Actor {
    pub(crate) id: ActorId,
    pub(crate) kind: ActorKind,
    pub(crate) name: String,
    pub(crate) pos: DVec2,
    pub(crate) last_pos: DVec2,
    pub(crate) motion: DVec2,
    pub(crate) motion_decay: f64,
    pub(crate) rotation: f64,
    pub(crate) direction: Direction,
    pub(crate) running: RunningState,
    pub(crate) health: u32,
    pub(crate) max_health: u32,
    pub(crate) bounding: [f64; 4],
    pub(crate) attachments: BTreeMap<AttachKey, ActorId>,
    pub(crate) attaching: Option<(ActorId, AttachKey)>,
    pub(crate) dirty: u8,
    pub(crate) using: bool,
    pub(crate) use_tick: u64,
    pub(crate) land: LandCoord,
}

impl Actor {
    pub(crate) fn new(id: ActorId, init: ActorInit) -> Self {
        let profile = init.kind.profile();
        Self {
            id,
            kind: init.kind,
            name: init
                .name
                .unwrap_or_else(|| profile.display_name.to_string()),
            pos: init.pos,
            last_pos: init.pos,
            motion: DVec2::ZERO,
            motion_decay: profile.motion_decay,
            rotation: 0.0,
            direction: Direction::default(),
            running: RunningState::default(),
            health: profile.max_health,
            max_health: profile.max_health,
            bounding: init.bounding.unwrap_or(profile.bounding),
            attachments: BTreeMap::new(),
            attaching: None,
            dirty: 0,
            using: false,
            use_tick: 0,
            land: LandCoord::of_position(init.pos),
        }
    }

    /// Stable id.
    pub fn id(&self) -> ActorId {
        self.id
    }

    /// Kind.
    pub fn kind(&self) -> ActorKind {
        self.kind
    }

    /// Display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current position.
    pub fn pos(&self) -> DVec2 {
        self.pos
    }

    /// Position before the most recent move.
    pub fn last_pos(&self) -> DVec2 {
        self.last_pos
    }

    /// Current motion per tick.
    pub fn motion(&self) -> DVec2 {
        self.motion
    }

    /// Motion multiplier applied each tick.
    pub fn motion_decay(&self) -> f64 {
        self.motion_decay
    }

    /// Rotation in radians, `[0, 2π)`.
    pub fn rotation(&self) -> f64 {
        self.rotation
    }

    /// Facing direction.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Locomotion state.
    pub fn running(&self) -> RunningState {
        self.running
    }

    /// Remaining health.
    pub fn health(&self) -> u32 {
        self.health
    }

    /// Upper bound of health.
    pub fn max_health(&self) -> u32 {
        self.max_health
    }

    /// Bounding box offsets `[min_x, min_y, max_x, max_y]`.
    pub fn bounding(&self) -> [f64; 4] {
        self.bounding
    }

    /// Rendered size of the kind.
    pub fn size(&self) -> DVec2 {
        let [w, h] = self.kind.profile().size;
        DVec2::new(w, h)
    }

    /// Children by slot.
    pub fn attachments(&self) -> &BTreeMap<AttachKey, ActorId> {
        &self.attachments
    }

    /// Parent and slot, if attached.
    pub fn attaching(&self) -> Option<(ActorId, AttachKey)> {
        self.attaching
    }

    /// Returns `true` if any of the bits in `flag` are set.
    pub fn is_dirty(&self, flag: u8) -> bool {
        self.dirty & flag != 0
    }

    /// Whether the actor is currently using its held item.
    pub fn is_using(&self) -> bool {
        self.using
    }

    /// Ticks elapsed since using started.
    pub fn use_tick(&self) -> u64 {
        self.use_tick
    }

    /// Land containing the actor's position.
    pub fn land(&self) -> LandCoord {
        self.land
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_actor_takes_kind_defaults() {
        let actor = Actor::new(ActorId(1), ActorInit::new(ActorKind::Player, DVec2::new(9.0, -1.0)));
        assert_eq!(actor.name(), "Player");
        assert_eq!(actor.health(), 100);
        assert_eq!(actor.bounding(), [-0.5, -1.5, 0.5, 0.0]);
        assert_eq!(actor.motion_decay(), 0.75);
        assert_eq!(actor.size(), DVec2::new(1.0, 1.5));
        assert_eq!(actor.land(), LandCoord::new(1, -1));
        assert_eq!(actor.last_pos(), actor.pos());
    }

    #[test]
    fn test_init_overrides() {
        let init = ActorInit::new(ActorKind::Prop, DVec2::ZERO)
            .with_name("crate")
            .with_bounding([-1.0, -1.0, 1.0, 1.0]);
        let actor = Actor::new(ActorId(2), init);
        assert_eq!(actor.name(), "crate");
        assert_eq!(actor.bounding(), [-1.0, -1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_dirty_bits() {
        let mut actor = Actor::new(ActorId(3), ActorInit::new(ActorKind::Bow, DVec2::ZERO));
        assert!(!actor.is_dirty(ANY_MOVE_DIRTY));
        actor.dirty |= CONTROL_MOVE_DIRTY;
        assert!(actor.is_dirty(ANY_MOVE_DIRTY));
        assert!(!actor.is_dirty(MOVE_DIRTY));
        assert!(!actor.is_dirty(WALK_DIRTY));
    }
}
