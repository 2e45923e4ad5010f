//! Actor kinds, facing directions and per-kind static profiles.

use std::f64::consts::{FRAC_PI_2, PI, TAU};

use glam::DVec2;
use serde::{Deserialize, Serialize};

/// Closed set of actor kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ActorKind {
    /// A connected player's avatar.
    Player,
    /// A bow, usually held in a player's hand.
    Bow,
    /// A fired arrow.
    Arrow,
    /// Any static or pushable object.
    Prop,
}

impl ActorKind {
    /// Every kind, in declaration order.
    pub const ALL: [ActorKind; 4] = [
        ActorKind::Player,
        ActorKind::Bow,
        ActorKind::Arrow,
        ActorKind::Prop,
    ];

    /// Dense index for per-kind tables.
    pub const fn index(self) -> usize {
        match self {
            ActorKind::Player => 0,
            ActorKind::Bow => 1,
            ActorKind::Arrow => 2,
            ActorKind::Prop => 3,
        }
    }

    /// Static defaults for this kind.
    pub fn profile(self) -> &'static KindProfile {
        match self {
            ActorKind::Player => &PLAYER,
            ActorKind::Bow => &BOW,
            ActorKind::Arrow => &ARROW,
            ActorKind::Prop => &PROP,
        }
    }
}

/// Facing direction of an actor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Facing the viewer.
    #[default]
    Forward,
    /// Facing away.
    Back,
    /// Facing left.
    Left,
    /// Facing right.
    Right,
}

impl Direction {
    /// Index into direction-indexed offset tables.
    pub const fn index(self) -> usize {
        match self {
            Direction::Forward => 0,
            Direction::Back => 1,
            Direction::Left => 2,
            Direction::Right => 3,
        }
    }
}

/// Locomotion state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunningState {
    /// Standing still.
    #[default]
    Silent,
    /// Walking.
    Walking,
}

/// Named attachment slot on a parent actor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AttachKey {
    /// Held in the right hand.
    RightHand,
    /// Held in the left hand.
    LeftHand,
    /// Carried on the back.
    Back,
}

/// Fixed defaults shared by every actor of a kind.
#[derive(Debug)]
pub struct KindProfile {
    /// Display name used when none is given at spawn.
    pub display_name: &'static str,
    /// Bounding box offsets `[min_x, min_y, max_x, max_y]` relative to position.
    pub bounding: [f64; 4],
    /// Rendered size `[width, height]`.
    pub size: [f64; 2],
    /// Motion multiplier applied each tick.
    pub motion_decay: f64,
    /// Health at spawn and upper bound.
    pub max_health: u32,
    /// Offsets of children per attach slot, indexed by [`Direction::index`].
    pub attach_offsets: &'static [(AttachKey, [[f64; 2]; 4])],
}

impl KindProfile {
    /// Offset of a child attached under `key` while the parent faces `direction`.
    ///
    /// Slots without a mapping place the child on the parent's position.
    pub fn attach_offset(&self, key: AttachKey, direction: Direction) -> DVec2 {
        self.attach_offsets
            .iter()
            .find(|(k, _)| *k == key)
            .map_or(DVec2::ZERO, |(_, table)| {
                let [x, y] = table[direction.index()];
                DVec2::new(x, y)
            })
    }
}

static PLAYER: KindProfile = KindProfile {
    display_name: "Player",
    bounding: [-0.5, -1.5, 0.5, 0.0],
    size: [1.0, 1.5],
    motion_decay: 0.75,
    max_health: 100,
    attach_offsets: &[(
        AttachKey::RightHand,
        [[-0.4, -0.5], [0.4, -0.5], [0.0, -0.5], [0.0, -0.4]],
    )],
};

static BOW: KindProfile = KindProfile {
    display_name: "Bow",
    bounding: [-0.25, -0.25, 0.25, 0.25],
    size: [0.5, 0.5],
    motion_decay: 0.75,
    max_health: 1,
    attach_offsets: &[],
};

static ARROW: KindProfile = KindProfile {
    display_name: "Arrow",
    bounding: [-0.1, -0.1, 0.1, 0.1],
    size: [0.2, 0.2],
    motion_decay: 0.95,
    max_health: 1,
    attach_offsets: &[],
};

static PROP: KindProfile = KindProfile {
    display_name: "Prop",
    bounding: [-0.5, -0.5, 0.5, 0.5],
    size: [1.0, 1.0],
    motion_decay: 0.75,
    max_health: 10,
    attach_offsets: &[],
};

/// Wraps an angle into `[0, 2π)`.
pub fn normalize_angle(rad: f64) -> f64 {
    let r = rad.rem_euclid(TAU);
    // rem_euclid can round up to TAU for tiny negative inputs
    if r >= TAU { 0.0 } else { r }
}

/// Keeps a held item's rotation inside the half-plane its holder faces.
///
/// Rotations inside the direction's arc are kept; anything else snaps to
/// the arc's bound angle.
pub fn constrain_rotation(direction: Direction, rotation: f64) -> f64 {
    let r = normalize_angle(rotation);
    let (inside, bound) = match direction {
        Direction::Forward => (r > 0.0 && r < PI, FRAC_PI_2),
        Direction::Back => (r > PI && r < TAU, 3.0 * FRAC_PI_2),
        Direction::Left => (r > FRAC_PI_2 && r < 3.0 * FRAC_PI_2, PI),
        Direction::Right => (r > 3.0 * FRAC_PI_2 || r < FRAC_PI_2, 0.0),
    };
    if inside { r } else { bound }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_player_hand_offsets_follow_direction() {
        let profile = ActorKind::Player.profile();
        assert_eq!(
            profile.attach_offset(AttachKey::RightHand, Direction::Forward),
            DVec2::new(-0.4, -0.5)
        );
        assert_eq!(
            profile.attach_offset(AttachKey::RightHand, Direction::Right),
            DVec2::new(0.0, -0.4)
        );
    }

    #[test]
    fn test_unmapped_slot_is_zero_offset() {
        let player = ActorKind::Player.profile();
        assert_eq!(player.attach_offset(AttachKey::Back, Direction::Left), DVec2::ZERO);
        let prop = ActorKind::Prop.profile();
        assert_eq!(prop.attach_offset(AttachKey::RightHand, Direction::Back), DVec2::ZERO);
    }

    #[test]
    fn test_kind_indices_are_dense() {
        for (i, kind) in ActorKind::ALL.iter().enumerate() {
            assert_eq!(kind.index(), i);
        }
    }

    #[test]
    fn test_normalize_angle() {
        assert_eq!(normalize_angle(0.0), 0.0);
        assert!((normalize_angle(-FRAC_PI_2) - 3.0 * FRAC_PI_2).abs() < 1e-12);
        assert!((normalize_angle(TAU + 1.0) - 1.0).abs() < 1e-12);
        assert!(normalize_angle(-1e-18) < TAU);
    }

    #[test]
    fn test_rotation_inside_arc_is_kept() {
        assert_eq!(constrain_rotation(Direction::Forward, 1.0), 1.0);
        assert_eq!(constrain_rotation(Direction::Back, 4.0), 4.0);
        assert_eq!(constrain_rotation(Direction::Left, 3.0), 3.0);
        assert_eq!(constrain_rotation(Direction::Right, 0.5), 0.5);
        assert_eq!(constrain_rotation(Direction::Right, 5.0), 5.0);
    }

    #[test]
    fn test_rotation_outside_arc_snaps_to_bound() {
        assert_eq!(constrain_rotation(Direction::Forward, 4.0), FRAC_PI_2);
        assert_eq!(constrain_rotation(Direction::Back, 1.0), 3.0 * FRAC_PI_2);
        assert_eq!(constrain_rotation(Direction::Left, 0.2), PI);
        assert_eq!(constrain_rotation(Direction::Right, PI), 0.0);
        // Arc ends are exclusive.
        assert_eq!(constrain_rotation(Direction::Forward, 0.0), FRAC_PI_2);
    }
}
