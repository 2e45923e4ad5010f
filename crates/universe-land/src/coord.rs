//! Land grid coordinates and actor identifiers.

use std::fmt;

use glam::DVec2;
use serde::{Deserialize, Serialize};

/// Width (and height) of one land in world units and in bricks.
pub const LAND_WIDTH: i64 = 8;

/// Stable integer identity of an actor.
///
/// Lands record membership by id only; the actor table itself lives in the
/// entity store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActorId(pub u64);

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Integer grid position of a land.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LandCoord {
    /// Land-grid X coordinate.
    pub x: i64,
    /// Land-grid Y coordinate.
    pub y: i64,
}

impl LandCoord {
    /// Creates a new land coordinate.
    pub const fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }

    /// The land containing a world position (`floor(pos / LAND_WIDTH)` per axis).
    pub fn of_position(pos: DVec2) -> Self {
        let width = LAND_WIDTH as f64;
        Self {
            x: (pos.x / width).floor() as i64,
            y: (pos.y / width).floor() as i64,
        }
    }

    /// Deterministic persistence key, `land.<x>.<y>`.
    pub fn storage_key(self) -> String {
        format!("land.{}.{}", self.x, self.y)
    }

    /// World position of this land's minimum corner.
    pub fn origin(self) -> DVec2 {
        DVec2::new((self.x * LAND_WIDTH) as f64, (self.y * LAND_WIDTH) as f64)
    }

    /// Chebyshev distance in lands.
    pub fn chebyshev_distance(self, other: LandCoord) -> u64 {
        self.x.abs_diff(other.x).max(self.y.abs_diff(other.y))
    }

    /// All lands within `radius` (Chebyshev) of this one, row by row.
    pub fn within_radius(self, radius: u32) -> impl Iterator<Item = LandCoord> {
        let r = i64::from(radius);
        (-r..=r).flat_map(move |dy| (-r..=r).map(move |dx| LandCoord::new(self.x + dx, self.y + dy)))
    }
}

impl fmt::Display for LandCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_floors_into_land() {
        assert_eq!(LandCoord::of_position(DVec2::new(0.0, 0.0)), LandCoord::new(0, 0));
        assert_eq!(LandCoord::of_position(DVec2::new(7.99, 7.99)), LandCoord::new(0, 0));
        assert_eq!(LandCoord::of_position(DVec2::new(8.0, 0.0)), LandCoord::new(1, 0));
        assert_eq!(LandCoord::of_position(DVec2::new(-0.01, -8.0)), LandCoord::new(-1, -1));
        assert_eq!(LandCoord::of_position(DVec2::new(-8.01, 0.0)), LandCoord::new(-2, 0));
    }

    #[test]
    fn test_storage_key_format() {
        assert_eq!(LandCoord::new(3, -2).storage_key(), "land.3.-2");
    }

    #[test]
    fn test_within_radius_covers_square() {
        let lands: Vec<_> = LandCoord::new(0, 0).within_radius(1).collect();
        assert_eq!(lands.len(), 9);
        assert_eq!(lands[0], LandCoord::new(-1, -1));
        assert_eq!(lands[8], LandCoord::new(1, 1));
        assert!(lands.iter().all(|l| l.chebyshev_distance(LandCoord::new(0, 0)) <= 1));
    }

    #[test]
    fn test_zero_radius_is_self() {
        let lands: Vec<_> = LandCoord::new(4, 5).within_radius(0).collect();
        assert_eq!(lands, vec![LandCoord::new(4, 5)]);
    }

    #[test]
    fn test_origin() {
        assert_eq!(LandCoord::new(-1, 2).origin(), DVec2::new(-8.0, 16.0));
    }
}
