//! Terrain payload of a land: a full grid of typed bricks.

use serde::{Deserialize, Serialize};

use crate::coord::{LAND_WIDTH, LandCoord};

/// Material of a single brick.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BrickType {
    /// Grass.
    Grass,
    /// Dry, cracked dirt.
    DryDirt,
    /// Dirt.
    Dirt,
    /// Sand.
    Sand,
    /// Ice.
    Ice,
    /// Water.
    Water,
    /// Rock.
    Rock,
}

/// One terrain cell at a local offset inside its land.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Brick {
    /// Offset along X within the land, `0..LAND_WIDTH`.
    pub off_x: u8,
    /// Offset along Y within the land, `0..LAND_WIDTH`.
    pub off_y: u8,
    /// Brick material.
    pub brick_type: BrickType,
}

/// Terrain snapshot of one land, bricks in row order (`y` major, `x` minor).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LandData {
    /// Land this terrain belongs to.
    pub coord: LandCoord,
    /// `LAND_WIDTH * LAND_WIDTH` bricks.
    pub bricks: Vec<Brick>,
}

impl LandData {
    /// Number of bricks in a fully populated land.
    pub const BRICK_COUNT: usize = (LAND_WIDTH * LAND_WIDTH) as usize;

    /// Brick at a local offset, if populated.
    pub fn brick_at(&self, off_x: u8, off_y: u8) -> Option<&Brick> {
        let width = LAND_WIDTH as usize;
        let (x, y) = (off_x as usize, off_y as usize);
        if x >= width || y >= width {
            return None;
        }
        self.bricks
            .get(y * width + x)
            .filter(|b| b.off_x == off_x && b.off_y == off_y)
    }

    /// Whether every cell of the land has exactly one brick, in row order.
    pub fn is_complete(&self) -> bool {
        let width = LAND_WIDTH as usize;
        self.bricks.len() == Self::BRICK_COUNT
            && self.bricks.iter().enumerate().all(|(i, b)| {
                b.off_x as usize == i % width && b.off_y as usize == i / width
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_land(brick_type: BrickType) -> LandData {
        let bricks = (0..LAND_WIDTH as u8)
            .flat_map(|y| {
                (0..LAND_WIDTH as u8).map(move |x| Brick {
                    off_x: x,
                    off_y: y,
                    brick_type,
                })
            })
            .collect();
        LandData {
            coord: LandCoord::new(0, 0),
            bricks,
        }
    }

    #[test]
    fn test_brick_at_indexes_row_major() {
        let land = flat_land(BrickType::Grass);
        let brick = land.brick_at(3, 5).unwrap();
        assert_eq!((brick.off_x, brick.off_y), (3, 5));
        assert!(land.is_complete());
    }

    #[test]
    fn test_brick_at_out_of_range() {
        let land = flat_land(BrickType::Sand);
        assert!(land.brick_at(8, 0).is_none());
        assert!(land.brick_at(0, 200).is_none());
    }

    #[test]
    fn test_partial_land_is_not_complete() {
        let mut land = flat_land(BrickType::Rock);
        land.bricks.truncate(10);
        assert!(!land.is_complete());
        assert!(land.brick_at(7, 7).is_none());
    }

    #[test]
    fn test_shuffled_land_is_not_complete() {
        let mut land = flat_land(BrickType::Grass);
        land.bricks.swap(0, 9);
        assert_eq!(land.bricks.len(), LandData::BRICK_COUNT);
        assert!(!land.is_complete());
    }
}
