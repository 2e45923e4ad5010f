//! Procedural terrain: simplex temperature, moisture and elevation fields pick
//! a biome per brick through a Whittaker-style table, and each biome maps to
//! a brick material.

use noise::{NoiseFn, Simplex};

use crate::coord::{LAND_WIDTH, LandCoord};
use crate::terrain::{Brick, BrickType, LandData};

/// Produces the terrain of a land. Must be deterministic in `(coord, seed)`
/// and safe to call from worker threads.
pub trait TerrainGenerator: Send + Sync {
    /// Generate the full brick grid of `coord`.
    fn generate(&self, coord: LandCoord, seed: u64) -> LandData;
}

/// Climate class of a brick.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Biome {
    /// Frozen ground.
    Cold,
    /// Ice sheet.
    Iceland,
    /// Hot and dry.
    Desert,
    /// Temperate and dry.
    Dry,
    /// Temperate and wet.
    Forest,
    /// Hot and wet.
    Rainforest,
    /// Standing water.
    Lake,
    /// High elevation.
    Mountain,
    /// Temperate grassland.
    Plain,
}

impl Biome {
    /// Brick material laid down for this biome.
    pub fn brick_type(self) -> BrickType {
        match self {
            Biome::Cold | Biome::Iceland => BrickType::Ice,
            Biome::Desert => BrickType::Sand,
            Biome::Dry => BrickType::DryDirt,
            Biome::Forest | Biome::Rainforest => BrickType::Dirt,
            Biome::Lake => BrickType::Water,
            Biome::Mountain => BrickType::Rock,
            Biome::Plain => BrickType::Grass,
        }
    }
}

/// A rectangle in temperature/moisture space mapped to a biome.
#[derive(Clone, Debug)]
pub struct WhittakerRegion {
    /// Minimum temperature (inclusive), in `[0.0, 1.0]`.
    pub temp_min: f64,
    /// Maximum temperature (exclusive).
    pub temp_max: f64,
    /// Minimum moisture (inclusive), in `[0.0, 1.0]`.
    pub moisture_min: f64,
    /// Maximum moisture (exclusive).
    pub moisture_max: f64,
    /// Biome assigned inside the region.
    pub biome: Biome,
}

/// Ordered region list; first match wins, otherwise `fallback`.
#[derive(Clone, Debug)]
pub struct WhittakerTable {
    /// Regions checked in order.
    pub regions: Vec<WhittakerRegion>,
    /// Biome used when no region matches.
    pub fallback: Biome,
}

impl WhittakerTable {
    /// Looks up the biome for a temperature and moisture in `[0.0, 1.0]`.
    pub fn lookup(&self, temperature: f64, moisture: f64) -> Biome {
        self.regions
            .iter()
            .find(|r| {
                temperature >= r.temp_min
                    && temperature < r.temp_max
                    && moisture >= r.moisture_min
                    && moisture < r.moisture_max
            })
            .map_or(self.fallback, |r| r.biome)
    }
}

impl Default for WhittakerTable {
    fn default() -> Self {
        let region = |temp_min, temp_max, moisture_min, moisture_max, biome| WhittakerRegion {
            temp_min,
            temp_max,
            moisture_min,
            moisture_max,
            biome,
        };
        Self {
            regions: vec![
                region(0.0, 0.2, 0.0, 1.01, Biome::Iceland),
                region(0.2, 0.35, 0.0, 1.01, Biome::Cold),
                region(0.35, 0.65, 0.0, 0.25, Biome::Dry),
                region(0.35, 0.65, 0.25, 0.55, Biome::Plain),
                region(0.35, 0.65, 0.55, 0.8, Biome::Forest),
                region(0.35, 0.65, 0.8, 1.01, Biome::Lake),
                region(0.65, 1.01, 0.0, 0.3, Biome::Desert),
                region(0.65, 1.01, 0.3, 0.6, Biome::Plain),
                region(0.65, 1.01, 0.6, 1.01, Biome::Rainforest),
            ],
            fallback: Biome::Plain,
        }
    }
}

/// Samples biomes at world positions from three decorrelated simplex fields.
pub struct BiomeSampler {
    temp_noise: Simplex,
    moisture_noise: Simplex,
    elevation_noise: Simplex,
    table: WhittakerTable,
    /// Frequency of all three fields, per world unit.
    pub frequency: f64,
    /// Normalized elevation above which the biome is [`Biome::Mountain`].
    pub mountain_threshold: f64,
}

impl BiomeSampler {
    /// Creates a sampler for `seed` with the default table.
    pub fn new(seed: u64) -> Self {
        Self::with_table(seed, WhittakerTable::default())
    }

    /// Creates a sampler for `seed` with a custom table.
    pub fn with_table(seed: u64, table: WhittakerTable) -> Self {
        Self {
            temp_noise: Simplex::new(seed as u32),
            moisture_noise: Simplex::new(seed.wrapping_add(0xDEAD_BEEF) as u32),
            elevation_noise: Simplex::new(seed.wrapping_mul(31).wrapping_add(7) as u32),
            table,
            frequency: 0.03,
            mountain_threshold: 0.8,
        }
    }

    /// Normalized `(temperature, moisture, elevation)` at a world position.
    pub fn climate(&self, x: f64, y: f64) -> (f64, f64, f64) {
        let p = [x * self.frequency, y * self.frequency];
        let normalize = |v: f64| ((v + 1.0) * 0.5).clamp(0.0, 1.0);
        (
            normalize(self.temp_noise.get(p)),
            normalize(self.moisture_noise.get(p)),
            normalize(self.elevation_noise.get(p)),
        )
    }

    /// Biome at a world position.
    pub fn sample(&self, x: f64, y: f64) -> Biome {
        let (temperature, moisture, elevation) = self.climate(x, y);
        if elevation >= self.mountain_threshold {
            return Biome::Mountain;
        }
        self.table.lookup(temperature, moisture)
    }
}

/// Default terrain generator: one biome-derived brick per cell.
#[derive(Clone, Debug, Default)]
pub struct BiomeGenerator {
    table: WhittakerTable,
}

impl BiomeGenerator {
    /// Generator using a custom biome table.
    pub fn with_table(table: WhittakerTable) -> Self {
        Self { table }
    }
}

impl TerrainGenerator for BiomeGenerator {
    fn generate(&self, coord: LandCoord, seed: u64) -> LandData {
        let sampler = BiomeSampler::with_table(seed, self.table.clone());
        let origin = coord.origin();
        let width = LAND_WIDTH as u8;

        let mut bricks = Vec::with_capacity(LandData::BRICK_COUNT);
        for off_y in 0..width {
            for off_x in 0..width {
                let biome = sampler.sample(origin.x + off_x as f64, origin.y + off_y as f64);
                bricks.push(Brick {
                    off_x,
                    off_y,
                    brick_type: biome.brick_type(),
                });
            }
        }
        LandData { coord, bricks }
    }
}

/// Generate a land with the default [`BiomeGenerator`].
pub fn generate_land(coord: LandCoord, seed: u64) -> LandData {
    BiomeGenerator::default().generate(coord, seed)
}
