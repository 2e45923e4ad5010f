//! Spatial chunk store: partitions the world into fixed-size lands, loads
//! their terrain from a key-value store or generates it from the world seed,
//! and tracks which actors currently stand in each land.

mod codec;
mod coord;
mod database;
mod error;
mod generator;
mod loader;
mod store;
mod terrain;

pub use codec::{decode_land, encode_land};
pub use coord::{ActorId, LAND_WIDTH, LandCoord};
pub use database::{DatabaseError, FileDatabase, LandDatabase, MemoryDatabase};
pub use error::{CodecError, LandError};
pub use generator::{
    Biome, BiomeGenerator, BiomeSampler, TerrainGenerator, WhittakerRegion, WhittakerTable,
    generate_land,
};
pub use loader::{LandLoader, LoadCompletion, LoadTask};
pub use store::{Land, LandEvent, LandState, LandStore, fetch_or_generate};
pub use terrain::{Brick, BrickType, LandData};
