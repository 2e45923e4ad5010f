//! The land table: load state, terrain and actor membership per coordinate.
//!
//! Every land moves through `Unloaded -> Loading -> Loaded` and back to
//! `Unloaded` on unload. A load request stamps the land with a fresh ticket;
//! a completion is applied only while the land is still loading under that
//! same ticket, so a superseded load can never overwrite newer state.

use std::collections::BTreeSet;
use std::sync::Arc;

use crossbeam_channel::Sender;
use rustc_hash::FxHashMap;
use tracing::{debug, info, warn};

use crate::codec::{decode_land, encode_land};
use crate::coord::{ActorId, LandCoord};
use crate::database::LandDatabase;
use crate::error::LandError;
use crate::generator::TerrainGenerator;
use crate::loader::{LandLoader, LoadCompletion, LoadTask};
use crate::terrain::LandData;

/// Load state of a land.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LandState {
    /// Known but without terrain.
    Unloaded,
    /// A load is outstanding under `ticket`.
    Loading {
        /// Identifies the outstanding request.
        ticket: u64,
    },
    /// Terrain fully populated.
    Loaded,
}

/// Notifications emitted by the store.
#[derive(Clone, Debug, PartialEq)]
pub enum LandEvent {
    /// A land finished loading; carries its terrain.
    Loaded {
        /// Land that loaded.
        coord: LandCoord,
        /// Its terrain snapshot.
        data: LandData,
    },
    /// A land's terrain was dropped.
    Unloaded {
        /// Land that unloaded.
        coord: LandCoord,
    },
}

/// One land record.
#[derive(Clone, Debug)]
pub struct Land {
    coord: LandCoord,
    state: LandState,
    terrain: Option<LandData>,
    actors: BTreeSet<ActorId>,
}

impl Land {
    fn new(coord: LandCoord) -> Self {
        Self {
            coord,
            state: LandState::Unloaded,
            terrain: None,
            actors: BTreeSet::new(),
        }
    }

    /// Grid coordinate.
    pub fn coord(&self) -> LandCoord {
        self.coord
    }

    /// Current load state.
    pub fn state(&self) -> LandState {
        self.state
    }

    /// Terrain, present only while loaded.
    pub fn terrain(&self) -> Option<&LandData> {
        self.terrain.as_ref()
    }

    /// Actors currently inside this land.
    pub fn actors(&self) -> &BTreeSet<ActorId> {
        &self.actors
    }

    /// Returns `true` if the terrain is loaded.
    pub fn is_loaded(&self) -> bool {
        self.state == LandState::Loaded
    }
}

/// Fetch a land's terrain from `database`, or generate and persist it on a miss.
///
/// A database error is returned as-is; it is never treated as a miss.
pub fn fetch_or_generate(
    database: &dyn LandDatabase,
    generator: &dyn TerrainGenerator,
    coord: LandCoord,
    seed: u64,
) -> Result<LandData, LandError> {
    let key = coord.storage_key();
    match database.get(&key)? {
        Some(bytes) => {
            let data = decode_land(&bytes)?;
            check_terrain(coord, &data)?;
            Ok(data)
        }
        None => {
            let data = generator.generate(coord, seed);
            check_terrain(coord, &data)?;
            database.set(&key, &encode_land(&data)?)?;
            debug!(%coord, "generated and persisted land");
            Ok(data)
        }
    }
}

/// Rejects terrain that belongs to another land or leaves cells empty.
fn check_terrain(coord: LandCoord, data: &LandData) -> Result<(), LandError> {
    if data.coord != coord {
        return Err(LandError::Malformed {
            coord,
            reason: "terrain belongs to another land",
        });
    }
    if !data.is_complete() {
        return Err(LandError::Malformed {
            coord,
            reason: "terrain is not fully populated",
        });
    }
    Ok(())
}

/// Owns every known land.
pub struct LandStore {
    lands: FxHashMap<LandCoord, Land>,
    database: Arc<dyn LandDatabase>,
    generator: Arc<dyn TerrainGenerator>,
    seed: u64,
    next_ticket: u64,
    events: Sender<LandEvent>,
}

impl LandStore {
    /// Creates an empty store. Events are delivered on `events`.
    pub fn new(
        seed: u64,
        database: Arc<dyn LandDatabase>,
        generator: Arc<dyn TerrainGenerator>,
        events: Sender<LandEvent>,
    ) -> Self {
        Self {
            lands: FxHashMap::default(),
            database,
            generator,
            seed,
            next_ticket: 0,
            events,
        }
    }

    /// World seed passed to the generator.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Shared handle to the persistence collaborator.
    pub fn database(&self) -> Arc<dyn LandDatabase> {
        Arc::clone(&self.database)
    }

    /// Shared handle to the generation collaborator.
    pub fn generator(&self) -> Arc<dyn TerrainGenerator> {
        Arc::clone(&self.generator)
    }

    /// Creates an unloaded record for `coord` if none exists. Returns `true` if created.
    pub fn ensure(&mut self, coord: LandCoord) -> bool {
        if self.lands.contains_key(&coord) {
            return false;
        }
        self.lands.insert(coord, Land::new(coord));
        true
    }

    /// Land record at `coord`.
    pub fn get(&self, coord: LandCoord) -> Option<&Land> {
        self.lands.get(&coord)
    }

    /// Load state at `coord`, `None` if unknown.
    pub fn state(&self, coord: LandCoord) -> Option<LandState> {
        self.lands.get(&coord).map(Land::state)
    }

    /// Terrain at `coord` if loaded.
    pub fn terrain(&self, coord: LandCoord) -> Option<&LandData> {
        self.lands.get(&coord).and_then(Land::terrain)
    }

    /// Number of known lands.
    pub fn len(&self) -> usize {
        self.lands.len()
    }

    /// Returns `true` if no land is known.
    pub fn is_empty(&self) -> bool {
        self.lands.is_empty()
    }

    /// Coordinates of all loaded lands.
    pub fn loaded_coords(&self) -> impl Iterator<Item = LandCoord> + '_ {
        self.lands.values().filter(|l| l.is_loaded()).map(Land::coord)
    }

    /// Coordinates of all lands with a load outstanding.
    pub fn loading_coords(&self) -> impl Iterator<Item = LandCoord> + '_ {
        self.lands
            .values()
            .filter(|l| matches!(l.state, LandState::Loading { .. }))
            .map(Land::coord)
    }

    // -----------------------------------------------------------------------
    // Loading
    // -----------------------------------------------------------------------

    /// Ensures the land exists and marks it loading. `None` if it is already
    /// loading or loaded.
    fn begin_loading(&mut self, coord: LandCoord) -> Option<u64> {
        self.ensure(coord);
        let ticket = self.next_ticket;
        let land = self.lands.get_mut(&coord)?;
        if land.state != LandState::Unloaded {
            return None;
        }
        self.next_ticket += 1;
        land.state = LandState::Loading { ticket };
        Some(ticket)
    }

    fn finish_loading(&mut self, coord: LandCoord, data: LandData) {
        if let Some(land) = self.lands.get_mut(&coord) {
            land.state = LandState::Loaded;
            land.terrain = Some(data.clone());
            info!(%coord, "land loaded");
            let _ = self.events.send(LandEvent::Loaded { coord, data });
        }
    }

    fn abort_loading(&mut self, coord: LandCoord) {
        if let Some(land) = self.lands.get_mut(&coord) {
            land.state = LandState::Unloaded;
        }
    }

    /// Loads `coord` on the calling thread.
    ///
    /// No-op if the land is loaded or loading. On failure the land is left
    /// unloaded and the error is returned.
    pub fn load(&mut self, coord: LandCoord) -> Result<(), LandError> {
        let Some(_ticket) = self.begin_loading(coord) else {
            return Ok(());
        };
        match fetch_or_generate(self.database.as_ref(), self.generator.as_ref(), coord, self.seed)
        {
            Ok(data) => {
                self.finish_loading(coord, data);
                Ok(())
            }
            Err(e) => {
                warn!(%coord, error = %e, "land load failed");
                self.abort_loading(coord);
                Err(e)
            }
        }
    }

    /// Queues `coord` on `loader`. Returns `Ok(false)` if the land was
    /// already loading or loaded.
    pub fn request_load(&mut self, coord: LandCoord, loader: &LandLoader) -> Result<bool, LandError> {
        let Some(ticket) = self.begin_loading(coord) else {
            return Ok(false);
        };
        let task = LoadTask {
            coord,
            ticket,
            seed: self.seed,
        };
        if loader.submit(task).is_err() {
            self.abort_loading(coord);
            return Err(LandError::QueueFull(coord));
        }
        debug!(%coord, ticket, "land load queued");
        Ok(true)
    }

    /// Applies one completion if it still matches the land's outstanding ticket.
    ///
    /// Returns the coordinate on success, [`LandError::Cancelled`] for a stale
    /// completion (state untouched), or the load's own error (land reverts to
    /// unloaded).
    pub fn apply_completion(&mut self, completion: LoadCompletion) -> Result<LandCoord, LandError> {
        let coord = completion.coord;
        let current = self.state(coord);
        if current != Some(LandState::Loading {
            ticket: completion.ticket,
        }) {
            debug!(%coord, ticket = completion.ticket, ?current, "discarding stale land load");
            return Err(LandError::Cancelled(coord));
        }
        match completion
            .result
            .and_then(|data| check_terrain(coord, &data).map(|()| data))
        {
            Ok(data) => {
                debug!(%coord, elapsed_us = completion.elapsed_us, "land load completed");
                self.finish_loading(coord, data);
                Ok(coord)
            }
            Err(e) => {
                warn!(%coord, error = %e, "land load failed");
                self.abort_loading(coord);
                Err(e)
            }
        }
    }

    /// Drains `loader` and applies every completion. Call once per tick.
    pub fn poll_loads(&mut self, loader: &LandLoader) -> Vec<Result<LandCoord, LandError>> {
        loader
            .drain()
            .into_iter()
            .map(|completion| self.apply_completion(completion))
            .collect()
    }

    /// Abandons an outstanding load, returning the land to unloaded.
    ///
    /// Returns `true` if a load was outstanding.
    pub fn cancel_load(&mut self, coord: LandCoord, loader: Option<&LandLoader>) -> bool {
        let Some(LandState::Loading { ticket }) = self.state(coord) else {
            return false;
        };
        if let Some(loader) = loader {
            loader.cancel(coord, ticket);
        }
        self.abort_loading(coord);
        debug!(%coord, ticket, "land load cancelled");
        true
    }

    /// Drops a loaded land's terrain. Membership is kept.
    pub fn unload(&mut self, coord: LandCoord) -> Result<(), LandError> {
        let land = self
            .lands
            .get_mut(&coord)
            .ok_or(LandError::NotFound(coord))?;
        if land.state != LandState::Loaded {
            return Err(LandError::InvalidState {
                coord,
                state: land.state,
            });
        }
        land.state = LandState::Unloaded;
        land.terrain = None;
        info!(%coord, "land unloaded");
        let _ = self.events.send(LandEvent::Unloaded { coord });
        Ok(())
    }

    /// Forgets unloaded lands that hold no actors and fail `keep`.
    ///
    /// Returns how many records were dropped.
    pub fn forget_idle(&mut self, keep: impl Fn(LandCoord) -> bool) -> usize {
        let before = self.lands.len();
        self.lands.retain(|&coord, land| {
            land.state != LandState::Unloaded || !land.actors.is_empty() || keep(coord)
        });
        let dropped = before - self.lands.len();
        if dropped > 0 {
            debug!(dropped, remaining = self.lands.len(), "idle land records forgotten");
        }
        dropped
    }

    // -----------------------------------------------------------------------
    // Membership
    // -----------------------------------------------------------------------

    /// Actors inside `coord`, empty if the land is unknown.
    pub fn actors_in(&self, coord: LandCoord) -> Vec<ActorId> {
        self.lands
            .get(&coord)
            .map(|l| l.actors.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Records `id` as inside `coord`, creating the land record if needed.
    pub fn insert_actor(&mut self, id: ActorId, coord: LandCoord) {
        self.ensure(coord);
        if let Some(land) = self.lands.get_mut(&coord) {
            land.actors.insert(id);
        }
    }

    /// Removes `id` from `coord`. Returns `true` if it was a member.
    pub fn remove_actor(&mut self, id: ActorId, coord: LandCoord) -> bool {
        self.lands
            .get_mut(&coord)
            .is_some_and(|l| l.actors.remove(&id))
    }

    /// Moves `id` from one land's membership to another's.
    pub fn move_actor(&mut self, id: ActorId, from: LandCoord, to: LandCoord) {
        if from == to {
            return;
        }
        self.remove_actor(id, from);
        self.insert_actor(id, to);
    }
}
