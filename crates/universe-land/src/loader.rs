//! Off-thread land loading.
//!
//! Workers fetch terrain from the database, or generate and persist it, and
//! send the outcome back over a bounded channel. The tick thread drains
//! completions through [`LandStore::poll_loads`](crate::LandStore::poll_loads),
//! which discards any completion whose ticket no longer matches the land.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender, bounded};
use dashmap::DashMap;

use crate::coord::LandCoord;
use crate::database::LandDatabase;
use crate::error::LandError;
use crate::generator::TerrainGenerator;
use crate::store::fetch_or_generate;
use crate::terrain::LandData;

/// A request to load one land.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoadTask {
    /// Land to load.
    pub coord: LandCoord,
    /// Ticket stamped by the store when the load was requested.
    pub ticket: u64,
    /// World seed for generation on a miss.
    pub seed: u64,
}

/// Outcome of a finished load.
#[derive(Debug)]
pub struct LoadCompletion {
    /// Land that was loaded.
    pub coord: LandCoord,
    /// Ticket of the originating request.
    pub ticket: u64,
    /// Terrain, or the error that stopped the load.
    pub result: Result<LandData, LandError>,
    /// Wall time spent on the worker, in microseconds.
    pub elapsed_us: u64,
}

struct QueuedLoad {
    task: LoadTask,
    cancelled: Arc<AtomicBool>,
}

/// Pool of named worker threads that load lands.
pub struct LandLoader {
    task_sender: Sender<QueuedLoad>,
    result_receiver: Receiver<LoadCompletion>,
    active: Arc<DashMap<(LandCoord, u64), Arc<AtomicBool>>>,
    in_flight: Arc<AtomicU64>,
}

impl LandLoader {
    /// Start `thread_count` workers accepting up to `max_in_flight` queued loads.
    pub fn new(
        database: Arc<dyn LandDatabase>,
        generator: Arc<dyn TerrainGenerator>,
        thread_count: usize,
        max_in_flight: usize,
    ) -> Result<Self, LandError> {
        let capacity = max_in_flight.max(1);
        let (task_sender, task_receiver) = bounded::<QueuedLoad>(capacity);
        let (result_sender, result_receiver) = bounded::<LoadCompletion>(capacity);
        let in_flight = Arc::new(AtomicU64::new(0));

        for index in 0..thread_count.max(1) {
            let receiver = task_receiver.clone();
            let sender = result_sender.clone();
            let in_flight = Arc::clone(&in_flight);
            let database = Arc::clone(&database);
            let generator = Arc::clone(&generator);

            std::thread::Builder::new()
                .name(format!("land-loader-{index}"))
                .spawn(move || {
                    while let Ok(queued) = receiver.recv() {
                        if queued.cancelled.load(Ordering::Relaxed) {
                            in_flight.fetch_sub(1, Ordering::Relaxed);
                            continue;
                        }

                        let task = queued.task;
                        let start = Instant::now();
                        let result = fetch_or_generate(
                            database.as_ref(),
                            generator.as_ref(),
                            task.coord,
                            task.seed,
                        );
                        let elapsed_us = start.elapsed().as_micros() as u64;

                        if !queued.cancelled.load(Ordering::Relaxed) {
                            let _ = sender.send(LoadCompletion {
                                coord: task.coord,
                                ticket: task.ticket,
                                result,
                                elapsed_us,
                            });
                        }
                        in_flight.fetch_sub(1, Ordering::Relaxed);
                    }
                })
                .map_err(LandError::WorkerSpawn)?;
        }

        Ok(Self {
            task_sender,
            result_receiver,
            active: Arc::new(DashMap::new()),
            in_flight,
        })
    }

    /// Loader with `num_cpus - 2` workers (at least one).
    pub fn with_defaults(
        database: Arc<dyn LandDatabase>,
        generator: Arc<dyn TerrainGenerator>,
    ) -> Result<Self, LandError> {
        let threads = num_cpus::get().saturating_sub(2).max(1);
        Self::new(database, generator, threads, 64)
    }

    /// Queue a load. Returns the task back if the queue is full.
    pub fn submit(&self, task: LoadTask) -> Result<(), LoadTask> {
        let cancelled = Arc::new(AtomicBool::new(false));
        self.active
            .insert((task.coord, task.ticket), Arc::clone(&cancelled));
        self.in_flight.fetch_add(1, Ordering::Relaxed);

        self.task_sender
            .try_send(QueuedLoad { task, cancelled })
            .map_err(|e| {
                self.in_flight.fetch_sub(1, Ordering::Relaxed);
                let task = e.into_inner().task;
                self.active.remove(&(task.coord, task.ticket));
                task
            })
    }

    /// Flag a queued or running load as cancelled. No-op once it completed.
    pub fn cancel(&self, coord: LandCoord, ticket: u64) {
        if let Some((_, cancelled)) = self.active.remove(&(coord, ticket)) {
            cancelled.store(true, Ordering::Relaxed);
        }
    }

    /// Collect every completion delivered so far without blocking.
    pub fn drain(&self) -> Vec<LoadCompletion> {
        let mut results = Vec::new();
        while let Ok(done) = self.result_receiver.try_recv() {
            self.active.remove(&(done.coord, done.ticket));
            results.push(done);
        }
        results
    }

    /// Number of loads queued or running.
    pub fn in_flight_count(&self) -> u64 {
        self.in_flight.load(Ordering::Relaxed)
    }

    /// Returns `true` if the load `(coord, ticket)` has not been drained or cancelled.
    pub fn is_pending(&self, coord: LandCoord, ticket: u64) -> bool {
        self.active.contains_key(&(coord, ticket))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::database::MemoryDatabase;
    use crate::generator::{BiomeGenerator, generate_land};

    fn loader(threads: usize) -> (Arc<MemoryDatabase>, LandLoader) {
        let db = Arc::new(MemoryDatabase::new());
        let loader = LandLoader::new(db.clone(), Arc::new(BiomeGenerator::default()), threads, 32)
            .unwrap();
        (db, loader)
    }

    fn drain_until(loader: &LandLoader, count: usize) -> Vec<LoadCompletion> {
        let mut done = Vec::new();
        let deadline = Instant::now() + Duration::from_secs(10);
        while done.len() < count && Instant::now() < deadline {
            done.extend(loader.drain());
            if done.len() < count {
                std::thread::sleep(Duration::from_millis(5));
            }
        }
        done
    }

    #[test]
    fn test_submitted_loads_complete_and_persist() {
        let (db, loader) = loader(2);
        for i in 0..6 {
            let task = LoadTask {
                coord: LandCoord::new(i, -i),
                ticket: i as u64,
                seed: 3,
            };
            loader.submit(task).unwrap();
        }

        let done = drain_until(&loader, 6);
        assert_eq!(done.len(), 6);
        for completion in &done {
            let data = completion.result.as_ref().unwrap();
            assert_eq!(data, &generate_land(completion.coord, 3));
            assert!(db.contains(&completion.coord.storage_key()));
        }
    }

    #[test]
    fn test_drained_load_is_no_longer_pending() {
        let (_db, loader) = loader(1);
        let coord = LandCoord::new(1, 1);
        loader
            .submit(LoadTask {
                coord,
                ticket: 9,
                seed: 0,
            })
            .unwrap();
        let done = drain_until(&loader, 1);
        assert_eq!(done[0].ticket, 9);
        assert!(!loader.is_pending(coord, 9));
    }

    #[test]
    fn test_cancel_clears_pending() {
        let (_db, loader) = loader(1);
        let coord = LandCoord::new(40, 40);
        loader
            .submit(LoadTask {
                coord,
                ticket: 1,
                seed: 0,
            })
            .unwrap();
        loader.cancel(coord, 1);
        assert!(!loader.is_pending(coord, 1));
        // The load may already have finished; either way nothing panics.
        std::thread::sleep(Duration::from_millis(50));
        let _ = loader.drain();
    }

    #[test]
    fn test_in_flight_returns_to_zero() {
        let (_db, loader) = loader(1);
        for i in 0..4 {
            let _ = loader.submit(LoadTask {
                coord: LandCoord::new(i, 0),
                ticket: 0,
                seed: 0,
            });
        }
        let deadline = Instant::now() + Duration::from_secs(10);
        while loader.in_flight_count() > 0 && Instant::now() < deadline {
            let _ = loader.drain();
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(loader.in_flight_count(), 0);
    }
}
