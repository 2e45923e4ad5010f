//! Interest management: which lands each viewer uses and which actors are
//! spawned to it.
//!
//! A viewer uses every land within `view_radius` (Chebyshev) of the land its
//! actor stands in. An actor is spawned to a viewer exactly when the actor's
//! land is one of the viewer's used lands, and per-tick updates about an actor
//! only reach viewers it is spawned to. Spawns are re-derived whenever either
//! side changes: the viewer's used set, or the actor's land.

use std::collections::{BTreeMap, BTreeSet};

use crossbeam_channel::Sender;
use tracing::{debug, trace, warn};
use universe_actor::{Actor, ActorEvent, ActorId, ActorStore};
use universe_land::{LandCoord, LandData, LandEvent, LandLoader, LandStore};

use crate::error::ServerError;
use crate::messages::{ConnId, Envelope, ServerMessage};

// ---------------------------------------------------------------------------
// Viewer
// ---------------------------------------------------------------------------

/// Visibility state of one connection.
#[derive(Clone, Debug)]
pub struct Viewer {
    conn: ConnId,
    actor: ActorId,
    center: Option<LandCoord>,
    used: BTreeSet<LandCoord>,
    terrain_sent: BTreeSet<LandCoord>,
    spawned: BTreeSet<ActorId>,
}

impl Viewer {
    /// Connection.
    pub fn conn(&self) -> ConnId {
        self.conn
    }

    /// Actor the viewer sees from.
    pub fn actor(&self) -> ActorId {
        self.actor
    }

    /// Land the used set is centred on.
    pub fn center(&self) -> Option<LandCoord> {
        self.center
    }

    /// Lands currently in range.
    pub fn used_lands(&self) -> &BTreeSet<LandCoord> {
        &self.used
    }

    /// Used lands whose terrain the viewer currently holds.
    pub fn terrain_sent(&self) -> &BTreeSet<LandCoord> {
        &self.terrain_sent
    }

    /// Actors currently spawned to this viewer.
    pub fn spawned(&self) -> &BTreeSet<ActorId> {
        &self.spawned
    }

    /// Returns `true` if `id` is spawned to this viewer.
    pub fn is_spawned(&self, id: ActorId) -> bool {
        self.spawned.contains(&id)
    }
}

fn send(outbound: &Sender<Envelope>, conn: ConnId, message: ServerMessage) {
    let _ = outbound.send(Envelope::new(conn, message));
}

fn spawn_to(outbound: &Sender<Envelope>, viewer: &mut Viewer, actor: &Actor) {
    if viewer.spawned.insert(actor.id()) {
        trace!(conn = %viewer.conn, actor = %actor.id(), "actor spawned to viewer");
        send(
            outbound,
            viewer.conn,
            ServerMessage::ActorAdded {
                id: actor.id(),
                options: actor.construct_options(),
            },
        );
    }
}

fn send_terrain(outbound: &Sender<Envelope>, viewer: &mut Viewer, data: &LandData) {
    if viewer.terrain_sent.insert(data.coord) {
        send(outbound, viewer.conn, ServerMessage::LandLoaded { data: data.clone() });
    }
}

fn despawn_from(outbound: &Sender<Envelope>, viewer: &mut Viewer, id: ActorId) {
    if viewer.spawned.remove(&id) {
        trace!(conn = %viewer.conn, actor = %id, "actor despawned from viewer");
        send(outbound, viewer.conn, ServerMessage::ActorRemoved { id });
    }
}

/// Starts loading `coord`, on `loader` if given, otherwise in place.
pub(crate) fn request_land(lands: &mut LandStore, loader: Option<&LandLoader>, coord: LandCoord) {
    let result = match loader {
        Some(loader) => lands.request_load(coord, loader).map(|_| ()),
        None => lands.load(coord),
    };
    if let Err(e) = result {
        warn!(%coord, error = %e, "land load request failed");
    }
}

// ---------------------------------------------------------------------------
// VisibilityManager
// ---------------------------------------------------------------------------

/// Tracks every viewer's used lands and spawned actors, and addresses
/// replication messages accordingly.
pub struct VisibilityManager {
    viewers: BTreeMap<ConnId, Viewer>,
    view_radius: u32,
    outbound: Sender<Envelope>,
}

impl VisibilityManager {
    /// Manager using lands within `view_radius`, writing to `outbound`.
    pub fn new(view_radius: u32, outbound: Sender<Envelope>) -> Self {
        Self {
            viewers: BTreeMap::new(),
            view_radius,
            outbound,
        }
    }

    /// Radius in lands.
    pub fn view_radius(&self) -> u32 {
        self.view_radius
    }

    /// Viewer for `conn`.
    pub fn viewer(&self, conn: ConnId) -> Option<&Viewer> {
        self.viewers.get(&conn)
    }

    /// All viewers.
    pub fn viewers(&self) -> impl Iterator<Item = &Viewer> {
        self.viewers.values()
    }

    /// Number of viewers.
    pub fn len(&self) -> usize {
        self.viewers.len()
    }

    /// Returns `true` if there are no viewers.
    pub fn is_empty(&self) -> bool {
        self.viewers.is_empty()
    }

    /// Union of every viewer's used lands.
    pub fn all_used(&self) -> BTreeSet<LandCoord> {
        self.viewers
            .values()
            .flat_map(|v| v.used.iter().copied())
            .collect()
    }

    /// Registers a viewer seeing from `actor` and computes its initial sets.
    pub fn add_viewer(
        &mut self,
        conn: ConnId,
        actor: ActorId,
        actors: &ActorStore,
        lands: &mut LandStore,
        loader: Option<&LandLoader>,
    ) -> Result<(), ServerError> {
        actors.actor(actor)?;
        self.viewers.insert(
            conn,
            Viewer {
                conn,
                actor,
                center: None,
                used: BTreeSet::new(),
                terrain_sent: BTreeSet::new(),
                spawned: BTreeSet::new(),
            },
        );
        debug!(%conn, %actor, "viewer added");
        self.recompute_for_viewer(conn, actors, lands, loader)
    }

    /// Forgets a viewer. Nothing is sent; the connection is gone.
    pub fn remove_viewer(&mut self, conn: ConnId) -> Option<Viewer> {
        let viewer = self.viewers.remove(&conn);
        if viewer.is_some() {
            debug!(%conn, "viewer removed");
        }
        viewer
    }

    /// Recomputes `conn`'s used lands from its actor's position.
    ///
    /// Lands entering range are ensured and loaded (terrain is sent at once
    /// if already loaded, otherwise when the load completes). Lands leaving
    /// range are released to the viewer; whether they unload is decided
    /// elsewhere. Spawns are then re-derived against the new set.
    pub fn recompute_for_viewer(
        &mut self,
        conn: ConnId,
        actors: &ActorStore,
        lands: &mut LandStore,
        loader: Option<&LandLoader>,
    ) -> Result<(), ServerError> {
        let radius = self.view_radius;
        let outbound = &self.outbound;
        let viewer = self
            .viewers
            .get_mut(&conn)
            .ok_or(ServerError::UnknownConnection(conn))?;
        let center = actors.actor(viewer.actor)?.land();
        let next: BTreeSet<LandCoord> = center.within_radius(radius).collect();
        if viewer.center == Some(center) && viewer.used == next {
            return Ok(());
        }

        let gained: Vec<LandCoord> = next.difference(&viewer.used).copied().collect();
        let lost: Vec<LandCoord> = viewer.used.difference(&next).copied().collect();
        viewer.center = Some(center);
        viewer.used = next;

        for coord in lost {
            trace!(%conn, %coord, "land no longer used");
            viewer.terrain_sent.remove(&coord);
            send(outbound, conn, ServerMessage::LandUnloaded { coord });
        }
        for &coord in &gained {
            trace!(%conn, %coord, "land used");
            lands.ensure(coord);
            match lands.terrain(coord) {
                Some(data) => send_terrain(outbound, viewer, data),
                None => request_land(lands, loader, coord),
            }
        }

        let out_of_range: Vec<ActorId> = viewer
            .spawned
            .iter()
            .copied()
            .filter(|id| actors.get(*id).is_none_or(|a| !viewer.used.contains(&a.land())))
            .collect();
        for id in out_of_range {
            despawn_from(outbound, viewer, id);
        }
        let in_range: Vec<LandCoord> = viewer.used.iter().copied().collect();
        for coord in in_range {
            for id in lands.actors_in(coord) {
                if let Some(actor) = actors.get(id) {
                    spawn_to(outbound, viewer, actor);
                }
            }
        }

        debug!(%conn, %center, gained = gained.len(), "viewer recomputed");
        Ok(())
    }

    /// Spawns a new actor to every viewer using its land.
    pub fn on_actor_added(&mut self, id: ActorId, actors: &ActorStore) {
        let Some(actor) = actors.get(id) else {
            return;
        };
        let land = actor.land();
        for viewer in self.viewers.values_mut() {
            if viewer.used.contains(&land) {
                spawn_to(&self.outbound, viewer, actor);
            }
        }
    }

    /// Despawns a removed actor from every viewer that had it.
    pub fn on_actor_removed(&mut self, id: ActorId) {
        for viewer in self.viewers.values_mut() {
            despawn_from(&self.outbound, viewer, id);
        }
    }

    /// Re-derives spawns for an actor that changed land. Viewers seeing from
    /// that actor are recomputed first.
    pub fn on_actor_crossed(
        &mut self,
        id: ActorId,
        actors: &ActorStore,
        lands: &mut LandStore,
        loader: Option<&LandLoader>,
    ) -> Result<(), ServerError> {
        let Some(actor) = actors.get(id) else {
            return Ok(());
        };
        let controlling: Vec<ConnId> = self
            .viewers
            .values()
            .filter(|v| v.actor == id)
            .map(Viewer::conn)
            .collect();
        for conn in controlling {
            self.recompute_for_viewer(conn, actors, lands, loader)?;
        }

        let land = actor.land();
        for viewer in self.viewers.values_mut() {
            if viewer.used.contains(&land) {
                spawn_to(&self.outbound, viewer, actor);
            } else {
                despawn_from(&self.outbound, viewer, id);
            }
        }
        Ok(())
    }

    /// Applies one entity store event: lifecycle and land crossings update
    /// spawns, everything else is forwarded to viewers the actor is
    /// spawned to.
    ///
    /// Input-driven position updates skip the controlling viewer, which is
    /// kept in sync by input acknowledgements instead.
    pub fn route_actor_event(
        &mut self,
        event: &ActorEvent,
        actors: &ActorStore,
        lands: &mut LandStore,
        loader: Option<&LandLoader>,
    ) -> Result<(), ServerError> {
        match *event {
            ActorEvent::Added { id } => self.on_actor_added(id, actors),
            ActorEvent::Removed { id } => self.on_actor_removed(id),
            ActorEvent::CrossedLand { id, .. } => self.on_actor_crossed(id, actors, lands, loader)?,
            _ => {
                let Some(message) = ServerMessage::from_update(event) else {
                    return Ok(());
                };
                let subject = event.subject();
                let skip_controller = matches!(
                    event,
                    ActorEvent::NewPosition {
                        control_moved: true,
                        ..
                    }
                );
                for viewer in self.viewers.values() {
                    if !viewer.spawned.contains(&subject) {
                        continue;
                    }
                    if skip_controller && viewer.actor == subject {
                        continue;
                    }
                    send(&self.outbound, viewer.conn, message.clone());
                }
            }
        }
        Ok(())
    }

    /// Forwards land load state to viewers using the land. Terrain already
    /// handed to a viewer is not sent again.
    pub fn route_land_event(&mut self, event: &LandEvent) {
        let outbound = &self.outbound;
        match event {
            LandEvent::Loaded { coord, data } => {
                for viewer in self.viewers.values_mut().filter(|v| v.used.contains(coord)) {
                    send_terrain(outbound, viewer, data);
                }
            }
            LandEvent::Unloaded { coord } => {
                for viewer in self.viewers.values_mut().filter(|v| v.used.contains(coord)) {
                    viewer.terrain_sent.remove(coord);
                    send(outbound, viewer.conn, ServerMessage::LandUnloaded { coord: *coord });
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
