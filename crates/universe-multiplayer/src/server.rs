//! Authoritative server driver.
//!
//! Transports hand client traffic to an [`InboundSender`]; nothing touches
//! world state until [`GameServer::tick`] drains it. Each tick then runs the
//! simulation in a fixed order and returns the envelopes to deliver.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_channel::{Receiver, Sender, unbounded};
use glam::DVec2;
use tracing::{debug, info, trace, warn};
use universe_actor::{ActorEvent, ActorId, ActorInit, ActorKind, ActorStore};
use universe_config::{Config, ServerConfig, WorldConfig};
use universe_land::{
    LandDatabase, LandError, LandEvent, LandLoader, LandState, LandStore, TerrainGenerator,
};

use crate::error::ServerError;
use crate::messages::{ClientMessage, ConnId, Envelope, ServerMessage};
use crate::prediction::simulate_input;
use crate::visibility::{VisibilityManager, request_land};

// ---------------------------------------------------------------------------
// Inbound queue
// ---------------------------------------------------------------------------

/// Client traffic as seen by the tick thread.
#[derive(Clone, Debug, PartialEq)]
pub enum Inbound {
    /// A transport accepted a connection.
    Connected(ConnId),
    /// A connection sent a message.
    Message(ConnId, ClientMessage),
    /// A connection closed.
    Disconnected(ConnId),
}

/// Cloneable handle transports use to feed the server.
#[derive(Clone, Debug)]
pub struct InboundSender {
    tx: Sender<Inbound>,
    next_conn: Arc<AtomicU64>,
}

impl InboundSender {
    /// Allocates a connection id and announces it.
    pub fn connect(&self) -> ConnId {
        let conn = ConnId(self.next_conn.fetch_add(1, Ordering::Relaxed));
        let _ = self.tx.send(Inbound::Connected(conn));
        conn
    }

    /// Queues a message from `conn`.
    pub fn send(&self, conn: ConnId, message: ClientMessage) {
        let _ = self.tx.send(Inbound::Message(conn, message));
    }

    /// Queues the close of `conn`.
    pub fn disconnect(&self, conn: ConnId) {
        let _ = self.tx.send(Inbound::Disconnected(conn));
    }
}

// ---------------------------------------------------------------------------
// GameServer
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Session {
    actor: Option<ActorId>,
    last_seq: u64,
    ack_due: bool,
}

/// Owns the land and actor stores and drives them one tick at a time.
pub struct GameServer {
    world: WorldConfig,
    settings: ServerConfig,
    lands: LandStore,
    actors: ActorStore,
    visibility: VisibilityManager,
    loader: Option<LandLoader>,
    sessions: BTreeMap<ConnId, Session>,
    inbound_tx: Sender<Inbound>,
    inbound_rx: Receiver<Inbound>,
    next_conn: Arc<AtomicU64>,
    actor_events: Receiver<ActorEvent>,
    land_events: Receiver<LandEvent>,
    outbound: Receiver<Envelope>,
    outbound_tx: Sender<Envelope>,
    tick: u64,
}

impl GameServer {
    /// Builds a server over `database` and `generator`.
    ///
    /// With a `loader`, lands load on its workers and arrive in later ticks;
    /// without one they load inside the tick that needs them.
    pub fn new(
        config: &Config,
        database: Arc<dyn LandDatabase>,
        generator: Arc<dyn TerrainGenerator>,
        loader: Option<LandLoader>,
    ) -> Self {
        let (actor_tx, actor_events) = unbounded();
        let (land_tx, land_events) = unbounded();
        let (outbound_tx, outbound) = unbounded();
        let (inbound_tx, inbound_rx) = unbounded();

        info!(
            seed = config.world.seed,
            view_radius = config.world.view_radius,
            async_loading = loader.is_some(),
            "game server created"
        );

        Self {
            world: config.world.clone(),
            settings: config.server.clone(),
            lands: LandStore::new(config.world.seed, database, generator, land_tx),
            actors: ActorStore::new(actor_tx),
            visibility: VisibilityManager::new(config.world.view_radius, outbound_tx.clone()),
            loader,
            sessions: BTreeMap::new(),
            inbound_tx,
            inbound_rx,
            next_conn: Arc::new(AtomicU64::new(1)),
            actor_events,
            land_events,
            outbound,
            outbound_tx,
            tick: 0,
        }
    }

    /// Handle for transports. Clones share connection numbering.
    pub fn inbound(&self) -> InboundSender {
        InboundSender {
            tx: self.inbound_tx.clone(),
            next_conn: Arc::clone(&self.next_conn),
        }
    }

    /// Ticks completed so far.
    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    /// Entity store.
    pub fn actors(&self) -> &ActorStore {
        &self.actors
    }

    /// Land store.
    pub fn lands(&self) -> &LandStore {
        &self.lands
    }

    /// Visibility state.
    pub fn visibility(&self) -> &VisibilityManager {
        &self.visibility
    }

    /// Actor controlled by `conn`, if logged in.
    pub fn session_actor(&self, conn: ConnId) -> Option<ActorId> {
        self.sessions.get(&conn).and_then(|s| s.actor)
    }

    /// Open connections, logged in or not.
    pub fn connection_count(&self) -> usize {
        self.sessions.len()
    }

    /// Spawns a server-owned actor. Viewers learn of it on the next tick.
    pub fn spawn_actor(&mut self, init: ActorInit) -> ActorId {
        self.actors.spawn(&mut self.lands, init)
    }

    /// Damages an actor on behalf of game logic.
    pub fn damage_actor(
        &mut self,
        id: ActorId,
        cost: u32,
        from_rad: f64,
        power: f64,
    ) -> Result<u32, ServerError> {
        Ok(self.actors.damage(id, cost, from_rad, power)?)
    }

    /// Runs one simulation tick and returns the messages it produced.
    ///
    /// Order: inbound traffic, land completions, the actor sweep, actor
    /// event routing, land event routing, input acknowledgements, unused
    /// land release.
    pub fn tick(&mut self) -> Vec<Envelope> {
        self.tick += 1;

        let inbound: Vec<Inbound> = self.inbound_rx.try_iter().collect();
        for item in inbound {
            if let Err(e) = self.handle_inbound(item) {
                warn!(error = %e, "inbound message rejected");
            }
        }

        if let Some(loader) = &self.loader {
            for result in self.lands.poll_loads(loader) {
                match result {
                    Ok(coord) => trace!(%coord, "land load applied"),
                    Err(LandError::Cancelled(coord)) => debug!(%coord, "stale land load dropped"),
                    Err(e) => warn!(error = %e, "land load failed"),
                }
            }
        }

        self.actors.advance(&mut self.lands, self.tick);
        self.route_actor_events();
        self.route_land_events();
        self.send_acks();
        self.maintain_lands();
        self.route_land_events();

        self.outbound.try_iter().collect()
    }

    // -----------------------------------------------------------------------
    // Inbound handling
    // -----------------------------------------------------------------------

    fn handle_inbound(&mut self, item: Inbound) -> Result<(), ServerError> {
        match item {
            Inbound::Connected(conn) => {
                debug!(%conn, "connection opened");
                self.sessions.entry(conn).or_default();
                Ok(())
            }
            Inbound::Message(conn, message) => self.handle_message(conn, message),
            Inbound::Disconnected(conn) => self.disconnect(conn),
        }
    }

    fn handle_message(&mut self, conn: ConnId, message: ClientMessage) -> Result<(), ServerError> {
        if !self.sessions.contains_key(&conn) {
            return Err(ServerError::UnknownConnection(conn));
        }
        match message {
            ClientMessage::Login { name } => self.login(conn, name),
            ClientMessage::Move { seq, delta } => self.apply_move(conn, seq, delta),
            ClientMessage::SetWalkState { running, direction } => {
                let actor = self.logged_in(conn)?;
                self.actors
                    .set_walk_state(&mut self.lands, actor, running, direction)?;
                Ok(())
            }
            ClientMessage::StartUsing => {
                let actor = self.logged_in(conn)?;
                self.actors.start_using(actor)?;
                Ok(())
            }
            ClientMessage::EndUsing => {
                let actor = self.logged_in(conn)?;
                if let Some(ticks) = self.actors.end_using(actor)? {
                    debug!(%conn, %actor, ticks, "use ended");
                }
                Ok(())
            }
        }
    }

    fn logged_in(&self, conn: ConnId) -> Result<ActorId, ServerError> {
        self.sessions
            .get(&conn)
            .ok_or(ServerError::UnknownConnection(conn))?
            .actor
            .ok_or(ServerError::NotLoggedIn(conn))
    }

    fn login(&mut self, conn: ConnId, name: String) -> Result<(), ServerError> {
        let session = self
            .sessions
            .get(&conn)
            .ok_or(ServerError::UnknownConnection(conn))?;
        if session.actor.is_some() {
            return Err(ServerError::AlreadyLoggedIn(conn));
        }
        let players = self.sessions.values().filter(|s| s.actor.is_some()).count();
        if players >= self.settings.max_players as usize {
            return Err(ServerError::ServerFull {
                max: self.settings.max_players,
            });
        }

        let spawn = DVec2::new(self.world.spawn_x, self.world.spawn_y);
        let init = ActorInit::new(ActorKind::Player, spawn).with_name(name.clone());
        let actor = self.actors.spawn(&mut self.lands, init);
        if let Some(session) = self.sessions.get_mut(&conn) {
            session.actor = Some(actor);
        }

        let _ = self
            .outbound_tx
            .send(Envelope::new(conn, ServerMessage::LoginAcknowledged { actor }));
        self.visibility
            .add_viewer(conn, actor, &self.actors, &mut self.lands, self.loader.as_ref())?;
        info!(%conn, %actor, %name, "player logged in");
        Ok(())
    }

    fn apply_move(&mut self, conn: ConnId, seq: u64, delta: DVec2) -> Result<(), ServerError> {
        let actor = self.logged_in(conn)?;
        let Some(session) = self.sessions.get_mut(&conn) else {
            return Err(ServerError::UnknownConnection(conn));
        };
        if seq <= session.last_seq {
            trace!(%conn, seq, last = session.last_seq, "duplicate input ignored");
            return Ok(());
        }
        session.last_seq = seq;
        session.ack_due = true;

        let max = self.settings.max_move_per_input;
        let distance = delta.length();
        if !distance.is_finite() || distance > max {
            return Err(ServerError::MoveTooFast { distance, max });
        }
        if delta == DVec2::ZERO {
            return Ok(());
        }
        let pos = self.actors.actor(actor)?.pos();
        let target = simulate_input(pos, delta, max);
        self.actors.move_to(&mut self.lands, actor, target, true)?;
        Ok(())
    }

    fn disconnect(&mut self, conn: ConnId) -> Result<(), ServerError> {
        let session = self
            .sessions
            .remove(&conn)
            .ok_or(ServerError::UnknownConnection(conn))?;
        self.visibility.remove_viewer(conn);
        if let Some(actor) = session.actor {
            let removed = self.actors.despawn(&mut self.lands, actor)?;
            info!(%conn, %actor, removed = removed.len(), "player left");
        } else {
            debug!(%conn, "connection closed before login");
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Tick phases
    // -----------------------------------------------------------------------

    fn route_actor_events(&mut self) {
        let events: Vec<ActorEvent> = self.actor_events.try_iter().collect();
        for event in &events {
            if let Err(e) = self.visibility.route_actor_event(
                event,
                &self.actors,
                &mut self.lands,
                self.loader.as_ref(),
            ) {
                warn!(error = %e, "actor event routing failed");
            }
        }
    }

    fn route_land_events(&mut self) {
        let events: Vec<LandEvent> = self.land_events.try_iter().collect();
        for event in &events {
            self.visibility.route_land_event(event);
        }
    }

    fn send_acks(&mut self) {
        for (conn, session) in &mut self.sessions {
            if !session.ack_due {
                continue;
            }
            session.ack_due = false;
            let Some(actor) = session.actor.and_then(|id| self.actors.get(id)) else {
                continue;
            };
            let ack = ServerMessage::InputAck {
                seq: session.last_seq,
                pos: actor.pos(),
                motion: actor.motion(),
            };
            let _ = self.outbound_tx.send(Envelope::new(*conn, ack));
        }
    }

    /// Retries used lands that are not loaded and, when configured, releases
    /// lands no viewer uses.
    fn maintain_lands(&mut self) {
        let used = self.visibility.all_used();
        for &coord in &used {
            if self.lands.state(coord) == Some(LandState::Unloaded) {
                request_land(&mut self.lands, self.loader.as_ref(), coord);
            }
        }

        if !self.settings.unload_unused_lands {
            return;
        }
        let idle_loaded: Vec<_> = self
            .lands
            .loaded_coords()
            .filter(|c| !used.contains(c))
            .collect();
        for coord in idle_loaded {
            if let Err(e) = self.lands.unload(coord) {
                warn!(%coord, error = %e, "land unload failed");
            }
        }
        let idle_loading: Vec<_> = self
            .lands
            .loading_coords()
            .filter(|c| !used.contains(c))
            .collect();
        for coord in idle_loading {
            self.lands.cancel_load(coord, self.loader.as_ref());
        }
        self.lands.forget_idle(|c| used.contains(&c));
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
