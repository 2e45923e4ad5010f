//! Client-side mirror of the replicated world.

use std::collections::BTreeMap;

use glam::DVec2;
use tracing::debug;
use universe_actor::{
    ActorId, ActorKind, AttachKey, ConstructOptions, Direction, FieldValue, RunningState,
};
use universe_land::{LandCoord, LandData};

use crate::messages::{ClientMessage, ServerMessage};
use crate::prediction::{PredictedState, PredictionPhase, Predictor};

/// Local copy of one replicated actor.
#[derive(Clone, Debug, PartialEq)]
pub struct MirrorActor {
    pub kind: Option<ActorKind>,
    pub name: String,
    pub pos: DVec2,
    pub motion: DVec2,
    pub rotation: f64,
    pub direction: Direction,
    pub running: RunningState,
    /// `None` for kinds whose health is not replicated.
    pub health: Option<u32>,
    pub using: bool,
    pub attachments: BTreeMap<AttachKey, ActorId>,
}

impl MirrorActor {
    fn from_options(options: &ConstructOptions) -> Self {
        let mut actor = Self {
            kind: options.kind(),
            name: options.name().unwrap_or_default().to_string(),
            pos: options.pos().map_or(DVec2::ZERO, DVec2::from_array),
            motion: DVec2::ZERO,
            rotation: 0.0,
            direction: Direction::default(),
            running: RunningState::default(),
            health: None,
            using: false,
            attachments: options
                .attachments()
                .map(|list| list.iter().copied().collect())
                .unwrap_or_default(),
        };
        for (name, value) in &options.fields {
            match (name.as_str(), value) {
                ("motion", FieldValue::Vec2(v)) => actor.motion = DVec2::from_array(*v),
                ("rotation", FieldValue::Float(r)) => actor.rotation = *r,
                ("direction", FieldValue::Direction(d)) => actor.direction = *d,
                ("running", FieldValue::Running(r)) => actor.running = *r,
                ("health", FieldValue::Count(h)) => actor.health = u32::try_from(*h).ok(),
                ("using", FieldValue::Flag(u)) => actor.using = *u,
                _ => {}
            }
        }
        actor
    }
}

/// Everything a client knows: visible actors, visible terrain and the
/// prediction state of its own actor.
#[derive(Debug)]
pub struct ClientWorld {
    actors: BTreeMap<ActorId, MirrorActor>,
    lands: BTreeMap<LandCoord, LandData>,
    me: Option<ActorId>,
    predictor: Predictor,
}

impl ClientWorld {
    /// Empty mirror. `max_move` must match the server's per-input limit.
    pub fn new(max_move: f64) -> Self {
        Self {
            actors: BTreeMap::new(),
            lands: BTreeMap::new(),
            me: None,
            predictor: Predictor::new(DVec2::ZERO, max_move),
        }
    }

    /// Actor this client controls, once logged in.
    pub fn me(&self) -> Option<ActorId> {
        self.me
    }

    /// Mirrored actor.
    pub fn actor(&self, id: ActorId) -> Option<&MirrorActor> {
        self.actors.get(&id)
    }

    /// All mirrored actors.
    pub fn actors(&self) -> &BTreeMap<ActorId, MirrorActor> {
        &self.actors
    }

    /// Terrain of every land the server reports in range.
    pub fn lands(&self) -> &BTreeMap<LandCoord, LandData> {
        &self.lands
    }

    /// Prediction state of the controlled actor.
    pub fn predictor(&self) -> &Predictor {
        &self.predictor
    }

    /// Predicted position of the controlled actor.
    pub fn predicted_position(&self) -> Option<DVec2> {
        self.me.map(|_| self.predictor.predicted().pos)
    }

    fn sync_own_mirror(&mut self) {
        let predicted = self.predictor.predicted();
        if let Some(actor) = self.me.and_then(|id| self.actors.get_mut(&id)) {
            actor.pos = predicted.pos;
            actor.motion = predicted.motion;
        }
    }

    /// Predicts a movement input and returns the message to send, or `None`
    /// before login.
    pub fn pend_input(&mut self, delta: DVec2) -> Option<ClientMessage> {
        self.me?;
        let record = self.predictor.pend_input(delta);
        self.sync_own_mirror();
        Some(ClientMessage::Move {
            seq: record.seq,
            delta,
        })
    }

    /// Applies one server message.
    ///
    /// Position updates for the controlled actor are taken only while no
    /// inputs are pending; otherwise the next acknowledgement reconciles.
    pub fn apply(&mut self, message: &ServerMessage) {
        match message {
            ServerMessage::LoginAcknowledged { actor } => {
                self.me = Some(*actor);
                if let Some(pos) = self.actors.get(actor).map(|a| a.pos) {
                    self.predictor.reset(pos);
                }
                debug!(%actor, "logged in");
            }
            ServerMessage::ActorAdded { id, options } => {
                let mirror = MirrorActor::from_options(options);
                if self.me == Some(*id) {
                    self.predictor.reset(mirror.pos);
                }
                self.actors.insert(*id, mirror);
            }
            ServerMessage::ActorRemoved { id } => {
                self.actors.remove(id);
            }
            ServerMessage::NewPosition { id, pos, motion } => {
                if self.me == Some(*id) {
                    if self.predictor.phase() == PredictionPhase::Idle {
                        let seq = self.predictor.last_acked().unwrap_or(0);
                        self.predictor.apply_ack(
                            seq,
                            PredictedState {
                                pos: *pos,
                                motion: *motion,
                            },
                        );
                        self.sync_own_mirror();
                    }
                } else if let Some(actor) = self.actors.get_mut(id) {
                    actor.pos = *pos;
                    actor.motion = *motion;
                }
            }
            ServerMessage::WalkStateChanged {
                id,
                running,
                direction,
            } => {
                if let Some(actor) = self.actors.get_mut(id) {
                    actor.running = *running;
                    actor.direction = *direction;
                }
            }
            ServerMessage::AttachmentSet { target, key, child } => {
                if let Some(actor) = self.actors.get_mut(target) {
                    actor.attachments.insert(*key, *child);
                }
            }
            ServerMessage::AttachmentRemoved { target, key, .. } => {
                if let Some(actor) = self.actors.get_mut(target) {
                    actor.attachments.remove(key);
                }
            }
            ServerMessage::Damaged { id, health } => {
                if let Some(actor) = self.actors.get_mut(id) {
                    actor.health = Some(*health);
                }
            }
            ServerMessage::UsingToggled { id, started, .. } => {
                if let Some(actor) = self.actors.get_mut(id) {
                    actor.using = *started;
                }
            }
            ServerMessage::RotationSet { id, rotation } => {
                if let Some(actor) = self.actors.get_mut(id) {
                    actor.rotation = *rotation;
                }
            }
            ServerMessage::LandLoaded { data } => {
                self.lands.insert(data.coord, data.clone());
            }
            ServerMessage::LandUnloaded { coord } => {
                self.lands.remove(coord);
            }
            ServerMessage::InputAck { seq, pos, motion } => {
                self.predictor.apply_ack(
                    *seq,
                    PredictedState {
                        pos: *pos,
                        motion: *motion,
                    },
                );
                self.sync_own_mirror();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crossbeam_channel::unbounded;
    use universe_actor::{ActorInit, ActorStore};
    use universe_land::{BiomeGenerator, LandStore, MemoryDatabase};

    use super::*;

    fn options_for(kind: ActorKind, name: &str, x: f64, y: f64) -> ConstructOptions {
        let mut fields = BTreeMap::new();
        fields.insert("kind".to_string(), FieldValue::Kind(kind));
        fields.insert("name".to_string(), FieldValue::Text(name.to_string()));
        fields.insert("pos".to_string(), FieldValue::Vec2([x, y]));
        fields.insert("health".to_string(), FieldValue::Count(100));
        ConstructOptions { fields }
    }

    fn logged_in(pos: DVec2) -> ClientWorld {
        let mut world = ClientWorld::new(1.0);
        let me = ActorId(1);
        world.apply(&ServerMessage::LoginAcknowledged { actor: me });
        world.apply(&ServerMessage::ActorAdded {
            id: me,
            options: options_for(ActorKind::Player, "me", pos.x, pos.y),
        });
        world
    }

    #[test]
    fn test_login_then_spawn_seeds_prediction() {
        let world = logged_in(DVec2::new(2.0, 3.0));
        assert_eq!(world.me(), Some(ActorId(1)));
        assert_eq!(world.predicted_position(), Some(DVec2::new(2.0, 3.0)));
        let me = world.actor(ActorId(1)).unwrap();
        assert_eq!(me.name, "me");
        assert_eq!(me.health, Some(100));
    }

    #[test]
    fn test_input_before_login_is_refused() {
        let mut world = ClientWorld::new(1.0);
        assert!(world.pend_input(DVec2::X).is_none());
    }

    #[test]
    fn test_input_moves_mirror_and_ack_reconciles() {
        let mut world = logged_in(DVec2::ZERO);
        let msg = world.pend_input(DVec2::new(0.5, 0.0)).unwrap();
        assert_eq!(
            msg,
            ClientMessage::Move {
                seq: 1,
                delta: DVec2::new(0.5, 0.0),
            }
        );
        world.pend_input(DVec2::new(0.5, 0.0));
        assert_eq!(world.actor(ActorId(1)).unwrap().pos, DVec2::new(1.0, 0.0));

        // Server only saw the first input so far, and it was blocked.
        world.apply(&ServerMessage::InputAck {
            seq: 1,
            pos: DVec2::ZERO,
            motion: DVec2::ZERO,
        });
        assert_eq!(world.predicted_position(), Some(DVec2::new(0.5, 0.0)));
        assert_eq!(world.predictor().phase(), PredictionPhase::Predicting);
    }

    #[test]
    fn test_own_position_updates_wait_for_ack() {
        let mut world = logged_in(DVec2::ZERO);
        world.pend_input(DVec2::X);
        world.apply(&ServerMessage::NewPosition {
            id: ActorId(1),
            pos: DVec2::new(-5.0, 0.0),
            motion: DVec2::ZERO,
        });
        assert_eq!(world.predicted_position(), Some(DVec2::X));

        world.apply(&ServerMessage::InputAck {
            seq: 1,
            pos: DVec2::X,
            motion: DVec2::ZERO,
        });
        // Idle now: a knockback update applies.
        world.apply(&ServerMessage::NewPosition {
            id: ActorId(1),
            pos: DVec2::new(1.75, 0.0),
            motion: DVec2::new(0.5, 0.0),
        });
        assert_eq!(world.predicted_position(), Some(DVec2::new(1.75, 0.0)));
    }

    #[test]
    fn test_other_actors_follow_updates() {
        let mut world = logged_in(DVec2::ZERO);
        let other = ActorId(2);
        world.apply(&ServerMessage::ActorAdded {
            id: other,
            options: options_for(ActorKind::Player, "bob", 4.0, 4.0),
        });
        world.apply(&ServerMessage::NewPosition {
            id: other,
            pos: DVec2::new(5.0, 4.0),
            motion: DVec2::ZERO,
        });
        world.apply(&ServerMessage::WalkStateChanged {
            id: other,
            running: RunningState::Walking,
            direction: Direction::Right,
        });
        world.apply(&ServerMessage::AttachmentSet {
            target: other,
            key: AttachKey::RightHand,
            child: ActorId(3),
        });
        world.apply(&ServerMessage::Damaged {
            id: other,
            health: 40,
        });
        let bob = world.actor(other).unwrap();
        assert_eq!(bob.pos, DVec2::new(5.0, 4.0));
        assert_eq!(bob.direction, Direction::Right);
        assert_eq!(bob.attachments.get(&AttachKey::RightHand), Some(&ActorId(3)));
        assert_eq!(bob.health, Some(40));

        world.apply(&ServerMessage::ActorRemoved { id: other });
        assert!(world.actor(other).is_none());
    }

    #[test]
    fn test_land_terrain_comes_and_goes() {
        let mut world = ClientWorld::new(1.0);
        let coord = LandCoord::new(3, -2);
        world.apply(&ServerMessage::LandLoaded {
            data: LandData {
                coord,
                bricks: Vec::new(),
            },
        });
        assert!(world.lands().contains_key(&coord));
        world.apply(&ServerMessage::LandUnloaded { coord });
        assert!(world.lands().is_empty());
    }

    #[test]
    fn test_mirror_from_real_construct_options() {
        let (tx, _rx) = unbounded();
        let (land_tx, _land_rx) = unbounded();
        let mut lands = LandStore::new(
            1,
            Arc::new(MemoryDatabase::new()),
            Arc::new(BiomeGenerator::default()),
            land_tx,
        );
        let mut actors = ActorStore::new(tx);
        let id = actors.spawn(&mut lands, ActorInit::new(ActorKind::Bow, DVec2::new(1.0, 2.0)));
        let options = actors.get(id).unwrap().construct_options();
        let mirror = MirrorActor::from_options(&options);
        assert_eq!(mirror.kind, Some(ActorKind::Bow));
        assert_eq!(mirror.pos, DVec2::new(1.0, 2.0));
        assert_eq!(mirror.health, None);
    }
}
