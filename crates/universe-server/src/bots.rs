//! In-process simulated clients.
//!
//! Each bot owns a [`ClientWorld`] and walks a square around the spawn
//! point, turning at every corner, so the server sees steady movement,
//! land crossings and walk-state changes without a network transport.

use std::collections::BTreeMap;

use glam::DVec2;
use tracing::debug;
use universe_actor::{Direction, RunningState};
use universe_multiplayer::{ClientMessage, ClientWorld, ConnId, Envelope, InboundSender};

/// Ticks spent walking each side of the square.
const SIDE_TICKS: u64 = 40;

/// Per-tick step and facing for each side, in order.
const PATTERN: [(DVec2, Direction); 4] = [
    (DVec2::X, Direction::Right),
    (DVec2::Y, Direction::Back),
    (DVec2::NEG_X, Direction::Left),
    (DVec2::NEG_Y, Direction::Forward),
];

/// Side of the square a bot walks on `step`.
fn side(step: u64) -> usize {
    ((step / SIDE_TICKS) % PATTERN.len() as u64) as usize
}

struct Bot {
    world: ClientWorld,
    step: u64,
}

/// A fleet of bots sharing one server.
pub struct BotFleet {
    bots: BTreeMap<ConnId, Bot>,
    speed: f64,
}

impl BotFleet {
    /// Connects `count` bots. Each walks at `speed` units per tick, capped
    /// to `max_move`.
    pub fn connect(inbound: &InboundSender, count: u32, speed: f64, max_move: f64) -> Self {
        let mut bots = BTreeMap::new();
        for index in 0..count {
            let conn = inbound.connect();
            inbound.send(
                conn,
                ClientMessage::Login {
                    name: format!("bot-{index}"),
                },
            );
            bots.insert(
                conn,
                Bot {
                    world: ClientWorld::new(max_move),
                    step: 0,
                },
            );
        }
        Self {
            bots,
            speed: speed.min(max_move),
        }
    }

    /// Number of bots.
    pub fn len(&self) -> usize {
        self.bots.len()
    }

    /// Queues this tick's input for every logged-in bot.
    pub fn drive(&mut self, inbound: &InboundSender) {
        for (conn, bot) in &mut self.bots {
            if bot.world.me().is_none() {
                continue;
            }
            let (dir, facing) = PATTERN[side(bot.step)];
            if bot.step % SIDE_TICKS == 0 {
                inbound.send(
                    *conn,
                    ClientMessage::SetWalkState {
                        running: RunningState::Walking,
                        direction: facing,
                    },
                );
            }
            if let Some(message) = bot.world.pend_input(dir * self.speed) {
                inbound.send(*conn, message);
            }
            bot.step += 1;
        }
    }

    /// Hands server output to the addressed bots. Returns how many
    /// envelopes were for bots.
    pub fn deliver(&mut self, envelopes: &[Envelope]) -> usize {
        let mut delivered = 0;
        for envelope in envelopes {
            if let Some(bot) = self.bots.get_mut(&envelope.conn) {
                bot.world.apply(&envelope.message);
                delivered += 1;
            }
        }
        delivered
    }

    /// Largest distance between a bot's prediction and its last
    /// acknowledged position.
    pub fn max_prediction_error(&self) -> f64 {
        self.bots
            .values()
            .map(|bot| {
                let predictor = bot.world.predictor();
                predictor.predicted().pos.distance(predictor.authoritative().pos)
            })
            .fold(0.0, f64::max)
    }

    /// Disconnects every bot.
    pub fn disconnect_all(&mut self, inbound: &InboundSender) {
        for conn in self.bots.keys() {
            debug!(%conn, "bot disconnecting");
            inbound.disconnect(*conn);
        }
        self.bots.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use universe_config::Config;
    use universe_land::{BiomeGenerator, MemoryDatabase};
    use universe_multiplayer::GameServer;

    use super::*;

    #[test]
    fn test_pattern_turns_every_side() {
        assert_eq!(side(0), 0);
        assert_eq!(side(SIDE_TICKS - 1), 0);
        assert_eq!(side(SIDE_TICKS), 1);
        assert_eq!(side(SIDE_TICKS * 4), 0);
    }

    #[test]
    fn test_bots_walk_and_return() {
        let config = Config::default();
        let mut server = GameServer::new(
            &config,
            Arc::new(MemoryDatabase::new()),
            Arc::new(BiomeGenerator::default()),
            None,
        );
        let inbound = server.inbound();
        let mut fleet = BotFleet::connect(&inbound, 2, 0.5, config.server.max_move_per_input);
        assert_eq!(fleet.len(), 2);

        let out = server.tick();
        assert_eq!(fleet.deliver(&out), out.len());
        for _ in 0..SIDE_TICKS * 4 {
            fleet.drive(&inbound);
            let out = server.tick();
            fleet.deliver(&out);
        }
        assert_eq!(server.actors().len(), 2);
        for actor in server.actors().iter() {
            assert!(actor.pos().length() < 1e-9, "bot ended at {}", actor.pos());
        }
        assert_eq!(fleet.max_prediction_error(), 0.0);

        fleet.disconnect_all(&inbound);
        server.tick();
        assert!(server.actors().is_empty());
    }
}
