//! Server-authoritative multiplayer on top of the land and actor stores:
//! protocol messages, interest-managed replication, the per-tick server
//! driver, and client-side prediction with reconciliation.

mod client;
mod error;
pub mod messages;
pub mod prediction;
mod server;
mod tick;
mod visibility;

pub use client::{ClientWorld, MirrorActor};
pub use error::{ServerError, WireError};
pub use messages::{ClientMessage, ConnId, Envelope, PROTOCOL_VERSION, ServerMessage, decode, encode};
pub use prediction::{InputBuffer, InputRecord, PredictedState, PredictionPhase, Predictor, simulate_input};
pub use server::{GameServer, Inbound, InboundSender};
pub use tick::ServerTickSchedule;
pub use visibility::{Viewer, VisibilityManager};
