//! Entity store for the simulated world.
//!
//! Actors live in an id-keyed arena owned by [`ActorStore`]. All mutation goes
//! through store operations, which set per-actor dirty bits; the once-per-tick
//! [`ActorStore::advance`] sweep turns those bits into [`ActorEvent`]s on the
//! channel handed to the store at construction. Attachments form a forest
//! stored as id relations, and collision queries run read-only against the
//! same arena.

mod actor;
pub mod collision;
mod error;
mod event;
mod kind;
pub mod schema;
mod store;

pub use actor::{Actor, ActorInit, CONTROL_MOVE_DIRTY, MOVE_DIRTY, WALK_DIRTY};
pub use collision::{Aabb, BROAD_PHASE_RADIUS, Collision, ConvexPolygon, Penetration};
pub use error::ActorError;
pub use event::ActorEvent;
pub use kind::{
    ActorKind, AttachKey, Direction, KindProfile, RunningState, constrain_rotation,
    normalize_angle,
};
pub use schema::{ConstructOptions, FieldSchema, FieldValue};
pub use store::{ActorStore, MOTION_EPSILON};
pub use universe_land::ActorId;
