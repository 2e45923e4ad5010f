//! The authoritative actor table and its per-tick sweep.

use std::collections::BTreeMap;

use crossbeam_channel::Sender;
use glam::DVec2;
use tracing::{debug, trace};
use universe_land::{ActorId, LandCoord, LandStore};

use crate::actor::{ANY_MOVE_DIRTY, Actor, ActorInit, CONTROL_MOVE_DIRTY, MOVE_DIRTY, WALK_DIRTY};
use crate::error::ActorError;
use crate::event::ActorEvent;
use crate::kind::{AttachKey, Direction, RunningState, constrain_rotation, normalize_angle};

/// Motion at or below this magnitude snaps to zero during decay.
pub const MOTION_EPSILON: f64 = 0.1;

/// Arena of actors keyed by id.
///
/// Every mutation goes through a method here. Land membership is kept in the
/// [`LandStore`] passed to each position-changing call.
pub struct ActorStore {
    actors: BTreeMap<ActorId, Actor>,
    next_id: u64,
    events: Sender<ActorEvent>,
}

impl ActorStore {
    /// Creates an empty store publishing to `events`.
    pub fn new(events: Sender<ActorEvent>) -> Self {
        Self {
            actors: BTreeMap::new(),
            next_id: 1,
            events,
        }
    }

    fn emit(&self, event: ActorEvent) {
        let _ = self.events.send(event);
    }

    /// Fails unless every value is finite.
    fn require_finite(id: ActorId, values: &[f64], reason: &'static str) -> Result<(), ActorError> {
        if values.iter().all(|v| v.is_finite()) {
            Ok(())
        } else {
            Err(ActorError::InvalidState { id, reason })
        }
    }

    /// Actor by id.
    pub fn get(&self, id: ActorId) -> Option<&Actor> {
        self.actors.get(&id)
    }

    /// Actor by id, or [`ActorError::NotFound`].
    pub fn actor(&self, id: ActorId) -> Result<&Actor, ActorError> {
        self.actors.get(&id).ok_or(ActorError::NotFound(id))
    }

    fn actor_mut(&mut self, id: ActorId) -> Result<&mut Actor, ActorError> {
        self.actors.get_mut(&id).ok_or(ActorError::NotFound(id))
    }

    /// Returns `true` if `id` exists.
    pub fn contains(&self, id: ActorId) -> bool {
        self.actors.contains_key(&id)
    }

    /// Number of actors.
    pub fn len(&self) -> usize {
        self.actors.len()
    }

    /// Returns `true` if there are no actors.
    pub fn is_empty(&self) -> bool {
        self.actors.is_empty()
    }

    /// All actors in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Actor> {
        self.actors.values()
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Creates an actor and records it in its land.
    pub fn spawn(&mut self, lands: &mut LandStore, init: ActorInit) -> ActorId {
        let id = ActorId(self.next_id);
        self.next_id += 1;

        let actor = Actor::new(id, init);
        lands.insert_actor(id, actor.land);
        debug!(actor = %id, kind = ?actor.kind, land = %actor.land, "actor spawned");
        self.actors.insert(id, actor);
        self.emit(ActorEvent::Added { id });
        id
    }

    /// Removes an actor and, recursively, everything attached to it.
    ///
    /// Returns the removed ids, the requested actor first. Despawning an
    /// unknown id removes nothing.
    pub fn despawn(&mut self, lands: &mut LandStore, id: ActorId) -> Result<Vec<ActorId>, ActorError> {
        let Some(actor) = self.actors.get(&id) else {
            trace!(actor = %id, "despawn of unknown actor ignored");
            return Ok(Vec::new());
        };
        if let Some((parent, key)) = actor.attaching {
            self.detach(parent, key);
        }

        let mut removed = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            let Some(actor) = self.actors.remove(&next) else {
                continue;
            };
            stack.extend(actor.attachments.values().rev().copied());
            lands.remove_actor(next, actor.land);
            self.emit(ActorEvent::Removed { id: next });
            removed.push(next);
        }
        debug!(actor = %id, count = removed.len(), "actor despawned");
        Ok(removed)
    }

    // -----------------------------------------------------------------------
    // Movement
    // -----------------------------------------------------------------------

    /// Moves an actor to `target`.
    ///
    /// `control` marks input-driven movement. Attached actors follow their
    /// parent and cannot be moved directly.
    pub fn move_to(
        &mut self,
        lands: &mut LandStore,
        id: ActorId,
        target: DVec2,
        control: bool,
    ) -> Result<(), ActorError> {
        if self.actor(id)?.attaching.is_some() {
            return Err(ActorError::InvalidState {
                id,
                reason: "attached actors follow their parent",
            });
        }
        Self::require_finite(id, &[target.x, target.y], "move target is not finite")?;
        self.commit_move(lands, id, target, control);
        self.sync_attachments(lands, id);
        Ok(())
    }

    fn commit_move(&mut self, lands: &mut LandStore, id: ActorId, target: DVec2, control: bool) {
        let Some(actor) = self.actors.get_mut(&id) else {
            return;
        };
        actor.last_pos = actor.pos;
        actor.pos = target;
        actor.dirty |= if control { CONTROL_MOVE_DIRTY } else { MOVE_DIRTY };

        let from = actor.land;
        let to = LandCoord::of_position(target);
        if from != to {
            actor.land = to;
            lands.move_actor(id, from, to);
            trace!(actor = %id, %from, %to, "actor crossed land");
            self.emit(ActorEvent::CrossedLand { id, from, to });
        }
    }

    /// Places every descendant of `id` at its parent's position plus the
    /// parent's direction-indexed offset.
    fn sync_attachments(&mut self, lands: &mut LandStore, id: ActorId) {
        let Some(parent) = self.actors.get(&id) else {
            return;
        };
        let profile = parent.kind.profile();
        let placements: Vec<(ActorId, DVec2)> = parent
            .attachments
            .iter()
            .map(|(key, child)| (*child, parent.pos + profile.attach_offset(*key, parent.direction)))
            .collect();

        for (child, target) in placements {
            if self.actors.get(&child).is_some_and(|c| c.pos != target) {
                self.commit_move(lands, child, target, false);
            }
            self.sync_attachments(lands, child);
        }
    }

    /// Replaces an actor's motion vector.
    pub fn set_motion(&mut self, id: ActorId, motion: DVec2) -> Result<(), ActorError> {
        let actor = self.actor_mut(id)?;
        if actor.attaching.is_some() {
            return Err(ActorError::InvalidState {
                id,
                reason: "attached actors have no motion of their own",
            });
        }
        Self::require_finite(id, &[motion.x, motion.y], "motion is not finite")?;
        actor.motion = motion;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Walk state and rotation
    // -----------------------------------------------------------------------

    /// Updates running state and facing. Returns `false` if nothing changed.
    pub fn set_walk_state(
        &mut self,
        lands: &mut LandStore,
        id: ActorId,
        running: RunningState,
        direction: Direction,
    ) -> Result<bool, ActorError> {
        let actor = self.actor_mut(id)?;
        if actor.running == running && actor.direction == direction {
            return Ok(false);
        }
        let turned = actor.direction != direction;
        actor.running = running;
        actor.direction = direction;
        actor.dirty |= WALK_DIRTY;

        if turned {
            self.resolve_attachment_rotation(id);
            self.sync_attachments(lands, id);
        }
        Ok(true)
    }

    /// Sets rotation, normalized to `[0, 2π)`.
    pub fn set_rotation(&mut self, id: ActorId, rotation: f64) -> Result<(), ActorError> {
        Self::require_finite(id, &[rotation], "rotation is not finite")?;
        let rotation = normalize_angle(rotation);
        let actor = self.actor_mut(id)?;
        if actor.rotation == rotation {
            return Ok(());
        }
        actor.rotation = rotation;
        self.emit(ActorEvent::RotationSet { id, rotation });
        Ok(())
    }

    /// Clamps each child's rotation to the arc of the parent's facing.
    fn resolve_attachment_rotation(&mut self, id: ActorId) {
        let Some(parent) = self.actors.get(&id) else {
            return;
        };
        let direction = parent.direction;
        let children: Vec<ActorId> = parent.attachments.values().copied().collect();

        for child in children {
            let Some(actor) = self.actors.get_mut(&child) else {
                continue;
            };
            let rotation = constrain_rotation(direction, actor.rotation);
            if rotation != actor.rotation {
                actor.rotation = rotation;
                self.emit(ActorEvent::RotationSet { id: child, rotation });
            }
        }
    }

    // -----------------------------------------------------------------------
    // Combat
    // -----------------------------------------------------------------------

    /// Applies damage and knockback. Returns remaining health.
    ///
    /// Health floors at zero. The knockback motion is `power` along
    /// `from_rad`; attached actors take the damage but not the knockback.
    pub fn damage(
        &mut self,
        id: ActorId,
        cost: u32,
        from_rad: f64,
        power: f64,
    ) -> Result<u32, ActorError> {
        Self::require_finite(id, &[from_rad, power], "knockback is not finite")?;
        let actor = self.actor_mut(id)?;
        actor.health = actor.health.saturating_sub(cost);

        let knockback = if actor.attaching.is_none() {
            DVec2::new(from_rad.cos(), from_rad.sin()) * power
        } else {
            DVec2::ZERO
        };
        if actor.attaching.is_none() {
            actor.motion = knockback;
        }
        let health = actor.health;

        debug!(actor = %id, cost, health, "actor damaged");
        self.emit(ActorEvent::Damaged {
            id,
            health,
            knockback,
        });
        Ok(health)
    }

    // -----------------------------------------------------------------------
    // Attachments
    // -----------------------------------------------------------------------

    /// Returns `true` if `ancestor` is reachable from `id` by following parents.
    pub fn is_ancestor(&self, ancestor: ActorId, id: ActorId) -> bool {
        let mut current = self.actors.get(&id).and_then(|a| a.attaching);
        let mut steps = 0;
        while let Some((parent, _)) = current {
            if parent == ancestor {
                return true;
            }
            steps += 1;
            if steps > self.actors.len() {
                break;
            }
            current = self.actors.get(&parent).and_then(|a| a.attaching);
        }
        false
    }

    /// Unlinks whatever is attached to `target` at `key`.
    fn detach(&mut self, target: ActorId, key: AttachKey) -> Option<ActorId> {
        let child = self.actors.get_mut(&target)?.attachments.remove(&key)?;
        if let Some(actor) = self.actors.get_mut(&child) {
            actor.attaching = None;
        }
        self.emit(ActorEvent::AttachmentRemoved { target, key, child });
        Some(child)
    }

    /// Attaches `child` under `target` at `key`.
    ///
    /// Any actor already in the slot is detached (not removed), and `child`
    /// is detached from its previous parent. Fails with
    /// [`ActorError::CycleDetected`] if `child` is `target` or one of its
    /// ancestors; state is unchanged on failure.
    pub fn set_attachment(
        &mut self,
        lands: &mut LandStore,
        target: ActorId,
        key: AttachKey,
        child: ActorId,
    ) -> Result<(), ActorError> {
        let current = self.actor(target)?.attachments.get(&key).copied();
        let previous_parent = self.actor(child)?.attaching;
        if target == child || self.is_ancestor(child, target) {
            return Err(ActorError::CycleDetected { target, child });
        }
        if current == Some(child) {
            return Ok(());
        }

        if current.is_some() {
            self.detach(target, key);
        }
        if let Some((parent, old_key)) = previous_parent {
            self.detach(parent, old_key);
        }

        self.actor_mut(target)?.attachments.insert(key, child);
        let actor = self.actor_mut(child)?;
        actor.attaching = Some((target, key));
        actor.motion = DVec2::ZERO;

        debug!(%target, ?key, %child, "attachment set");
        self.emit(ActorEvent::AttachmentSet { target, key, child });
        self.sync_attachments(lands, target);
        Ok(())
    }

    /// Detaches the actor at `target`/`key`. Returns it, or `None` if the
    /// slot was empty.
    pub fn remove_attachment(
        &mut self,
        target: ActorId,
        key: AttachKey,
    ) -> Result<Option<ActorId>, ActorError> {
        self.actor(target)?;
        Ok(self.detach(target, key))
    }

    /// Detaches every child of `target`, deleting them (and their subtrees)
    /// when `also_delete` is set. Returns the detached children.
    pub fn clear_attachments(
        &mut self,
        lands: &mut LandStore,
        target: ActorId,
        also_delete: bool,
    ) -> Result<Vec<ActorId>, ActorError> {
        let keys: Vec<AttachKey> = self.actor(target)?.attachments.keys().copied().collect();
        let mut children = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(child) = self.detach(target, key) {
                children.push(child);
            }
        }
        if also_delete {
            for &child in &children {
                self.despawn(lands, child)?;
            }
        }
        Ok(children)
    }

    // -----------------------------------------------------------------------
    // Using
    // -----------------------------------------------------------------------

    /// Starts using. Returns `false` if already using.
    pub fn start_using(&mut self, id: ActorId) -> Result<bool, ActorError> {
        let actor = self.actor_mut(id)?;
        if actor.using {
            return Ok(false);
        }
        actor.using = true;
        actor.use_tick = 0;
        self.emit(ActorEvent::UsingToggled {
            id,
            started: true,
            use_tick: 0,
        });
        Ok(true)
    }

    /// Stops using and reports the ticks spent. `None` if not using.
    pub fn end_using(&mut self, id: ActorId) -> Result<Option<u64>, ActorError> {
        let actor = self.actor_mut(id)?;
        if !actor.using {
            return Ok(None);
        }
        let use_tick = actor.use_tick;
        actor.using = false;
        actor.use_tick = 0;
        self.emit(ActorEvent::UsingToggled {
            id,
            started: false,
            use_tick,
        });
        Ok(Some(use_tick))
    }

    // -----------------------------------------------------------------------
    // Sweep
    // -----------------------------------------------------------------------

    /// Runs the per-tick sweep. Order is fixed:
    ///
    /// 1. position-dirty actors: place attachments, emit `NewPosition`
    /// 2. walk-dirty actors: emit `WalkStateChanged`
    /// 3. advance the using counter
    /// 4. decay motion and move by what remains
    pub fn advance(&mut self, lands: &mut LandStore, tick: u64) {
        loop {
            let moved: Vec<ActorId> = self
                .actors
                .values()
                .filter(|a| a.is_dirty(ANY_MOVE_DIRTY))
                .map(Actor::id)
                .collect();
            if moved.is_empty() {
                break;
            }
            for id in moved {
                self.sync_attachments(lands, id);
                let Some(actor) = self.actors.get_mut(&id) else {
                    continue;
                };
                let control_moved = !actor.is_dirty(MOVE_DIRTY);
                actor.dirty &= !ANY_MOVE_DIRTY;
                let event = ActorEvent::NewPosition {
                    id,
                    pos: actor.pos,
                    motion: actor.motion,
                    control_moved,
                };
                self.emit(event);
            }
        }

        let mut walked = Vec::new();
        for actor in self.actors.values_mut().filter(|a| a.is_dirty(WALK_DIRTY)) {
            actor.dirty &= !WALK_DIRTY;
            walked.push(ActorEvent::WalkStateChanged {
                id: actor.id,
                running: actor.running,
                direction: actor.direction,
            });
        }
        for event in walked {
            self.emit(event);
        }

        for actor in self.actors.values_mut().filter(|a| a.using) {
            actor.use_tick += 1;
        }

        let moving: Vec<ActorId> = self
            .actors
            .values()
            .filter(|a| a.motion != DVec2::ZERO)
            .map(Actor::id)
            .collect();
        for id in moving {
            let Some(actor) = self.actors.get_mut(&id) else {
                continue;
            };
            if actor.attaching.is_some() {
                actor.motion = DVec2::ZERO;
                continue;
            }
            let mut motion = actor.motion * actor.motion_decay;
            if motion.length() <= MOTION_EPSILON {
                motion = DVec2::ZERO;
            }
            actor.motion = motion;
            if motion != DVec2::ZERO {
                let target = actor.pos + motion;
                self.commit_move(lands, id, target, false);
                self.sync_attachments(lands, id);
            }
        }

        trace!(tick, actors = self.actors.len(), "sweep complete");
    }
}
