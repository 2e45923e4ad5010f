//! Overlap queries between actor bounding boxes.
//!
//! Boxes are converted to convex polygons and tested with the separating
//! axis theorem. Queries never mutate; callers decide how to resolve a hit.

use glam::DVec2;
use universe_land::{ActorId, LandCoord, LandStore};

use crate::actor::Actor;
use crate::error::ActorError;
use crate::store::ActorStore;

/// Half-width of the square searched around the query box for candidates.
pub const BROAD_PHASE_RADIUS: f64 = 10.0;

/// Axis-aligned box in world space.
///
/// Invariant: `min.x <= max.x` and `min.y <= max.y`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    pub min: DVec2,
    pub max: DVec2,
}

impl Aabb {
    /// Creates a box from two corners, sorting components.
    pub fn new(a: DVec2, b: DVec2) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    /// Box of `bounding` offsets `[min_x, min_y, max_x, max_y]` placed at `pos`.
    pub fn from_bounding(pos: DVec2, bounding: [f64; 4]) -> Self {
        let [x0, y0, x1, y1] = bounding;
        Self::new(pos + DVec2::new(x0, y0), pos + DVec2::new(x1, y1))
    }

    /// The actor's current box.
    pub fn of_actor(actor: &Actor) -> Self {
        Self::from_bounding(actor.pos(), actor.bounding())
    }

    /// Smallest box covering the actor at both its last and current position.
    pub fn swept(actor: &Actor) -> Self {
        Self::from_bounding(actor.last_pos(), actor.bounding()).union(&Self::of_actor(actor))
    }

    /// Smallest box enclosing both.
    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Returns `true` if the boxes overlap, touching edges included.
    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
    }

    /// Returns `true` if `p` lies inside or on the boundary.
    pub fn contains_point(&self, p: DVec2) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }

    /// Box grown by `margin` on every side.
    pub fn expand(&self, margin: f64) -> Aabb {
        Aabb {
            min: self.min - DVec2::splat(margin),
            max: self.max + DVec2::splat(margin),
        }
    }

    /// Corners in counter-clockwise order.
    pub fn to_polygon(&self) -> ConvexPolygon {
        ConvexPolygon {
            points: vec![
                self.min,
                DVec2::new(self.max.x, self.min.y),
                self.max,
                DVec2::new(self.min.x, self.max.y),
            ],
        }
    }
}

/// Convex polygon given by its vertices in winding order.
#[derive(Clone, Debug, PartialEq)]
pub struct ConvexPolygon {
    pub points: Vec<DVec2>,
}

impl ConvexPolygon {
    /// Unit normals of every non-degenerate edge.
    fn axes(&self) -> impl Iterator<Item = DVec2> + '_ {
        let n = self.points.len();
        (0..n).filter_map(move |i| {
            let edge = self.points[(i + 1) % n] - self.points[i];
            (edge.length_squared() > 0.0).then(|| DVec2::new(edge.y, -edge.x).normalize())
        })
    }

    fn project(&self, axis: DVec2) -> (f64, f64) {
        self.points
            .iter()
            .map(|p| p.dot(axis))
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), d| (lo.min(d), hi.max(d)))
    }
}

/// Minimum translation separating two overlapping shapes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Penetration {
    /// Unit axis pointing from the first shape toward the second.
    pub normal: DVec2,
    /// Overlap along `normal`. Zero for shapes that only touch.
    pub depth: f64,
}

impl Penetration {
    /// Displacement that pushes the second shape clear of the first.
    pub fn translation(&self) -> DVec2 {
        self.normal * self.depth
    }
}

/// Separating axis test. `None` if some axis separates the shapes.
pub fn sat_overlap(a: &ConvexPolygon, b: &ConvexPolygon) -> Option<Penetration> {
    let mut best: Option<Penetration> = None;
    for axis in a.axes().chain(b.axes()) {
        let (a_min, a_max) = a.project(axis);
        let (b_min, b_max) = b.project(axis);
        if a_max < b_min || b_max < a_min {
            return None;
        }
        let forward = a_max - b_min;
        let backward = b_max - a_min;
        let candidate = if forward <= backward {
            Penetration {
                normal: axis,
                depth: forward,
            }
        } else {
            Penetration {
                normal: -axis,
                depth: backward,
            }
        };
        if best.is_none_or(|p| candidate.depth < p.depth) {
            best = Some(candidate);
        }
    }
    best
}

/// One overlapping neighbour found by [`ActorStore::query_collisions`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Collision {
    /// The other actor.
    pub other: ActorId,
    /// Normal points from the queried actor toward `other`.
    pub penetration: Penetration,
}

impl ActorStore {
    /// Actors whose boxes overlap `id`'s box.
    ///
    /// With `use_sweep` the query box spans the actor's last and current
    /// positions, so fast movers do not skip over thin obstacles. Results
    /// are ordered by id.
    pub fn query_collisions(
        &self,
        lands: &LandStore,
        id: ActorId,
        use_sweep: bool,
        excluded: &[ActorId],
    ) -> Result<Vec<Collision>, ActorError> {
        let actor = self.actor(id)?;
        let query = if use_sweep {
            Aabb::swept(actor)
        } else {
            Aabb::of_actor(actor)
        };
        let shape = query.to_polygon();
        let region = query.expand(BROAD_PHASE_RADIUS);

        let lo = LandCoord::of_position(region.min);
        let hi = LandCoord::of_position(region.max);
        let span = (i128::from(hi.x) - i128::from(lo.x) + 1)
            * (i128::from(hi.y) - i128::from(lo.y) + 1);
        // A long sweep covers more lands than there are actors.
        let candidates: Vec<ActorId> = if span <= self.len() as i128 {
            (lo.y..=hi.y)
                .flat_map(|y| (lo.x..=hi.x).map(move |x| LandCoord::new(x, y)))
                .flat_map(|coord| lands.actors_in(coord))
                .collect()
        } else {
            self.iter().map(Actor::id).collect()
        };

        let mut hits = Vec::new();
        for other in candidates {
            if other == id || excluded.contains(&other) {
                continue;
            }
            let Some(candidate) = self.get(other) else {
                continue;
            };
            if !region.contains_point(candidate.pos()) {
                continue;
            }
            let target = Aabb::of_actor(candidate).to_polygon();
            if let Some(penetration) = sat_overlap(&shape, &target) {
                hits.push(Collision { other, penetration });
            }
        }
        hits.sort_by_key(|c| c.other);
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crossbeam_channel::unbounded;
    use universe_land::{BiomeGenerator, MemoryDatabase};

    use super::*;
    use crate::actor::ActorInit;
    use crate::kind::ActorKind;

    const UNIT_BOX: [f64; 4] = [-0.5, -0.5, 0.5, 0.5];

    fn setup() -> (ActorStore, LandStore) {
        let (tx, _rx) = unbounded();
        let (land_tx, _land_rx) = unbounded();
        let lands = LandStore::new(
            7,
            Arc::new(MemoryDatabase::new()),
            Arc::new(BiomeGenerator::default()),
            land_tx,
        );
        (ActorStore::new(tx), lands)
    }

    fn prop(store: &mut ActorStore, lands: &mut LandStore, x: f64, y: f64) -> ActorId {
        let init = ActorInit::new(ActorKind::Prop, DVec2::new(x, y)).with_bounding(UNIT_BOX);
        store.spawn(lands, init)
    }

    #[test]
    fn test_overlap_then_separate() {
        let (mut store, mut lands) = setup();
        let a = prop(&mut store, &mut lands, 0.0, 0.0);
        let b = prop(&mut store, &mut lands, 0.4, 0.0);

        let hits = store.query_collisions(&lands, a, false, &[]).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].other, b);
        let p = hits[0].penetration;
        assert!((p.depth - 0.6).abs() < 1e-9);
        assert!((p.normal - DVec2::X).length() < 1e-9);
        assert!((p.translation() - DVec2::new(0.6, 0.0)).length() < 1e-9);

        store.move_to(&mut lands, b, DVec2::new(2.0, 0.0), false).unwrap();
        assert!(store.query_collisions(&lands, a, false, &[]).unwrap().is_empty());
    }

    #[test]
    fn test_query_is_symmetric_in_normal() {
        let (mut store, mut lands) = setup();
        let a = prop(&mut store, &mut lands, 0.0, 0.0);
        let b = prop(&mut store, &mut lands, 0.0, 0.7);
        let from_a = store.query_collisions(&lands, a, false, &[]).unwrap();
        let from_b = store.query_collisions(&lands, b, false, &[]).unwrap();
        assert!((from_a[0].penetration.normal - DVec2::Y).length() < 1e-9);
        assert!((from_b[0].penetration.normal + DVec2::Y).length() < 1e-9);
    }

    #[test]
    fn test_excluded_and_self_are_skipped() {
        let (mut store, mut lands) = setup();
        let a = prop(&mut store, &mut lands, 0.0, 0.0);
        let b = prop(&mut store, &mut lands, 0.2, 0.0);
        let c = prop(&mut store, &mut lands, -0.2, 0.0);

        let hits = store.query_collisions(&lands, a, false, &[b]).unwrap();
        assert_eq!(hits.iter().map(|h| h.other).collect::<Vec<_>>(), vec![c]);
    }

    #[test]
    fn test_sweep_catches_tunnelling() {
        let (mut store, mut lands) = setup();
        let arrow = prop(&mut store, &mut lands, 0.0, 0.0);
        let wall = prop(&mut store, &mut lands, 2.5, 0.0);
        store.move_to(&mut lands, arrow, DVec2::new(5.0, 0.0), false).unwrap();

        assert!(store.query_collisions(&lands, arrow, false, &[]).unwrap().is_empty());
        let swept = store.query_collisions(&lands, arrow, true, &[]).unwrap();
        assert_eq!(swept.len(), 1);
        assert_eq!(swept[0].other, wall);
    }

    #[test]
    fn test_long_sweep_scans_actors_not_lands() {
        let (mut store, mut lands) = setup();
        let arrow = prop(&mut store, &mut lands, 0.0, 0.0);
        let far_wall = prop(&mut store, &mut lands, 5.0e11, 0.0);
        let _bystander = prop(&mut store, &mut lands, 5.0e11, 50.0);
        store
            .move_to(&mut lands, arrow, DVec2::new(1.0e12, 0.0), false)
            .unwrap();

        let swept = store.query_collisions(&lands, arrow, true, &[]).unwrap();
        assert_eq!(swept.iter().map(|h| h.other).collect::<Vec<_>>(), vec![far_wall]);
    }

    #[test]
    fn test_candidates_across_land_border() {
        let (mut store, mut lands) = setup();
        let a = prop(&mut store, &mut lands, 7.8, 0.0);
        let b = prop(&mut store, &mut lands, 8.3, 0.0);
        assert_ne!(store.get(a).unwrap().land(), store.get(b).unwrap().land());
        assert_eq!(store.query_collisions(&lands, a, false, &[]).unwrap().len(), 1);
    }

    #[test]
    fn test_unknown_actor() {
        let (store, lands) = setup();
        assert_eq!(
            store.query_collisions(&lands, ActorId(3), false, &[]),
            Err(ActorError::NotFound(ActorId(3)))
        );
    }

    #[test]
    fn test_touching_boxes_overlap_with_zero_depth() {
        let a = Aabb::new(DVec2::ZERO, DVec2::ONE).to_polygon();
        let b = Aabb::new(DVec2::new(1.0, 0.0), DVec2::new(2.0, 1.0)).to_polygon();
        let p = sat_overlap(&a, &b).unwrap();
        assert_eq!(p.depth, 0.0);
    }

    #[test]
    fn test_degenerate_box_is_a_point() {
        let point = Aabb::from_bounding(DVec2::new(0.5, 0.5), [0.0; 4]).to_polygon();
        let unit = Aabb::new(DVec2::ZERO, DVec2::ONE).to_polygon();
        assert!(sat_overlap(&point, &unit).is_some());
        let outside = Aabb::from_bounding(DVec2::new(3.0, 0.5), [0.0; 4]).to_polygon();
        assert!(sat_overlap(&outside, &unit).is_none());
    }

    #[test]
    fn test_aabb_helpers() {
        let a = Aabb::new(DVec2::new(2.0, 0.0), DVec2::new(0.0, 1.0));
        assert_eq!(a.min, DVec2::ZERO);
        assert_eq!(a.max, DVec2::new(2.0, 1.0));
        assert!(a.intersects(&Aabb::new(DVec2::new(2.0, 1.0), DVec2::splat(3.0))));
        assert!(!a.intersects(&Aabb::new(DVec2::splat(3.0), DVec2::splat(4.0))));
        assert_eq!(a.expand(1.0).min, DVec2::splat(-1.0));
    }
}
