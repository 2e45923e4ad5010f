//! Static field schema: which actor fields are persisted and which are sent
//! to a viewer when the actor is first spawned to it.
//!
//! Tables are built once per kind from a common base list and kind-specific
//! adjustments, then looked up by [`schema_for`].

use std::collections::BTreeMap;
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};
use universe_land::ActorId;

use crate::actor::Actor;
use crate::kind::{ActorKind, AttachKey, Direction, RunningState};

/// Metadata for one actor field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FieldSchema {
    /// Field name.
    pub name: &'static str,
    /// Saved with the actor.
    pub persist: bool,
    /// Included in the spawn payload sent to viewers.
    pub replicate_on_construct: bool,
}

const fn field(name: &'static str, persist: bool, replicate_on_construct: bool) -> FieldSchema {
    FieldSchema {
        name,
        persist,
        replicate_on_construct,
    }
}

const COMMON_FIELDS: &[FieldSchema] = &[
    field("kind", true, true),
    field("name", true, true),
    field("pos", true, true),
    field("motion", false, true),
    field("rotation", true, true),
    field("direction", true, true),
    field("running", false, true),
    field("health", true, true),
    field("max_health", false, true),
    field("bounding", false, true),
    field("size", false, true),
    field("attachments", true, true),
    field("attaching", true, false),
    field("using", false, true),
    field("use_tick", false, false),
];

fn adjust(kind: ActorKind, base: FieldSchema) -> FieldSchema {
    let mut f = base;
    if matches!(kind, ActorKind::Bow | ActorKind::Arrow)
        && matches!(f.name, "health" | "max_health")
    {
        f.replicate_on_construct = false;
    }
    // arrows are transient
    if kind == ActorKind::Arrow {
        f.persist = false;
    }
    f
}

static SCHEMA: LazyLock<[Vec<FieldSchema>; 4]> = LazyLock::new(|| {
    ActorKind::ALL.map(|kind| COMMON_FIELDS.iter().map(|f| adjust(kind, *f)).collect())
});

/// Field table for `kind`.
pub fn schema_for(kind: ActorKind) -> &'static [FieldSchema] {
    &SCHEMA[kind.index()]
}

/// A field value in a construct or persistence payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    /// Actor kind.
    Kind(ActorKind),
    /// Text.
    Text(String),
    /// 2D vector.
    Vec2([f64; 2]),
    /// Scalar.
    Float(f64),
    /// Unsigned count.
    Count(u64),
    /// Boolean.
    Flag(bool),
    /// Facing direction.
    Direction(Direction),
    /// Running state.
    Running(RunningState),
    /// Bounding box offsets.
    Bounds([f64; 4]),
    /// Children by slot.
    Attachments(Vec<(AttachKey, ActorId)>),
    /// Parent and slot.
    Parent(Option<(ActorId, AttachKey)>),
}

/// Named field values describing an actor.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConstructOptions {
    /// Values keyed by field name.
    pub fields: BTreeMap<String, FieldValue>,
}

impl ConstructOptions {
    /// Value of `name`, if present.
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// The `kind` field.
    pub fn kind(&self) -> Option<ActorKind> {
        match self.get("kind")? {
            FieldValue::Kind(kind) => Some(*kind),
            _ => None,
        }
    }

    /// The `name` field.
    pub fn name(&self) -> Option<&str> {
        match self.get("name")? {
            FieldValue::Text(name) => Some(name),
            _ => None,
        }
    }

    /// The `pos` field.
    pub fn pos(&self) -> Option<[f64; 2]> {
        match self.get("pos")? {
            FieldValue::Vec2(pos) => Some(*pos),
            _ => None,
        }
    }

    /// The `attachments` field.
    pub fn attachments(&self) -> Option<&[(AttachKey, ActorId)]> {
        match self.get("attachments")? {
            FieldValue::Attachments(list) => Some(list),
            _ => None,
        }
    }
}

impl Actor {
    /// Current value of a schema field.
    pub fn field_value(&self, name: &str) -> Option<FieldValue> {
        let value = match name {
            "kind" => FieldValue::Kind(self.kind),
            "name" => FieldValue::Text(self.name.clone()),
            "pos" => FieldValue::Vec2(self.pos.to_array()),
            "motion" => FieldValue::Vec2(self.motion.to_array()),
            "rotation" => FieldValue::Float(self.rotation),
            "direction" => FieldValue::Direction(self.direction),
            "running" => FieldValue::Running(self.running),
            "health" => FieldValue::Count(u64::from(self.health)),
            "max_health" => FieldValue::Count(u64::from(self.max_health)),
            "bounding" => FieldValue::Bounds(self.bounding),
            "size" => FieldValue::Vec2(self.size().to_array()),
            "attachments" => FieldValue::Attachments(
                self.attachments.iter().map(|(k, v)| (*k, *v)).collect(),
            ),
            "attaching" => FieldValue::Parent(self.attaching),
            "using" => FieldValue::Flag(self.using),
            "use_tick" => FieldValue::Count(self.use_tick),
            _ => return None,
        };
        Some(value)
    }

    fn collect_fields(&self, include: impl Fn(&FieldSchema) -> bool) -> ConstructOptions {
        let fields = schema_for(self.kind)
            .iter()
            .filter(|f| include(*f))
            .filter_map(|f| Some((f.name.to_string(), self.field_value(f.name)?)))
            .collect();
        ConstructOptions { fields }
    }

    /// Fields sent to a viewer when the actor is spawned to it.
    pub fn construct_options(&self) -> ConstructOptions {
        self.collect_fields(|f| f.replicate_on_construct)
    }

    /// Fields saved with the actor.
    pub fn persisted_fields(&self) -> ConstructOptions {
        self.collect_fields(|f| f.persist)
    }
}

#[cfg(test)]
mod tests {
    use glam::DVec2;

    use super::*;
    use crate::actor::ActorInit;

    #[test]
    fn test_every_schema_field_has_a_value() {
        let actor = Actor::new(ActorId(1), ActorInit::new(ActorKind::Player, DVec2::ZERO));
        for kind in ActorKind::ALL {
            for f in schema_for(kind) {
                assert!(actor.field_value(f.name).is_some(), "missing {}", f.name);
            }
        }
    }

    #[test]
    fn test_construct_options_carry_spawn_essentials() {
        let init = ActorInit::new(ActorKind::Player, DVec2::new(2.0, 3.0)).with_name("alice");
        let actor = Actor::new(ActorId(5), init);
        let options = actor.construct_options();
        assert_eq!(options.kind(), Some(ActorKind::Player));
        assert_eq!(options.name(), Some("alice"));
        assert_eq!(options.pos(), Some([2.0, 3.0]));
        assert!(options.get("health").is_some());
        assert!(options.get("use_tick").is_none());
    }

    #[test]
    fn test_item_health_is_not_replicated() {
        let bow = Actor::new(ActorId(2), ActorInit::new(ActorKind::Bow, DVec2::ZERO));
        let options = bow.construct_options();
        assert!(options.get("health").is_none());
        assert!(options.get("max_health").is_none());
        assert!(bow.persisted_fields().get("health").is_some());
    }

    #[test]
    fn test_arrows_persist_nothing() {
        let arrow = Actor::new(ActorId(3), ActorInit::new(ActorKind::Arrow, DVec2::ZERO));
        assert!(arrow.persisted_fields().fields.is_empty());
        assert!(schema_for(ActorKind::Arrow).iter().all(|f| !f.persist));
    }

    #[test]
    fn test_persisted_fields_skip_transient_state() {
        let actor = Actor::new(ActorId(4), ActorInit::new(ActorKind::Prop, DVec2::ZERO));
        let saved = actor.persisted_fields();
        assert!(saved.get("pos").is_some());
        assert!(saved.get("motion").is_none());
        assert!(saved.get("running").is_none());
    }

    #[test]
    fn test_construct_options_serialize() {
        let actor = Actor::new(ActorId(6), ActorInit::new(ActorKind::Prop, DVec2::new(1.0, 1.0)));
        let options = actor.construct_options();
        let json = serde_json::to_string(&options).unwrap();
        let back: ConstructOptions = serde_json::from_str(&json).unwrap();
        assert_eq!(back, options);
    }
}
