//! Decoded row values.

use std::collections::BTreeMap;

use relmap_proto::Value;

/// Association state attached to a fetched owner.
#[derive(Debug, Clone, PartialEq)]
pub enum Fetched {
    /// A to-one association; `None` when the outer join matched nothing.
    One(Option<Box<EntityInstance>>),
    /// A collection, in row order.
    Many(Vec<EntityInstance>),
}

/// An entity assembled from its columns.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityInstance {
    pub entity: String,
    /// Identifier values; one per id column.
    pub id: Vec<Value>,
    pub attributes: BTreeMap<String, ResultValue>,
    pub fetched: BTreeMap<String, Fetched>,
}

impl EntityInstance {
    pub fn new(entity: impl Into<String>, id: Vec<Value>) -> Self {
        Self {
            entity: entity.into(),
            id,
            attributes: BTreeMap::new(),
            fetched: BTreeMap::new(),
        }
    }

    pub fn get(&self, attribute: &str) -> Option<&ResultValue> {
        self.attributes.get(attribute)
    }

    /// Value of a single-column attribute.
    pub fn get_value(&self, attribute: &str) -> Option<&Value> {
        match self.attributes.get(attribute) {
            Some(ResultValue::Scalar(value)) => Some(value),
            _ => None,
        }
    }

    /// A single-column identifier.
    pub fn single_id(&self) -> Option<&Value> {
        match self.id.as_slice() {
            [id] => Some(id),
            _ => None,
        }
    }

    /// Entities fetched through `association`.
    pub fn fetched(&self, association: &str) -> Option<&Fetched> {
        self.fetched.get(association)
    }

    /// Whether `other` is the same persistent entity.
    pub fn same_identity(&self, other: &EntityInstance) -> bool {
        self.entity == other.entity && self.id == other.id
    }

    /// Fold the fetched state of another row of the same entity into this one.
    pub fn merge(&mut self, other: EntityInstance) {
        for (association, incoming) in other.fetched {
            let Some(existing) = self.fetched.get_mut(&association) else {
                self.fetched.insert(association, incoming);
                continue;
            };
            match (existing, incoming) {
                (Fetched::Many(existing), Fetched::Many(items)) => {
                    for item in items {
                        match existing.iter_mut().find(|e| e.same_identity(&item)) {
                            Some(known) => known.merge(item),
                            None => existing.push(item),
                        }
                    }
                }
                (Fetched::One(existing), Fetched::One(Some(item))) => match existing {
                    Some(known) if known.same_identity(&item) => known.merge(*item),
                    Some(_) => {}
                    None => *existing = Some(item),
                },
                _ => {}
            }
        }
    }
}

/// One decoded result of a row.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultValue {
    Scalar(Value),
    /// A multi-column value, in column order.
    Composite(Vec<Value>),
    Entity(EntityInstance),
}

impl ResultValue {
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            ResultValue::Scalar(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_entity(&self) -> Option<&EntityInstance> {
        match self {
            ResultValue::Entity(entity) => Some(entity),
            _ => None,
        }
    }

    pub fn into_entity(self) -> Option<EntityInstance> {
        match self {
            ResultValue::Entity(entity) => Some(entity),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ResultValue::Scalar(Value::Null))
    }

    /// Whether two results denote the same thing: same entity identity, or equal values.
    pub fn same_identity(&self, other: &ResultValue) -> bool {
        match (self, other) {
            (ResultValue::Entity(a), ResultValue::Entity(b)) => a.same_identity(b),
            (a, b) => a == b,
        }
    }
}

/// Hashable form of a [`Value`]. Floating point values compare by bit
/// pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueKey {
    Null,
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Float32(u32),
    Float64(u64),
    String(String),
    Bytes(Vec<u8>),
    Timestamp(i64),
    Uuid([u8; 16]),
}

impl From<&Value> for ValueKey {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => ValueKey::Null,
            Value::Bool(b) => ValueKey::Bool(*b),
            Value::Int32(i) => ValueKey::Int32(*i),
            Value::Int64(i) => ValueKey::Int64(*i),
            Value::Float32(f) => ValueKey::Float32(f.to_bits()),
            Value::Float64(f) => ValueKey::Float64(f.to_bits()),
            Value::String(s) => ValueKey::String(s.clone()),
            Value::Bytes(b) => ValueKey::Bytes(b.clone()),
            Value::Timestamp(t) => ValueKey::Timestamp(*t),
            Value::Uuid(u) => ValueKey::Uuid(*u),
        }
    }
}

/// Keys of `values`, in order.
pub fn value_keys(values: &[Value]) -> Vec<ValueKey> {
    values.iter().map(ValueKey::from).collect()
}

/// Hashable counterpart of [`ResultValue::same_identity`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IdentityKey {
    Scalar(ValueKey),
    Composite(Vec<ValueKey>),
    Entity { entity: String, id: Vec<ValueKey> },
}

impl ResultValue {
    /// Key equal for results that share identity.
    pub fn identity_key(&self) -> IdentityKey {
        match self {
            ResultValue::Scalar(value) => IdentityKey::Scalar(value.into()),
            ResultValue::Composite(values) => IdentityKey::Composite(value_keys(values)),
            ResultValue::Entity(entity) => IdentityKey::Entity {
                entity: entity.entity.clone(),
                id: value_keys(&entity.id),
            },
        }
    }
}

impl From<Value> for ResultValue {
    fn from(value: Value) -> Self {
        ResultValue::Scalar(value)
    }
}

/// Whether two decoded rows describe the same entities, differing only in
/// fetched collection elements.
pub fn rows_share_identity(a: &[ResultValue], b: &[ResultValue]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.same_identity(y))
}

/// Merge the fetched state of `next` into `target`; both rows must share identity.
pub fn merge_row(target: &mut [ResultValue], next: Vec<ResultValue>) {
    for (existing, incoming) in target.iter_mut().zip(next) {
        if let (ResultValue::Entity(existing), ResultValue::Entity(incoming)) = (existing, incoming) {
            existing.merge(incoming);
        }
    }
}
