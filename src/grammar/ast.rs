//! Document types for the mutation grammar.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::net::types::BoardObject;
use crate::state::store::ObjectPatch;

/// Inline `props` map: string keys to string values, interpreted per kind.
pub type Props = BTreeMap<String, String>;

/// A parsed snapshot document: every object on a board, in order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub objects: Vec<SnapshotObject>,
}

/// One object description in a snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotObject {
    pub id: String,
    pub kind: String,
    pub x: f64,
    pub y: f64,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub rotation: Option<f64>,
    pub z: Option<i32>,
    pub props: Props,
}

/// A parsed changes document, applied as creates, then updates, then deletes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Changes {
    pub create: Vec<CreateOp>,
    pub update: Vec<UpdateOp>,
    pub delete: Vec<DeleteOp>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateOp {
    pub kind: String,
    pub x: f64,
    pub y: f64,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub rotation: Option<f64>,
    pub z: Option<i32>,
    pub props: Props,
}

/// Update of an existing object by its final id. At least one field is set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateOp {
    pub id: String,
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub rotation: Option<f64>,
    pub z: Option<i32>,
    pub props: Option<Props>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteOp {
    pub id: String,
}

impl Changes {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.create.is_empty() && self.update.is_empty() && self.delete.is_empty()
    }

    /// Total number of operations across all three batches.
    #[must_use]
    pub fn len(&self) -> usize {
        self.create.len() + self.update.len() + self.delete.len()
    }
}

impl SnapshotObject {
    /// Describe a cached object. Non-string prop values become their JSON text.
    #[must_use]
    pub fn from_object(obj: &BoardObject) -> Self {
        Self {
            id: obj.id.clone(),
            kind: obj.kind.clone(),
            x: obj.x,
            y: obj.y,
            width: obj.width,
            height: obj.height,
            rotation: (obj.rotation != 0.0).then_some(obj.rotation),
            z: (obj.z_index != 0).then_some(obj.z_index),
            props: props_from_value(&obj.props),
        }
    }
}

impl Snapshot {
    /// Snapshot of `objects` in the order given.
    #[must_use]
    pub fn from_objects<'a>(objects: impl IntoIterator<Item = &'a BoardObject>) -> Self {
        Self { objects: objects.into_iter().map(SnapshotObject::from_object).collect() }
    }
}

impl CreateOp {
    /// `object:create` request payload.
    #[must_use]
    pub fn to_payload(&self) -> Value {
        let mut data = Map::new();
        data.insert("kind".into(), Value::from(self.kind.as_str()));
        data.insert("x".into(), Value::from(self.x));
        data.insert("y".into(), Value::from(self.y));
        if let Some(width) = self.width {
            data.insert("width".into(), Value::from(width));
        }
        if let Some(height) = self.height {
            data.insert("height".into(), Value::from(height));
        }
        data.insert("rotation".into(), Value::from(self.rotation.unwrap_or(0.0)));
        if let Some(z) = self.z {
            data.insert("z_index".into(), Value::from(z));
        }
        data.insert("props".into(), props_to_value(&self.props));
        Value::Object(data)
    }
}

impl UpdateOp {
    /// Store patch for this update.
    #[must_use]
    pub fn to_patch(&self) -> ObjectPatch {
        ObjectPatch {
            x: self.x,
            y: self.y,
            width: self.width,
            height: self.height,
            rotation: self.rotation,
            z_index: self.z,
            props: self.props.as_ref().map(props_to_value),
            ..ObjectPatch::default()
        }
    }
}

/// Flatten a JSON props object to strings. Non-objects yield an empty map.
#[must_use]
pub fn props_from_value(value: &Value) -> Props {
    let Value::Object(map) = value else {
        return Props::new();
    };
    map.iter()
        .map(|(k, v)| {
            let text = match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (k.clone(), text)
        })
        .collect()
}

#[must_use]
pub fn props_to_value(props: &Props) -> Value {
    Value::Object(props.iter().map(|(k, v)| (k.clone(), Value::from(v.as_str()))).collect())
}
