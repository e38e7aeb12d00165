//! Local cache of board objects, keyed by object id.
//!
//! The store never merges: every update overwrites the fields it carries and
//! the last frame applied wins. The authority sequences writes, so there is
//! no clock or version comparison here.

#[cfg(test)]
#[path = "store_test.rs"]
mod store_test;

use std::collections::{HashMap, HashSet};

use serde_json::{Map, Value};

use crate::net::types::{BoardObject, number_as_i32, number_as_i64};

/// Fields carried by an update. `None` means "leave as is".
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ObjectPatch {
    /// Only used when the patch has to materialize an unknown object.
    pub kind: Option<String>,
    pub board_id: Option<String>,
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub rotation: Option<f64>,
    pub z_index: Option<i32>,
    pub props: Option<Value>,
    pub version: Option<i64>,
}

impl ObjectPatch {
    /// Read the update fields present in a frame payload.
    #[must_use]
    pub fn from_payload(data: &Value) -> Self {
        let number = |key: &str| data.get(key).and_then(Value::as_f64);
        let string = |key: &str| data.get(key).and_then(Value::as_str).map(str::to_owned);
        Self {
            kind: string("kind"),
            board_id: string("board_id"),
            x: number("x"),
            y: number("y"),
            width: number("width"),
            height: number("height"),
            rotation: number("rotation"),
            z_index: data.get("z_index").and_then(number_as_i32),
            props: data.get("props").filter(|p| p.is_object()).cloned(),
            version: data.get("version").and_then(number_as_i64),
        }
    }

    /// True if the patch would change nothing on an existing object.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.x.is_none()
            && self.y.is_none()
            && self.width.is_none()
            && self.height.is_none()
            && self.rotation.is_none()
            && self.z_index.is_none()
            && self.props.is_none()
            && self.version.is_none()
    }

    /// Overwrite every field the patch carries.
    pub fn apply_to(&self, obj: &mut BoardObject) {
        if let Some(x) = self.x {
            obj.x = x;
        }
        if let Some(y) = self.y {
            obj.y = y;
        }
        if let Some(w) = self.width {
            obj.width = Some(w);
        }
        if let Some(h) = self.height {
            obj.height = Some(h);
        }
        if let Some(r) = self.rotation {
            obj.rotation = r;
        }
        if let Some(z) = self.z_index {
            obj.z_index = z;
        }
        if let Some(props) = &self.props {
            obj.props = props.clone();
        }
        if let Some(v) = self.version {
            obj.version = v;
        }
    }

    /// Build a whole object if the patch carries `kind`, `x` and `y`.
    #[must_use]
    pub fn materialize(&self, id: &str) -> Option<BoardObject> {
        let (Some(kind), Some(x), Some(y)) = (self.kind.clone(), self.x, self.y) else {
            return None;
        };
        let mut obj = BoardObject {
            id: id.to_owned(),
            board_id: self.board_id.clone().unwrap_or_default(),
            kind,
            x,
            y,
            width: None,
            height: None,
            rotation: 0.0,
            z_index: 0,
            props: Value::Object(Map::new()),
            created_by: None,
            version: 0,
        };
        self.apply_to(&mut obj);
        Some(obj)
    }

    /// Request payload for `object:update` on `id`.
    #[must_use]
    pub fn to_payload(&self, id: &str) -> Value {
        let mut data = Map::new();
        data.insert("id".into(), Value::from(id));
        let numbers = [
            ("x", self.x),
            ("y", self.y),
            ("width", self.width),
            ("height", self.height),
            ("rotation", self.rotation),
        ];
        for (key, value) in numbers {
            if let Some(value) = value {
                data.insert(key.into(), Value::from(value));
            }
        }
        if let Some(z) = self.z_index {
            data.insert("z_index".into(), Value::from(z));
        }
        if let Some(props) = &self.props {
            data.insert("props".into(), props.clone());
        }
        Value::Object(data)
    }
}

/// What [`ObjectStore::update`] did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The object existed and was overwritten.
    Applied,
    /// The object was unknown and the patch was complete enough to insert.
    Inserted,
    /// The object was unknown and the patch was partial.
    Ignored,
}

/// Board objects plus the local selection that refers to them.
#[derive(Clone, Debug, Default)]
pub struct ObjectStore {
    objects: HashMap<String, BoardObject>,
    selection: HashSet<String>,
}

impl ObjectStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or wholly replace an object. Returns the previous value.
    pub fn upsert(&mut self, obj: BoardObject) -> Option<BoardObject> {
        self.objects.insert(obj.id.clone(), obj)
    }

    /// Overwrite the fields `patch` carries on object `id`.
    pub fn update(&mut self, id: &str, patch: &ObjectPatch) -> UpdateOutcome {
        if let Some(existing) = self.objects.get_mut(id) {
            patch.apply_to(existing);
            return UpdateOutcome::Applied;
        }
        match patch.materialize(id) {
            Some(obj) => {
                self.objects.insert(id.to_owned(), obj);
                UpdateOutcome::Inserted
            }
            None => UpdateOutcome::Ignored,
        }
    }

    /// Remove an object and drop it from the selection. Unknown ids are a no-op.
    pub fn remove(&mut self, id: &str) -> Option<BoardObject> {
        self.selection.remove(id);
        self.objects.remove(id)
    }

    /// Move the object under `old` to `new`, carrying the selection along.
    ///
    /// An object already stored under `new` is replaced, so at most one entry
    /// survives. Returns `false` if `old` is unknown.
    pub fn rename_id(&mut self, old: &str, new: &str) -> bool {
        if old == new {
            return self.objects.contains_key(old);
        }
        let Some(mut obj) = self.objects.remove(old) else {
            return false;
        };
        obj.id = new.to_owned();
        self.objects.insert(new.to_owned(), obj);
        if self.selection.remove(old) {
            self.selection.insert(new.to_owned());
        }
        true
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&BoardObject> {
        self.objects.get(id)
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.objects.contains_key(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BoardObject> {
        self.objects.values()
    }

    /// Objects in drawing order: `z_index`, then id.
    #[must_use]
    pub fn sorted(&self) -> Vec<&BoardObject> {
        let mut objects = self.objects.values().collect::<Vec<_>>();
        objects.sort_by(|a, b| a.z_index.cmp(&b.z_index).then_with(|| a.id.cmp(&b.id)));
        objects
    }

    pub fn clear(&mut self) {
        self.objects.clear();
        self.selection.clear();
    }

    /// Replace the contents with a join snapshot.
    ///
    /// Objects for which `keep` returns true (unconfirmed optimistic creates)
    /// survive unless the snapshot itself carries their id.
    pub fn replace_all(&mut self, snapshot: Vec<BoardObject>, keep: impl Fn(&str) -> bool) {
        self.objects.retain(|id, _| keep(id));
        for obj in snapshot {
            self.objects.insert(obj.id.clone(), obj);
        }
        let objects = &self.objects;
        self.selection.retain(|id| objects.contains_key(id));
    }

    // --- selection ---

    /// Select `id` if it exists. Returns whether it is now selected.
    pub fn select(&mut self, id: &str) -> bool {
        if !self.objects.contains_key(id) {
            return false;
        }
        self.selection.insert(id.to_owned());
        true
    }

    pub fn deselect(&mut self, id: &str) -> bool {
        self.selection.remove(id)
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    #[must_use]
    pub fn is_selected(&self, id: &str) -> bool {
        self.selection.contains(id)
    }

    #[must_use]
    pub fn selection(&self) -> &HashSet<String> {
        &self.selection
    }
}
