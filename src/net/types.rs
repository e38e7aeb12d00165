//! Wire-protocol DTOs mirrored by the local caches.
//!
//! DESIGN
//! ======
//! These types mirror the server's object rows and presence payloads so serde
//! round-trips stay lossless. Numeric fields tolerate integers encoded as
//! floats because the protobuf wire carries every number as a double.

#[cfg(test)]
#[path = "types_test.rs"]
mod types_test;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

pub use frames::Frame;
pub use frames::Status as FrameStatus;

/// A board object as cached by the object store.
///
/// Mirrors one row of the externally owned `board_objects` table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoardObject {
    /// Object identifier, unique within a board. Temporary until confirmed.
    pub id: String,
    /// Board this object belongs to.
    #[serde(default)]
    pub board_id: String,
    /// Shape or edge type (e.g. `"rectangle"`, `"sticky_note"`).
    pub kind: String,
    /// Left edge in canvas coordinates.
    pub x: f64,
    /// Top edge in canvas coordinates.
    pub y: f64,
    /// Bounding-box width in canvas coordinates.
    #[serde(default)]
    pub width: Option<f64>,
    /// Bounding-box height in canvas coordinates.
    #[serde(default)]
    pub height: Option<f64>,
    /// Clockwise rotation in degrees.
    #[serde(default)]
    pub rotation: f64,
    /// Stacking order; lower values are drawn beneath higher values.
    #[serde(default, deserialize_with = "deserialize_i32_from_number")]
    pub z_index: i32,
    /// Open-ended per-kind properties (fill, stroke, text, endpoints, etc.).
    #[serde(default = "empty_props")]
    pub props: serde_json::Value,
    /// User who created the object, if known.
    #[serde(default)]
    pub created_by: Option<String>,
    /// Edit counter assigned by the authoritative store. Never bumped locally.
    #[serde(default, deserialize_with = "deserialize_i64_from_number")]
    pub version: i64,
}

impl BoardObject {
    /// Build an object from a frame payload, if it carries a complete row.
    #[must_use]
    pub fn from_payload(data: &serde_json::Value) -> Option<Self> {
        match serde_json::from_value::<Self>(data.clone()) {
            Ok(obj) if !obj.id.is_empty() => Some(obj),
            _ => None,
        }
    }
}

fn empty_props() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

/// Presence information for a peer connected to the same board.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Presence {
    /// Peer identifier (websocket client id or user id).
    pub user_id: String,
    /// Display name.
    pub name: String,
    /// Assigned presence color (hex).
    pub color: String,
    /// Last known cursor position in canvas coordinates, if visible.
    pub cursor: Option<Point>,
}

/// A 2D point in canvas or screen space.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    #[must_use]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

fn deserialize_i32_from_number<'de, D>(deserializer: D) -> Result<i32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = deserialize_i64_from_number(deserializer)?;
    i32::try_from(value).map_err(|_| D::Error::custom(format!("value {value} out of range for i32")))
}

fn deserialize_i64_from_number<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    number_as_i64(&value).ok_or_else(|| D::Error::custom("expected integer-compatible number"))
}

/// Read an integer that may have been encoded as an integral float.
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
pub(crate) fn number_as_i64(value: &serde_json::Value) -> Option<i64> {
    let serde_json::Value::Number(number) = value else {
        return None;
    };
    if let Some(int) = number.as_i64() {
        return Some(int);
    }
    number
        .as_f64()
        .filter(|v| v.is_finite() && v.fract() == 0.0)
        .filter(|v| (i64::MIN as f64..=i64::MAX as f64).contains(v))
        .map(|v| v as i64)
}

/// Read an `i32` that may have been encoded as an integral float.
pub(crate) fn number_as_i32(value: &serde_json::Value) -> Option<i32> {
    match i32::try_from(number_as_i64(value)?) {
        Ok(v) => Some(v),
        Err(_) => None,
    }
}
