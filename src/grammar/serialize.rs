//! Render documents in the exact layout the parser accepts.

use super::ast::{Changes, Props, Snapshot};

/// Render a snapshot document.
#[must_use]
pub fn serialize_snapshot(snapshot: &Snapshot) -> String {
    if snapshot.objects.is_empty() {
        return "objects: []\n".to_owned();
    }
    let mut out = String::from("objects:\n");
    for obj in &snapshot.objects {
        item(&mut out, "id", &obj.id);
        field(&mut out, "kind", &obj.kind);
        field(&mut out, "x", &number(obj.x));
        field(&mut out, "y", &number(obj.y));
        optional_fields(&mut out, obj.width, obj.height, obj.rotation, obj.z);
        if !obj.props.is_empty() {
            props_field(&mut out, &obj.props);
        }
    }
    out
}

/// Render a changes document. Empty batches are written `name: []`.
#[must_use]
pub fn serialize_changes(changes: &Changes) -> String {
    let mut out = String::new();

    if changes.create.is_empty() {
        out.push_str("create: []\n");
    } else {
        out.push_str("create:\n");
        for op in &changes.create {
            item(&mut out, "kind", &op.kind);
            field(&mut out, "x", &number(op.x));
            field(&mut out, "y", &number(op.y));
            optional_fields(&mut out, op.width, op.height, op.rotation, op.z);
            if !op.props.is_empty() {
                props_field(&mut out, &op.props);
            }
        }
    }

    if changes.update.is_empty() {
        out.push_str("update: []\n");
    } else {
        out.push_str("update:\n");
        for op in &changes.update {
            item(&mut out, "id", &op.id);
            if let Some(x) = op.x {
                field(&mut out, "x", &number(x));
            }
            if let Some(y) = op.y {
                field(&mut out, "y", &number(y));
            }
            optional_fields(&mut out, op.width, op.height, op.rotation, op.z);
            if let Some(props) = &op.props {
                props_field(&mut out, props);
            }
        }
    }

    if changes.delete.is_empty() {
        out.push_str("delete: []\n");
    } else {
        out.push_str("delete:\n");
        for op in &changes.delete {
            item(&mut out, "id", &op.id);
        }
    }

    out
}

fn item(out: &mut String, key: &str, value: &str) {
    out.push_str("  - ");
    out.push_str(key);
    out.push_str(": ");
    out.push_str(&quote(value));
    out.push('\n');
}

fn field(out: &mut String, key: &str, value: &str) {
    out.push_str("    ");
    out.push_str(key);
    out.push_str(": ");
    out.push_str(&quote(value));
    out.push('\n');
}

fn optional_fields(out: &mut String, width: Option<f64>, height: Option<f64>, rotation: Option<f64>, z: Option<i32>) {
    if let Some(width) = width {
        field(out, "width", &number(width));
    }
    if let Some(height) = height {
        field(out, "height", &number(height));
    }
    if let Some(rotation) = rotation {
        field(out, "rotation", &number(rotation));
    }
    if let Some(z) = z {
        field(out, "z", &z.to_string());
    }
}

fn props_field(out: &mut String, props: &Props) {
    let entries = props
        .iter()
        .map(|(k, v)| {
            let key = if is_bare_key(k) { k.clone() } else { quote(k) };
            format!("{key}: {}", quote(v))
        })
        .collect::<Vec<_>>()
        .join(", ");
    out.push_str("    props: {");
    out.push_str(&entries);
    out.push_str("}\n");
}

fn number(value: f64) -> String {
    value.to_string()
}

fn is_bare_key(key: &str) -> bool {
    !key.is_empty() && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}
