//! Strict line parser for snapshot and changes documents.
//!
//! Layout is fixed: section headers at column 0, list items at two spaces
//! (`  - key: "value"`), item fields at four. Every scalar is a double-quoted
//! string, numerics included; `props` is a one-line `{key: "value", ...}` map.
//! Any deviation rejects the whole document.

use std::collections::BTreeMap;

use super::ast::{Changes, CreateOp, DeleteOp, Props, Snapshot, SnapshotObject, UpdateOp};

const ITEM_INDENT: usize = 2;
const FIELD_INDENT: usize = 4;

const SNAPSHOT_FIELDS: &[&str] = &["id", "kind", "x", "y", "width", "height", "rotation", "z", "props"];
const CREATE_FIELDS: &[&str] = &["kind", "x", "y", "width", "height", "rotation", "z", "props"];
const UPDATE_FIELDS: &[&str] = &["id", "x", "y", "width", "height", "rotation", "z", "props"];
const DELETE_FIELDS: &[&str] = &["id"];

/// A rejected document: where, and why.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("line {line}: {kind}")]
pub struct GrammarError {
    /// 1-based line number.
    pub line: usize,
    pub kind: GrammarErrorKind,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GrammarErrorKind {
    #[error("document is empty")]
    Empty,
    #[error("tab in indentation")]
    Tab,
    #[error("expected {expected} spaces of indentation, found {found}")]
    Indentation { expected: usize, found: usize },
    #[error("unexpected section `{0}`")]
    UnexpectedSection(String),
    #[error("section `{0}` has no items; write `{0}: []`")]
    EmptySection(String),
    #[error("unexpected line `{0}`")]
    UnexpectedLine(String),
    #[error("unknown field `{0}`")]
    UnknownField(String),
    #[error("duplicate field `{0}`")]
    DuplicateField(String),
    #[error("field `{field}` must come before `{after}`")]
    FieldOrder { field: String, after: String },
    #[error("missing required field `{0}`")]
    MissingField(String),
    #[error("update must change at least one field")]
    EmptyUpdate,
    #[error("field `{0}` has no value")]
    MissingValue(String),
    #[error("value for `{field}` must be double-quoted, found `{value}`")]
    UnquotedScalar { field: String, value: String },
    #[error("unterminated string")]
    UnterminatedString,
    #[error("invalid escape `\\{0}`")]
    InvalidEscape(char),
    #[error("invalid number `{value}` for `{field}`")]
    InvalidNumber { field: String, value: String },
    #[error("invalid props: {0}")]
    InvalidProps(String),
}

impl GrammarErrorKind {
    fn at(self, line: usize) -> GrammarError {
        GrammarError { line, kind: self }
    }
}

/// Parse a snapshot document (`objects:` followed by object items).
///
/// # Errors
///
/// Returns the first [`GrammarError`] found; nothing is partially returned.
pub fn parse_snapshot(input: &str) -> Result<Snapshot, GrammarError> {
    let sections = parse_sections(input, &["objects"])?;
    let mut snapshot = Snapshot::default();
    for section in sections {
        for item in section.items {
            let fields = item.check(SNAPSHOT_FIELDS)?;
            snapshot.objects.push(SnapshotObject {
                id: fields.required_string("id")?,
                kind: fields.required_string("kind")?,
                x: fields.required_number("x")?,
                y: fields.required_number("y")?,
                width: fields.number("width")?,
                height: fields.number("height")?,
                rotation: fields.number("rotation")?,
                z: fields.integer("z")?,
                props: fields.props("props").unwrap_or_default(),
            });
        }
    }
    Ok(snapshot)
}

/// Parse a changes document (`create:`, `update:`, `delete:` in that order).
///
/// # Errors
///
/// Returns the first [`GrammarError`] found; nothing is partially returned.
pub fn parse_changes(input: &str) -> Result<Changes, GrammarError> {
    let sections = parse_sections(input, &["create", "update", "delete"])?;
    let mut changes = Changes::default();
    for section in sections {
        for item in section.items {
            match section.name.as_str() {
                "create" => {
                    let fields = item.check(CREATE_FIELDS)?;
                    changes.create.push(CreateOp {
                        kind: fields.required_string("kind")?,
                        x: fields.required_number("x")?,
                        y: fields.required_number("y")?,
                        width: fields.number("width")?,
                        height: fields.number("height")?,
                        rotation: fields.number("rotation")?,
                        z: fields.integer("z")?,
                        props: fields.props("props").unwrap_or_default(),
                    });
                }
                "update" => {
                    let item_line = item.line;
                    let fields = item.check(UPDATE_FIELDS)?;
                    if fields.len() < 2 {
                        return Err(GrammarErrorKind::EmptyUpdate.at(item_line));
                    }
                    changes.update.push(UpdateOp {
                        id: fields.required_string("id")?,
                        x: fields.number("x")?,
                        y: fields.number("y")?,
                        width: fields.number("width")?,
                        height: fields.number("height")?,
                        rotation: fields.number("rotation")?,
                        z: fields.integer("z")?,
                        props: fields.props("props"),
                    });
                }
                _ => {
                    let fields = item.check(DELETE_FIELDS)?;
                    changes.delete.push(DeleteOp { id: fields.required_string("id")? });
                }
            }
        }
    }
    Ok(changes)
}

// =============================================================================
// LINES AND SECTIONS
// =============================================================================

struct Line<'a> {
    number: usize,
    indent: usize,
    text: &'a str,
}

struct Section {
    name: String,
    items: Vec<Item>,
}

struct Item {
    line: usize,
    fields: Vec<Field>,
}

struct Field {
    line: usize,
    key: String,
    value: Value,
}

enum Value {
    Scalar(String),
    Props(Props),
}

fn split_lines(input: &str) -> Result<Vec<Line<'_>>, GrammarError> {
    let mut lines = Vec::new();
    for (idx, raw) in input.lines().enumerate() {
        let number = idx + 1;
        let raw = raw.trim_end();
        if raw.is_empty() {
            continue;
        }
        let text = raw.trim_start_matches(' ');
        if text.starts_with('\t') {
            return Err(GrammarErrorKind::Tab.at(number));
        }
        lines.push(Line { number, indent: raw.len() - text.len(), text });
    }
    Ok(lines)
}

fn parse_sections(input: &str, allowed: &[&str]) -> Result<Vec<Section>, GrammarError> {
    let lines = split_lines(input)?;
    if lines.is_empty() {
        return Err(GrammarErrorKind::Empty.at(1));
    }

    let mut sections = Vec::new();
    let mut next_allowed = 0;
    let mut pos = 0;
    while pos < lines.len() {
        let header = &lines[pos];
        if header.indent != 0 {
            return Err(GrammarErrorKind::Indentation { expected: 0, found: header.indent }.at(header.number));
        }
        let (name, empty) = parse_header(header)?;
        match allowed.iter().position(|a| *a == name) {
            Some(idx) if idx >= next_allowed => next_allowed = idx + 1,
            _ => return Err(GrammarErrorKind::UnexpectedSection(name.to_owned()).at(header.number)),
        }
        pos += 1;

        let mut items = Vec::new();
        while pos < lines.len() && lines[pos].indent != 0 {
            if empty {
                return Err(GrammarErrorKind::Indentation { expected: 0, found: lines[pos].indent }.at(lines[pos].number));
            }
            items.push(parse_item(&lines, &mut pos)?);
        }
        if !empty && items.is_empty() {
            return Err(GrammarErrorKind::EmptySection(name.to_owned()).at(header.number));
        }
        sections.push(Section { name: name.to_owned(), items });
    }
    Ok(sections)
}

/// `name:` (items follow) or `name: []` (empty).
fn parse_header<'a>(line: &Line<'a>) -> Result<(&'a str, bool), GrammarError> {
    let unexpected = || GrammarErrorKind::UnexpectedLine(line.text.to_owned()).at(line.number);
    let Some((name, rest)) = line.text.split_once(':') else {
        return Err(unexpected());
    };
    if !is_bareword(name) {
        return Err(unexpected());
    }
    match rest.trim() {
        "" => Ok((name, false)),
        "[]" => Ok((name, true)),
        _ => Err(unexpected()),
    }
}

fn parse_item(lines: &[Line<'_>], pos: &mut usize) -> Result<Item, GrammarError> {
    let start = &lines[*pos];
    if start.indent != ITEM_INDENT {
        return Err(GrammarErrorKind::Indentation { expected: ITEM_INDENT, found: start.indent }.at(start.number));
    }
    let Some(first) = start.text.strip_prefix("- ") else {
        return Err(GrammarErrorKind::UnexpectedLine(start.text.to_owned()).at(start.number));
    };
    let mut item = Item { line: start.number, fields: vec![parse_field(first, start.number)?] };
    *pos += 1;

    while *pos < lines.len() && lines[*pos].indent > ITEM_INDENT {
        let line = &lines[*pos];
        if line.indent != FIELD_INDENT {
            return Err(GrammarErrorKind::Indentation { expected: FIELD_INDENT, found: line.indent }.at(line.number));
        }
        item.fields.push(parse_field(line.text, line.number)?);
        *pos += 1;
    }
    Ok(item)
}

fn parse_field(text: &str, line: usize) -> Result<Field, GrammarError> {
    let Some((key, rest)) = text.split_once(':') else {
        return Err(GrammarErrorKind::UnexpectedLine(text.to_owned()).at(line));
    };
    if !is_bareword(key) {
        return Err(GrammarErrorKind::UnexpectedLine(text.to_owned()).at(line));
    }
    let raw = rest.trim();
    if raw.is_empty() {
        return Err(GrammarErrorKind::MissingValue(key.to_owned()).at(line));
    }
    let value = if key == "props" {
        Value::Props(parse_props(raw).map_err(|kind| kind.at(line))?)
    } else {
        let (value, trailing) = parse_quoted(raw, key).map_err(|kind| kind.at(line))?;
        if !trailing.trim().is_empty() {
            return Err(GrammarErrorKind::UnexpectedLine(text.to_owned()).at(line));
        }
        Value::Scalar(value)
    };
    Ok(Field { line, key: key.to_owned(), value })
}

// =============================================================================
// SCALARS AND PROPS
// =============================================================================

/// Read a double-quoted string at the start of `input`; returns it and the rest.
fn parse_quoted<'a>(input: &'a str, field: &str) -> Result<(String, &'a str), GrammarErrorKind> {
    let Some(body) = input.strip_prefix('"') else {
        let value = input.split([',', '}']).next().unwrap_or(input).trim();
        return Err(GrammarErrorKind::UnquotedScalar { field: field.to_owned(), value: value.to_owned() });
    };
    let mut out = String::new();
    let mut chars = body.char_indices();
    while let Some((idx, c)) = chars.next() {
        match c {
            '"' => return Ok((out, &body[idx + 1..])),
            '\\' => match chars.next() {
                Some((_, '"')) => out.push('"'),
                Some((_, '\\')) => out.push('\\'),
                Some((_, 'n')) => out.push('\n'),
                Some((_, 't')) => out.push('\t'),
                Some((_, other)) => return Err(GrammarErrorKind::InvalidEscape(other)),
                None => return Err(GrammarErrorKind::UnterminatedString),
            },
            other => out.push(other),
        }
    }
    Err(GrammarErrorKind::UnterminatedString)
}

/// `{key: "value", "quoted key": "value"}` on a single line.
fn parse_props(raw: &str) -> Result<Props, GrammarErrorKind> {
    let invalid = |msg: &str| GrammarErrorKind::InvalidProps(msg.to_owned());
    let Some(mut rest) = raw.strip_prefix('{') else {
        return Err(invalid("expected `{`"));
    };
    let mut props = BTreeMap::new();

    rest = rest.trim_start();
    if let Some(after) = rest.strip_prefix('}') {
        return if after.trim().is_empty() { Ok(props) } else { Err(invalid("text after `}`")) };
    }

    loop {
        let key;
        if rest.starts_with('"') {
            let (quoted, after) = parse_quoted(rest, "props")?;
            key = quoted;
            rest = after;
        } else {
            let end = rest
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '-'))
                .unwrap_or(rest.len());
            if end == 0 {
                return Err(invalid("expected a key"));
            }
            key = rest[..end].to_owned();
            rest = &rest[end..];
        }

        rest = rest.trim_start();
        let Some(after_colon) = rest.strip_prefix(':') else {
            return Err(invalid("expected `:` after key"));
        };
        let (value, after) = parse_quoted(after_colon.trim_start(), &format!("props.{key}"))?;
        if props.insert(key.clone(), value).is_some() {
            return Err(GrammarErrorKind::InvalidProps(format!("duplicate key `{key}`")));
        }

        rest = after.trim_start();
        if let Some(after) = rest.strip_prefix(',') {
            rest = after.trim_start();
            continue;
        }
        if let Some(after) = rest.strip_prefix('}') {
            if !after.trim().is_empty() {
                return Err(invalid("text after `}`"));
            }
            return Ok(props);
        }
        return Err(invalid("expected `,` or `}`"));
    }
}

fn is_bareword(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_lowercase() || c == '_')
}

// =============================================================================
// FIELD VALIDATION
// =============================================================================

/// Fields of one item, validated against a fixed order.
struct CheckedFields {
    item_line: usize,
    slots: Vec<(&'static str, Option<(usize, Value)>)>,
}

impl Item {
    fn check(self, schema: &[&'static str]) -> Result<CheckedFields, GrammarError> {
        let mut slots = schema.iter().map(|name| (*name, None)).collect::<Vec<_>>();
        let mut last: Option<usize> = None;
        for field in self.fields {
            let Some(idx) = schema.iter().position(|name| *name == field.key) else {
                return Err(GrammarErrorKind::UnknownField(field.key).at(field.line));
            };
            if slots[idx].1.is_some() {
                return Err(GrammarErrorKind::DuplicateField(field.key).at(field.line));
            }
            if let Some(prev) = last
                && idx < prev
            {
                return Err(GrammarErrorKind::FieldOrder { field: field.key, after: schema[prev].to_owned() }
                    .at(field.line));
            }
            last = Some(idx);
            slots[idx].1 = Some((field.line, field.value));
        }
        Ok(CheckedFields { item_line: self.line, slots })
    }
}

impl CheckedFields {
    fn len(&self) -> usize {
        self.slots.iter().filter(|(_, v)| v.is_some()).count()
    }

    fn get(&self, name: &str) -> Option<&(usize, Value)> {
        self.slots
            .iter()
            .find(|(n, _)| *n == name)
            .and_then(|(_, v)| v.as_ref())
    }

    fn scalar(&self, name: &str) -> Option<(usize, &str)> {
        match self.get(name) {
            Some((line, Value::Scalar(s))) => Some((*line, s.as_str())),
            _ => None,
        }
    }

    fn required_string(&self, name: &str) -> Result<String, GrammarError> {
        self.scalar(name)
            .map(|(_, s)| s.to_owned())
            .ok_or_else(|| GrammarErrorKind::MissingField(name.to_owned()).at(self.item_line))
    }

    fn number(&self, name: &str) -> Result<Option<f64>, GrammarError> {
        let Some((line, raw)) = self.scalar(name) else {
            return Ok(None);
        };
        match raw.trim().parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(Some(v)),
            _ => Err(GrammarErrorKind::InvalidNumber { field: name.to_owned(), value: raw.to_owned() }.at(line)),
        }
    }

    fn required_number(&self, name: &str) -> Result<f64, GrammarError> {
        self.number(name)?
            .ok_or_else(|| GrammarErrorKind::MissingField(name.to_owned()).at(self.item_line))
    }

    #[allow(clippy::cast_possible_truncation)]
    fn integer(&self, name: &str) -> Result<Option<i32>, GrammarError> {
        let Some(value) = self.number(name)? else {
            return Ok(None);
        };
        if value.fract() != 0.0 || value < f64::from(i32::MIN) || value > f64::from(i32::MAX) {
            let line = self.scalar(name).map_or(self.item_line, |(line, _)| line);
            return Err(GrammarErrorKind::InvalidNumber { field: name.to_owned(), value: value.to_string() }.at(line));
        }
        Ok(Some(value as i32))
    }

    fn props(&self, name: &str) -> Option<Props> {
        match self.get(name) {
            Some((_, Value::Props(props))) => Some(props.clone()),
            _ => None,
        }
    }
}
