use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{ser::PrettyFormatter, Map, Value};

use crate::models::{EditingBuffer, Row};

pub(crate) const EMPTY_OBJECT_TEXT: &str = "{}";

/// Build the editing buffer for a node.
///
/// - no rows: the empty object text
/// - a single unkeyed row (bare scalar document): that value as free text
/// - otherwise: one field per keyed scalar row; container rows are left out
///   because they are edited by navigating into their own node
pub fn project_for_editing(rows: &[Row]) -> EditingBuffer {
  if rows.is_empty() {
    return EditingBuffer::text(EMPTY_OBJECT_TEXT);
  }
  if let [row] = rows {
    if row.key.is_none() && !row.is_container() {
      return EditingBuffer::text(literal_text(row.value.as_ref()));
    }
  }

  let fields: IndexMap<String, String> = rows
    .iter()
    .filter(|r| !r.is_container())
    .filter_map(|r| Some((r.key.clone()?, literal_text(r.value.as_ref()))))
    .collect();
  if fields.is_empty() {
    return EditingBuffer::text(EMPTY_OBJECT_TEXT);
  }
  EditingBuffer::Fields { fields }
}

/// Turn an editing buffer back into a value. Never fails: text that is not a
/// JSON literal becomes a string, field by field.
pub fn reconstruct_from_editing(buffer: &EditingBuffer) -> Value {
  match buffer {
    EditingBuffer::Text { text } => parse_literal(text),
    EditingBuffer::Fields { fields } => Value::Object(
      fields
        .iter()
        .map(|(k, raw)| (k.clone(), parse_literal(raw)))
        .collect(),
    ),
  }
}

/// Best-effort literal parse: numbers, booleans, null and nested JSON parse as
/// such, anything else is kept verbatim as a string.
pub fn parse_literal(raw: &str) -> Value {
  serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Text shown for a row value in an edit field. Strings are unquoted, absent
/// values are empty.
pub fn literal_text(value: Option<&Value>) -> String {
  match value {
    None => String::new(),
    Some(Value::String(s)) => s.clone(),
    Some(other) => other.to_string(),
  }
}

/// Read-only rendering of a node: the bare scalar for a single unkeyed row,
/// otherwise its keyed scalar rows as a pretty-printed object.
pub fn render_preview(rows: &[Row]) -> String {
  if rows.is_empty() {
    return EMPTY_OBJECT_TEXT.to_string();
  }
  if let [row] = rows {
    if row.key.is_none() && !row.is_container() {
      return literal_text(row.value.as_ref());
    }
  }

  let mut obj = Map::new();
  for row in rows.iter().filter(|r| !r.is_container()) {
    if let (Some(key), Some(value)) = (&row.key, &row.value) {
      obj.insert(key.clone(), value.clone());
    }
  }
  to_pretty_text(&Value::Object(obj), 2).unwrap_or_else(|_| EMPTY_OBJECT_TEXT.to_string())
}

/// Serialize a document the way it is stored: pretty printed with `indent` spaces.
pub fn to_pretty_text(value: &Value, indent: usize) -> Result<String, serde_json::Error> {
  let indent = " ".repeat(indent);
  let mut out = Vec::new();
  let mut ser =
    serde_json::Serializer::with_formatter(&mut out, PrettyFormatter::with_indent(indent.as_bytes()));
  value.serialize(&mut ser)?;
  // serde_json only ever emits UTF-8.
  Ok(String::from_utf8_lossy(&out).into_owned())
}
