use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::path::JsonPath;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FileFormat {
  Json,
  Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentInfo {
  pub session_id: String,
  /// Backing file, if the document was opened from disk.
  pub path: Option<String>,
  pub display_name: String,
  pub format: FileFormat,
  pub created_at_ms: i64,
  /// Whether the canonical text currently parses.
  pub valid: bool,
}

/// A JSON path segment used by the UI to refer to a subtree.
///
/// This is intentionally "untagged" so the IPC payload can be a simple
/// array like `["foo", 0, "bar"]`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum JsonPathSegment {
  Key(String),
  Index(u64),
}

impl From<&str> for JsonPathSegment {
  fn from(key: &str) -> Self {
    JsonPathSegment::Key(key.to_string())
  }
}

impl From<String> for JsonPathSegment {
  fn from(key: String) -> Self {
    JsonPathSegment::Key(key)
  }
}

impl From<u64> for JsonPathSegment {
  fn from(idx: u64) -> Self {
    JsonPathSegment::Index(idx)
  }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JsonNodeKind {
  Object,
  Array,
  String,
  Number,
  Boolean,
  Null,
  Unknown,
}

impl JsonNodeKind {
  pub fn of(value: &Value) -> Self {
    match value {
      Value::Object(_) => JsonNodeKind::Object,
      Value::Array(_) => JsonNodeKind::Array,
      Value::String(_) => JsonNodeKind::String,
      Value::Number(_) => JsonNodeKind::Number,
      Value::Bool(_) => JsonNodeKind::Boolean,
      Value::Null => JsonNodeKind::Null,
    }
  }

  pub fn is_container(self) -> bool {
    matches!(self, JsonNodeKind::Object | JsonNodeKind::Array)
  }
}

/// One display line of a node.
///
/// Scalar rows carry a literal `value`; container rows summarize a nested
/// object/array through `child_count` and are never edited from the parent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Row {
  /// `None` for the synthetic row of a bare scalar document.
  pub key: Option<String>,
  /// `None` when the value is absent.
  pub value: Option<Value>,
  #[serde(rename = "type")]
  pub kind: JsonNodeKind,
  pub child_count: Option<u64>,
}

impl Row {
  pub fn scalar(key: Option<&str>, value: Value) -> Self {
    Self {
      key: key.map(str::to_string),
      kind: JsonNodeKind::of(&value),
      value: Some(value),
      child_count: None,
    }
  }

  pub fn container(key: Option<&str>, kind: JsonNodeKind, child_count: u64) -> Self {
    Self {
      key: key.map(str::to_string),
      value: None,
      kind,
      child_count: Some(child_count),
    }
  }

  pub fn is_container(&self) -> bool {
    self.kind.is_container()
  }
}

/// One container level (or a bare scalar document) as derived for display.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeData {
  pub id: String,
  pub rows: Vec<Row>,
  pub path: JsonPath,
}

/// Transient edit state of one node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum EditingBuffer {
  /// Whole-node free text (bare scalars, empty nodes).
  Text { text: String },
  /// Raw text per keyed scalar row, in row order.
  Fields { fields: IndexMap<String, String> },
}

impl EditingBuffer {
  pub fn text(text: impl Into<String>) -> Self {
    EditingBuffer::Text { text: text.into() }
  }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EditState {
  Viewing,
  Editing,
  Committing,
}

/// What to create when a path runs through a missing intermediate value.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum IntermediateContainers {
  /// Always an empty object, even under an index segment.
  #[default]
  AlwaysKeyed,
  /// An empty array when the next segment is an index, an object otherwise.
  FollowSegment,
}

/// User-level settings persisted in the settings table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EditorSettings {
  pub indent: usize,
  pub intermediate_containers: IntermediateContainers,
}

impl Default for EditorSettings {
  fn default() -> Self {
    Self {
      indent: 2,
      intermediate_containers: IntermediateContainers::AlwaysKeyed,
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveResult {
  pub output_path: String,
  pub bytes_written: u64,
}
