use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::JsonPathSegment;

/// Location of a value inside a document, root first.
///
/// Serializes as a plain array (`["customer", 0, "name"]`). A path is only
/// meaningful against the snapshot it was derived from: inserting or removing
/// siblings before an addressed index shifts what it points at.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct JsonPath(Vec<JsonPathSegment>);

impl JsonPath {
  pub fn root() -> Self {
    Self(Vec::new())
  }

  pub fn new(segments: Vec<JsonPathSegment>) -> Self {
    Self(segments)
  }

  pub fn segments(&self) -> &[JsonPathSegment] {
    &self.0
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  pub fn is_root(&self) -> bool {
    self.0.is_empty()
  }

  pub fn last(&self) -> Option<&JsonPathSegment> {
    self.0.last()
  }

  /// `None` for the root.
  pub fn parent(&self) -> Option<JsonPath> {
    if self.0.is_empty() {
      return None;
    }
    Some(Self(self.0[..self.0.len() - 1].to_vec()))
  }

  pub fn child(&self, segment: impl Into<JsonPathSegment>) -> JsonPath {
    let mut segments = self.0.clone();
    segments.push(segment.into());
    Self(segments)
  }

  /// Render as an accessor chain: `$["customer"][0]["name"]`, or `$` for the root.
  pub fn to_display_string(&self) -> String {
    self.to_string()
  }

  /// Look up the value this path addresses.
  ///
  /// An index segment applied to an object reads the decimal key, the same
  /// slot the mutator writes to.
  pub fn value_at<'a>(&self, root: &'a Value) -> Option<&'a Value> {
    let mut current = root;
    for seg in &self.0 {
      current = match (seg, current) {
        (JsonPathSegment::Key(k), Value::Object(map)) => map.get(k)?,
        (JsonPathSegment::Index(i), Value::Object(map)) => map.get(&i.to_string())?,
        (JsonPathSegment::Index(i), Value::Array(arr)) => arr.get(usize::try_from(*i).ok()?)?,
        _ => return None,
      };
    }
    Some(current)
  }
}

impl fmt::Display for JsonPath {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str("$")?;
    for seg in &self.0 {
      match seg {
        JsonPathSegment::Index(i) => write!(f, "[{i}]")?,
        // JSON string quoting keeps keys containing quotes or brackets unambiguous.
        JsonPathSegment::Key(k) => write!(f, "[{}]", Value::String(k.clone()))?,
      }
    }
    Ok(())
  }
}

impl From<Vec<JsonPathSegment>> for JsonPath {
  fn from(segments: Vec<JsonPathSegment>) -> Self {
    Self(segments)
  }
}

impl FromIterator<JsonPathSegment> for JsonPath {
  fn from_iter<I: IntoIterator<Item = JsonPathSegment>>(iter: I) -> Self {
    Self(iter.into_iter().collect())
  }
}
