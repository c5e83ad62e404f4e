use serde_json::{Map, Value};
use tracing::warn;

use crate::{
  models::{IntermediateContainers, JsonPathSegment},
  path::JsonPath,
};

/// Most `null` slots an index write may add past the end of an array.
pub const MAX_ARRAY_PADDING: usize = 4096;

const INDEX_TOO_FAR: &str = "index too far past the end of the array";

/// Return a copy of `root` with `new_value` stored at `path`.
///
/// `root` is never modified. An empty path replaces the whole document.
/// Missing (or `null`) intermediates become empty objects, even under an
/// index segment; a scalar that sits where a container is needed is
/// overwritten the same way.
pub fn set_value_at_path(root: &Value, path: &JsonPath, new_value: Value) -> Value {
  set_value_at_path_with(root, path, new_value, IntermediateContainers::AlwaysKeyed)
}

/// Like [`set_value_at_path`], with an explicit intermediate container policy.
pub fn set_value_at_path_with(
  root: &Value,
  path: &JsonPath,
  new_value: Value,
  intermediates: IntermediateContainers,
) -> Value {
  if path.is_root() {
    return new_value;
  }
  let mut out = root.clone();
  set_value_at_path_in_place(&mut out, path, new_value, intermediates);
  out
}

/// Owned form of the mutator: writes into `root` directly.
pub fn set_value_at_path_in_place(
  root: &mut Value,
  path: &JsonPath,
  new_value: Value,
  intermediates: IntermediateContainers,
) {
  let segments = path.segments();
  let Some((last, parents)) = segments.split_last() else {
    *root = new_value;
    return;
  };

  ensure_container(root, &segments[0], intermediates);
  let mut cur = root;
  for (seg, next) in parents.iter().zip(segments.iter().skip(1)) {
    let child = match slot(cur, seg) {
      Ok(child) => child,
      Err(reason) => {
        warn!(path = %path, reason, "write dropped");
        return;
      }
    };
    ensure_container(child, next, intermediates);
    cur = child;
  }

  match slot(cur, last) {
    Ok(target) => *target = new_value,
    Err(reason) => warn!(path = %path, reason, "write dropped"),
  }
}

/// Make sure `value` can be descended into with `next`.
fn ensure_container(value: &mut Value, next: &JsonPathSegment, intermediates: IntermediateContainers) {
  if matches!(value, Value::Object(_) | Value::Array(_)) {
    return;
  }
  *value = match (intermediates, next) {
    (IntermediateContainers::FollowSegment, JsonPathSegment::Index(_)) => Value::Array(Vec::new()),
    _ => Value::Object(Map::new()),
  };
}

/// Mutable slot for `seg` inside a container, created as `null` if missing.
///
/// Arrays are padded with `null` up to the index, at most
/// [`MAX_ARRAY_PADDING`] slots past the current end.
fn slot<'a>(container: &'a mut Value, seg: &JsonPathSegment) -> Result<&'a mut Value, &'static str> {
  match (container, seg) {
    (Value::Object(map), JsonPathSegment::Key(k)) => Ok(map.entry(k.clone()).or_insert(Value::Null)),
    (Value::Object(map), JsonPathSegment::Index(i)) => {
      Ok(map.entry(i.to_string()).or_insert(Value::Null))
    }
    (Value::Array(arr), JsonPathSegment::Index(i)) => {
      let i = usize::try_from(*i).map_err(|_| INDEX_TOO_FAR)?;
      if i >= arr.len() {
        if i - arr.len() > MAX_ARRAY_PADDING {
          return Err(INDEX_TOO_FAR);
        }
        arr.resize(i + 1, Value::Null);
      }
      arr.get_mut(i).ok_or(INDEX_TOO_FAR)
    }
    (Value::Array(_), JsonPathSegment::Key(_)) => Err("key segment addresses an array"),
    _ => Err("segment addresses a scalar"),
  }
}
