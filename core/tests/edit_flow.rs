use std::sync::{
  atomic::{AtomicUsize, Ordering},
  Arc,
};

use parking_lot::Mutex;

use ne_core::{
  project_for_editing, reconstruct_from_editing, render_preview, set_value_at_path,
  ChangeEvent, CommitError, DocumentError, DocumentHandle, DocumentStore, EditSession, EditState,
  EditingBuffer, JsonNodeKind, JsonPath, JsonPathSegment, NodeData, Revision, Row, SetTextOptions,
};
use serde_json::{json, Value};

fn path(segments: &[JsonPathSegment]) -> JsonPath {
  JsonPath::new(segments.to_vec())
}

fn key(k: &str) -> JsonPathSegment {
  JsonPathSegment::Key(k.into())
}

fn idx(i: u64) -> JsonPathSegment {
  JsonPathSegment::Index(i)
}

fn node(id: &str, p: JsonPath, rows: Vec<Row>) -> NodeData {
  NodeData {
    id: id.into(),
    rows,
    path: p,
  }
}

fn doc(value: Value) -> DocumentHandle {
  DocumentHandle::from_value(value, 2).unwrap()
}

/// Rows of the root object, as a graph view derives them.
fn root_rows(value: &Value) -> Vec<Row> {
  value
    .as_object()
    .unwrap()
    .iter()
    .map(|(k, v)| match v {
      Value::Object(m) => Row::container(Some(k.as_str()), JsonNodeKind::Object, m.len() as u64),
      Value::Array(a) => Row::container(Some(k.as_str()), JsonNodeKind::Array, a.len() as u64),
      _ => Row::scalar(Some(k.as_str()), v.clone()),
    })
    .collect()
}

#[test]
fn set_then_read_returns_new_value() {
  let d = json!({"a": {"b": [1, {"c": 2}]}, "z": null});
  let cases = vec![
    path(&[key("a"), key("b"), idx(1), key("c")]),
    path(&[key("a"), key("b"), idx(0)]),
    path(&[key("z")]),
    path(&[key("new"), key("deep"), key("leaf")]),
    path(&[key("a"), key("b"), idx(5)]),
  ];
  for p in cases {
    let out = set_value_at_path(&d, &p, json!("v"));
    assert_eq!(p.value_at(&out), Some(&json!("v")), "path {p}");
  }
}

#[test]
fn empty_path_replaces_document() {
  for d in [json!({"a": 1}), json!([1, 2]), json!("s"), json!(null)] {
    assert_eq!(set_value_at_path(&d, &JsonPath::root(), json!({"x": true})), json!({"x": true}));
  }
}

#[test]
fn nested_set_keeps_siblings() {
  let d = json!({"a": {"b": 1, "c": [1, 2]}, "d": "keep"});
  let out = set_value_at_path(&d, &path(&[key("a"), key("b")]), json!(2));
  assert_eq!(out, json!({"a": {"b": 2, "c": [1, 2]}, "d": "keep"}));
  // input untouched
  assert_eq!(d, json!({"a": {"b": 1, "c": [1, 2]}, "d": "keep"}));
}

#[test]
fn missing_intermediate_is_created() {
  let d = json!({"x": 1});
  let out = set_value_at_path(&d, &path(&[key("y"), key("z")]), json!(5));
  assert_eq!(out, json!({"x": 1, "y": {"z": 5}}));
}

#[test]
fn arrays_stay_arrays() {
  let d = json!([{"n": 1}, {"n": 2}]);
  let out = set_value_at_path(&d, &path(&[idx(1), key("n")]), json!(3));
  assert_eq!(out, json!([{"n": 1}, {"n": 3}]));
}

#[test]
fn projection_of_zero_rows_is_empty_object() {
  let buf = project_for_editing(&[]);
  assert_eq!(buf, EditingBuffer::text("{}"));
  assert_eq!(reconstruct_from_editing(&buf), json!({}));
}

#[test]
fn projection_of_bare_scalar_is_free_text() {
  let buf = project_for_editing(&[Row::scalar(None, json!("hello world"))]);
  assert_eq!(buf, EditingBuffer::text("hello world"));
  assert_eq!(reconstruct_from_editing(&buf), json!("hello world"));

  let buf = project_for_editing(&[Row::scalar(None, json!(42))]);
  assert_eq!(reconstruct_from_editing(&buf), json!(42));
}

#[test]
fn projection_skips_container_rows() {
  let rows = vec![
    Row::scalar(Some("name"), json!("Ada")),
    Row::container(Some("address"), JsonNodeKind::Object, 3),
    Row::scalar(Some("age"), json!(36)),
    Row::container(Some("tags"), JsonNodeKind::Array, 2),
    Row::scalar(Some("nick"), Value::Null),
    Row {
      key: Some("missing".into()),
      value: None,
      kind: JsonNodeKind::Unknown,
      child_count: None,
    },
  ];
  let EditingBuffer::Fields { fields } = project_for_editing(&rows) else {
    panic!("expected field buffer");
  };
  let entries: Vec<(&str, &str)> = fields.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
  assert_eq!(
    entries,
    vec![("name", "Ada"), ("age", "36"), ("nick", "null"), ("missing", "")]
  );
}

#[test]
fn container_only_node_projects_empty_object_text() {
  let rows = vec![Row::container(Some("a"), JsonNodeKind::Object, 1)];
  assert_eq!(project_for_editing(&rows), EditingBuffer::text("{}"));
}

#[test]
fn unedited_round_trip_preserves_values() {
  let rows = vec![Row::scalar(Some("a"), json!(1))];
  assert_eq!(reconstruct_from_editing(&project_for_editing(&rows)), json!({"a": 1}));

  let rows = vec![
    Row::scalar(Some("s"), json!("text")),
    Row::scalar(Some("b"), json!(false)),
    Row::scalar(Some("n"), Value::Null),
    Row::scalar(Some("f"), json!(1.5)),
  ];
  assert_eq!(
    reconstruct_from_editing(&project_for_editing(&rows)),
    json!({"s": "text", "b": false, "n": null, "f": 1.5})
  );
}

#[test]
fn field_parsing_falls_back_per_field() {
  let mut fields = indexmap::IndexMap::new();
  fields.insert("flag".to_string(), "true".to_string());
  fields.insert("greeting".to_string(), "hello".to_string());
  fields.insert("list".to_string(), "[1, 2".to_string());
  fields.insert("obj".to_string(), r#"{"k": [1]}"#.to_string());
  let value = reconstruct_from_editing(&EditingBuffer::Fields { fields });
  assert_eq!(
    value,
    json!({"flag": true, "greeting": "hello", "list": "[1, 2", "obj": {"k": [1]}})
  );
  let keys: Vec<&String> = value.as_object().unwrap().keys().collect();
  assert_eq!(keys, ["flag", "greeting", "list", "obj"]);
}

#[test]
fn free_text_that_does_not_parse_is_kept_as_string() {
  assert_eq!(reconstruct_from_editing(&EditingBuffer::text("{oops")), json!("{oops"));
  assert_eq!(reconstruct_from_editing(&EditingBuffer::text("")), json!(""));
}

#[test]
fn preview_pretty_prints_scalar_rows() {
  let rows = vec![
    Row::scalar(Some("a"), json!(1)),
    Row::container(Some("b"), JsonNodeKind::Array, 0),
  ];
  assert_eq!(render_preview(&rows), "{\n  \"a\": 1\n}");
  assert_eq!(render_preview(&[Row::scalar(None, json!("x"))]), "x");
}

#[test]
fn commit_writes_fields_and_keeps_nested_children() {
  let store = doc(json!({
    "customer": {"name": "Ada", "address": {"city": "London"}, "age": 36},
    "other": 1
  }));
  let mut edit = EditSession::default();
  edit.select_node(Some(node(
    "n1",
    path(&[key("customer")]),
    vec![
      Row::scalar(Some("name"), json!("Ada")),
      Row::container(Some("address"), JsonNodeKind::Object, 1),
      Row::scalar(Some("age"), json!(36)),
    ],
  )));
  assert_eq!(edit.path_display(), r#"$["customer"]"#);

  edit.begin_edit().unwrap();
  assert!(edit.set_field("age", "37"));
  assert!(edit.set_field("name", "Grace"));
  assert!(!edit.set_field("address", "x"));

  let outcome = edit.commit(&store).unwrap();
  assert_eq!(edit.state(), EditState::Viewing);
  assert!(edit.buffer().is_none());
  assert!(edit.node().is_none());
  assert_eq!(outcome.path, path(&[key("customer")]));

  let expected = json!({
    "customer": {"name": "Grace", "address": {"city": "London"}, "age": 37},
    "other": 1
  });
  assert_eq!(store.canonical_value().unwrap(), expected);
  assert_eq!(outcome.revision, store.revision());
  // text and value agree
  let reparsed: Value = serde_json::from_str(&store.canonical_text()).unwrap();
  assert_eq!(reparsed, expected);
  assert!(store.is_dirty());
}

#[test]
fn commit_of_bare_scalar_node() {
  let store = doc(json!({"items": ["a", "b"]}));
  let mut edit = EditSession::default();
  edit.select_node(Some(node(
    "n2",
    path(&[key("items"), idx(1)]),
    vec![Row::scalar(None, json!("b"))],
  )));
  edit.begin_edit().unwrap();
  assert!(edit.set_text("42"));
  edit.commit(&store).unwrap();
  assert_eq!(store.canonical_value().unwrap(), json!({"items": ["a", 42]}));
}

#[test]
fn commit_at_root_replaces_document() {
  let store = doc(json!("just text"));
  let mut edit = EditSession::default();
  edit.select_node(Some(node("root", JsonPath::root(), vec![Row::scalar(None, json!("just text"))])));
  edit.begin_edit().unwrap();
  edit.set_text("hello");
  edit.commit(&store).unwrap();
  assert_eq!(store.canonical_value().unwrap(), json!("hello"));
  assert_eq!(store.canonical_text(), "\"hello\"");
}

#[test]
fn cancel_never_mutates_document() {
  let store = doc(json!({"a": 1}));
  let before_text = store.canonical_text();
  let before_rev = store.revision();

  let mut edit = EditSession::default();
  edit.select_node(Some(node("n", JsonPath::root(), vec![Row::scalar(Some("a"), json!(1))])));
  edit.begin_edit().unwrap();
  edit.set_field("a", "999");
  edit.cancel();

  assert_eq!(edit.state(), EditState::Viewing);
  assert!(edit.buffer().is_none());
  assert_eq!(store.canonical_text(), before_text);
  assert_eq!(store.revision(), before_rev);

  // re-entering projects again from the rows, not the cancelled text
  let buf = edit.begin_edit().unwrap().clone();
  let EditingBuffer::Fields { fields } = buf else {
    panic!("expected fields");
  };
  assert_eq!(fields.get("a").map(String::as_str), Some("1"));
}

#[test]
fn failed_canonical_read_leaves_everything_unchanged() {
  let store = DocumentHandle::from_text("{\"a\": 1}", 2);
  // the text surface wrote something that does not parse
  store.set_canonical_text("{\"a\": ".to_string(), SetTextOptions::default());
  let text_before = store.canonical_text();
  let rev_before = store.revision();

  let mut edit = EditSession::default();
  edit.select_node(Some(node("n", JsonPath::root(), vec![Row::scalar(Some("a"), json!(1))])));
  edit.begin_edit().unwrap();
  edit.set_field("a", "2");

  let err = edit.commit(&store).unwrap_err();
  assert!(matches!(err, CommitError::CanonicalRead(_)));
  assert_eq!(edit.state(), EditState::Editing);
  let Some(EditingBuffer::Fields { fields }) = edit.buffer() else {
    panic!("buffer should be kept");
  };
  assert_eq!(fields.get("a").map(String::as_str), Some("2"));
  assert_eq!(store.canonical_text(), text_before);
  assert!(store.canonical_value().is_err());
  assert_eq!(store.revision(), rev_before);

  // once the text is fixed the same buffer commits
  store.set_canonical_text("{\"a\": 1}".to_string(), SetTextOptions::default());
  edit.commit(&store).unwrap();
  assert_eq!(store.canonical_value().unwrap(), json!({"a": 2}));
}

#[test]
fn commit_requires_editing_state() {
  let store = doc(json!({}));
  let mut edit = EditSession::default();
  assert!(matches!(edit.commit(&store), Err(CommitError::NoNode)));
  edit.select_node(Some(node("n", JsonPath::root(), vec![])));
  assert!(matches!(
    edit.commit(&store),
    Err(CommitError::NotEditing(EditState::Viewing))
  ));
}

#[test]
fn switching_nodes_drops_the_buffer() {
  let mut edit = EditSession::default();
  edit.select_node(Some(node("a", JsonPath::root(), vec![Row::scalar(Some("x"), json!(1))])));
  edit.begin_edit().unwrap();
  edit.set_field("x", "2");
  edit.select_node(Some(node("b", path(&[key("y")]), vec![Row::scalar(None, json!(3))])));
  assert_eq!(edit.state(), EditState::Viewing);
  assert!(edit.buffer().is_none());
  assert_eq!(edit.node().map(|n| n.id.as_str()), Some("b"));
}

#[test]
fn commit_does_not_refresh_its_own_edit_surface() {
  let store = doc(json!({"a": 1, "b": 2}));
  let refreshes = Arc::new(AtomicUsize::new(0));
  let events = Arc::new(Mutex::new(Vec::new()));
  {
    let refreshes = refreshes.clone();
    let events = events.clone();
    store.subscribe(move |e| {
      events.lock().push(*e);
      if e.refresh_edit_surface {
        refreshes.fetch_add(1, Ordering::SeqCst);
      }
    });
  }

  let rows = vec![Row::scalar(Some("a"), json!(1)), Row::scalar(Some("b"), json!(2))];
  let mut edit = EditSession::default();
  edit.select_node(Some(node("n", JsonPath::root(), rows)));
  edit.begin_edit().unwrap();
  edit.set_field("a", "10");
  edit.commit(&store).unwrap();

  // exactly one write, flagged as not refreshing the edit surface
  let seen = events.lock().clone();
  assert_eq!(seen.len(), 1);
  assert!(!seen[0].refresh_edit_surface);
  assert_eq!(refreshes.load(Ordering::SeqCst), 0);

  // a session mid-edit ignores that event but reacts to external writes
  let current = store.canonical_value().unwrap();
  edit.select_node(Some(node("n", JsonPath::root(), root_rows(&current))));
  edit.begin_edit().unwrap();
  edit.set_field("b", "20");
  assert!(!edit.on_document_change(&seen[0], None));
  assert_eq!(edit.state(), EditState::Editing);

  store.set_canonical_text("{\"a\": 0}".to_string(), SetTextOptions::default());
  let external = *events.lock().last().unwrap();
  let refreshed = node("n", JsonPath::root(), vec![Row::scalar(Some("a"), json!(0))]);
  assert!(edit.on_document_change(&external, Some(refreshed)));
  assert_eq!(edit.state(), EditState::Viewing);
  assert_eq!(refreshes.load(Ordering::SeqCst), 1);
}

#[test]
fn stale_write_is_refused() {
  let store = doc(json!({"a": 1}));
  let (rev, _) = store.read_versioned().unwrap();
  store.set_canonical_text("{\"a\": 2}".to_string(), SetTextOptions::default());
  let err = store
    .replace(Some(rev), "{}".into(), json!({}), SetTextOptions::default())
    .unwrap_err();
  assert!(matches!(err, DocumentError::Stale { .. }));
  assert_eq!(store.canonical_value().unwrap(), json!({"a": 2}));
}

#[test]
fn reopening_after_commit_shows_committed_values() {
  let store = doc(json!({"a": 1, "nested": {"x": true}}));
  let mut edit = EditSession::default();
  let rows = root_rows(&store.canonical_value().unwrap());
  edit.select_node(Some(node("root", JsonPath::root(), rows)));
  edit.begin_edit().unwrap();
  edit.set_field("a", "10");
  edit.commit(&store).unwrap();

  // the stale rows are gone; the caller reselects from the new document
  assert!(matches!(edit.begin_edit(), Err(CommitError::NoNode)));
  let rows = root_rows(&store.canonical_value().unwrap());
  edit.select_node(Some(node("root", JsonPath::root(), rows)));
  assert_eq!(edit.preview(), "{\n  \"a\": 10\n}");
  let EditingBuffer::Fields { fields } = edit.begin_edit().unwrap().clone() else {
    panic!("expected fields");
  };
  assert_eq!(fields.get("a").map(String::as_str), Some("10"));

  // committing the untouched buffer keeps the earlier edit
  edit.commit(&store).unwrap();
  assert_eq!(store.canonical_value().unwrap(), json!({"a": 10, "nested": {"x": true}}));
}

/// Store that keeps text only and records every notification it would send.
#[derive(Default)]
struct TextOnlyStore {
  state: Mutex<(u64, String)>,
  events: Mutex<Vec<ChangeEvent>>,
}

impl TextOnlyStore {
  fn write(&self, text: String, refresh: bool) -> Revision {
    let revision = {
      let mut state = self.state.lock();
      state.0 += 1;
      state.1 = text;
      Revision(state.0)
    };
    self.events.lock().push(ChangeEvent {
      revision,
      refresh_edit_surface: refresh,
    });
    revision
  }
}

impl DocumentStore for TextOnlyStore {
  fn canonical_text(&self) -> String {
    self.state.lock().1.clone()
  }

  fn canonical_value(&self) -> Result<Value, DocumentError> {
    serde_json::from_str(&self.canonical_text()).map_err(|e| DocumentError::Parse(e.to_string()))
  }

  fn set_canonical_text(&self, text: String, options: SetTextOptions) -> Revision {
    self.write(text, !options.suppress_edit_surface_refresh)
  }

  fn set_canonical_value(&self, value: Value) -> Result<Revision, DocumentError> {
    Ok(self.write(value.to_string(), true))
  }

  fn revision(&self) -> Revision {
    Revision(self.state.lock().0)
  }

  fn read_versioned(&self) -> Result<(Revision, Value), DocumentError> {
    let state = self.state.lock();
    let value = serde_json::from_str(&state.1).map_err(|e| DocumentError::Parse(e.to_string()))?;
    Ok((Revision(state.0), value))
  }

  fn replace(
    &self,
    expected: Option<Revision>,
    text: String,
    _value: Value,
    options: SetTextOptions,
  ) -> Result<Revision, DocumentError> {
    let revision = {
      let mut state = self.state.lock();
      if let Some(expected) = expected {
        if state.0 != expected.0 {
          return Err(DocumentError::Stale {
            expected: expected.0,
            actual: state.0,
          });
        }
      }
      state.0 += 1;
      state.1 = text;
      Revision(state.0)
    };
    self.events.lock().push(ChangeEvent {
      revision,
      refresh_edit_surface: !options.suppress_edit_surface_refresh,
    });
    Ok(revision)
  }
}

#[test]
fn commit_through_a_custom_store_is_one_silent_write() {
  let store = TextOnlyStore::default();
  store.set_canonical_text(r#"{"a": 1}"#.into(), SetTextOptions::default());
  store.events.lock().clear();

  let mut edit = EditSession::default();
  edit.select_node(Some(node("n", JsonPath::root(), vec![Row::scalar(Some("a"), json!(1))])));
  edit.begin_edit().unwrap();
  edit.set_field("a", "2");
  let outcome = edit.commit(&store).unwrap();

  let events = store.events.lock().clone();
  assert_eq!(events.len(), 1);
  assert!(!events[0].refresh_edit_surface);
  assert_eq!(outcome.revision, Revision(2));
  assert_eq!(store.canonical_value().unwrap(), json!({"a": 2}));
}

#[test]
fn unsubscribed_listener_stops_hearing_writes() {
  let store = doc(json!({}));
  let calls = Arc::new(AtomicUsize::new(0));
  let id = {
    let calls = calls.clone();
    store.subscribe(move |_| {
      calls.fetch_add(1, Ordering::SeqCst);
    })
  };

  store.set_canonical_value(json!({"a": 1})).unwrap();
  assert!(store.unsubscribe(id));
  assert!(!store.unsubscribe(id));
  store.set_canonical_value(json!({"a": 2})).unwrap();
  assert_eq!(calls.load(Ordering::SeqCst), 1);
}
