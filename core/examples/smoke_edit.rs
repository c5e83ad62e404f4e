use std::path::PathBuf;

use ne_core::{
  CoreEngine, CoreOptions, DocumentStore, JsonNodeKind, JsonPath, NodeData, Row, StorageOptions,
};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

/// Edit one scalar member of the root object and print the committed document.
fn main() -> Result<(), String> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

  let mut args = std::env::args().skip(1);
  let usage = "usage: cargo run -p ne_core --example smoke_edit -- <file.json> <key> <text>";
  let path = PathBuf::from(args.next().ok_or_else(|| usage.to_string())?);
  let key = args.next().ok_or_else(|| usage.to_string())?;
  let text = args.next().ok_or_else(|| usage.to_string())?;

  let dir = tempfile::tempdir().map_err(|e| e.to_string())?;
  let eng = CoreEngine::new(CoreOptions {
    storage: StorageOptions {
      sqlite_path: Some(dir.path().join("smoke.sqlite")),
    },
    ..CoreOptions::default()
  })
  .map_err(|e| e.to_string())?;

  let info = eng.open_file(&path).map_err(|e| e.to_string())?;
  let doc = eng.document(&info.session_id).map_err(|e| e.to_string())?;
  let current = doc.canonical_value().map_err(|e| e.to_string())?;
  let obj = current
    .as_object()
    .ok_or_else(|| "document root is not an object".to_string())?;

  // One row per root member, the way a graph view would show the root node.
  let rows = obj
    .iter()
    .map(|(k, v)| match v {
      Value::Object(m) => Row::container(Some(k.as_str()), JsonNodeKind::Object, m.len() as u64),
      Value::Array(a) => Row::container(Some(k.as_str()), JsonNodeKind::Array, a.len() as u64),
      _ => Row::scalar(Some(k.as_str()), v.clone()),
    })
    .collect();

  let mut edit = eng.new_edit_session();
  edit.select_node(Some(NodeData {
    id: "root".into(),
    rows,
    path: JsonPath::root(),
  }));
  edit.begin_edit().map_err(|e| e.to_string())?;
  if !edit.set_field(&key, text) {
    return Err(format!("{key} is not a scalar member of the root object"));
  }
  let edited = edit.path_display();
  let token = eng.commit(&info.session_id, &mut edit).map_err(|e| e.to_string())?;

  println!("path={edited}");
  println!("token={token}");
  println!("{}", doc.canonical_text());
  Ok(())
}
