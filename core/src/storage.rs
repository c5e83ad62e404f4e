use std::{
  fs,
  path::PathBuf,
  time::{SystemTime, UNIX_EPOCH},
};

use rusqlite::{params, Connection, OptionalExtension};
use tracing::warn;

use crate::{models::EditorSettings, path::JsonPath};

const EDITOR_SETTINGS_KEY: &str = "editor.settings";

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS settings(
  key TEXT PRIMARY KEY,
  value_json TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS last_edits(
  file_path TEXT PRIMARY KEY,
  node_path_json TEXT NOT NULL,
  committed_at INTEGER NOT NULL
);
"#;

#[derive(Debug, Clone, Default)]
pub struct StorageOptions {
  /// SQLite file; `~/.node-edit/storage.sqlite` when unset.
  pub sqlite_path: Option<PathBuf>,
}

/// Where the last commit into a file landed, so a view can reselect that node
/// when the file is opened again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastEdit {
  pub file_path: String,
  pub node_path: JsonPath,
  pub committed_at_ms: i64,
}

/// Editor settings and per-file edit positions.
#[derive(Clone)]
pub struct Storage {
  path: PathBuf,
}

impl Storage {
  pub fn new(opts: StorageOptions) -> Result<Self, String> {
    let path = opts.sqlite_path.unwrap_or_else(default_sqlite_path);
    if let Some(dir) = path.parent() {
      fs::create_dir_all(dir).map_err(|e| e.to_string())?;
    }
    let storage = Self { path };
    storage.connect()?.execute_batch(SCHEMA).map_err(|e| e.to_string())?;
    Ok(storage)
  }

  fn connect(&self) -> Result<Connection, String> {
    Connection::open(&self.path).map_err(|e| e.to_string())
  }

  pub fn set_setting_json(&self, key: &str, value_json: &str) -> Result<(), String> {
    self
      .connect()?
      .execute(
        "INSERT INTO settings(key, value_json) VALUES(?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value_json=excluded.value_json",
        params![key, value_json],
      )
      .map(|_| ())
      .map_err(|e| e.to_string())
  }

  pub fn get_setting_json(&self, key: &str) -> Result<Option<String>, String> {
    self
      .connect()?
      .query_row(
        "SELECT value_json FROM settings WHERE key=?1",
        params![key],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| e.to_string())
  }

  /// Stored editor settings, if any. A malformed entry is logged and ignored.
  pub fn load_editor_settings(&self) -> Result<Option<EditorSettings>, String> {
    let Some(raw) = self.get_setting_json(EDITOR_SETTINGS_KEY)? else {
      return Ok(None);
    };
    match serde_json::from_str(&raw) {
      Ok(settings) => Ok(Some(settings)),
      Err(e) => {
        warn!(error = %e, "ignoring malformed editor settings");
        Ok(None)
      }
    }
  }

  pub fn save_editor_settings(&self, settings: &EditorSettings) -> Result<(), String> {
    let raw = serde_json::to_string(settings).map_err(|e| e.to_string())?;
    self.set_setting_json(EDITOR_SETTINGS_KEY, &raw)
  }

  /// Remember `node_path` as the last node committed into `file_path`.
  pub fn record_edit(&self, file_path: &str, node_path: &JsonPath) -> Result<(), String> {
    let node_path_json = serde_json::to_string(node_path).map_err(|e| e.to_string())?;
    self
      .connect()?
      .execute(
        "INSERT INTO last_edits(file_path, node_path_json, committed_at) VALUES(?1, ?2, ?3)
         ON CONFLICT(file_path) DO UPDATE SET
           node_path_json=excluded.node_path_json,
           committed_at=excluded.committed_at",
        params![file_path, node_path_json, now_ms()],
      )
      .map(|_| ())
      .map_err(|e| e.to_string())
  }

  pub fn last_edit(&self, file_path: &str) -> Result<Option<LastEdit>, String> {
    let row: Option<(String, i64)> = self
      .connect()?
      .query_row(
        "SELECT node_path_json, committed_at FROM last_edits WHERE file_path=?1",
        params![file_path],
        |row| Ok((row.get(0)?, row.get(1)?)),
      )
      .optional()
      .map_err(|e| e.to_string())?;
    let Some((raw, committed_at_ms)) = row else {
      return Ok(None);
    };
    let node_path = serde_json::from_str(&raw).map_err(|e| e.to_string())?;
    Ok(Some(LastEdit {
      file_path: file_path.to_string(),
      node_path,
      committed_at_ms,
    }))
  }

  /// Drop the stored position for `file_path`; false if there was none.
  pub fn forget_edit(&self, file_path: &str) -> Result<bool, String> {
    let n = self
      .connect()?
      .execute("DELETE FROM last_edits WHERE file_path=?1", params![file_path])
      .map_err(|e| e.to_string())?;
    Ok(n > 0)
  }
}

fn default_sqlite_path() -> PathBuf {
  std::env::var_os("HOME")
    .or_else(|| std::env::var_os("USERPROFILE"))
    .map(PathBuf::from)
    .unwrap_or_else(|| PathBuf::from("."))
    .join(".node-edit")
    .join("storage.sqlite")
}

pub(crate) fn now_ms() -> i64 {
  SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .unwrap_or_default()
    .as_millis() as i64
}
