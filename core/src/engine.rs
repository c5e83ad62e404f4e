use std::{
  collections::HashMap,
  path::Path,
  sync::Arc,
};

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
  models::{DocumentInfo, EditorSettings, FileFormat, SaveResult},
  session::{CommitError, EditSession},
  storage::{now_ms, LastEdit, Storage, StorageOptions},
  store::{DocumentError, DocumentHandle, DocumentStore},
  token::{decode_token, encode_token, RevisionToken},
};

#[derive(Debug, Error)]
pub enum CoreError {
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
  #[error("unsupported format: {0:?}")]
  UnsupportedFormat(FileFormat),
  #[error("unknown session: {0}")]
  UnknownSession(String),
  #[error("bad revision token: {0}")]
  BadToken(String),
  #[error("invalid argument: {0}")]
  InvalidArg(String),
  #[error("document too large: {len} bytes (max {max})")]
  TooLarge { len: u64, max: u64 },
  #[error("storage error: {0}")]
  Storage(String),
  #[error("document error: {0}")]
  Document(#[from] DocumentError),
  #[error("commit failed: {0}")]
  Commit(#[from] CommitError),
}

#[derive(Debug, Clone)]
pub struct CoreOptions {
  /// Files above this size are refused at open.
  pub max_document_bytes: u64,
  /// Defaults; settings saved in storage take precedence.
  pub settings: EditorSettings,
  pub storage: StorageOptions,
}

impl Default for CoreOptions {
  fn default() -> Self {
    Self {
      max_document_bytes: 50 * 1024 * 1024,
      settings: EditorSettings::default(),
      storage: StorageOptions::default(),
    }
  }
}

#[derive(Clone)]
struct DocumentSlot {
  info: DocumentInfo,
  handle: DocumentHandle,
}

/// Open documents, keyed by session id.
#[derive(Clone)]
pub struct CoreEngine {
  options: CoreOptions,
  settings: Arc<Mutex<EditorSettings>>,
  sessions: Arc<Mutex<HashMap<String, DocumentSlot>>>,
  storage: Storage,
}

impl CoreEngine {
  pub fn new(options: CoreOptions) -> Result<Self, CoreError> {
    let storage = Storage::new(options.storage.clone()).map_err(CoreError::Storage)?;
    let settings = match storage.load_editor_settings() {
      Ok(Some(saved)) => saved,
      Ok(None) => options.settings.clone(),
      Err(e) => {
        warn!(error = %e, "could not load editor settings; using defaults");
        options.settings.clone()
      }
    };
    Ok(Self {
      options,
      settings: Arc::new(Mutex::new(settings)),
      sessions: Arc::new(Mutex::new(HashMap::new())),
      storage,
    })
  }

  pub fn settings(&self) -> EditorSettings {
    self.settings.lock().clone()
  }

  /// Persist new settings. Documents opened afterwards (and new edit sessions) use them.
  pub fn update_settings(&self, settings: EditorSettings) -> Result<(), CoreError> {
    if settings.indent > 16 {
      return Err(CoreError::InvalidArg(format!(
        "indent {} out of range (max 16)",
        settings.indent
      )));
    }
    self
      .storage
      .save_editor_settings(&settings)
      .map_err(CoreError::Storage)?;
    *self.settings.lock() = settings;
    Ok(())
  }

  /// IPC API: open_file(path) -> DocumentInfo
  ///
  /// Text that is not valid JSON still opens (`valid == false`); commits are
  /// refused until the text is fixed.
  pub fn open_file(&self, path: impl AsRef<Path>) -> Result<DocumentInfo, CoreError> {
    let path = path.as_ref().to_path_buf();
    let format = detect_format(&path);
    if format != FileFormat::Json {
      return Err(CoreError::UnsupportedFormat(format));
    }

    let len = std::fs::metadata(&path)?.len();
    if len > self.options.max_document_bytes {
      return Err(CoreError::TooLarge {
        len,
        max: self.options.max_document_bytes,
      });
    }
    let path_str = path.to_string_lossy().to_string();
    // Lossy decoding would rewrite the file on the next save.
    let text = String::from_utf8(std::fs::read(&path)?)
      .map_err(|e| CoreError::InvalidArg(format!("{path_str} is not valid UTF-8: {e}")))?;

    let info = self.insert_document(Some(path_str.clone()), display_name_of(&path_str), text);
    info!(session = %info.session_id, path = %path_str, valid = info.valid, "document opened");
    Ok(info)
  }

  /// IPC API: open_text(name, text) -> DocumentInfo (no backing file).
  pub fn open_text(&self, display_name: &str, text: impl Into<String>) -> DocumentInfo {
    self.insert_document(None, display_name.to_string(), text.into())
  }

  fn insert_document(&self, path: Option<String>, display_name: String, text: String) -> DocumentInfo {
    let handle = DocumentHandle::from_text(text, self.settings.lock().indent);
    let info = DocumentInfo {
      session_id: Uuid::new_v4().to_string(),
      path,
      display_name,
      format: FileFormat::Json,
      created_at_ms: now_ms(),
      valid: handle.is_valid(),
    };
    self.sessions.lock().insert(
      info.session_id.clone(),
      DocumentSlot {
        info: info.clone(),
        handle,
      },
    );
    info
  }

  pub fn document(&self, session_id: &str) -> Result<DocumentHandle, CoreError> {
    Ok(self.slot(session_id)?.handle)
  }

  pub fn info(&self, session_id: &str) -> Result<DocumentInfo, CoreError> {
    let slot = self.slot(session_id)?;
    Ok(DocumentInfo {
      valid: slot.handle.is_valid(),
      ..slot.info
    })
  }

  pub fn list_documents(&self) -> Vec<DocumentInfo> {
    let mut out: Vec<DocumentInfo> = self
      .sessions
      .lock()
      .values()
      .map(|s| DocumentInfo {
        valid: s.handle.is_valid(),
        ..s.info.clone()
      })
      .collect();
    out.sort_by_key(|i| i.created_at_ms);
    out
  }

  /// A fresh edit session using the current settings.
  pub fn new_edit_session(&self) -> EditSession {
    let settings = self.settings();
    EditSession::new(settings.intermediate_containers, settings.indent)
  }

  /// IPC API: commit(session_id, edit) -> revision token
  ///
  /// For file-backed documents the committed node is remembered, see [`CoreEngine::last_edit`].
  pub fn commit(&self, session_id: &str, edit: &mut EditSession) -> Result<String, CoreError> {
    let slot = self.slot(session_id)?;
    let outcome = edit.commit(&slot.handle)?;
    if let Some(file) = slot.info.path.as_deref() {
      if let Err(e) = self.storage.record_edit(file, &outcome.path) {
        warn!(path = %file, error = %e, "could not record last edit");
      }
    }
    encode_token(&RevisionToken::new(session_id, outcome.revision))
  }

  /// Node last committed into the document's file, from this or an earlier run.
  pub fn last_edit(&self, session_id: &str) -> Result<Option<LastEdit>, CoreError> {
    let slot = self.slot(session_id)?;
    match slot.info.path {
      Some(file) => self.storage.last_edit(&file).map_err(CoreError::Storage),
      None => Ok(None),
    }
  }

  /// Token for the document's current revision.
  pub fn revision_token(&self, session_id: &str) -> Result<String, CoreError> {
    let handle = self.document(session_id)?;
    encode_token(&RevisionToken::new(session_id, handle.revision()))
  }

  /// Whether nothing was written to the document since `token` was issued.
  pub fn is_current(&self, token: &str) -> Result<bool, CoreError> {
    let t = decode_token(token)?;
    let handle = self.document(&t.session_id)?;
    Ok(handle.revision() == t.revision)
  }

  /// IPC API: save(session_id) -> SaveResult, to the file the document came from.
  pub fn save(&self, session_id: &str) -> Result<SaveResult, CoreError> {
    let slot = self.slot(session_id)?;
    let path = slot.info.path.ok_or_else(|| {
      CoreError::InvalidArg("document has no backing file; use save_as".into())
    })?;
    write_document(&slot.handle, Path::new(&path))
  }

  /// IPC API: save_as(session_id, path) -> SaveResult; the document follows the new file.
  pub fn save_as(&self, session_id: &str, output_path: impl AsRef<Path>) -> Result<SaveResult, CoreError> {
    let output_path = output_path.as_ref();
    let format = detect_format(output_path);
    if format != FileFormat::Json {
      return Err(CoreError::UnsupportedFormat(format));
    }
    let slot = self.slot(session_id)?;
    let result = write_document(&slot.handle, output_path)?;

    if let Some(s) = self.sessions.lock().get_mut(session_id) {
      s.info.path = Some(result.output_path.clone());
      s.info.display_name = display_name_of(&result.output_path);
    }
    Ok(result)
  }

  pub fn close(&self, session_id: &str) -> bool {
    self.sessions.lock().remove(session_id).is_some()
  }

  pub fn storage(&self) -> &Storage {
    &self.storage
  }

  fn slot(&self, session_id: &str) -> Result<DocumentSlot, CoreError> {
    self
      .sessions
      .lock()
      .get(session_id)
      .cloned()
      .ok_or_else(|| CoreError::UnknownSession(session_id.to_string()))
  }
}

fn write_document(handle: &DocumentHandle, path: &Path) -> Result<SaveResult, CoreError> {
  let (revision, text) = handle.text_snapshot();
  std::fs::write(path, text.as_bytes())?;
  handle.mark_saved(revision);
  let output_path = path.to_string_lossy().to_string();
  info!(path = %output_path, revision = revision.0, "document saved");
  Ok(SaveResult {
    output_path,
    bytes_written: text.len() as u64,
  })
}

fn display_name_of(path: &str) -> String {
  Path::new(path)
    .file_name()
    .and_then(|s| s.to_str())
    .unwrap_or(path)
    .to_string()
}

pub(crate) fn detect_format(path: &Path) -> FileFormat {
  let ext = path
    .extension()
    .and_then(|s| s.to_str())
    .unwrap_or("")
    .to_ascii_lowercase();
  match ext.as_str() {
    "json" => FileFormat::Json,
    _ => FileFormat::Unknown,
  }
}
