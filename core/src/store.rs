use std::sync::{
  atomic::{AtomicU64, Ordering},
  Arc,
};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::codec::to_pretty_text;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DocumentError {
  #[error("canonical text is not valid json: {0}")]
  Parse(String),
  #[error("serialize error: {0}")]
  Serialize(String),
  #[error("stale write: expected revision {expected}, document is at {actual}")]
  Stale { expected: u64, actual: u64 },
}

/// Monotonic version of a document; bumped by every write.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Revision(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetTextOptions {
  /// Tell edit surfaces not to re-derive from this write (the write came from them).
  pub suppress_edit_surface_refresh: bool,
  /// Whether the document now differs from what is on disk.
  pub has_changes: bool,
}

impl Default for SetTextOptions {
  fn default() -> Self {
    Self {
      suppress_edit_surface_refresh: false,
      has_changes: true,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeEvent {
  pub revision: Revision,
  pub refresh_edit_surface: bool,
}

/// Canonical document contract consumed by edit sessions.
///
/// The text is the source of truth; the value is its parsed form and is
/// unavailable while the text does not parse.
pub trait DocumentStore {
  fn canonical_text(&self) -> String;

  fn canonical_value(&self) -> Result<Value, DocumentError>;

  fn set_canonical_text(&self, text: String, options: SetTextOptions) -> Revision;

  fn set_canonical_value(&self, value: Value) -> Result<Revision, DocumentError>;

  fn revision(&self) -> Revision;

  /// Current value together with the revision it was read at, read atomically.
  fn read_versioned(&self) -> Result<(Revision, Value), DocumentError>;

  /// Write text and value as one logical update: one new revision, one
  /// notification carrying `options`.
  ///
  /// With `expected` set, the write is refused if another write happened since
  /// that revision was read.
  fn replace(
    &self,
    expected: Option<Revision>,
    text: String,
    value: Value,
    options: SetTextOptions,
  ) -> Result<Revision, DocumentError>;
}

pub type ChangeListener = Arc<dyn Fn(&ChangeEvent) + Send + Sync>;

#[derive(Debug)]
struct DocumentState {
  text: String,
  value: Result<Value, DocumentError>,
  revision: u64,
  dirty: bool,
}

struct Inner {
  state: Mutex<DocumentState>,
  listeners: Mutex<Vec<(u64, ChangeListener)>>,
  next_listener_id: AtomicU64,
  indent: usize,
}

/// Shared handle to one canonical document.
///
/// Clones refer to the same document. Listeners run after the internal lock
/// is released, so they may read the document.
#[derive(Clone)]
pub struct DocumentHandle {
  inner: Arc<Inner>,
}

impl DocumentHandle {
  /// Text that does not parse is accepted; the value stays unavailable until
  /// the text is fixed.
  pub fn from_text(text: impl Into<String>, indent: usize) -> Self {
    let text = text.into();
    let value = parse_text(&text);
    Self::with_state(
      DocumentState {
        text,
        value,
        revision: 0,
        dirty: false,
      },
      indent,
    )
  }

  pub fn from_value(value: Value, indent: usize) -> Result<Self, DocumentError> {
    let text = to_pretty_text(&value, indent).map_err(|e| DocumentError::Serialize(e.to_string()))?;
    Ok(Self::with_state(
      DocumentState {
        text,
        value: Ok(value),
        revision: 0,
        dirty: false,
      },
      indent,
    ))
  }

  fn with_state(state: DocumentState, indent: usize) -> Self {
    Self {
      inner: Arc::new(Inner {
        state: Mutex::new(state),
        listeners: Mutex::new(Vec::new()),
        next_listener_id: AtomicU64::new(1),
        indent,
      }),
    }
  }

  pub fn indent(&self) -> usize {
    self.inner.indent
  }

  pub fn is_dirty(&self) -> bool {
    self.inner.state.lock().dirty
  }

  pub fn is_valid(&self) -> bool {
    self.inner.state.lock().value.is_ok()
  }

  /// Text and the revision it belongs to, read together.
  pub fn text_snapshot(&self) -> (Revision, String) {
    let state = self.inner.state.lock();
    (Revision(state.revision), state.text.clone())
  }

  /// Clear the dirty flag if nothing was written after `revision`.
  pub fn mark_saved(&self, revision: Revision) {
    let mut state = self.inner.state.lock();
    if state.revision == revision.0 {
      state.dirty = false;
    }
  }

  /// Register a change listener; returns an id for [`DocumentHandle::unsubscribe`].
  pub fn subscribe(&self, listener: impl Fn(&ChangeEvent) + Send + Sync + 'static) -> u64 {
    let id = self.inner.next_listener_id.fetch_add(1, Ordering::SeqCst);
    let listener: ChangeListener = Arc::new(listener);
    self.inner.listeners.lock().push((id, listener));
    id
  }

  pub fn unsubscribe(&self, id: u64) -> bool {
    let mut listeners = self.inner.listeners.lock();
    let before = listeners.len();
    listeners.retain(|(lid, _)| *lid != id);
    listeners.len() != before
  }

  fn notify(&self, event: ChangeEvent) {
    let listeners: Vec<ChangeListener> = self
      .inner
      .listeners
      .lock()
      .iter()
      .map(|(_, l)| l.clone())
      .collect();
    for l in listeners {
      (*l)(&event);
    }
  }
}

impl DocumentStore for DocumentHandle {
  fn canonical_text(&self) -> String {
    self.inner.state.lock().text.clone()
  }

  fn canonical_value(&self) -> Result<Value, DocumentError> {
    self.inner.state.lock().value.clone()
  }

  fn set_canonical_text(&self, text: String, options: SetTextOptions) -> Revision {
    let revision = {
      let mut state = self.inner.state.lock();
      state.value = parse_text(&text);
      state.text = text;
      state.dirty = options.has_changes;
      state.revision += 1;
      Revision(state.revision)
    };
    self.notify(ChangeEvent {
      revision,
      refresh_edit_surface: !options.suppress_edit_surface_refresh,
    });
    revision
  }

  fn set_canonical_value(&self, value: Value) -> Result<Revision, DocumentError> {
    let text =
      to_pretty_text(&value, self.inner.indent).map_err(|e| DocumentError::Serialize(e.to_string()))?;
    let revision = {
      let mut state = self.inner.state.lock();
      state.text = text;
      state.value = Ok(value);
      state.dirty = true;
      state.revision += 1;
      Revision(state.revision)
    };
    self.notify(ChangeEvent {
      revision,
      refresh_edit_surface: true,
    });
    Ok(revision)
  }

  fn revision(&self) -> Revision {
    Revision(self.inner.state.lock().revision)
  }

  fn read_versioned(&self) -> Result<(Revision, Value), DocumentError> {
    let state = self.inner.state.lock();
    let value = state.value.clone()?;
    Ok((Revision(state.revision), value))
  }

  fn replace(
    &self,
    expected: Option<Revision>,
    text: String,
    value: Value,
    options: SetTextOptions,
  ) -> Result<Revision, DocumentError> {
    let revision = {
      let mut state = self.inner.state.lock();
      if let Some(expected) = expected {
        if state.revision != expected.0 {
          return Err(DocumentError::Stale {
            expected: expected.0,
            actual: state.revision,
          });
        }
      }
      state.text = text;
      state.value = Ok(value);
      state.dirty = options.has_changes;
      state.revision += 1;
      Revision(state.revision)
    };
    debug!(revision = revision.0, "document replaced");
    self.notify(ChangeEvent {
      revision,
      refresh_edit_surface: !options.suppress_edit_surface_refresh,
    });
    Ok(revision)
  }
}

fn parse_text(text: &str) -> Result<Value, DocumentError> {
  serde_json::from_str(text).map_err(|e| DocumentError::Parse(e.to_string()))
}
