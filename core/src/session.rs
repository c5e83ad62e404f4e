use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
  codec::{project_for_editing, reconstruct_from_editing, render_preview, to_pretty_text},
  models::{EditState, EditingBuffer, IntermediateContainers, NodeData},
  mutate::set_value_at_path_with,
  path::JsonPath,
  store::{ChangeEvent, DocumentError, DocumentStore, Revision, SetTextOptions},
};

#[derive(Debug, Error)]
pub enum CommitError {
  #[error("no node selected")]
  NoNode,
  #[error("not editing (state: {0:?})")]
  NotEditing(EditState),
  #[error("canonical document unavailable: {0}")]
  CanonicalRead(DocumentError),
  #[error("document write failed: {0}")]
  Store(DocumentError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommitOutcome {
  pub revision: Revision,
  pub path: JsonPath,
  /// Value written at `path`.
  pub value: Value,
}

/// Edit state of the currently selected node.
///
/// `Viewing -> Editing -> Committing -> Viewing`, or `Editing -> Viewing` on
/// cancel. Nothing is kept across nodes: selecting another node drops any
/// uncommitted buffer.
#[derive(Debug, Clone)]
pub struct EditSession {
  node: Option<NodeData>,
  state: EditState,
  buffer: Option<EditingBuffer>,
  intermediates: IntermediateContainers,
  indent: usize,
}

impl Default for EditSession {
  fn default() -> Self {
    Self::new(IntermediateContainers::AlwaysKeyed, 2)
  }
}

impl EditSession {
  pub fn new(intermediates: IntermediateContainers, indent: usize) -> Self {
    Self {
      node: None,
      state: EditState::Viewing,
      buffer: None,
      intermediates,
      indent,
    }
  }

  pub fn node(&self) -> Option<&NodeData> {
    self.node.as_ref()
  }

  pub fn state(&self) -> EditState {
    self.state
  }

  pub fn buffer(&self) -> Option<&EditingBuffer> {
    self.buffer.as_ref()
  }

  /// Accessor chain of the selected node, `$` when nothing is selected.
  pub fn path_display(&self) -> String {
    self
      .node
      .as_ref()
      .map(|n| n.path.to_display_string())
      .unwrap_or_else(|| JsonPath::root().to_display_string())
  }

  /// Read-only content shown while viewing.
  pub fn preview(&self) -> String {
    render_preview(self.node.as_ref().map(|n| n.rows.as_slice()).unwrap_or(&[]))
  }

  /// Switch to another node (or none). Always lands in `Viewing`.
  pub fn select_node(&mut self, node: Option<NodeData>) {
    self.node = node;
    self.state = EditState::Viewing;
    self.buffer = None;
  }

  pub fn close(&mut self) {
    self.select_node(None);
  }

  /// Enter `Editing` with a buffer projected from the node's current rows.
  ///
  /// Calling it again while editing keeps the buffer as is.
  pub fn begin_edit(&mut self) -> Result<&EditingBuffer, CommitError> {
    let node = self.node.as_ref().ok_or(CommitError::NoNode)?;
    if self.state != EditState::Editing || self.buffer.is_none() {
      self.buffer = Some(project_for_editing(&node.rows));
      self.state = EditState::Editing;
    }
    self.buffer.as_ref().ok_or(CommitError::NotEditing(self.state))
  }

  /// Replace one field's raw text. False unless editing a field buffer that has `key`.
  pub fn set_field(&mut self, key: &str, text: impl Into<String>) -> bool {
    if self.state != EditState::Editing {
      return false;
    }
    match self.buffer.as_mut() {
      Some(EditingBuffer::Fields { fields }) => match fields.get_mut(key) {
        Some(slot) => {
          *slot = text.into();
          true
        }
        None => false,
      },
      _ => false,
    }
  }

  /// Replace the free text. False unless editing a text buffer.
  pub fn set_text(&mut self, text: impl Into<String>) -> bool {
    if self.state != EditState::Editing {
      return false;
    }
    match self.buffer.as_mut() {
      Some(EditingBuffer::Text { text: slot }) => {
        *slot = text.into();
        true
      }
      _ => false,
    }
  }

  /// Leave `Editing` without touching the document.
  pub fn cancel(&mut self) {
    if self.state == EditState::Editing {
      self.state = EditState::Viewing;
      self.buffer = None;
    }
  }

  /// Write the buffer into the document at the node's path.
  ///
  /// On success the edit surface closes: node and buffer are dropped. On any
  /// failure the session stays in `Editing` with the buffer intact.
  pub fn commit<S: DocumentStore + ?Sized>(&mut self, store: &S) -> Result<CommitOutcome, CommitError> {
    let node = self.node.as_ref().ok_or(CommitError::NoNode)?;
    let buffer = match (&self.state, self.buffer.as_ref()) {
      (EditState::Editing, Some(buffer)) => buffer,
      _ => return Err(CommitError::NotEditing(self.state)),
    };

    self.state = EditState::Committing;
    let result = commit_buffer(node, buffer, store, self.intermediates, self.indent);
    match result {
      Ok(outcome) => {
        // The node's rows predate the write; callers reselect from the new document.
        self.close();
        Ok(outcome)
      }
      Err(e) => {
        self.state = EditState::Editing;
        Err(e)
      }
    }
  }

  /// React to a document change notification.
  ///
  /// Writes flagged as not refreshing edit surfaces are ignored. Otherwise the
  /// session moves to `refreshed` (the re-derived node) and returns to
  /// `Viewing`. Returns whether the session was reset.
  pub fn on_document_change(&mut self, event: &ChangeEvent, refreshed: Option<NodeData>) -> bool {
    if !event.refresh_edit_surface {
      return false;
    }
    self.select_node(refreshed);
    true
  }
}

fn commit_buffer<S: DocumentStore + ?Sized>(
  node: &NodeData,
  buffer: &EditingBuffer,
  store: &S,
  intermediates: IntermediateContainers,
  indent: usize,
) -> Result<CommitOutcome, CommitError> {
  let (revision, current) = store.read_versioned().map_err(|e| {
    warn!(node = %node.id, error = %e, "could not read canonical document; commit aborted");
    CommitError::CanonicalRead(e)
  })?;

  let edited = carry_over_children(node.path.value_at(&current), reconstruct_from_editing(buffer));
  let updated = set_value_at_path_with(&current, &node.path, edited.clone(), intermediates);
  let text = to_pretty_text(&updated, indent)
    .map_err(|e| CommitError::Store(DocumentError::Serialize(e.to_string())))?;

  let revision = store
    .replace(
      Some(revision),
      text,
      updated,
      SetTextOptions {
        suppress_edit_surface_refresh: true,
        has_changes: true,
      },
    )
    .map_err(|e| {
      warn!(node = %node.id, error = %e, "commit write rejected");
      CommitError::Store(e)
    })?;
  debug!(node = %node.id, path = %node.path, revision = revision.0, "node committed");

  Ok(CommitOutcome {
    revision,
    path: node.path.clone(),
    value: edited,
  })
}

/// Keep nested objects/arrays of the edited object that the buffer never
/// showed. Existing keys keep their position; new keys go last.
fn carry_over_children(existing: Option<&Value>, edited: Value) -> Value {
  match (existing, edited) {
    (Some(Value::Object(existing)), Value::Object(fields)) => {
      let mut merged = Map::new();
      for (k, v) in existing {
        if let Some(new_v) = fields.get(k) {
          merged.insert(k.clone(), new_v.clone());
        } else if v.is_object() || v.is_array() {
          merged.insert(k.clone(), v.clone());
        }
      }
      for (k, v) in fields {
        if !merged.contains_key(&k) {
          merged.insert(k, v);
        }
      }
      Value::Object(merged)
    }
    (_, edited) => edited,
  }
}
