mod codec;
mod engine;
mod models;
mod mutate;
mod path;
mod session;
mod storage;
mod store;
mod token;

pub use crate::codec::{
  literal_text, parse_literal, project_for_editing, reconstruct_from_editing, render_preview,
  to_pretty_text,
};
pub use crate::engine::{CoreEngine, CoreError, CoreOptions};
pub use crate::models::{
  DocumentInfo, EditState, EditingBuffer, EditorSettings, FileFormat, IntermediateContainers,
  JsonNodeKind, JsonPathSegment, NodeData, Row, SaveResult,
};
pub use crate::mutate::{
  set_value_at_path, set_value_at_path_in_place, set_value_at_path_with, MAX_ARRAY_PADDING,
};
pub use crate::path::JsonPath;
pub use crate::session::{CommitError, CommitOutcome, EditSession};
pub use crate::storage::{LastEdit, Storage, StorageOptions};
pub use crate::store::{
  ChangeEvent, ChangeListener, DocumentError, DocumentHandle, DocumentStore, Revision,
  SetTextOptions,
};
pub use crate::token::RevisionToken;
