use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::{engine::CoreError, store::Revision};

/// Opaque handle on "document X as of revision N", handed to UI callers so
/// they can tell whether what they show is still current.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionToken {
  pub session_id: String,
  pub revision: Revision,
}

impl RevisionToken {
  pub fn new(session_id: impl Into<String>, revision: Revision) -> Self {
    Self {
      session_id: session_id.into(),
      revision,
    }
  }
}

pub(crate) fn encode_token(t: &RevisionToken) -> Result<String, CoreError> {
  let json = serde_json::to_vec(t).map_err(|e| CoreError::BadToken(e.to_string()))?;
  Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(json))
}

pub(crate) fn decode_token(token: &str) -> Result<RevisionToken, CoreError> {
  if token.is_empty() {
    return Err(CoreError::BadToken("empty token".into()));
  }
  let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
    .decode(token)
    .map_err(|e| CoreError::BadToken(e.to_string()))?;
  serde_json::from_slice(&bytes).map_err(|e| CoreError::BadToken(e.to_string()))
}
