use serde::{Deserialize, Serialize};
use serde_json::Error as JsonError;
use thiserror::Error;

use crate::properties::ItemId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
pub enum CartaError {
    /// A patch or lookup targeted an entity the store does not hold. Recovered
    /// as a no-op at the session boundary, never surfaced to the UI.
    #[error("Entity not found: {0}")]
    NotFound(String),
    /// A parent→child edge already exists. Callers treat this as
    /// already-satisfied.
    #[error("Duplicate edge: {parent} -> {child}")]
    DuplicateEdge { parent: ItemId, child: ItemId },
    /// A mutation result envelope was missing expected fields. Fatal to that
    /// single reconciliation: the cache is left unpatched for the mutation and
    /// the error surfaces to the invoking collaborator.
    #[error("Malformed mutation result: {0}")]
    MalformedResult(String),
    #[error("(De)Serialization error: {0}")]
    Serialization(String),
}

impl From<JsonError> for CartaError {
    fn from(src: JsonError) -> CartaError {
        CartaError::Serialization(format!("JSON (de)serialization error: {src}"))
    }
}
