use thiserror::Error;

use crate::catalog::{ParentKey, RepositoryError};

/// Errors surfaced by the tree state engine.
///
/// Structural invalidation is routine cache maintenance and is not represented
/// here; see [`CategoryTree::invalidate`](super::CategoryTree::invalidate).
#[derive(Debug, Error)]
pub enum TreeError {
    /// Loading the children of `key` failed. The node stays collapsed and
    /// uncached, so toggling it again retries.
    #[error("Could not load subcategories of {key}: {source}")]
    FetchFailure {
        key: ParentKey,
        source: RepositoryError,
    },
}

impl TreeError {
    pub fn key(&self) -> ParentKey {
        match self {
            Self::FetchFailure { key, .. } => *key,
        }
    }
}
