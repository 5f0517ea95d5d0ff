use async_trait::async_trait;

use super::error::RepositoryError;
use super::types::{CategoryId, CategoryNode};

/// Request/response contract for the category backend.
///
/// The tree engine only ever calls `list_children`; the mutation methods exist
/// so the admin screen can edit categories and then invalidate the affected
/// parent. Implementations are injected as `Arc<dyn CategoryRepository>`.
#[async_trait]
pub trait CategoryRepository: Send + Sync {
    /// List the direct children of `parent`, or the root categories for `None`.
    ///
    /// An empty list is a valid answer meaning "no children".
    async fn list_children(
        &self,
        parent: Option<CategoryId>,
    ) -> Result<Vec<CategoryNode>, RepositoryError>;

    /// Create a category under `parent` (root level for `None`).
    async fn create(
        &self,
        name: &str,
        parent: Option<CategoryId>,
    ) -> Result<CategoryNode, RepositoryError>;

    /// Rename a category, returning the updated node.
    async fn rename(&self, id: CategoryId, name: &str) -> Result<CategoryNode, RepositoryError>;

    /// Delete a category.
    async fn delete(&self, id: CategoryId) -> Result<(), RepositoryError>;
}
