use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Identifiers
// ============================================================================

/// Server-assigned category identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryId(pub i64);

impl fmt::Display for CategoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Key of a child list in the node cache.
///
/// The root list has no parent category, so it gets its own sentinel
/// instead of overloading `Option<CategoryId>` at every call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParentKey {
    Root,
    Node(CategoryId),
}

impl ParentKey {
    /// The parent id as the repository expects it (`None` for the root list).
    pub fn parent_id(self) -> Option<CategoryId> {
        match self {
            Self::Root => None,
            Self::Node(id) => Some(id),
        }
    }
}

impl From<Option<CategoryId>> for ParentKey {
    fn from(parent: Option<CategoryId>) -> Self {
        parent.map_or(Self::Root, Self::Node)
    }
}

impl From<CategoryId> for ParentKey {
    fn from(id: CategoryId) -> Self {
        Self::Node(id)
    }
}

impl fmt::Display for ParentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Root => f.write_str("root"),
            Self::Node(id) => write!(f, "{}", id),
        }
    }
}

// ============================================================================
// Category Node
// ============================================================================

/// A category as returned by the repository.
///
/// Nodes are immutable snapshots: any structural edit is observed by
/// re-fetching the parent's child list, never by patching a node in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryNode {
    pub id: CategoryId,
    pub name: String,
    #[serde(default)]
    pub parent_id: Option<CategoryId>,
    /// Server-computed: whether listing this node's children would return anything.
    #[serde(default)]
    pub has_children: bool,
    /// Display only.
    #[serde(default)]
    pub children_count: u32,
    /// Display only.
    #[serde(default)]
    pub product_count: u32,
}

impl CategoryNode {
    /// Cache key under which this node's own children are stored.
    pub fn key(&self) -> ParentKey {
        ParentKey::Node(self.id)
    }

    /// Cache key of the list this node appears in.
    pub fn parent_key(&self) -> ParentKey {
        ParentKey::from(self.parent_id)
    }
}
