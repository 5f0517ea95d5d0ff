use std::collections::HashSet;

use super::state::CategoryTree;
use crate::catalog::{CategoryId, CategoryNode, ParentKey};

/// Expand/collapse affordance shown next to a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Affordance {
    Leaf,
    Collapsed,
    Expanded,
}

/// A single visible row of the category tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeRow {
    pub id: CategoryId,
    pub parent_id: Option<CategoryId>,
    pub name: String,
    /// Nesting depth (0 = root level).
    pub depth: usize,
    pub affordance: Affordance,
    /// A child fetch for this node is in flight.
    pub loading: bool,
    /// The node's own name matches the active search.
    pub highlighted: bool,
    pub product_count: u32,
}

/// Project the tree state into visible rows.
///
/// Pure function of the root list, the node cache, the expansion set, the
/// loading set and `matched`: the same inputs always produce the same rows,
/// regardless of what order fetches resolved in. Children are shown only for
/// expanded nodes whose children are cached.
pub fn project(tree: &CategoryTree, matched: &HashSet<CategoryId>) -> Vec<TreeRow> {
    let mut rows = Vec::new();
    let mut path: HashSet<CategoryId> = HashSet::new();
    if let Some(roots) = tree.roots() {
        push_rows(tree, matched, roots, 0, &mut path, &mut rows);
    }
    rows
}

fn push_rows(
    tree: &CategoryTree,
    matched: &HashSet<CategoryId>,
    nodes: &[CategoryNode],
    depth: usize,
    path: &mut HashSet<CategoryId>,
    rows: &mut Vec<TreeRow>,
) {
    for node in nodes {
        let expanded = node.has_children && tree.is_expanded(node.id);
        let affordance = match (node.has_children, expanded) {
            (false, _) => Affordance::Leaf,
            (true, false) => Affordance::Collapsed,
            (true, true) => Affordance::Expanded,
        };
        rows.push(TreeRow {
            id: node.id,
            parent_id: node.parent_id,
            name: node.name.clone(),
            depth,
            affordance,
            loading: tree.is_loading(ParentKey::Node(node.id)),
            highlighted: matched.contains(&node.id),
            product_count: node.product_count,
        });

        // A node listed below itself would recurse forever; show it but stop there.
        if expanded && path.insert(node.id) {
            if let Some(children) = tree.children(ParentKey::Node(node.id)) {
                push_rows(tree, matched, children, depth + 1, path, rows);
            }
            path.remove(&node.id);
        }
    }
}
