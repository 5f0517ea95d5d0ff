use futures::stream::{self, StreamExt};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::state::NodeCache;
use crate::catalog::{CategoryId, CategoryNode, CategoryRepository, ParentKey};

/// One category in the flat search index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub id: CategoryId,
    pub name: String,
    pub parent_id: Option<CategoryId>,
    /// Lowercased `name`, computed once per build instead of per keystroke.
    pub(crate) folded: String,
}

/// Flat list of every category reachable from the root.
///
/// Built once per search session; filtering it is synchronous.
#[derive(Debug, Default)]
pub struct SearchIndex {
    entries: Vec<IndexEntry>,
    positions: HashMap<CategoryId, usize>,
    /// Child lists fetched during the build, for merging into the node cache.
    fetched: Vec<(ParentKey, Arc<[CategoryNode]>)>,
    /// Subtrees whose children could not be listed.
    failed: Vec<ParentKey>,
    /// Tree epoch the build started from.
    epoch: u64,
}

impl SearchIndex {
    /// Flatten already-loaded child lists, depth-first pre-order from the root.
    ///
    /// Only nodes advertising `has_children` are descended into, and a node
    /// reachable twice (corrupt parent links) is indexed once.
    pub fn from_lists(lists: &NodeCache) -> Self {
        let mut entries = Vec::new();
        let mut visited: HashSet<CategoryId> = HashSet::new();
        let mut stack: Vec<&CategoryNode> = Vec::new();

        if let Some(roots) = lists.get(&ParentKey::Root) {
            stack.extend(roots.iter().rev());
        }
        while let Some(node) = stack.pop() {
            if !visited.insert(node.id) {
                continue;
            }
            entries.push(IndexEntry {
                id: node.id,
                name: node.name.clone(),
                parent_id: node.parent_id,
                folded: node.name.to_lowercase(),
            });
            if node.has_children {
                if let Some(children) = lists.get(&node.key()) {
                    stack.extend(children.iter().rev());
                }
            }
        }

        let positions = entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.id, i))
            .collect();
        Self {
            entries,
            positions,
            ..Self::default()
        }
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    pub fn get(&self, id: CategoryId) -> Option<&IndexEntry> {
        self.positions.get(&id).map(|&i| &self.entries[i])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn failed(&self) -> &[ParentKey] {
        &self.failed
    }

    /// False if some subtree could not be listed and may hide matches.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Hand over the lists fetched during the build (once).
    pub fn take_fetched(&mut self) -> Vec<(ParentKey, Arc<[CategoryNode]>)> {
        std::mem::take(&mut self.fetched)
    }
}

/// Walk the whole category graph and build a [`SearchIndex`].
///
/// `seed` is a snapshot of the node cache: keys already present are not
/// fetched again, so search and manual expansion share one set of requests.
/// Each tree level is fetched with up to `concurrency` requests in flight.
/// A failed subtree is skipped and recorded rather than failing the build.
pub async fn build_index(
    repo: &dyn CategoryRepository,
    seed: NodeCache,
    epoch: u64,
    concurrency: usize,
) -> SearchIndex {
    let mut lists = seed;
    let mut fetched = Vec::new();
    let mut failed = Vec::new();
    let mut seen: HashSet<ParentKey> = HashSet::from([ParentKey::Root]);
    let mut frontier = vec![ParentKey::Root];

    while !frontier.is_empty() {
        let missing: Vec<ParentKey> = frontier
            .iter()
            .copied()
            .filter(|k| !lists.contains_key(k))
            .collect();

        let results: Vec<_> = stream::iter(missing)
            .map(|key| async move { (key, repo.list_children(key.parent_id()).await) })
            .buffered(concurrency.max(1))
            .collect()
            .await;

        for (key, result) in results {
            match result {
                Ok(children) => {
                    let list: Arc<[CategoryNode]> = Arc::from(children);
                    lists.insert(key, Arc::clone(&list));
                    fetched.push((key, list));
                }
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Skipping subtree in search index");
                    failed.push(key);
                }
            }
        }

        let mut next = Vec::new();
        for key in &frontier {
            let Some(children) = lists.get(key) else {
                continue;
            };
            for child in children.iter() {
                if child.has_children && seen.insert(child.key()) {
                    next.push(child.key());
                }
            }
        }
        frontier = next;
    }

    let mut index = SearchIndex::from_lists(&lists);
    tracing::debug!(
        entries = index.len(),
        fetched = fetched.len(),
        failed = failed.len(),
        "Built category search index"
    );
    index.fetched = fetched;
    index.failed = failed;
    index.epoch = epoch;
    index
}
