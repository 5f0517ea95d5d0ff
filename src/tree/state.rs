use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::error::TreeError;
use crate::catalog::{CategoryId, CategoryNode, CategoryRepository, ParentKey, RepositoryError};

/// Cached child lists keyed by parent.
pub type NodeCache = HashMap<ParentKey, Arc<[CategoryNode]>>;

// ============================================================================
// Outcomes
// ============================================================================

/// Proof that a fetch for `key` was admitted through the loading gate.
///
/// Only the holder of the current ticket for a key can commit a result for
/// it, so a late answer to a superseded request cannot overwrite fresh data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket {
    key: ParentKey,
    serial: u64,
}

impl FetchTicket {
    pub fn key(&self) -> ParentKey {
        self.key
    }
}

/// What a `toggle` / `force_expand` call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    /// Node was expanded and is now collapsed. No network call.
    Collapsed,
    /// Node is expanded from cached children (or already was).
    Expanded,
    /// Children are not cached; the caller must run the fetch for this ticket.
    FetchStarted(FetchTicket),
    /// A fetch for this node is already in flight; no second request is made,
    /// but the node will open when that fetch lands.
    AlreadyLoading,
}

/// What committing a successful or stale fetch did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchCommit {
    /// Children cached and the node expanded.
    Expanded,
    /// Children cached; nobody wants the node open any more (or it is the root list).
    Cached,
    /// The key was invalidated while the request was in flight and the node is
    /// still wanted open: the payload was dropped and a fresh fetch admitted.
    Refetch(FetchTicket),
    /// The ticket no longer matches anything in flight; nothing changed.
    Discarded,
}

// ============================================================================
// Category Tree State
// ============================================================================

/// Client-side state of the lazily loaded category tree.
///
/// Owns the node cache, the expansion set and the loading set, and is the
/// only place they are mutated. All methods are synchronous; the network
/// call sits between a `FetchStarted` ticket and [`CategoryTree::complete_fetch`],
/// so the owning event loop never holds this state across an await.
///
/// Invariants:
/// - an id in `expanded` always has a cache entry;
/// - a key is in `loading` for exactly one admitted fetch at a time;
/// - cache entries are only removed by [`CategoryTree::invalidate`].
#[derive(Debug, Default)]
pub struct CategoryTree {
    cache: NodeCache,
    expanded: HashSet<CategoryId>,
    /// Key -> serial of the admitted fetch.
    loading: HashMap<ParentKey, u64>,
    /// Nodes the user (or search) asked to open whose children are still loading.
    wants_expand: HashSet<CategoryId>,
    /// Keys invalidated while their fetch was in flight.
    stale_in_flight: HashSet<ParentKey>,
    next_serial: u64,
    /// Bumped by every invalidation.
    epoch: u64,
}

impl CategoryTree {
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    /// Root categories, if the root list has been loaded.
    pub fn roots(&self) -> Option<&[CategoryNode]> {
        self.children(ParentKey::Root)
    }

    pub fn children(&self, key: ParentKey) -> Option<&[CategoryNode]> {
        self.cache.get(&key).map(|c| &**c)
    }

    pub fn is_cached(&self, key: ParentKey) -> bool {
        self.cache.contains_key(&key)
    }

    pub fn is_expanded(&self, id: CategoryId) -> bool {
        self.expanded.contains(&id)
    }

    pub fn is_loading(&self, key: ParentKey) -> bool {
        self.loading.contains_key(&key)
    }

    pub fn expanded(&self) -> &HashSet<CategoryId> {
        &self.expanded
    }

    pub fn loading_count(&self) -> usize {
        self.loading.len()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Cheap copy of the cache (child lists are shared, not cloned).
    pub fn cache_snapshot(&self) -> NodeCache {
        self.cache.clone()
    }

    /// Look a node up in whatever lists have been fetched so far.
    pub fn find_node(&self, id: CategoryId) -> Option<&CategoryNode> {
        self.cache
            .values()
            .flat_map(|list| list.iter())
            .find(|n| n.id == id)
    }

    // ------------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------------

    /// Flip a node between expanded and collapsed.
    ///
    /// Collapsing keeps the cache entry. Expanding uses cached children when
    /// present and otherwise admits a single fetch; repeated toggles while that
    /// fetch is pending are dropped.
    pub fn toggle(&mut self, id: CategoryId) -> ToggleOutcome {
        if self.expanded.remove(&id) {
            tracing::trace!(id = %id, "Collapsed category");
            return ToggleOutcome::Collapsed;
        }
        self.force_expand(id)
    }

    /// Expand a node, fetching its children first if needed. Idempotent.
    pub fn force_expand(&mut self, id: CategoryId) -> ToggleOutcome {
        let key = ParentKey::Node(id);
        if self.expanded.contains(&id) {
            return ToggleOutcome::Expanded;
        }
        if self.cache.contains_key(&key) {
            self.expanded.insert(id);
            return ToggleOutcome::Expanded;
        }
        if self.loading.contains_key(&key) {
            // Re-arm the intent a collapse may have dropped; the pending fetch serves it.
            self.wants_expand.insert(id);
            tracing::debug!(id = %id, "Fetch already in flight, not fetching again");
            return ToggleOutcome::AlreadyLoading;
        }
        self.wants_expand.insert(id);
        ToggleOutcome::FetchStarted(self.admit(key))
    }

    /// Admit a fetch of the root list unless it is cached or already loading.
    pub fn begin_root_load(&mut self) -> Option<FetchTicket> {
        let key = ParentKey::Root;
        if self.cache.contains_key(&key) || self.loading.contains_key(&key) {
            return None;
        }
        Some(self.admit(key))
    }

    fn admit(&mut self, key: ParentKey) -> FetchTicket {
        self.next_serial += 1;
        let serial = self.next_serial;
        self.loading.insert(key, serial);
        tracing::debug!(key = %key, serial, "Fetching child categories");
        FetchTicket { key, serial }
    }

    /// Commit the result of the fetch admitted by `ticket`.
    ///
    /// On success the children are cached and the node is expanded only if it
    /// is still wanted open. On failure the node leaves the loading set and
    /// stays collapsed with no cache entry, so a later toggle retries.
    pub fn complete_fetch(
        &mut self,
        ticket: FetchTicket,
        result: Result<Vec<CategoryNode>, RepositoryError>,
    ) -> Result<FetchCommit, TreeError> {
        let key = ticket.key;
        if self.loading.get(&key) != Some(&ticket.serial) {
            tracing::debug!(key = %key, serial = ticket.serial, "Ignoring result for superseded fetch");
            return Ok(FetchCommit::Discarded);
        }
        self.loading.remove(&key);

        if self.stale_in_flight.remove(&key) {
            let still_wanted = match key {
                ParentKey::Root => true,
                ParentKey::Node(id) => self.wants_expand.contains(&id),
            };
            tracing::debug!(key = %key, still_wanted, "Dropping result invalidated in flight");
            if still_wanted {
                return Ok(FetchCommit::Refetch(self.admit(key)));
            }
            return Ok(FetchCommit::Discarded);
        }

        match result {
            Ok(children) => {
                tracing::debug!(key = %key, count = children.len(), "Cached child categories");
                self.cache.insert(key, Arc::from(children));
                match key {
                    ParentKey::Node(id) if self.wants_expand.remove(&id) => {
                        self.expanded.insert(id);
                        Ok(FetchCommit::Expanded)
                    }
                    _ => Ok(FetchCommit::Cached),
                }
            }
            Err(source) => {
                if let ParentKey::Node(id) = key {
                    self.wants_expand.remove(&id);
                }
                tracing::warn!(key = %key, error = %source, "Failed to load child categories");
                Err(TreeError::FetchFailure { key, source })
            }
        }
    }

    /// Collapse a single node. A pending fetch for it will cache but not expand.
    pub fn collapse(&mut self, id: CategoryId) -> bool {
        let was_wanted = self.wants_expand.remove(&id);
        self.expanded.remove(&id) || was_wanted
    }

    /// Collapse everything. The cache is untouched, so re-expanding is free.
    pub fn collapse_all(&mut self) {
        self.expanded.clear();
        self.wants_expand.clear();
    }

    /// Replace the expansion set, keeping only ids whose children are cached.
    pub fn restore_expanded(&mut self, ids: &HashSet<CategoryId>) {
        self.wants_expand.clear();
        self.expanded = ids
            .iter()
            .copied()
            .filter(|id| self.cache.contains_key(&ParentKey::Node(*id)))
            .collect();
    }

    /// Drop the cached child list for `key` after a structural edit.
    ///
    /// The node is collapsed so the next expansion fetches fresh data. A fetch
    /// already in flight for the key is marked stale and its payload will not
    /// be cached. Returns whether the node was expanded.
    pub fn invalidate(&mut self, key: ParentKey) -> bool {
        self.epoch += 1;
        let had_entry = self.cache.remove(&key).is_some();
        if self.loading.contains_key(&key) {
            self.stale_in_flight.insert(key);
        }
        let was_expanded = match key {
            ParentKey::Root => had_entry,
            ParentKey::Node(id) => self.expanded.remove(&id),
        };
        tracing::debug!(key = %key, had_entry, was_expanded, "Invalidated cached children");
        was_expanded
    }

    /// Merge child lists fetched outside the loading gate (by the search index
    /// builder). Skipped entirely if anything was invalidated since `epoch`;
    /// never overwrites an existing entry or races an in-flight fetch.
    pub fn merge_prefetched<I>(&mut self, entries: I, epoch: u64) -> usize
    where
        I: IntoIterator<Item = (ParentKey, Arc<[CategoryNode]>)>,
    {
        if epoch != self.epoch {
            tracing::debug!(
                built_at = epoch,
                current = self.epoch,
                "Skipping prefetched lists from an older epoch"
            );
            return 0;
        }
        let mut merged = 0;
        for (key, children) in entries {
            if self.cache.contains_key(&key) || self.loading.contains_key(&key) {
                continue;
            }
            self.cache.insert(key, children);
            merged += 1;
        }
        merged
    }

    // ------------------------------------------------------------------------
    // Sequential helpers
    // ------------------------------------------------------------------------

    /// `toggle` plus the fetch it may require, awaited inline.
    pub async fn toggle_now(
        &mut self,
        repo: &dyn CategoryRepository,
        id: CategoryId,
    ) -> Result<ToggleOutcome, TreeError> {
        let outcome = self.toggle(id);
        self.drive(repo, outcome).await?;
        Ok(outcome)
    }

    /// `force_expand` plus the fetch it may require, awaited inline.
    pub async fn force_expand_now(
        &mut self,
        repo: &dyn CategoryRepository,
        id: CategoryId,
    ) -> Result<ToggleOutcome, TreeError> {
        let outcome = self.force_expand(id);
        self.drive(repo, outcome).await?;
        Ok(outcome)
    }

    /// Load the root list inline if it is not cached yet.
    pub async fn load_roots_now(&mut self, repo: &dyn CategoryRepository) -> Result<(), TreeError> {
        if let Some(ticket) = self.begin_root_load() {
            let result = repo.list_children(None).await;
            self.complete_fetch(ticket, result)?;
        }
        Ok(())
    }

    async fn drive(
        &mut self,
        repo: &dyn CategoryRepository,
        outcome: ToggleOutcome,
    ) -> Result<(), TreeError> {
        let mut next = match outcome {
            ToggleOutcome::FetchStarted(ticket) => Some(ticket),
            _ => None,
        };
        while let Some(ticket) = next.take() {
            let result = repo.list_children(ticket.key().parent_id()).await;
            if let FetchCommit::Refetch(again) = self.complete_fetch(ticket, result)? {
                next = Some(again);
            }
        }
        Ok(())
    }
}
