//! Application state and the operations the event loop drives.
//!
//! `App` is owned by the single UI task. Key handlers and background-task
//! results both end up here; network calls run in spawned tokio tasks that
//! report back through the [`AppEvent`] channel, so no state is ever held
//! across an await.

use futures::FutureExt;
use std::borrow::Cow;
use std::collections::HashSet;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::catalog::{CategoryId, CategoryNode, CategoryRepository, ParentKey, RepositoryError};
use crate::config::Config;
use crate::tree::{
    build_index, project, Affordance, CategoryTree, ClearSearch, FetchCommit, FetchTicket,
    QueryChange, SearchIndex, SearchSession, ToggleOutcome, TreeRow,
};
use crate::util::{sanitize_category_name, MAX_CATEGORY_NAME_CHARS, MAX_SEARCH_QUERY_LENGTH};

/// Number of frames in the loading spinner animation.
pub const SPINNER_FRAMES: usize = 10;

/// Seconds a status message stays on screen.
const STATUS_TTL_SECS: u64 = 3;

// ============================================================================
// Modes
// ============================================================================

/// What keyboard input currently goes to.
#[derive(Debug)]
pub enum Mode {
    Browse,
    /// Typing into the search box.
    Search,
    /// Typing a category name.
    Prompt(Prompt),
    /// Waiting for y/n on a delete.
    Confirm(PendingDelete),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptKind {
    AddChild { parent: CategoryId, parent_name: String },
    AddRoot,
    Rename { id: CategoryId },
}

#[derive(Debug, Clone)]
pub struct Prompt {
    pub kind: PromptKind,
    pub input: String,
}

impl Prompt {
    pub fn title(&self) -> Cow<'_, str> {
        match &self.kind {
            PromptKind::AddChild { parent_name, .. } => {
                Cow::Owned(format!("New subcategory of {parent_name}"))
            }
            PromptKind::AddRoot => Cow::Borrowed("New top-level category"),
            PromptKind::Rename { .. } => Cow::Borrowed("Rename category"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PendingDelete {
    pub id: CategoryId,
    pub parent_id: Option<CategoryId>,
    pub name: String,
    /// Whether the parent list will be left empty.
    pub last_child: bool,
}

// ============================================================================
// Events
// ============================================================================

/// A structural edit the server accepted.
#[derive(Debug)]
pub enum MutationOutcome {
    Created(CategoryNode),
    Renamed(CategoryNode),
    Deleted {
        id: CategoryId,
        parent_id: Option<CategoryId>,
        name: String,
        last_child: bool,
    },
}

/// Events from background tasks
#[derive(Debug)]
pub enum AppEvent {
    /// A child-list fetch admitted by `ticket` finished.
    ChildrenLoaded {
        ticket: FetchTicket,
        result: Result<Vec<CategoryNode>, RepositoryError>,
    },
    /// A search index build tagged `generation` finished.
    SearchIndexBuilt { generation: u64, index: SearchIndex },
    MutationApplied(MutationOutcome),
    MutationFailed {
        action: &'static str,
        error: RepositoryError,
    },
    /// A background task panicked.
    TaskPanicked { task: &'static str, error: String },
}

// ============================================================================
// Application State
// ============================================================================

/// Central application state
pub struct App {
    repo: Arc<dyn CategoryRepository>,
    pub tree: CategoryTree,
    pub search: SearchSession,
    pub mode: Mode,
    /// Projection of `tree`, refreshed after every state change.
    rows: Vec<TreeRow>,
    selected: usize,
    /// Id behind `selected`, so selection survives reloads.
    selected_id: Option<CategoryId>,
    /// Status bar message with timestamp for auto-expiry
    pub status_message: Option<(Cow<'static, str>, Instant)>,
    pub needs_redraw: bool,
    pub spinner_frame: usize,
    clear_search: ClearSearch,
    search_concurrency: usize,
    index_handle: Option<JoinHandle<()>>,
    pending_mutations: usize,
}

impl App {
    pub fn new(repo: Arc<dyn CategoryRepository>, config: &Config) -> Self {
        Self {
            repo,
            tree: CategoryTree::new(),
            search: SearchSession::new(),
            mode: Mode::Browse,
            rows: Vec::new(),
            selected: 0,
            selected_id: None,
            status_message: None,
            needs_redraw: true,
            spinner_frame: 0,
            clear_search: config.clear_search,
            search_concurrency: config.search_concurrency.max(1),
            index_handle: None,
            pending_mutations: 0,
        }
    }

    /// Kick off the root list load.
    pub fn start(&mut self, event_tx: &mpsc::Sender<AppEvent>) {
        if let Some(ticket) = self.tree.begin_root_load() {
            self.spawn_fetch(ticket, event_tx);
        }
        self.refresh_rows();
    }

    pub fn rows(&self) -> &[TreeRow] {
        &self.rows
    }

    pub fn selected_index(&self) -> usize {
        self.selected
    }

    pub fn selected_row(&self) -> Option<&TreeRow> {
        self.rows.get(self.selected)
    }

    /// True while any fetch, index build or mutation is outstanding.
    pub fn is_busy(&self) -> bool {
        self.tree.loading_count() > 0 || self.search.is_building() || self.pending_mutations > 0
    }

    // ------------------------------------------------------------------------
    // Selection
    // ------------------------------------------------------------------------

    fn select(&mut self, index: usize) {
        if let Some(row) = self.rows.get(index) {
            self.selected = index;
            self.selected_id = Some(row.id);
            self.needs_redraw = true;
        }
    }

    /// Move the cursor to the first visible row for `id`.
    pub fn select_id(&mut self, id: CategoryId) -> bool {
        match self.rows.iter().position(|r| r.id == id) {
            Some(pos) => {
                self.select(pos);
                true
            }
            None => false,
        }
    }

    pub fn move_selection(&mut self, delta: isize) {
        if self.rows.is_empty() {
            return;
        }
        let last = self.rows.len() - 1;
        let target = self.selected.saturating_add_signed(delta).min(last);
        self.select(target);
    }

    pub fn select_first(&mut self) {
        self.select(0);
    }

    pub fn select_last(&mut self) {
        self.select(self.rows.len().saturating_sub(1));
    }

    /// Recompute rows from the tree, keeping the cursor on the same category.
    fn refresh_rows(&mut self) {
        self.rows = project(&self.tree, &self.search.matches().matched);
        let kept = self
            .selected_id
            .and_then(|id| self.rows.iter().position(|r| r.id == id));
        match kept {
            Some(pos) => self.selected = pos,
            None if self.rows.is_empty() => self.selected = 0,
            None => {
                let hidden = self
                    .selected_id
                    .filter(|id| self.tree.find_node(*id).is_some());
                let reloading = self.selected_id.is_some() && self.tree.loading_count() > 0;
                match hidden {
                    // Still cached, so a collapse hid it: follow it up the tree
                    Some(id) => {
                        let pos = self
                            .nearest_visible_ancestor(id)
                            .unwrap_or_else(|| self.selected.min(self.rows.len() - 1));
                        self.selected = pos;
                        self.selected_id = Some(self.rows[pos].id);
                    }
                    // Its list is being fetched again and will bring it back
                    None if reloading => {
                        self.selected = self.selected.min(self.rows.len() - 1);
                    }
                    None => {
                        self.selected = self.selected.min(self.rows.len() - 1);
                        self.selected_id = Some(self.rows[self.selected].id);
                    }
                }
            }
        }
        self.needs_redraw = true;
    }

    /// Row index of the closest ancestor of `id` that is on screen.
    fn nearest_visible_ancestor(&self, id: CategoryId) -> Option<usize> {
        let mut seen = HashSet::from([id]);
        let mut parent = self.tree.find_node(id).and_then(|n| n.parent_id);
        while let Some(pid) = parent {
            if let Some(pos) = self.rows.iter().position(|r| r.id == pid) {
                return Some(pos);
            }
            if !seen.insert(pid) {
                return None;
            }
            parent = self.tree.find_node(pid).and_then(|n| n.parent_id);
        }
        None
    }

    // ------------------------------------------------------------------------
    // Tree operations
    // ------------------------------------------------------------------------

    /// Toggle the selected row. With no rows yet this retries the root load.
    pub fn toggle_selected(&mut self, event_tx: &mpsc::Sender<AppEvent>) {
        let Some(row) = self.selected_row() else {
            self.reload(ParentKey::Root, event_tx);
            self.refresh_rows();
            return;
        };
        if row.affordance == Affordance::Leaf {
            let msg = format!("{} has no subcategories", row.name);
            self.set_status(msg);
            return;
        }
        let id = row.id;
        self.toggle(id, event_tx);
    }

    pub fn toggle(&mut self, id: CategoryId, event_tx: &mpsc::Sender<AppEvent>) {
        if let ToggleOutcome::FetchStarted(ticket) = self.tree.toggle(id) {
            self.spawn_fetch(ticket, event_tx);
        }
        self.refresh_rows();
    }

    /// Collapse the selected row, or jump to its parent if it is not expanded.
    pub fn collapse_or_parent(&mut self) {
        let Some(row) = self.selected_row() else {
            return;
        };
        let (id, parent_id) = (row.id, row.parent_id);
        let open = row.affordance == Affordance::Expanded || row.loading;

        if open {
            self.tree.collapse(id);
            self.refresh_rows();
        } else if let Some(pid) = parent_id {
            self.select_id(pid);
        }
    }

    pub fn collapse_all(&mut self) {
        self.tree.collapse_all();
        self.refresh_rows();
    }

    /// Re-fetch the selected node's children if it is open, otherwise the
    /// list the selected node sits in.
    pub fn refresh_selected(&mut self, event_tx: &mpsc::Sender<AppEvent>) {
        let key = match self.selected_row() {
            Some(row) if row.affordance == Affordance::Expanded => ParentKey::Node(row.id),
            Some(row) => ParentKey::from(row.parent_id),
            None => ParentKey::Root,
        };
        self.set_status(format!("Refreshing {key}"));
        self.reload(key, event_tx);
        self.rebuild_search_index(event_tx);
        self.refresh_rows();
    }

    /// Drop the cached list for `key` and fetch it again if it is on screen.
    fn reload(&mut self, key: ParentKey, event_tx: &mpsc::Sender<AppEvent>) {
        let was_open = self.tree.invalidate(key);
        match key {
            ParentKey::Root => {
                if let Some(ticket) = self.tree.begin_root_load() {
                    self.spawn_fetch(ticket, event_tx);
                }
            }
            ParentKey::Node(id) if was_open => {
                if let ToggleOutcome::FetchStarted(ticket) = self.tree.force_expand(id) {
                    self.spawn_fetch(ticket, event_tx);
                }
            }
            ParentKey::Node(_) => {}
        }
    }

    /// Reload the list a structural edit touched. When the edit flips the
    /// parent's `has_children`, the list the parent itself sits in is
    /// reloaded too so its expand affordance is current.
    fn reload_after_edit(
        &mut self,
        parent: Option<CategoryId>,
        parent_flag_changed: bool,
        event_tx: &mpsc::Sender<AppEvent>,
    ) {
        if parent_flag_changed {
            if let Some(owner) = parent
                .and_then(|pid| self.tree.find_node(pid))
                .map(CategoryNode::parent_key)
            {
                self.reload(owner, event_tx);
            }
        }
        self.reload(ParentKey::from(parent), event_tx);
    }

    // ------------------------------------------------------------------------
    // Search
    // ------------------------------------------------------------------------

    pub fn begin_search(&mut self) {
        self.mode = Mode::Search;
        self.needs_redraw = true;
    }

    pub fn search_push(&mut self, c: char, event_tx: &mpsc::Sender<AppEvent>) {
        if c.is_control() {
            return;
        }
        if self.search.query().chars().count() >= MAX_SEARCH_QUERY_LENGTH {
            self.set_status(format!(
                "Search query too long (max {} chars)",
                MAX_SEARCH_QUERY_LENGTH
            ));
            return;
        }
        let mut query = self.search.query().to_string();
        query.push(c);
        self.set_search_query(&query, event_tx);
    }

    pub fn search_pop(&mut self, event_tx: &mpsc::Sender<AppEvent>) {
        let mut query = self.search.query().to_string();
        if query.pop().is_some() {
            self.set_search_query(&query, event_tx);
        }
    }

    /// Leave search typing mode, keeping the filter.
    pub fn finish_search(&mut self) {
        self.mode = Mode::Browse;
        self.needs_redraw = true;
    }

    /// End the search session entirely.
    pub fn clear_search(&mut self, event_tx: &mpsc::Sender<AppEvent>) {
        self.mode = Mode::Browse;
        self.set_search_query("", event_tx);
    }

    pub fn set_search_query(&mut self, query: &str, event_tx: &mpsc::Sender<AppEvent>) {
        let change = self.search.set_query(query, self.tree.expanded());
        match &change {
            QueryChange::SessionStarted { generation } => {
                self.set_status("Indexing categories...");
                self.spawn_index_build(*generation, event_tx);
            }
            QueryChange::Refined => self.apply_search_expansion(event_tx),
            QueryChange::Cleared { saved } => {
                if let Some(handle) = self.index_handle.take() {
                    handle.abort();
                    tracing::debug!("Aborted search index build");
                }
                match self.clear_search {
                    ClearSearch::Collapse => self.tree.collapse_all(),
                    ClearSearch::Restore => self.tree.restore_expanded(saved),
                }
            }
            QueryChange::Unchanged => {}
        }
        self.refresh_rows();
        if matches!(change, QueryChange::Refined) {
            self.focus_first_match();
        }
    }

    /// Open every ancestor the current matches need.
    fn apply_search_expansion(&mut self, event_tx: &mpsc::Sender<AppEvent>) {
        let expand: Vec<CategoryId> = self.search.matches().expand.iter().copied().collect();
        for id in expand {
            if let ToggleOutcome::FetchStarted(ticket) = self.tree.force_expand(id) {
                self.spawn_fetch(ticket, event_tx);
            }
        }
    }

    fn rebuild_search_index(&mut self, event_tx: &mpsc::Sender<AppEvent>) {
        if let Some(generation) = self.search.request_rebuild() {
            self.spawn_index_build(generation, event_tx);
        }
    }

    fn focus_first_match(&mut self) {
        if self.selected_row().is_some_and(|r| r.highlighted) {
            return;
        }
        if let Some(pos) = self.rows.iter().position(|r| r.highlighted) {
            self.select(pos);
        }
    }

    /// Move to the next (or previous) highlighted row, wrapping around.
    pub fn jump_to_match(&mut self, forward: bool) {
        let n = self.rows.len();
        if n == 0 {
            return;
        }
        let found = (1..=n)
            .map(|step| {
                if forward {
                    (self.selected + step) % n
                } else {
                    (self.selected + n - step) % n
                }
            })
            .find(|&i| self.rows[i].highlighted);
        match found {
            Some(i) => self.select(i),
            None => self.set_status("No matches"),
        }
    }

    // ------------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------------

    pub fn begin_add_child(&mut self) {
        let Some(row) = self.selected_row() else {
            self.set_status("Select a category first");
            return;
        };
        self.mode = Mode::Prompt(Prompt {
            kind: PromptKind::AddChild {
                parent: row.id,
                parent_name: row.name.clone(),
            },
            input: String::new(),
        });
        self.needs_redraw = true;
    }

    pub fn begin_add_root(&mut self) {
        self.mode = Mode::Prompt(Prompt {
            kind: PromptKind::AddRoot,
            input: String::new(),
        });
        self.needs_redraw = true;
    }

    pub fn begin_rename(&mut self) {
        let Some(row) = self.selected_row() else {
            self.set_status("Select a category first");
            return;
        };
        self.mode = Mode::Prompt(Prompt {
            kind: PromptKind::Rename { id: row.id },
            input: row.name.clone(),
        });
        self.needs_redraw = true;
    }

    pub fn begin_delete(&mut self) {
        let Some(row) = self.selected_row() else {
            self.set_status("Select a category first");
            return;
        };
        let siblings = self
            .tree
            .children(ParentKey::from(row.parent_id))
            .map_or(0, <[CategoryNode]>::len);
        self.mode = Mode::Confirm(PendingDelete {
            id: row.id,
            parent_id: row.parent_id,
            name: row.name.clone(),
            last_child: siblings <= 1,
        });
        self.needs_redraw = true;
    }

    pub fn prompt_push(&mut self, c: char) {
        if let Mode::Prompt(prompt) = &mut self.mode {
            if !c.is_control() && prompt.input.chars().count() < MAX_CATEGORY_NAME_CHARS {
                prompt.input.push(c);
                self.needs_redraw = true;
            }
        }
    }

    pub fn prompt_pop(&mut self) {
        if let Mode::Prompt(prompt) = &mut self.mode {
            prompt.input.pop();
            self.needs_redraw = true;
        }
    }

    /// Close a prompt or confirmation without doing anything.
    pub fn cancel_modal(&mut self) {
        if matches!(self.mode, Mode::Prompt(_) | Mode::Confirm(_)) {
            self.mode = Mode::Browse;
            self.set_status("Cancelled");
        }
    }

    pub fn submit_prompt(&mut self, event_tx: &mpsc::Sender<AppEvent>) {
        let Mode::Prompt(prompt) = std::mem::replace(&mut self.mode, Mode::Browse) else {
            return;
        };
        let name = match sanitize_category_name(&prompt.input) {
            Ok(name) => name,
            Err(e) => {
                self.set_status(e.to_string());
                self.mode = Mode::Prompt(prompt);
                return;
            }
        };

        match prompt.kind {
            PromptKind::AddChild { parent, .. } => self.spawn_create(name, Some(parent), event_tx),
            PromptKind::AddRoot => self.spawn_create(name, None, event_tx),
            PromptKind::Rename { id } => {
                tracing::info!(id = %id, name = %name, "Renaming category");
                self.spawn_mutation("rename", event_tx, move |repo| async move {
                    repo.rename(id, &name).await.map(MutationOutcome::Renamed)
                });
            }
        }
        self.needs_redraw = true;
    }

    fn spawn_create(
        &mut self,
        name: String,
        parent: Option<CategoryId>,
        event_tx: &mpsc::Sender<AppEvent>,
    ) {
        tracing::info!(name = %name, parent = ?parent, "Creating category");
        self.spawn_mutation("create", event_tx, move |repo| async move {
            repo.create(&name, parent).await.map(MutationOutcome::Created)
        });
    }

    pub fn confirm_delete(&mut self, event_tx: &mpsc::Sender<AppEvent>) {
        let Mode::Confirm(pending) = std::mem::replace(&mut self.mode, Mode::Browse) else {
            return;
        };
        let PendingDelete {
            id,
            parent_id,
            name,
            last_child,
        } = pending;
        tracing::info!(id = %id, "Deleting category");
        self.spawn_mutation("delete", event_tx, move |repo| async move {
            repo.delete(id).await.map(|()| MutationOutcome::Deleted {
                id,
                parent_id,
                name,
                last_child,
            })
        });
        self.needs_redraw = true;
    }

    fn apply_mutation(&mut self, outcome: MutationOutcome, event_tx: &mpsc::Sender<AppEvent>) {
        match outcome {
            MutationOutcome::Created(node) => {
                self.set_status(format!("Created \"{}\"", node.name));
                let parent_was_leaf = node
                    .parent_id
                    .and_then(|pid| self.tree.find_node(pid))
                    .is_some_and(|p| !p.has_children);
                self.reload_after_edit(node.parent_id, parent_was_leaf, event_tx);
            }
            MutationOutcome::Renamed(node) => {
                self.set_status(format!("Renamed to \"{}\"", node.name));
                self.reload(node.parent_key(), event_tx);
            }
            MutationOutcome::Deleted {
                id,
                parent_id,
                name,
                last_child,
            } => {
                self.set_status(format!("Deleted \"{name}\""));
                self.tree.invalidate(ParentKey::Node(id));
                self.reload_after_edit(parent_id, last_child, event_tx);
            }
        }
        self.rebuild_search_index(event_tx);
    }

    // ------------------------------------------------------------------------
    // Background events
    // ------------------------------------------------------------------------

    /// Apply the result of a background task.
    pub fn handle_event(&mut self, event: AppEvent, event_tx: &mpsc::Sender<AppEvent>) {
        match event {
            AppEvent::ChildrenLoaded { ticket, result } => {
                match self.tree.complete_fetch(ticket, result) {
                    Ok(FetchCommit::Refetch(next)) => self.spawn_fetch(next, event_tx),
                    Ok(_) => {}
                    Err(e) => {
                        let hint = match e.key() {
                            ParentKey::Root => "press R to retry",
                            ParentKey::Node(_) => "press Enter to retry",
                        };
                        self.set_status(format!("{e} ({hint})"));
                    }
                }
            }
            AppEvent::SearchIndexBuilt {
                generation,
                mut index,
            } => {
                let epoch = index.epoch();
                let merged = self.tree.merge_prefetched(index.take_fetched(), epoch);
                let failed = index.failed().len();
                tracing::debug!(generation, merged, failed, "Search index ready");
                if self.search.install_index(generation, index) {
                    self.index_handle = None;
                    let found = self.search.matches().matched.len();
                    if failed > 0 {
                        self.set_status(format!(
                            "{found} matches ({failed} subtrees could not be searched)"
                        ));
                    } else {
                        self.set_status(format!("{found} matches"));
                    }
                    self.apply_search_expansion(event_tx);
                    self.refresh_rows();
                    self.focus_first_match();
                }
            }
            AppEvent::MutationApplied(outcome) => {
                self.pending_mutations = self.pending_mutations.saturating_sub(1);
                self.apply_mutation(outcome, event_tx);
            }
            AppEvent::MutationFailed { action, error } => {
                self.pending_mutations = self.pending_mutations.saturating_sub(1);
                tracing::warn!(action, error = %error, "Category mutation failed");
                self.set_status(format!("Could not {action} category: {error}"));
            }
            AppEvent::TaskPanicked { task, error } => {
                if task == "search_index" {
                    self.search.cancel_build();
                    self.index_handle = None;
                }
                self.set_status(format!("Internal error in {task}: {error}"));
            }
        }
        self.refresh_rows();
    }

    /// Periodic tick: animate the spinner and expire the status message.
    pub fn tick(&mut self) {
        if self.is_busy() {
            self.spinner_frame = (self.spinner_frame + 1) % SPINNER_FRAMES;
            self.needs_redraw = true;
        }
        if self.clear_expired_status() {
            self.needs_redraw = true;
        }
    }

    /// Set status message (will auto-expire after 3 seconds)
    pub fn set_status(&mut self, msg: impl Into<Cow<'static, str>>) {
        self.status_message = Some((msg.into(), Instant::now()));
        self.needs_redraw = true;
    }

    /// Clear status message if expired. Returns true if a message was cleared.
    pub fn clear_expired_status(&mut self) -> bool {
        if let Some((_, time)) = &self.status_message {
            if time.elapsed().as_secs() >= STATUS_TTL_SECS {
                self.status_message = None;
                return true;
            }
        }
        false
    }

    // ------------------------------------------------------------------------
    // Background tasks
    // ------------------------------------------------------------------------

    fn spawn_fetch(&self, ticket: FetchTicket, event_tx: &mpsc::Sender<AppEvent>) {
        let repo = Arc::clone(&self.repo);
        let tx = event_tx.clone();
        tokio::spawn(async move {
            let key = ticket.key();
            let result = catch_task_panic(repo.list_children(key.parent_id()))
                .await
                .unwrap_or_else(|panic_msg| {
                    tracing::error!(task = "list_children", key = %key, error = %panic_msg, "Background task panicked");
                    Err(RepositoryError::TaskFailed(panic_msg))
                });
            send_event(&tx, AppEvent::ChildrenLoaded { ticket, result }).await;
        });
    }

    fn spawn_index_build(&mut self, generation: u64, event_tx: &mpsc::Sender<AppEvent>) {
        if let Some(handle) = self.index_handle.take() {
            handle.abort();
            tracing::debug!("Aborted previous search index build");
        }
        let repo = Arc::clone(&self.repo);
        let seed = self.tree.cache_snapshot();
        let epoch = self.tree.epoch();
        let concurrency = self.search_concurrency;
        let tx = event_tx.clone();

        tracing::debug!(generation, epoch, "Spawning search index build");
        self.index_handle = Some(tokio::spawn(async move {
            let built = catch_task_panic(build_index(repo.as_ref(), seed, epoch, concurrency)).await;
            let event = match built {
                Ok(index) => AppEvent::SearchIndexBuilt { generation, index },
                Err(error) => {
                    tracing::error!(task = "search_index", error = %error, "Background task panicked");
                    AppEvent::TaskPanicked {
                        task: "search_index",
                        error,
                    }
                }
            };
            send_event(&tx, event).await;
        }));
    }

    fn spawn_mutation<F, Fut>(&mut self, action: &'static str, event_tx: &mpsc::Sender<AppEvent>, op: F)
    where
        F: FnOnce(Arc<dyn CategoryRepository>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<MutationOutcome, RepositoryError>> + Send + 'static,
    {
        self.pending_mutations += 1;
        let repo = Arc::clone(&self.repo);
        let tx = event_tx.clone();
        tokio::spawn(async move {
            let result = catch_task_panic(op(repo))
                .await
                .unwrap_or_else(|panic_msg| Err(RepositoryError::TaskFailed(panic_msg)));
            let event = match result {
                Ok(outcome) => AppEvent::MutationApplied(outcome),
                Err(error) => AppEvent::MutationFailed { action, error },
            };
            send_event(&tx, event).await;
        });
    }
}

/// Abort the index build on exit so it does not outlive the event loop.
impl Drop for App {
    fn drop(&mut self) {
        if let Some(handle) = self.index_handle.take() {
            handle.abort();
            tracing::debug!("Aborted search index build on App drop");
        }
    }
}

/// Run a background future, converting a panic into its message.
async fn catch_task_panic<F, T>(future: F) -> Result<T, String>
where
    F: Future<Output = T>,
{
    AssertUnwindSafe(future).catch_unwind().await.map_err(|panic| {
        if let Some(s) = panic.downcast_ref::<&'static str>() {
            s.to_string()
        } else if let Some(s) = panic.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        }
    })
}

async fn send_event(tx: &mpsc::Sender<AppEvent>, event: AppEvent) {
    if let Err(e) = tx.send(event).await {
        tracing::warn!(error = %e, "Channel send failed (receiver dropped)");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::InMemoryCategoryRepository;
    use pretty_assertions::assert_eq;
    use std::collections::HashSet;
    use tokio::time::{self, Duration};

    struct Harness {
        app: App,
        repo: Arc<InMemoryCategoryRepository>,
        tx: mpsc::Sender<AppEvent>,
        rx: mpsc::Receiver<AppEvent>,
    }

    impl Harness {
        fn with_config(config: Config) -> Self {
            let repo = Arc::new(InMemoryCategoryRepository::demo());
            let app = App::new(repo.clone(), &config);
            let (tx, rx) = mpsc::channel(32);
            Self { app, repo, tx, rx }
        }

        async fn started() -> Self {
            let mut h = Self::with_config(Config::default());
            h.app.start(&h.tx);
            h.settle().await;
            h
        }

        /// Feed background events back into the app until nothing is pending.
        async fn settle(&mut self) {
            while self.app.is_busy() {
                let event = time::timeout(Duration::from_secs(5), self.rx.recv())
                    .await
                    .expect("background task did not report back")
                    .expect("channel closed");
                self.app.handle_event(event, &self.tx);
            }
        }

        fn visible(&self) -> Vec<(i64, usize)> {
            self.app.rows().iter().map(|r| (r.id.0, r.depth)).collect()
        }

        fn open(&mut self, id: i64) {
            assert!(self.app.select_id(CategoryId(id)), "row {id} not visible");
            self.app.toggle_selected(&self.tx);
        }

        fn status(&self) -> String {
            self.app
                .status_message
                .as_ref()
                .map(|(m, _)| m.to_string())
                .unwrap_or_default()
        }
    }

    fn ids(list: &[i64]) -> HashSet<CategoryId> {
        list.iter().copied().map(CategoryId).collect()
    }

    #[tokio::test]
    async fn test_start_loads_roots_collapsed() {
        let h = Harness::started().await;
        assert_eq!(h.visible(), vec![(1, 0), (2, 0), (3, 0), (4, 0)]);
        assert_eq!(h.app.rows()[0].affordance, Affordance::Collapsed);
        assert_eq!(h.app.rows()[1].affordance, Affordance::Leaf);
        assert_eq!(h.repo.list_calls(None), 1);
    }

    #[tokio::test]
    async fn test_toggle_fetches_once_and_caches() {
        let mut h = Harness::started().await;
        h.open(1);
        assert!(h.app.rows()[0].loading);
        h.settle().await;
        assert_eq!(h.visible()[..4], [(1, 0), (11, 1), (12, 1), (13, 1)]);

        h.open(1);
        assert_eq!(h.visible().len(), 4);
        h.open(1);
        assert_eq!(h.visible().len(), 7);
        assert!(!h.app.is_busy());
        assert_eq!(h.repo.list_calls(Some(1)), 1);
    }

    #[tokio::test]
    async fn test_double_toggle_while_loading_fetches_once() {
        let mut h = Harness::started().await;
        h.open(3);
        h.app.toggle_selected(&h.tx);
        h.settle().await;
        assert!(h.app.tree.is_expanded(CategoryId(3)));
        assert_eq!(h.repo.list_calls(Some(3)), 1);
    }

    #[tokio::test]
    async fn test_toggle_leaf_reports_status() {
        let mut h = Harness::started().await;
        h.open(2);
        assert!(!h.app.is_busy());
        assert!(h.status().contains("no subcategories"));
        assert_eq!(h.repo.list_calls(Some(2)), 0);
    }

    #[tokio::test]
    async fn test_fetch_failure_is_retryable() {
        let mut h = Harness::started().await;
        h.repo.fail_on(Some(1));
        h.open(1);
        h.settle().await;
        assert!(h.status().contains("Could not load subcategories"));
        assert!(!h.app.tree.is_expanded(CategoryId(1)));

        h.repo.recover(Some(1));
        h.open(1);
        h.settle().await;
        assert!(h.app.tree.is_expanded(CategoryId(1)));
        assert_eq!(h.repo.list_calls(Some(1)), 2);
    }

    #[tokio::test]
    async fn test_collapse_or_parent() {
        let mut h = Harness::started().await;
        h.open(1);
        h.settle().await;
        h.app.select_id(CategoryId(12));
        h.app.collapse_or_parent();
        assert_eq!(h.app.selected_row().unwrap().id, CategoryId(1));
        h.app.collapse_or_parent();
        assert!(!h.app.tree.is_expanded(CategoryId(1)));
        assert_eq!(h.visible().len(), 4);
    }

    #[tokio::test]
    async fn test_collapse_all_moves_cursor_to_visible_ancestor() {
        let mut h = Harness::started().await;
        h.open(3);
        h.settle().await;
        h.open(31);
        h.settle().await;
        h.app.select_id(CategoryId(312));

        h.app.collapse_all();
        assert_eq!(h.app.selected_row().unwrap().id, CategoryId(3));

        // Re-opening does not pull the cursor back to the hidden row
        h.app.toggle_selected(&h.tx);
        assert!(h.app.tree.is_expanded(CategoryId(3)));
        assert_eq!(h.app.selected_row().unwrap().id, CategoryId(3));
        h.app.move_selection(1);
        assert_eq!(h.app.selected_row().unwrap().id, CategoryId(31));
    }

    #[tokio::test]
    async fn test_search_expands_ancestors_and_highlights() {
        let mut h = Harness::started().await;
        h.app.begin_search();
        for c in "sam".chars() {
            h.app.search_push(c, &h.tx);
        }
        h.settle().await;

        assert_eq!(h.app.search.matches().matched, ids(&[12, 311]));
        assert_eq!(h.app.search.matches().expand, ids(&[1, 3, 31]));
        let highlighted: Vec<i64> = h
            .app
            .rows()
            .iter()
            .filter(|r| r.highlighted)
            .map(|r| r.id.0)
            .collect();
        assert_eq!(highlighted, vec![12, 311]);
        assert_eq!(h.app.selected_row().unwrap().id, CategoryId(12));
        // Index build filled the cache; the expansions needed no extra fetch
        assert_eq!(h.repo.list_calls(Some(1)), 1);

        h.app.jump_to_match(true);
        assert_eq!(h.app.selected_row().unwrap().id, CategoryId(311));
        h.app.jump_to_match(true);
        assert_eq!(h.app.selected_row().unwrap().id, CategoryId(12));
        h.app.jump_to_match(false);
        assert_eq!(h.app.selected_row().unwrap().id, CategoryId(311));
    }

    #[tokio::test]
    async fn test_clear_search_collapses_by_default() {
        let mut h = Harness::started().await;
        h.open(4);
        h.settle().await;
        h.app.set_search_query("redmi", &h.tx);
        h.settle().await;
        assert!(h.app.tree.is_expanded(CategoryId(13)));

        h.app.clear_search(&h.tx);
        assert!(h.app.tree.expanded().is_empty());
        assert!(h.app.rows().iter().all(|r| !r.highlighted));
        assert!(matches!(h.app.mode, Mode::Browse));
    }

    #[tokio::test]
    async fn test_clear_search_restores_when_configured() {
        let mut h = Harness::with_config(Config {
            clear_search: ClearSearch::Restore,
            ..Config::default()
        });
        h.app.start(&h.tx);
        h.settle().await;
        h.open(4);
        h.settle().await;

        h.app.set_search_query("redmi", &h.tx);
        h.settle().await;
        assert!(h.app.tree.is_expanded(CategoryId(1)));

        h.app.set_search_query("", &h.tx);
        assert_eq!(h.app.tree.expanded(), &ids(&[4]));
    }

    #[tokio::test]
    async fn test_create_child_under_leaf_updates_affordance() {
        let mut h = Harness::started().await;
        h.app.select_id(CategoryId(2));
        h.app.begin_add_child();
        for c in "  Gaming ".chars() {
            h.app.prompt_push(c);
        }
        h.app.submit_prompt(&h.tx);
        assert!(matches!(h.app.mode, Mode::Browse));
        h.settle().await;

        assert!(h.status().contains("Created \"Gaming\""));
        let laptop = h.app.rows().iter().find(|r| r.id == CategoryId(2)).unwrap();
        assert_eq!(laptop.affordance, Affordance::Collapsed);
        assert_eq!(h.repo.list_calls(None), 2);

        h.open(2);
        h.settle().await;
        let names: Vec<&str> = h.app.rows().iter().map(|r| r.name.as_str()).collect();
        assert!(names.contains(&"Gaming"));
    }

    #[tokio::test]
    async fn test_rename_refetches_open_parent() {
        let mut h = Harness::started().await;
        h.open(1);
        h.settle().await;
        h.app.select_id(CategoryId(11));
        h.app.begin_rename();
        if let Mode::Prompt(prompt) = &mut h.app.mode {
            assert_eq!(prompt.input, "Apple");
            prompt.input = "Apple Inc".to_string();
        }
        h.app.submit_prompt(&h.tx);
        h.settle().await;

        assert!(h.app.tree.is_expanded(CategoryId(1)));
        assert_eq!(h.repo.list_calls(Some(1)), 2);
        let apple = h.app.rows().iter().find(|r| r.id == CategoryId(11)).unwrap();
        assert_eq!(apple.name, "Apple Inc");
        // Cursor stays on the renamed row
        assert_eq!(h.app.selected_row().unwrap().id, CategoryId(11));
    }

    #[tokio::test]
    async fn test_blank_name_keeps_prompt_open() {
        let mut h = Harness::started().await;
        h.app.begin_add_root();
        h.app.prompt_push(' ');
        h.app.submit_prompt(&h.tx);
        assert!(matches!(h.app.mode, Mode::Prompt(_)));
        assert!(h.status().contains("empty"));
        assert!(!h.app.is_busy());
    }

    #[tokio::test]
    async fn test_delete_leaf_reloads_parent() {
        let mut h = Harness::started().await;
        h.app.select_id(CategoryId(2));
        h.app.begin_delete();
        assert!(matches!(h.app.mode, Mode::Confirm(_)));
        h.app.confirm_delete(&h.tx);
        h.settle().await;

        assert_eq!(h.visible(), vec![(1, 0), (3, 0), (4, 0)]);
        assert!(h.status().contains("Deleted \"Laptop\""));
    }

    #[tokio::test]
    async fn test_delete_parent_with_children_is_rejected() {
        let mut h = Harness::started().await;
        h.app.select_id(CategoryId(1));
        h.app.begin_delete();
        h.app.confirm_delete(&h.tx);
        h.settle().await;
        assert!(h.status().contains("Could not delete category"));
        assert_eq!(h.visible().len(), 4);
    }

    #[tokio::test]
    async fn test_cancel_modal() {
        let mut h = Harness::started().await;
        h.app.begin_delete();
        h.app.cancel_modal();
        assert!(matches!(h.app.mode, Mode::Browse));
        assert_eq!(h.status(), "Cancelled");
    }

    #[tokio::test]
    async fn test_mutation_during_search_rebuilds_index() {
        let mut h = Harness::started().await;
        h.app.set_search_query("watch", &h.tx);
        h.settle().await;
        assert_eq!(h.app.search.matches().matched, ids(&[41, 42]));

        h.app.select_id(CategoryId(42));
        h.app.begin_rename();
        if let Mode::Prompt(prompt) = &mut h.app.mode {
            prompt.input = "Apple Band".to_string();
        }
        h.app.submit_prompt(&h.tx);
        h.settle().await;
        assert_eq!(h.app.search.matches().matched, ids(&[41]));
    }

    #[tokio::test]
    async fn test_refresh_root_list() {
        let mut h = Harness::started().await;
        h.app.select_id(CategoryId(2));
        h.app.refresh_selected(&h.tx);
        h.settle().await;
        assert_eq!(h.repo.list_calls(None), 2);
        assert_eq!(h.app.selected_row().unwrap().id, CategoryId(2));
    }

    #[tokio::test]
    async fn test_spinner_advances_only_while_busy() {
        let mut h = Harness::started().await;
        h.app.tick();
        assert_eq!(h.app.spinner_frame, 0);
        h.open(1);
        h.app.tick();
        assert_eq!(h.app.spinner_frame, 1);
        h.settle().await;
    }

    #[tokio::test]
    async fn test_status_expires_after_3_seconds() {
        let repo = Arc::new(InMemoryCategoryRepository::new());
        let mut app = App::new(repo, &Config::default());
        time::pause();
        app.set_status("Test message");

        time::advance(Duration::from_secs(2)).await;
        app.clear_expired_status();
        assert!(app.status_message.is_some());

        time::advance(Duration::from_secs(2)).await;
        app.clear_expired_status();
        assert!(app.status_message.is_none());
    }
}
