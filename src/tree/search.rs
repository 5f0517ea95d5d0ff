use serde::Deserialize;
use std::collections::HashSet;

use super::index::SearchIndex;
use super::resolve::{normalize_query, resolve, SearchMatches};
use crate::catalog::CategoryId;

/// What happens to the expansion set when the search query is cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClearSearch {
    /// Collapse everything (same as `collapse_all`).
    #[default]
    Collapse,
    /// Put back the expansion set captured when the search started.
    Restore,
}

/// Effect of a query edit on the search session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryChange {
    /// Query went from empty to non-empty: build an index tagged `generation`.
    SessionStarted { generation: u64 },
    /// Query edited within a running session; matches were recomputed.
    Refined,
    /// Query cleared. Carries the expansion set saved when the session began.
    Cleared { saved: HashSet<CategoryId> },
    Unchanged,
}

/// State of one search session, from the first typed character until clear.
///
/// The index is built once per session (and again after structural edits);
/// keystrokes only re-run [`resolve`] over it. Builds are tagged with a
/// generation so a result arriving after the session ended is ignored.
#[derive(Debug, Default)]
pub struct SearchSession {
    query: String,
    index: Option<SearchIndex>,
    building: Option<u64>,
    generation: u64,
    matches: SearchMatches,
    saved_expansion: HashSet<CategoryId>,
}

impl SearchSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn is_active(&self) -> bool {
        normalize_query(&self.query).is_some()
    }

    pub fn is_building(&self) -> bool {
        self.building.is_some()
    }

    pub fn index(&self) -> Option<&SearchIndex> {
        self.index.as_ref()
    }

    pub fn matches(&self) -> &SearchMatches {
        &self.matches
    }

    /// Update the query. `expanded_now` is remembered when a session starts
    /// so the caller can restore it on clear.
    pub fn set_query(&mut self, query: &str, expanded_now: &HashSet<CategoryId>) -> QueryChange {
        let was_active = self.is_active();
        if self.query == query {
            return QueryChange::Unchanged;
        }
        self.query = query.to_string();

        match (was_active, self.is_active()) {
            (false, true) => {
                self.generation += 1;
                self.building = Some(self.generation);
                self.index = None;
                self.matches = SearchMatches::default();
                self.saved_expansion = expanded_now.clone();
                tracing::debug!(generation = self.generation, "Search session started");
                QueryChange::SessionStarted {
                    generation: self.generation,
                }
            }
            (true, true) => {
                self.refresh_matches();
                QueryChange::Refined
            }
            (true, false) => {
                // Bump so an in-flight build for the old session is ignored.
                self.generation += 1;
                self.building = None;
                self.index = None;
                self.matches = SearchMatches::default();
                tracing::debug!("Search session cleared");
                QueryChange::Cleared {
                    saved: std::mem::take(&mut self.saved_expansion),
                }
            }
            (false, false) => QueryChange::Unchanged,
        }
    }

    /// Install a finished index. Returns false if it belongs to an older generation.
    pub fn install_index(&mut self, generation: u64, index: SearchIndex) -> bool {
        if self.building != Some(generation) {
            tracing::debug!(
                generation,
                current = self.generation,
                "Dropping search index from a stale build"
            );
            return false;
        }
        self.building = None;
        self.index = Some(index);
        self.refresh_matches();
        true
    }

    /// Start a rebuild after the underlying data changed.
    ///
    /// The current index keeps serving matches until the new one arrives.
    /// Returns the generation to build, or `None` when no session is active.
    pub fn request_rebuild(&mut self) -> Option<u64> {
        if !self.is_active() {
            return None;
        }
        self.generation += 1;
        self.building = Some(self.generation);
        Some(self.generation)
    }

    /// Forget a build that will never report back. The last index, if any, stays.
    pub fn cancel_build(&mut self) {
        self.building = None;
    }

    fn refresh_matches(&mut self) {
        if let Some(index) = &self.index {
            self.matches = resolve(index, &self.query);
        }
    }
}
