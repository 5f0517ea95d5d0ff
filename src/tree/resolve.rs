use std::collections::HashSet;

use super::index::SearchIndex;
use crate::catalog::CategoryId;

/// Result of matching a query against the search index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchMatches {
    /// Categories whose own name contains the query.
    pub matched: HashSet<CategoryId>,
    /// Ancestors that must be expanded for every match to be visible.
    pub expand: HashSet<CategoryId>,
}

impl SearchMatches {
    pub fn is_empty(&self) -> bool {
        self.matched.is_empty()
    }
}

/// Normalize a raw query: trimmed and lowercased. `None` means "no search".
///
/// Surrounding whitespace is not part of the query. A space typed on the way
/// to a second word does not narrow the matches, and a query of only spaces
/// never starts a search session.
pub fn normalize_query(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_lowercase())
    }
}

/// Find the categories whose name contains `query` (case-insensitive) and the
/// minimal set of ancestors to expand to reveal them.
///
/// A match never forces itself open: a category lands in `expand` only when
/// one of its descendants matches. Root-level matches need no expansion.
pub fn resolve(index: &SearchIndex, query: &str) -> SearchMatches {
    let Some(needle) = normalize_query(query) else {
        return SearchMatches::default();
    };

    let mut matches = SearchMatches::default();
    for entry in index.entries() {
        if !entry.folded.contains(&needle) {
            continue;
        }
        matches.matched.insert(entry.id);

        // Walk up until a root, an ancestor already recorded, or an id the index doesn't know.
        let mut parent = entry.parent_id;
        while let Some(pid) = parent {
            let Some(ancestor) = index.get(pid) else {
                break;
            };
            if !matches.expand.insert(pid) {
                break;
            }
            parent = ancestor.parent_id;
        }
    }
    matches
}
