//! Client-side category tree: lazy loading, caching, search and projection.
//!
//! [`CategoryTree`] owns the node cache, the expansion set and the loading
//! set. Searching goes through a flat [`SearchIndex`] built once per
//! [`SearchSession`], filtered by [`resolve`]. [`project`] turns the whole
//! state into the rows the UI draws.

mod error;
mod index;
mod project;
mod resolve;
mod search;
mod state;

pub use error::TreeError;
pub use index::{build_index, IndexEntry, SearchIndex};
pub use project::{project, Affordance, TreeRow};
pub use resolve::{normalize_query, resolve, SearchMatches};
pub use search::{ClearSearch, QueryChange, SearchSession};
pub use state::{CategoryTree, FetchCommit, FetchTicket, NodeCache, ToggleOutcome};
