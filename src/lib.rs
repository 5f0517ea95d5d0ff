//! Lazily loaded, cached category tree for a storefront admin.
//!
//! - [`catalog`] - category data and the repository contract
//! - [`tree`] - expansion state, node cache, search resolution and projection
//! - [`app`] - controller tying the tree to background tasks
//! - [`ui`] - ratatui front end

pub mod app;
pub mod catalog;
pub mod config;
pub mod tree;
pub mod ui;
pub mod util;
