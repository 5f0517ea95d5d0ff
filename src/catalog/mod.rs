//! Category data and the repository contract.
//!
//! - `types` - `CategoryNode`, `CategoryId`, `ParentKey`
//! - `repository` - the async `CategoryRepository` trait
//! - `http` - REST client implementation
//! - `memory` - in-process implementation for demo mode and tests

mod error;
mod http;
mod memory;
mod repository;
mod types;

pub use error::RepositoryError;
pub use http::{HttpCategoryRepository, HttpSettings};
pub use memory::InMemoryCategoryRepository;
pub use repository::CategoryRepository;
pub use types::{CategoryId, CategoryNode, ParentKey};
