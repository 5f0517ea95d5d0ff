//! Small shared helpers: API base URL validation and terminal-safe text.

mod text;
mod url_validator;

pub use text::{
    display_width, sanitize_category_name, strip_control_chars, truncate_to_width, NameError,
    MAX_CATEGORY_NAME_CHARS,
};
pub use url_validator::{validate_base_url, BaseUrlError};

/// Longest search query the input line accepts.
pub const MAX_SEARCH_QUERY_LENGTH: usize = 256;
