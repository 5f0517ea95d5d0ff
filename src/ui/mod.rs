//! Terminal User Interface module.
//!
//! # Module Structure
//!
//! - `loop_runner` - Main event loop and terminal management
//! - `input` - Keyboard input handling per mode
//! - `render` - Layout, search line and modal overlays
//! - `categories` - Category tree widget
//! - `status` - Status bar widget

mod categories;
mod input;
mod loop_runner;
mod render;
mod status;

pub use loop_runner::{run, Action};
