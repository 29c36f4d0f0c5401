//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `core` - Core commands (init, formats) and shared utilities (open_db, load_pipeline)
//! - `detect` - Format detection for a single file
//! - `import` - CSV import
//! - `status` - Status, import history and upload issues

pub mod core;
pub mod detect;
pub mod import;
pub mod status;

// Re-export command functions for main.rs
pub use core::*;
pub use detect::*;
pub use import::*;
pub use status::*;
