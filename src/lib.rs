//! Default bookmark folder and title-mode management on top of a browser's
//! native bookmark API.

/// Surfaces: popup reconciliation, options page, keyboard, install lifecycle.
pub mod app;
/// Configuration loading and defaults.
pub mod config;
/// Folder flattening, settings store, storage areas and host APIs.
pub mod core;
/// Crate error type.
pub mod error;

pub use config::Config;
pub use error::Error;
