//! # Chinook Common Library
//!
//! Shared code for the Chinook reporting crates:
//! - Error taxonomy
//! - Configuration model and loading
//! - Logging sink construction

pub mod config;
pub mod error;
pub mod logging;

pub use error::{Error, Result};
