//! GeoCore Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared error handling, logging and checksum helpers for the GeoCore
//! harvester workspace.
//!
//! # Overview
//!
//! - **Error Handling**: the [`HarvestError`] taxonomy and [`Result`] alias
//! - **Logging**: [`logging::LogConfig`] and [`logging::init_logging`]
//! - **Checksums**: SHA-256 digests recorded for every stored artifact
//!
//! # Example
//!
//! ```no_run
//! use geocore_common::{HarvestError, Result};
//!
//! fn require_collection(name: Option<&str>) -> Result<&str> {
//!     name.ok_or_else(|| HarvestError::Config("COLLECTION is not set".into()))
//! }
//! ```

pub mod checksum;
pub mod error;
pub mod logging;

// Re-export commonly used types
pub use error::{HarvestError, Result};
