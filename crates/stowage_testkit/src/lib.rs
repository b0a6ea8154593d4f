//! # Stowage Testkit
//!
//! Test utilities for Stowage.
//!
//! This crate provides:
//! - Fixtures: temporary data directories, seeded registries and catalogs,
//!   sample users
//! - Property-based test generators using proptest: codex values, keys,
//!   subjects and subscription patterns
//!
//! ## Usage
//!
//! ```rust,ignore
//! use stowage_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn kv_in_seeded_catalog() {
//!     let fixture = TestCatalog::open();
//!     let kv = fixture.catalog.engine("sys", "cache").unwrap();
//!     // ... test operations
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;
