//! # rowbind testkit
//!
//! Test utilities for rowbind.
//!
//! This crate provides:
//! - Sample object types and session helpers
//! - Run-loop pumping for notification tests
//! - Property-based test generators using proptest
//! - Tracing setup for tests
//!
//! ## Usage
//!
//! ```rust,ignore
//! use rowbind_testkit::prelude::*;
//!
//! #[test]
//! fn adds_a_person() {
//!     let session = temp_session();
//!     let ada = add_person(&session, 1, "Ada", 36).unwrap();
//!     assert_eq!(ada.name.read().unwrap(), "Ada");
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
    pub use crate::init_tracing;
}

pub use fixtures::*;
pub use generators::*;

/// Installs a fmt subscriber filtered by `RUST_LOG` for the test process.
/// Later calls are no-ops.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}
