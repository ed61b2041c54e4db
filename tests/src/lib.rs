//! # Kestrel-Chain Test Suite
//!
//! Unified test crate containing:
//!
//! ```text
//! tests/src/
//! ├── support/          # Shared in-memory fakes for both subsystems
//! │   └── fakes.rs
//! │
//! └── integration/      # Cross-crate flows
//!     ├── end_to_end.rs     # gate -> mine -> aggregate -> apply -> confirm
//!     ├── scenarios.rs      # literal acceptance scenarios
//!     └── quorum_degrade.rs # gate fallback/degrade interplay
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! # All tests
//! cargo test -p kc-tests
//!
//! # By category
//! cargo test -p kc-tests integration::
//! ```

#![allow(dead_code)]

pub mod integration;
pub mod support;
