//! # Shared Types Crate
//!
//! Chain entities shared by the consensus-core crates (mining, aggregation,
//! consensus rules).
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: every type that crosses a crate boundary is
//!   defined here.
//! - **Opaque payloads**: transactions are carried as pre-built bytes; fee
//!   and incentive construction happens outside the consensus core.
//! - **No ambient clocks**: code that needs wall-clock time takes a
//!   [`TimeSource`], never reads the system clock directly.

pub mod entities;
pub mod time;

pub use entities::*;
pub use time::{ManualTimeSource, SystemTimeSource, TimeSource};
