//! Port definitions for the aggregation subsystem.

mod outbound;

pub use outbound::*;
