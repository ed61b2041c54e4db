//! Port definitions for the mining subsystem.

mod outbound;

pub use outbound::*;
