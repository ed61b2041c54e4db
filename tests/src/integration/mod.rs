//! Cross-crate integration flows.

mod end_to_end;
mod quorum_degrade;
mod scenarios;
