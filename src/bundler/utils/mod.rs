//! Shared helpers for the bundling stages.

pub mod checksum;
pub mod fs;
pub mod parallel;
