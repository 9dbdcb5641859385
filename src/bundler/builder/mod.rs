//! Release orchestration and coordination.
//!
//! The [`Packager`] takes a built `.app` bundle through the release:
//! 1. Resolves the signing identity from [`Settings`](crate::bundler::Settings)
//! 2. Signs the bundle inside-out
//! 3. Produces the zip, dmg or pkg artifact
//! 4. Notarizes and staples it
//! 5. Returns a [`BundledArtifact`](crate::bundler::BundledArtifact) with its checksum
//!
//! # Module Organization
//!
//! - [`orchestrator`] - Main [`Packager`] struct and release flow
//! - [`tool_detection`] - External tool availability checking

mod orchestrator;
mod tool_detection;

pub use orchestrator::Packager;
pub use tool_detection::{KNOWN_TOOLS, packaging_tools, tool_path, verify_tools};
