//! macOS release library for Rust applications
//!
//! This library provides:
//! - universal dependency tree merging and thinning via `lipo`
//! - inside-out code signing of app bundles
//! - notarization with resumable polling and stapling
//! - zip, dmg and pkg packaging
//!
//! It can be used both as a CLI tool and as a library dependency.

pub mod bundler;
pub mod cli;
pub mod error;
pub mod metadata;

pub use error::{BundlerError, CliError, Result};
