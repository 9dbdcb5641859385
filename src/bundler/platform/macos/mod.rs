//! macOS universal binaries, code signing, notarization and packaging.
//!
//! Stages, in the order a release runs them:
//! - [`merge`] combines per-architecture dependency trees, fusing binaries with `lipo`
//! - [`thin`] strips a universal tree down to one architecture
//! - [`sign`] signs a bundle inside-out
//! - [`notarize`] submits, polls, and staples
//! - [`archive`], [`dmg`] and [`pkg`] produce the distribution artifact
//!
//! Every external tool goes through [`tools::ToolRunner`].

pub mod archive;
pub mod classify;
pub mod dmg;
pub mod identity;
pub mod lipo;
pub mod merge;
pub mod notarize;
pub mod packages;
pub mod pkg;
pub mod sign;
pub mod thin;
pub mod tools;
