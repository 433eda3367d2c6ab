//! Android build descriptor tooling for Flutter plugins
//!
//! This crate provides:
//! - Pub package cache discovery
//! - Build descriptor analysis (group and namespace declarations)
//! - The in-place namespace patcher
//! - A Gradle init script overlay as a non-destructive alternative

#![warn(missing_docs)]

pub mod cache;
pub mod descriptor;
pub mod overlay;
pub mod patcher;

pub use patcher::{patch_missing_namespaces, Outcome, PatchOptions, PatchReport, Patcher};
