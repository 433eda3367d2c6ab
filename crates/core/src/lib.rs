//! Core utilities for nsfix
//!
//! Shared functionality used by the patcher and the command-line front end:
//!
//! - **Error handling**: errors with codes, context, and recovery suggestions
//! - **Configuration**: TOML-based configuration with defaults
//! - **Filesystem**: atomic file replacement

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod fs;

pub use error::{Error, ErrorCode, Result, ResultExt};
