//! CLI utilities for nsfix
//!
//! Terminal status lines and count/duration formatting.

#![warn(missing_docs)]

pub mod output;
