//! Multi-destination copy-and-verify for on-set media offloads.
//!
//! Each source file is read once, hashed inline and written to every
//! destination; every destination is then re-read from disk and its hash
//! compared before the copy is reported as verified.

pub mod config;
pub mod context;
pub mod core;
pub mod error;
pub mod logging;

pub use error::{OffloadError, Result};
