//! detectforge - object-detection inference server
//!
//! Serves detection over HTTP from a single active checkpoint, keeps that
//! checkpoint in sync with a model registry's Production stage, collects new
//! labeled samples and triggers an external retraining job.

#![warn(clippy::all)]

pub mod api;
pub mod cli;
pub mod config;
pub mod core;
pub mod inference;
pub mod models;
pub mod registry;
pub mod retrain;
pub mod server;
pub mod storage;
pub mod utils;

// Re-export commonly used types
pub use crate::api::error::{DetectForgeError, Result};
pub use crate::config::Config;

/// detectforge version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
