//! Core utilities for Abrogue.
//!
//! This crate provides foundational types used across the game:
//! - Error types and result aliases
//! - Logging initialization
//! - JSON-backed configuration
//! - Fixed-tick timing

mod config;
mod error;
mod logging;
mod timer;

pub use config::Config;
pub use error::{Error, Result};
pub use logging::init_logging;
pub use timer::TickTimer;
