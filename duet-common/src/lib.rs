//! # DUET-Screen Common Library
//!
//! Shared code for the DUET-Screen pipeline including:
//! - Record types (inputs, partners, stage results, consensus rows)
//! - Configuration loading and environment overrides
//! - Atomic JSON / JSON Lines persistence
//! - Error types and timestamp helpers

pub mod config;
pub mod error;
pub mod models;
pub mod records;
pub mod time;

pub use config::Config;
pub use error::{Error, Result};
pub use models::{EntityKind, Stage};
