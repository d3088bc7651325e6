//! duet-screen library interface
//!
//! Deterministic multi-stage screening: score inputs against a partner
//! library in three stages (DTI, docking, MM/GBSA), keep the top-K at each
//! stage, and fuse the stage rankings into one consensus ranking.

pub mod config_template;
pub mod consensus;
pub mod data;
pub mod error;
pub mod fusion;
pub mod manifest;
pub mod pipeline;
pub mod report;
pub mod scheduler;
pub mod scoring;
pub mod stage;
pub mod workspace;

pub use crate::error::{ScreenError, ScreenResult};
