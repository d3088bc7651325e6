//! Error types for duet-screen

use thiserror::Error;

use crate::fusion::FusionError;
use crate::scheduler::DispatchError;

/// Pipeline error type
#[derive(Debug, Error)]
pub enum ScreenError {
    /// Configuration, record, or filesystem error from duet-common
    #[error(transparent)]
    Common(#[from] duet_common::Error),

    /// Scheduler gave up on a stage
    #[error("Dispatch failed: {0}")]
    Dispatch(#[from] DispatchError),

    /// Invalid fusion arguments
    #[error("Fusion failed: {0}")]
    Fusion(#[from] FusionError),
}

/// Result type for pipeline operations
pub type ScreenResult<T> = Result<T, ScreenError>;
