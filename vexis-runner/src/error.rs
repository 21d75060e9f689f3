//! Error types for solver driving and result extraction

use std::path::PathBuf;

use thiserror::Error;
use vexis_core::error::CoreError;

/// Main error type for job execution
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Solver exited with code {0}")]
    SolverFailed(i32),

    #[error("Solver runtime missing and the fallback executable did not recover")]
    SolverMissingRuntime,

    #[error("Failed to launch solver '{path}': {source}")]
    Spawn {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Plot error: {0}")]
    Image(#[from] image::ImageError),
}

impl RunnerError {
    /// True for the clean-cancellation exit.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RunnerError::Core(CoreError::Cancelled))
    }

    /// Stable kind name written into `.err` diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            RunnerError::SolverFailed(_) => "SolverFailed",
            RunnerError::SolverMissingRuntime => "SolverMissingRuntime",
            RunnerError::Spawn { .. } => "SolverSpawn",
            RunnerError::Core(CoreError::MalformedMesh(_)) => "MalformedMesh",
            RunnerError::Core(CoreError::MissingPart(_)) => "MissingPart",
            RunnerError::Core(CoreError::TemplateMissingPart(_)) => "TemplateMissingPart",
            RunnerError::Core(CoreError::SelectionLost(_)) => "SelectionLost",
            RunnerError::Core(CoreError::MalformedTemplate(_)) => "MalformedTemplate",
            RunnerError::Core(CoreError::Cancelled) => "Cancelled",
            RunnerError::Core(_) => "Core",
            RunnerError::Io(_) => "Io",
            RunnerError::Csv(_) => "Csv",
            RunnerError::Image(_) => "Image",
        }
    }
}

/// Result type for job execution
pub type RunnerResult<T> = Result<T, RunnerError>;
