//! Error types for download jobs.
use std::path::PathBuf;

use thiserror::Error;

/// Input problems caught before any tool is started.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Please enter a URL")]
    EmptyUrl,

    #[error("Destination folder does not exist: {}", .0.display())]
    MissingDestination(PathBuf),

    #[error("A download is already running")]
    JobInProgress,
}

/// Everything that can end a job.
#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("'{tool}' was not found in PATH. {hint}")]
    ToolNotFound { tool: String, hint: &'static str },

    #[error("Failed to start {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{tool} failed ({}):\n{output}", exit_label(.code))]
    ProcessExit {
        tool: String,
        code: Option<i32>,
        /// Tail of the tool's stdout and stderr
        output: String,
    },

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

/// Coarse grouping used by the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Fetch,
    ProcessExit,
}

impl JobError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            JobError::Validation(_) => ErrorKind::Validation,
            JobError::ProcessExit { .. } => ErrorKind::ProcessExit,
            JobError::ToolNotFound { .. }
            | JobError::Spawn { .. }
            | JobError::Io(_)
            | JobError::Unexpected(_) => ErrorKind::Fetch,
        }
    }
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "terminated by signal".to_string(),
    }
}
