use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{JobError, ValidationError};

/// Output format chosen by the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Format {
    /// MP4 video with the best audio merged in
    #[default]
    Video,
    /// MP3 audio only
    Audio,
}

impl Format {
    /// Label shown next to the radio button
    pub fn label(self) -> &'static str {
        match self {
            Format::Video => "MP4 (Video)",
            Format::Audio => "MP3 (Audio)",
        }
    }
}

/// Which external tool handles a job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// yt-dlp: single videos and playlists
    MediaFetcher,
    /// spotdl: streaming-service tracks, albums and playlists
    StreamingService,
}

impl Backend {
    pub fn tool_name(self) -> &'static str {
        match self {
            Backend::MediaFetcher => "yt-dlp",
            Backend::StreamingService => "spotdl",
        }
    }
}

/// One user-initiated download, consumed by a single worker run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRequest {
    /// Trimmed, non-empty URL
    pub url: String,
    /// Selected output format
    pub format: Format,
    /// Existing directory the files are written into
    pub destination: PathBuf,
}

impl JobRequest {
    /// Validates user input and builds a request.
    ///
    /// The URL is trimmed; an empty result or a destination that is not an
    /// existing directory is rejected before any tool runs.
    pub fn new(url: &str, format: Format, destination: &Path) -> Result<Self, JobError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(ValidationError::EmptyUrl.into());
        }
        if !destination.is_dir() {
            return Err(ValidationError::MissingDestination(destination.to_path_buf()).into());
        }
        Ok(Self {
            url: url.to_string(),
            format,
            destination: destination.to_path_buf(),
        })
    }
}

/// Ephemeral progress update, overwritten on every report
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSignal {
    /// Completion between 0.0 and 1.0
    pub fraction: f32,
    /// Human-readable status line
    pub status: String,
}

impl ProgressSignal {
    pub fn new(fraction: f32, status: impl Into<String>) -> Self {
        Self {
            fraction: fraction.clamp(0.0, 1.0),
            status: status.into(),
        }
    }
}

/// Result of a job that ran to completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSummary {
    pub backend: Backend,
    /// Items the tool reported as finished
    pub completed_items: usize,
}

/// Messages sent from the worker to the UI thread
#[derive(Debug)]
pub enum WorkerEvent {
    Progress(ProgressSignal),
    Log(String),
    Finished(Result<JobSummary, JobError>),
}
