//! UI-thread state and the job lifecycle.

use std::path::PathBuf;

use tracing::warn;

use crate::config::Settings;
use crate::error::{ErrorKind, JobError, ValidationError};
use crate::model::{Format, JobRequest, JobSummary, WorkerEvent};

pub const IDLE_STATUS: &str = "Ready";

/// Idle -> Running -> (Completed | Failed) -> Idle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogLevel {
    Info,
    Error,
}

/// A modal message waiting to be shown by the window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dialog {
    pub level: DialogLevel,
    pub title: String,
    pub message: String,
}

impl Dialog {
    fn error(message: impl Into<String>) -> Self {
        Self {
            level: DialogLevel::Error,
            title: "Error".into(),
            message: message.into(),
        }
    }
}

/// Everything the window shows, owned by the UI thread
#[derive(Debug)]
pub struct AppState {
    pub url: String,
    pub format: Format,
    pub destination: PathBuf,
    pub phase: Phase,
    /// Progress bar value, 0.0 to 1.0
    pub progress: f32,
    pub status: String,
    /// Append-only log panel
    pub log: Vec<String>,
    /// Shown (and cleared) by the window on the next frame
    pub pending_dialog: Option<Dialog>,
}

impl AppState {
    pub fn new(settings: &Settings) -> Self {
        Self {
            url: String::new(),
            format: settings.format,
            destination: settings.download_dir.clone(),
            phase: Phase::Idle,
            progress: 0.0,
            status: IDLE_STATUS.into(),
            log: vec!["Welcome! Please make sure FFmpeg is installed on your system.".into()],
            pending_dialog: None,
        }
    }

    pub fn can_start(&self) -> bool {
        self.phase == Phase::Idle
    }

    pub fn push_log(&mut self, message: impl Into<String>) {
        self.log.push(message.into());
    }

    /// Validates the inputs and moves to `Running`.
    ///
    /// Validation failures queue an error dialog and leave the state `Idle`.
    pub fn begin(&mut self) -> Result<JobRequest, JobError> {
        if !self.can_start() {
            return Err(ValidationError::JobInProgress.into());
        }
        match JobRequest::new(&self.url, self.format, &self.destination) {
            Ok(job) => {
                self.phase = Phase::Running;
                self.progress = 0.0;
                self.status = "Starting...".into();
                Ok(job)
            }
            Err(err) => {
                self.pending_dialog = Some(Dialog::error(err.to_string()));
                Err(err)
            }
        }
    }

    /// Applies one worker event.
    pub fn apply(&mut self, event: WorkerEvent) {
        match event {
            WorkerEvent::Progress(signal) => {
                if self.phase != Phase::Running {
                    return;
                }
                // The bar only moves forward, even when a tool repeats a value.
                self.progress = self.progress.max(signal.fraction);
                self.status = signal.status;
            }
            WorkerEvent::Log(line) => self.push_log(line),
            WorkerEvent::Finished(result) => self.finish(result),
        }
    }

    fn finish(&mut self, result: Result<JobSummary, JobError>) {
        match result {
            Ok(summary) => {
                self.phase = Phase::Completed;
                self.progress = 1.0;
                self.push_log(format!(
                    "All tasks finished successfully! ({})",
                    summary.backend.tool_name()
                ));
                let message = match summary.completed_items {
                    0 | 1 => "Download Complete!".to_string(),
                    n => format!("Download Complete! {n} items saved."),
                };
                self.pending_dialog = Some(Dialog {
                    level: DialogLevel::Info,
                    title: "Success".into(),
                    message,
                });
            }
            Err(err) => {
                self.phase = Phase::Failed;
                if err.kind() == ErrorKind::Validation {
                    warn!("job rejected: {err}");
                }
                self.push_log(format!("Error: {err}"));
                self.pending_dialog = Some(Dialog::error(format!("An error occurred: {err}")));
            }
        }
        self.settle();
    }

    /// Completed and Failed both fall straight back to Idle.
    fn settle(&mut self) {
        if matches!(self.phase, Phase::Completed | Phase::Failed) {
            self.phase = Phase::Idle;
            self.status = IDLE_STATUS.into();
        }
    }
}
