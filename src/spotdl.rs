//! Streaming-service adapter: runs `spotdl <url>` inside the destination folder.

use tracing::info;

use crate::config::ToolCommand;
use crate::downloader::Fetcher;
use crate::error::JobError;
use crate::model::{Backend, JobRequest, JobSummary, ProgressSignal};
use crate::process;
use crate::progress::{Reporter, StreamingEstimate};

const INSTALL_HINT: &str = "Make sure 'spotdl' is installed via pip.";

#[derive(Debug, Clone)]
pub struct SpotdlFetcher {
    tool: ToolCommand,
}

impl SpotdlFetcher {
    pub fn new(tool: ToolCommand) -> Self {
        Self { tool }
    }
}

impl Fetcher for SpotdlFetcher {
    async fn fetch(&self, job: &JobRequest, reporter: &Reporter) -> Result<JobSummary, JobError> {
        reporter.log("Detected Spotify URL. Using SpotDL...");
        reporter.progress(ProgressSignal::new(
            0.0,
            "Initializing SpotDL (This may take a moment)...",
        ));

        let mut estimate = StreamingEstimate::default();
        let args = [job.url.clone()];
        let run = process::run_tool(&self.tool, INSTALL_HINT, &args, &job.destination, |_, line| {
            reporter.log(line);
            if let Some(signal) = estimate.observe(line) {
                reporter.progress(signal);
            }
            true
        })
        .await?;

        if !run.status.success() {
            return Err(JobError::ProcessExit {
                tool: Backend::StreamingService.tool_name().to_string(),
                code: run.status.code(),
                output: run.transcript,
            });
        }

        info!(completed = estimate.completed(), "spotdl finished");
        reporter.progress(ProgressSignal::new(1.0, "Download Complete."));
        Ok(JobSummary {
            backend: Backend::StreamingService,
            completed_items: estimate.completed(),
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::model::{Format, WorkerEvent};

    fn fake_spotdl(dir: &std::path::Path, script: &str) -> ToolCommand {
        let path = dir.join("fake-spotdl.sh");
        std::fs::write(&path, script).unwrap();
        ToolCommand::new("sh").with_args([path.to_string_lossy().into_owned()])
    }

    #[tokio::test]
    async fn test_runs_in_destination_with_url_argument() {
        let dest = tempfile::tempdir().unwrap();
        let tools = tempfile::tempdir().unwrap();
        let tool = fake_spotdl(
            tools.path(),
            "echo \"cwd:$(pwd)\"\necho \"args:$#:$1\"\necho 'Downloading Artist - Song'\necho 'Downloaded \"Artist - Song\": https://music.youtube.com/watch?v=1'\n",
        );
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let job = JobRequest::new("https://open.spotify.com/track/XYZ", Format::Audio, dest.path())
            .unwrap();

        let summary = SpotdlFetcher::new(tool)
            .fetch(&job, &Reporter::new(tx))
            .await
            .unwrap();
        assert_eq!(summary.backend, Backend::StreamingService);
        assert_eq!(summary.completed_items, 1);

        let mut logs = Vec::new();
        let mut fractions = Vec::new();
        while let Ok(event) = rx.try_recv() {
            match event {
                WorkerEvent::Log(m) => logs.push(m),
                WorkerEvent::Progress(p) => fractions.push(p.fraction),
                WorkerEvent::Finished(_) => {}
            }
        }
        let cwd = dest.path().canonicalize().unwrap();
        assert!(logs.contains(&format!("cwd:{}", cwd.display())));
        assert!(logs.contains(&"args:1:https://open.spotify.com/track/XYZ".to_string()));
        assert!(fractions.contains(&0.5));
        assert_eq!(fractions.last(), Some(&1.0));
    }

    #[tokio::test]
    async fn test_non_zero_exit_fails_with_output() {
        let dest = tempfile::tempdir().unwrap();
        let tools = tempfile::tempdir().unwrap();
        let tool = fake_spotdl(
            tools.path(),
            "echo 'Downloading Artist - Song'\necho 'LookupError: No results found for song' >&2\nexit 1\n",
        );
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let job = JobRequest::new("https://open.spotify.com/album/ABC", Format::Video, dest.path())
            .unwrap();

        let err = SpotdlFetcher::new(tool)
            .fetch(&job, &Reporter::new(tx))
            .await
            .unwrap_err();
        match err {
            JobError::ProcessExit { tool, code, output } => {
                assert_eq!(tool, "spotdl");
                assert_eq!(code, Some(1));
                assert!(output.contains("No results found"));
                assert!(output.contains("Downloading Artist - Song"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
