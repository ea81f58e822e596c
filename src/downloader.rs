use std::future::Future;
use std::sync::Arc;

use tokio::{runtime::Handle, sync::mpsc::UnboundedSender};
use tracing::{error, info};

use crate::config::Settings;
use crate::error::{JobError, ValidationError};
use crate::model::{Backend, JobRequest, JobSummary, WorkerEvent};
use crate::progress::Reporter;
use crate::spotdl::SpotdlFetcher;
use crate::ytdlp::YtDlpFetcher;

/// Substring identifying streaming-service links.
pub const STREAMING_MARKER: &str = "open.spotify.com";

/// An external tool that can carry out a job.
pub trait Fetcher {
    fn fetch(
        &self,
        job: &JobRequest,
        reporter: &Reporter,
    ) -> impl Future<Output = Result<JobSummary, JobError>> + Send;
}

/// Picks the tool for a URL. Playlists and single videos share the media fetcher.
pub fn route(url: &str) -> Backend {
    if url.contains(STREAMING_MARKER) {
        Backend::StreamingService
    } else {
        Backend::MediaFetcher
    }
}

/// Routes each job to one of two fetchers
pub struct Dispatcher<M, S> {
    media: M,
    streaming: S,
}

/// The dispatcher wired to the real tools
pub type ToolDispatcher = Dispatcher<YtDlpFetcher, SpotdlFetcher>;

impl ToolDispatcher {
    pub fn from_settings(settings: &Settings) -> Self {
        Dispatcher::new(
            YtDlpFetcher::new(settings.ytdlp.clone()),
            SpotdlFetcher::new(settings.spotdl.clone()),
        )
    }
}

impl<M: Fetcher, S: Fetcher> Dispatcher<M, S> {
    pub fn new(media: M, streaming: S) -> Self {
        Self { media, streaming }
    }

    pub async fn run(&self, job: &JobRequest, reporter: &Reporter) -> Result<JobSummary, JobError> {
        if job.url.trim().is_empty() {
            return Err(ValidationError::EmptyUrl.into());
        }
        let backend = route(&job.url);
        info!(url = %job.url, tool = backend.tool_name(), "dispatching job");
        match backend {
            Backend::StreamingService => self.streaming.fetch(job, reporter).await,
            Backend::MediaFetcher => self.media.fetch(job, reporter).await,
        }
    }
}

/// Runs `job` on the runtime and always ends with exactly one
/// [`WorkerEvent::Finished`], even if the job panics.
pub fn spawn_job<M, S>(
    handle: &Handle,
    dispatcher: Arc<Dispatcher<M, S>>,
    job: JobRequest,
    tx: UnboundedSender<WorkerEvent>,
) where
    M: Fetcher + Send + Sync + 'static,
    S: Fetcher + Send + Sync + 'static,
{
    let reporter = Reporter::new(tx);
    let worker_reporter = reporter.clone();
    let worker = handle.spawn(async move { dispatcher.run(&job, &worker_reporter).await });

    handle.spawn(async move {
        let result = match worker.await {
            Ok(result) => result,
            Err(join_err) => {
                error!("download worker crashed: {join_err}");
                Err(JobError::Unexpected(join_err.to_string()))
            }
        };
        match &result {
            Ok(summary) => info!(?summary, "job finished"),
            Err(err) => error!("job failed: {err}"),
        }
        reporter.finish(result);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Format;
    use std::sync::Mutex;

    /// Records every job it is asked to fetch.
    #[derive(Default)]
    struct Recording {
        calls: Mutex<Vec<String>>,
        fail: bool,
    }

    impl Recording {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl Fetcher for Arc<Recording> {
        async fn fetch(&self, job: &JobRequest, _: &Reporter) -> Result<JobSummary, JobError> {
            self.calls.lock().unwrap().push(job.url.clone());
            if self.fail {
                return Err(JobError::ProcessExit {
                    tool: "fake".into(),
                    code: Some(1),
                    output: "broken".into(),
                });
            }
            Ok(JobSummary {
                backend: Backend::MediaFetcher,
                completed_items: 1,
            })
        }
    }

    struct Panicking;

    impl Fetcher for Panicking {
        async fn fetch(&self, _: &JobRequest, _: &Reporter) -> Result<JobSummary, JobError> {
            panic!("fetcher blew up")
        }
    }

    fn job(url: &str, dir: &std::path::Path) -> JobRequest {
        JobRequest::new(url, Format::Audio, dir).unwrap()
    }

    fn setup() -> (Arc<Recording>, Arc<Recording>, Dispatcher<Arc<Recording>, Arc<Recording>>) {
        let media = Arc::new(Recording::default());
        let streaming = Arc::new(Recording::default());
        let dispatcher = Dispatcher::new(media.clone(), streaming.clone());
        (media, streaming, dispatcher)
    }

    #[test]
    fn test_route() {
        assert_eq!(
            route("https://open.spotify.com/track/XYZ"),
            Backend::StreamingService
        );
        assert_eq!(
            route("https://open.spotify.com/playlist/37i9dQZF1DXcBWIGoYBM5M"),
            Backend::StreamingService
        );
        assert_eq!(route("https://youtube.com/watch?v=ABC"), Backend::MediaFetcher);
        assert_eq!(
            route("https://www.youtube.com/playlist?list=PL123"),
            Backend::MediaFetcher
        );
        assert_eq!(route("https://spotify.com/track/XYZ"), Backend::MediaFetcher);
    }

    #[tokio::test]
    async fn test_spotify_only_reaches_streaming_fetcher() {
        let dir = tempfile::tempdir().unwrap();
        let (media, streaming, dispatcher) = setup();
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();

        dispatcher
            .run(&job("https://open.spotify.com/track/XYZ", dir.path()), &Reporter::new(tx))
            .await
            .unwrap();

        assert_eq!(streaming.calls(), vec!["https://open.spotify.com/track/XYZ"]);
        assert!(media.calls().is_empty());
    }

    #[tokio::test]
    async fn test_youtube_only_reaches_media_fetcher() {
        let dir = tempfile::tempdir().unwrap();
        let (media, streaming, dispatcher) = setup();
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();

        dispatcher
            .run(&job("https://youtube.com/watch?v=ABC", dir.path()), &Reporter::new(tx))
            .await
            .unwrap();

        assert_eq!(media.calls(), vec!["https://youtube.com/watch?v=ABC"]);
        assert!(streaming.calls().is_empty());
    }

    #[tokio::test]
    async fn test_blank_url_never_fetches() {
        let dir = tempfile::tempdir().unwrap();
        let (media, streaming, dispatcher) = setup();
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let blank = JobRequest {
            url: "   ".into(),
            format: Format::Video,
            destination: dir.path().to_path_buf(),
        };

        let err = dispatcher.run(&blank, &Reporter::new(tx)).await.unwrap_err();
        assert!(matches!(err, JobError::Validation(ValidationError::EmptyUrl)));
        assert!(media.calls().is_empty());
        assert!(streaming.calls().is_empty());
    }

    #[tokio::test]
    async fn test_spawn_job_reports_failure() {
        let dir = tempfile::tempdir().unwrap();
        let media = Arc::new(Recording {
            fail: true,
            ..Default::default()
        });
        let dispatcher = Arc::new(Dispatcher::new(media, Arc::new(Recording::default())));
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        spawn_job(
            &Handle::current(),
            dispatcher,
            job("https://youtube.com/watch?v=ABC", dir.path()),
            tx,
        );

        let mut finished = None;
        while let Some(event) = rx.recv().await {
            if let WorkerEvent::Finished(result) = event {
                finished = Some(result);
            }
        }
        assert!(matches!(finished, Some(Err(JobError::ProcessExit { .. }))));
    }

    #[tokio::test]
    async fn test_spawn_job_turns_panic_into_error() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = Arc::new(Dispatcher::new(Panicking, Panicking));
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        spawn_job(
            &Handle::current(),
            dispatcher,
            job("https://youtube.com/watch?v=ABC", dir.path()),
            tx,
        );

        let mut finished = None;
        while let Some(event) = rx.recv().await {
            if let WorkerEvent::Finished(result) = event {
                finished = Some(result);
            }
        }
        assert!(matches!(finished, Some(Err(JobError::Unexpected(_)))));
    }
}
