//! Media fetcher adapter: drives the `yt-dlp` command line.

use std::collections::HashSet;
use std::path::PathBuf;

use tracing::{info, warn};

use crate::config::ToolCommand;
use crate::downloader::Fetcher;
use crate::error::JobError;
use crate::model::{Backend, Format, JobRequest, JobSummary, ProgressSignal};
use crate::process::{self, ToolRun};
use crate::progress::{
    DOWNLOAD_TEMPLATE, MediaLine, POSTPROCESS_TEMPLATE, PostProcessProgress, Reporter,
    parse_media_line,
};

pub const MAX_VIDEO_HEIGHT: u32 = 1080;
pub const AUDIO_CODEC: &str = "mp3";
pub const AUDIO_QUALITY_KBPS: u32 = 192;
pub const VIDEO_CONTAINER: &str = "mp4";

/// File name inside the destination, after the media title. Kept free of
/// user paths so a `%` in a folder name is never read as a template field.
pub const OUTPUT_TEMPLATE: &str = "%(title)s.%(ext)s";

const INSTALL_HINT: &str = "Install yt-dlp (and FFmpeg) and make sure it is on your PATH.";

/// Step applied after the raw streams are downloaded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostProcessor {
    /// Extract the audio track and re-encode it
    ExtractAudio { codec: &'static str, quality_kbps: u32 },
    /// Convert the merged download into another container
    ConvertVideo { container: &'static str },
}

impl PostProcessor {
    /// Name yt-dlp reports for this step in post-processing progress
    pub fn hook_name(&self) -> &'static str {
        match self {
            PostProcessor::ExtractAudio { .. } => "ExtractAudio",
            PostProcessor::ConvertVideo { .. } => "VideoConvertor",
        }
    }
}

/// Configuration handed to yt-dlp for one job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaOptions {
    /// Directory the finished files land in, passed as yt-dlp's home path
    pub output_dir: PathBuf,
    /// Output file name template, relative to `output_dir`
    pub output_template: String,
    pub format_selector: String,
    pub post_processor: PostProcessor,
    /// Skip unavailable entries of a playlist instead of aborting
    pub ignore_errors: bool,
}

impl MediaOptions {
    pub fn for_job(job: &JobRequest) -> Self {
        let output_dir = job.destination.clone();
        let output_template = OUTPUT_TEMPLATE.to_string();
        match job.format {
            Format::Audio => Self {
                output_dir,
                output_template,
                format_selector: "bestaudio/best".to_string(),
                post_processor: PostProcessor::ExtractAudio {
                    codec: AUDIO_CODEC,
                    quality_kbps: AUDIO_QUALITY_KBPS,
                },
                ignore_errors: true,
            },
            Format::Video => Self {
                output_dir,
                output_template,
                format_selector: format!(
                    "bestvideo[height<={MAX_VIDEO_HEIGHT}]+bestaudio/best[ext=m4a]/best[ext=mp4]/best"
                ),
                post_processor: PostProcessor::ConvertVideo {
                    container: VIDEO_CONTAINER,
                },
                ignore_errors: true,
            },
        }
    }

    /// Renders the options as yt-dlp arguments, ending with `url`.
    pub fn to_args(&self, url: &str) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "--newline".into(),
            "--progress-template".into(),
            DOWNLOAD_TEMPLATE.into(),
            "--progress-template".into(),
            POSTPROCESS_TEMPLATE.into(),
        ];
        if self.ignore_errors {
            args.push("--ignore-errors".into());
        }
        args.push("-f".into());
        args.push(self.format_selector.clone());

        match &self.post_processor {
            PostProcessor::ExtractAudio {
                codec,
                quality_kbps,
            } => {
                args.push("--extract-audio".into());
                args.push("--audio-format".into());
                args.push((*codec).into());
                args.push("--audio-quality".into());
                args.push(format!("{quality_kbps}K"));
            }
            PostProcessor::ConvertVideo { container } => {
                args.push("--recode-video".into());
                args.push((*container).into());
            }
        }

        args.push("-P".into());
        args.push(format!("home:{}", self.output_dir.display()));
        args.push("-o".into());
        args.push(self.output_template.clone());
        args.push("--".into());
        args.push(url.to_string());
        args
    }
}

/// Runs jobs through yt-dlp
#[derive(Debug, Clone)]
pub struct YtDlpFetcher {
    tool: ToolCommand,
}

impl YtDlpFetcher {
    pub fn new(tool: ToolCommand) -> Self {
        Self { tool }
    }
}

impl Fetcher for YtDlpFetcher {
    async fn fetch(&self, job: &JobRequest, reporter: &Reporter) -> Result<JobSummary, JobError> {
        reporter.log("Detected YouTube URL. Using yt-dlp...");
        match job.format {
            Format::Audio => reporter.log(format!(
                "Mode: Audio ({}) - {AUDIO_QUALITY_KBPS} kbps",
                AUDIO_CODEC.to_uppercase()
            )),
            Format::Video => reporter.log(format!(
                "Mode: Video ({}) - {MAX_VIDEO_HEIGHT}p Max",
                VIDEO_CONTAINER.to_uppercase()
            )),
        }

        let options = MediaOptions::for_job(job);
        let args = options.to_args(&job.url);
        let final_step = options.post_processor.hook_name();
        let mut items = FinishedItems::default();
        let mut multi_item = false;

        // Template lines are consumed here and kept out of the failure transcript.
        let run = process::run_tool(&self.tool, INSTALL_HINT, &args, &job.destination, |_, line| {
            match parse_media_line(line) {
                Some(MediaLine::Download(progress)) => {
                    multi_item |= progress.count.is_some_and(|n| n > 1);
                    if let Some(signal) = progress.to_signal() {
                        reporter.progress(signal);
                    }
                    false
                }
                Some(MediaLine::PostProcess(step)) => {
                    multi_item |= step.count.is_some_and(|n| n > 1);
                    if step.status == "started" {
                        reporter.log(format!("Post-processing: {}", step.processor));
                    }
                    if is_item_done(&step, final_step) {
                        items.record(step.index, step.title.as_deref());
                    }
                    false
                }
                None => {
                    reporter.log(line);
                    true
                }
            }
        })
        .await?;

        let summary = settle_exit(run, items.count(), multi_item)?;
        if summary.completed_items > 0 {
            reporter.progress(ProgressSignal::new(1.0, "Download Complete."));
        }
        Ok(summary)
    }
}

/// An item is done once the format's own post-processor has finished on it.
/// A finished download alone is not enough: conversion can still fail.
fn is_item_done(step: &PostProcessProgress, final_step: &str) -> bool {
    step.status == "finished" && step.processor == final_step
}

/// Applies the skip-and-continue policy to yt-dlp's exit status.
///
/// With `--ignore-errors` yt-dlp exits non-zero whenever a playlist entry
/// failed. That counts as success when the input had several entries and at
/// least one of them completed. A single item must exit cleanly.
fn settle_exit(
    run: ToolRun,
    completed_items: usize,
    multi_item: bool,
) -> Result<JobSummary, JobError> {
    let summary = JobSummary {
        backend: Backend::MediaFetcher,
        completed_items,
    };
    if run.status.success() {
        info!(completed_items, "yt-dlp finished");
        return Ok(summary);
    }
    if multi_item && completed_items > 0 {
        warn!(code = ?run.status.code(), completed_items, "yt-dlp skipped unavailable entries");
        return Ok(summary);
    }
    Err(JobError::ProcessExit {
        tool: Backend::MediaFetcher.tool_name().to_string(),
        code: run.status.code(),
        output: run.transcript,
    })
}

/// Distinct playlist entries whose post-processing finished. Counted by
/// index and title so a repeated report is not counted twice.
#[derive(Default)]
struct FinishedItems {
    seen: HashSet<(Option<usize>, Option<String>)>,
}

impl FinishedItems {
    fn record(&mut self, index: Option<usize>, title: Option<&str>) {
        self.seen.insert((index, title.map(str::to_string)));
    }

    fn count(&self) -> usize {
        self.seen.len()
    }
}
