//! Turns each tool's native progress output into [`ProgressSignal`]s.

use tokio::sync::mpsc::UnboundedSender;

use crate::error::JobError;
use crate::model::{JobSummary, ProgressSignal, WorkerEvent};

/// yt-dlp `--progress-template` for download progress.
///
/// The title goes last because it may itself contain `|`.
pub const DOWNLOAD_TEMPLATE: &str = "download:[progress]|%(progress.status)s\
|%(progress.downloaded_bytes)s\
|%(progress.total_bytes,progress.total_bytes_estimate)s\
|%(progress._percent_str)s\
|%(progress._speed_str)s\
|%(info.playlist_index)s\
|%(info.n_entries)s\
|%(info.title)s";

/// yt-dlp `--progress-template` for post-processing.
pub const POSTPROCESS_TEMPLATE: &str = "postprocess:[postprocess]|%(progress.status)s\
|%(progress.postprocessor)s\
|%(info.playlist_index)s\
|%(info.n_entries)s\
|%(info.title)s";

const DOWNLOAD_PREFIX: &str = "[progress]|";
const POSTPROCESS_PREFIX: &str = "[postprocess]|";

/// A structured line printed by yt-dlp through one of the templates above
#[derive(Debug, Clone, PartialEq)]
pub enum MediaLine {
    Download(DownloadProgress),
    PostProcess(PostProcessProgress),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PostProcessProgress {
    /// `started` or `finished`
    pub status: String,
    /// yt-dlp's post-processor key, e.g. `ExtractAudio`
    pub processor: String,
    pub index: Option<usize>,
    pub count: Option<usize>,
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DownloadProgress {
    pub finished: bool,
    /// Completion of the current item
    pub item_fraction: Option<f32>,
    pub percent_text: Option<String>,
    pub speed: Option<String>,
    /// 1-based position inside a playlist
    pub index: Option<usize>,
    /// Playlist size
    pub count: Option<usize>,
    pub title: Option<String>,
}

impl DownloadProgress {
    /// Completion of the whole job, spreading playlist items evenly.
    pub fn overall_fraction(&self) -> Option<f32> {
        let item = self.item_fraction?;
        match (self.index, self.count) {
            (Some(index), Some(count)) if count > 0 && index > 0 => {
                let done_before = (index.min(count) - 1) as f32;
                Some((done_before + item) / count as f32)
            }
            _ => Some(item),
        }
    }

    pub fn to_signal(&self) -> Option<ProgressSignal> {
        let fraction = self.overall_fraction()?;
        let position = match (self.index, self.count) {
            (Some(index), Some(count)) => format!("[{index}/{count}] "),
            _ => String::new(),
        };
        let status = if self.finished {
            format!("{position}Download Complete. Processing...")
        } else {
            let percent = self
                .percent_text
                .clone()
                .unwrap_or_else(|| format!("{:.1}%", self.item_fraction.unwrap_or(0.0) * 100.0));
            let speed = self.speed.as_deref().unwrap_or("N/A");
            format!("{position}Downloading: {percent} | Speed: {speed}")
        };
        Some(ProgressSignal::new(fraction, status))
    }
}

/// Parses a yt-dlp stdout line. Lines not produced by our templates yield `None`.
pub fn parse_media_line(line: &str) -> Option<MediaLine> {
    let line = line.trim();
    if let Some(rest) = line.strip_prefix(DOWNLOAD_PREFIX) {
        let mut fields = rest.splitn(8, '|').map(field);
        let status = fields.next().flatten()?;
        let downloaded = fields.next().flatten().and_then(|v| v.parse::<f64>().ok());
        let total = fields.next().flatten().and_then(|v| v.parse::<f64>().ok());
        let percent_text = fields.next().flatten();
        let speed = fields.next().flatten();
        let index = fields.next().flatten().and_then(|v| v.parse().ok());
        let count = fields.next().flatten().and_then(|v| v.parse().ok());
        let title = fields.next().flatten();

        let finished = status == "finished";
        let item_fraction = if finished {
            Some(1.0)
        } else {
            match (downloaded, total) {
                (Some(done), Some(total)) if total > 0.0 => Some((done / total) as f32),
                _ => percent_text.as_deref().and_then(parse_percent),
            }
        };

        return Some(MediaLine::Download(DownloadProgress {
            finished,
            item_fraction: item_fraction.map(|f| f.clamp(0.0, 1.0)),
            percent_text,
            speed,
            index,
            count,
            title,
        }));
    }
    if let Some(rest) = line.strip_prefix(POSTPROCESS_PREFIX) {
        let mut fields = rest.splitn(5, '|').map(field);
        let status = fields.next().flatten()?;
        let processor = fields.next().flatten()?;
        let index = fields.next().flatten().and_then(|v| v.parse().ok());
        let count = fields.next().flatten().and_then(|v| v.parse().ok());
        let title = fields.next().flatten();
        return Some(MediaLine::PostProcess(PostProcessProgress {
            status,
            processor,
            index,
            count,
            title,
        }));
    }
    None
}

/// Template field, `None` for yt-dlp's `NA` placeholder.
fn field(raw: &str) -> Option<String> {
    let clean = strip_ansi(raw);
    let clean = clean.trim();
    if clean.is_empty() || clean == "NA" {
        None
    } else {
        Some(clean.to_string())
    }
}

/// Parses `" 45.3%"` into `0.453`.
pub fn parse_percent(text: &str) -> Option<f32> {
    let number = text.trim().strip_suffix('%')?;
    number.trim().parse::<f32>().ok().map(|v| v / 100.0)
}

fn strip_ansi(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c == '\u{1b}' {
            // skip until the final byte of the CSI sequence
            for next in chars.by_ref() {
                if next.is_ascii_alphabetic() {
                    break;
                }
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Best-effort progress estimate for spotdl's unstructured output.
///
/// Until spotdl announces how many songs it found, the first `Downloading`
/// line moves the bar to the midpoint. Once the total is known each
/// `Downloaded` or `Skipping` line advances it by one song. Never decreases.
#[derive(Debug, Default)]
pub struct StreamingEstimate {
    total: Option<usize>,
    done: usize,
    fraction: f32,
}

impl StreamingEstimate {
    pub const MIDPOINT: f32 = 0.5;

    pub fn completed(&self) -> usize {
        self.done
    }

    pub fn observe(&mut self, line: &str) -> Option<ProgressSignal> {
        let line = line.trim();
        if let Some(total) = parse_found_songs(line) {
            self.total = Some(total);
            return Some(ProgressSignal::new(self.fraction, format!("Found {total} songs")));
        }
        if line.starts_with("Downloaded") || line.starts_with("Skipping") {
            self.done += 1;
            if let Some(total) = self.total.filter(|t| *t > 0) {
                let done = self.done.min(total);
                self.advance(done as f32 / total as f32);
                return Some(ProgressSignal::new(
                    self.fraction,
                    format!("Downloaded {done} of {total}"),
                ));
            }
            return None;
        }
        if line.contains("Downloading") && self.total.is_none() && self.fraction < Self::MIDPOINT {
            self.advance(Self::MIDPOINT);
            return Some(ProgressSignal::new(self.fraction, "Downloading..."));
        }
        None
    }

    fn advance(&mut self, fraction: f32) {
        self.fraction = self.fraction.max(fraction.clamp(0.0, 1.0));
    }
}

/// `Found 12 songs in Album (Album)` -> 12
fn parse_found_songs(line: &str) -> Option<usize> {
    let rest = line.strip_prefix("Found ")?;
    let (count, tail) = rest.split_once(' ')?;
    if !tail.starts_with("song") {
        return None;
    }
    count.parse().ok()
}

/// Worker-side handle for sending events to the UI.
#[derive(Debug, Clone)]
pub struct Reporter {
    tx: UnboundedSender<WorkerEvent>,
}

impl Reporter {
    pub fn new(tx: UnboundedSender<WorkerEvent>) -> Self {
        Self { tx }
    }

    pub fn progress(&self, signal: ProgressSignal) {
        let _ = self.tx.send(WorkerEvent::Progress(signal));
    }

    pub fn log(&self, message: impl Into<String>) {
        let _ = self.tx.send(WorkerEvent::Log(message.into()));
    }

    pub fn finish(&self, result: Result<JobSummary, JobError>) {
        let _ = self.tx.send(WorkerEvent::Finished(result));
    }
}
