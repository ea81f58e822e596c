//! Settings remembered between runs

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::model::Format;

/// How to launch an external tool: a program plus leading arguments,
/// e.g. `python -m spotdl`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCommand {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl ToolCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

/// Persisted application settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Folder downloads are written into
    pub download_dir: PathBuf,
    /// Last selected output format
    pub format: Format,
    /// Media fetcher executable
    pub ytdlp: ToolCommand,
    /// Streaming-service fetcher executable
    pub spotdl: ToolCommand,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            format: Format::Video,
            ytdlp: ToolCommand::new(if cfg!(target_os = "windows") { "yt-dlp.exe" } else { "yt-dlp" }),
            spotdl: ToolCommand::new(if cfg!(target_os = "windows") { "spotdl.exe" } else { "spotdl" }),
        }
    }
}

/// The platform downloads folder, or `~/Downloads` when the platform has none.
pub fn default_download_dir() -> PathBuf {
    dirs::download_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join("Downloads")))
        .unwrap_or_else(|| PathBuf::from("."))
}
