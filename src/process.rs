//! Running an external tool and streaming its output line by line.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::ToolCommand;
use crate::error::JobError;

/// Lines of output kept for error reports.
const TRANSCRIPT_LINES: usize = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

/// What a finished child left behind
#[derive(Debug)]
pub struct ToolRun {
    pub status: ExitStatus,
    /// Last lines of combined stdout/stderr
    pub transcript: String,
}

/// Resolves the tool's program on PATH (or as a literal path).
pub fn resolve(tool: &ToolCommand, hint: &'static str) -> Result<PathBuf, JobError> {
    which::which(&tool.program).map_err(|_| JobError::ToolNotFound {
        tool: tool.program.clone(),
        hint,
    })
}

/// Spawns `tool` with `args` inside `cwd` and feeds every output line to
/// `on_line` until both streams close, then waits for the exit status.
///
/// Lines for which `on_line` returns `false` are left out of the transcript.
pub async fn run_tool<F>(
    tool: &ToolCommand,
    hint: &'static str,
    args: &[String],
    cwd: &Path,
    mut on_line: F,
) -> Result<ToolRun, JobError>
where
    F: FnMut(Stream, &str) -> bool,
{
    let program = resolve(tool, hint)?;
    info!(program = %program.display(), cwd = %cwd.display(), "spawning tool");

    let mut cmd = Command::new(&program);
    cmd.args(&tool.args)
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(windows)]
    {
        const CREATE_NO_WINDOW: u32 = 0x0800_0000;
        cmd.creation_flags(CREATE_NO_WINDOW);
    }

    let mut child = cmd.spawn().map_err(|source| JobError::Spawn {
        tool: tool.program.clone(),
        source,
    })?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| JobError::Unexpected("child stdout was not captured".into()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| JobError::Unexpected("child stderr was not captured".into()))?;

    let mut out = LineReader::new(stdout);
    let mut err = LineReader::new(stderr);
    let mut transcript = Transcript::default();
    let mut deliver = |stream: Stream, lines: Vec<String>| {
        for line in lines {
            debug!(?stream, "{line}");
            if on_line(stream, &line) {
                transcript.push(&line);
            }
        }
    };

    while !(out.done && err.done) {
        tokio::select! {
            lines = out.next_lines(), if !out.done => deliver(Stream::Stdout, lines?),
            lines = err.next_lines(), if !err.done => deliver(Stream::Stderr, lines?),
        }
    }

    let status = child.wait().await?;
    info!(code = ?status.code(), "tool exited");
    Ok(ToolRun {
        status,
        transcript: transcript.into_string(),
    })
}

/// Reads `\n`-terminated chunks as lossy UTF-8 and splits them on `\r`, so
/// carriage-return progress bars become separate lines.
struct LineReader<R> {
    reader: BufReader<R>,
    buf: Vec<u8>,
    done: bool,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    fn new(inner: R) -> Self {
        Self {
            reader: BufReader::new(inner),
            buf: Vec::new(),
            done: false,
        }
    }

    /// Partial reads stay in `buf`, so this is safe to cancel inside `select!`.
    async fn next_lines(&mut self) -> std::io::Result<Vec<String>> {
        let n = self.reader.read_until(b'\n', &mut self.buf).await?;
        if n == 0 {
            self.done = true;
        }
        let text = String::from_utf8_lossy(&self.buf).into_owned();
        self.buf.clear();
        Ok(split_lines(&text))
    }
}

fn split_lines(text: &str) -> Vec<String> {
    text.split(['\r', '\n'])
        .map(str::trim_end)
        .filter(|line| !line.trim().is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Default)]
struct Transcript {
    lines: VecDeque<String>,
}

impl Transcript {
    fn push(&mut self, line: &str) {
        if self.lines.len() == TRANSCRIPT_LINES {
            self.lines.pop_front();
        }
        self.lines.push_back(line.to_string());
    }

    fn into_string(self) -> String {
        Vec::from(self.lines).join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_lines_handles_carriage_returns() {
        assert_eq!(
            split_lines("  10%\r  20%\r  30%\r\n"),
            vec!["  10%", "  20%", "  30%"]
        );
        assert!(split_lines("\n").is_empty());
    }

    #[test]
    fn test_transcript_keeps_tail() {
        let mut t = Transcript::default();
        for i in 0..100 {
            t.push(&format!("line {i}"));
        }
        let text = t.into_string();
        assert!(text.starts_with("line 60"));
        assert!(text.ends_with("line 99"));
    }

    #[test]
    fn test_missing_tool_is_reported() {
        let tool = ToolCommand::new("definitely-not-a-real-tool-4711");
        let err = resolve(&tool, "install it").unwrap_err();
        assert!(matches!(err, JobError::ToolNotFound { ref tool, .. } if tool == "definitely-not-a-real-tool-4711"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_tool_streams_both_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let tool = ToolCommand::new("sh").with_args(["-c", "echo out; echo err >&2; pwd; exit 3"]);
        let mut seen = Vec::new();
        let run = run_tool(&tool, "", &[], dir.path(), |stream, line| {
            seen.push((stream, line.to_string()));
            true
        })
        .await
        .unwrap();

        assert_eq!(run.status.code(), Some(3));
        assert!(seen.contains(&(Stream::Stdout, "out".to_string())));
        assert!(seen.contains(&(Stream::Stderr, "err".to_string())));
        let cwd = dir.path().canonicalize().unwrap();
        assert!(seen.iter().any(|(_, l)| Path::new(l) == cwd.as_path()));
        assert!(run.transcript.contains("err"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_rejected_lines_stay_out_of_transcript() {
        let dir = tempfile::tempdir().unwrap();
        let tool = ToolCommand::new("sh").with_args(["-c", "echo noise 1; echo real; echo noise 2"]);
        let mut delivered = 0;
        let run = run_tool(&tool, "", &[], dir.path(), |_, line| {
            delivered += 1;
            !line.starts_with("noise")
        })
        .await
        .unwrap();

        assert_eq!(delivered, 3);
        assert_eq!(run.transcript, "real");
    }
}
