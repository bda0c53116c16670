//! yt-dlp subprocess driver.
//!
//! The tool is asked to search (`ytsearch1:`), extract audio in the target
//! format, print machine-readable progress lines and, once post-processing
//! is done, the final file path.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, trace};

use super::fetcher::{FetchError, FetchRequest, MediaFetcher, TransferSink};
use super::progress::TransferProgress;
use super::FetchFailure;
use crate::config::DownloadConfig;

/// Prefix of our progress template lines.
const PROGRESS_MARKER: &str = "PK|";

const PROGRESS_TEMPLATE: &str = "download:PK|%(progress.downloaded_bytes)s|%(progress.total_bytes)s|%(progress.total_bytes_estimate)s|%(progress.speed)s|%(progress.eta)s";

/// Real fetcher backed by the yt-dlp executable.
#[derive(Debug, Clone)]
pub struct YtDlpFetcher {
    program: String,
    cookies: Option<PathBuf>,
}

impl YtDlpFetcher {
    pub fn new(program: impl Into<String>, cookies: Option<PathBuf>) -> Self {
        Self {
            program: program.into(),
            cookies,
        }
    }

    pub fn from_config(config: &DownloadConfig) -> Self {
        Self::new(&config.fetch_tool, config.cookies_file.clone())
    }

    /// Check if the executable can be launched.
    pub fn is_available(&self) -> bool {
        std::process::Command::new(&self.program)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    /// Command-line arguments for one request.
    pub fn build_args(&self, request: &FetchRequest) -> Vec<String> {
        let template = request
            .output_dir
            .join(format!("{}.%(ext)s", request.file_stem));

        let mut args = vec![
            format!("ytsearch1:{}", request.query),
            "--format".into(),
            "bestaudio/best".into(),
            "--extract-audio".into(),
            "--audio-format".into(),
            request.format.extension().into(),
            "--audio-quality".into(),
            request.format.quality().into(),
            "--output".into(),
            template.to_string_lossy().into_owned(),
            "--no-playlist".into(),
            "--windows-filenames".into(),
            "--quiet".into(),
            "--no-warnings".into(),
            "--progress".into(),
            "--newline".into(),
            "--progress-template".into(),
            PROGRESS_TEMPLATE.into(),
            "--print".into(),
            "after_move:filepath".into(),
        ];
        if let Some(cookies) = self.cookies.as_deref().filter(|c| c.exists()) {
            args.push("--cookies".into());
            args.push(cookies.to_string_lossy().into_owned());
        }
        args
    }
}

enum Line {
    Out(String),
    Err(String),
}

#[async_trait]
impl MediaFetcher for YtDlpFetcher {
    async fn fetch(
        &self,
        request: &FetchRequest,
        sink: &mut dyn TransferSink,
    ) -> Result<PathBuf, FetchError> {
        let args = self.build_args(request);
        debug!(target: "download::ytdlp", query = %request.query, "Spawning fetch tool");

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| FetchError::Failed {
                kind: FetchFailure::Unclassified,
                detail: format!("Failed to run {}: {}", self.program, e),
            })?;

        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            return Err(FetchError::Failed {
                kind: FetchFailure::Unclassified,
                detail: "fetch tool pipes unavailable".into(),
            });
        };
        let mut out = BufReader::new(stdout).lines();
        let mut err = BufReader::new(stderr).lines();
        let (mut out_open, mut err_open) = (true, true);

        let mut produced: Option<PathBuf> = None;
        let mut diagnostics = String::new();

        while out_open || err_open {
            let line = tokio::select! {
                line = out.next_line(), if out_open => match line {
                    Ok(Some(l)) => Some(Line::Out(l)),
                    _ => { out_open = false; None }
                },
                line = err.next_line(), if err_open => match line {
                    Ok(Some(l)) => Some(Line::Err(l)),
                    _ => { err_open = false; None }
                },
            };
            let Some(line) = line else { continue };

            let (text, from_stdout) = match line {
                Line::Out(l) => (l, true),
                Line::Err(l) => (l, false),
            };
            let text = text.trim();
            if let Some(progress) = parse_progress_line(text) {
                if let Err(cancelled) = sink.on_transfer(progress).await {
                    let _ = child.kill().await;
                    return Err(cancelled.into());
                }
            } else if from_stdout && !text.is_empty() {
                trace!(target: "download::ytdlp", line = text, "stdout");
                produced = Some(PathBuf::from(text));
            } else if !text.is_empty() {
                diagnostics.push_str(text);
                diagnostics.push('\n');
            }
        }

        let status = child.wait().await.map_err(|e| FetchError::Failed {
            kind: FetchFailure::Unclassified,
            detail: e.to_string(),
        })?;

        if !status.success() {
            if diagnostics.trim().is_empty() {
                diagnostics = format!("{} exited with {}", self.program, status);
            }
            return Err(FetchError::from_output(&diagnostics));
        }

        produced.ok_or_else(|| FetchError::Failed {
            kind: FetchFailure::NoResults,
            detail: format!("no file produced for '{}'", request.query),
        })
    }
}

/// Parse one of our progress template lines. Fields the tool doesn't know
/// come through as `NA` or `None`.
pub fn parse_progress_line(line: &str) -> Option<TransferProgress> {
    let rest = line.strip_prefix(PROGRESS_MARKER)?;
    let fields: Vec<&str> = rest.split('|').collect();
    if fields.len() != 5 {
        return None;
    }
    let num = |s: &str| s.trim().parse::<f64>().ok().filter(|v| v.is_finite() && *v >= 0.0);

    let downloaded = num(fields[0]).map(|v| v as u64).unwrap_or(0);
    let total = num(fields[1])
        .or_else(|| num(fields[2]))
        .map(|v| v as u64)
        .filter(|t| *t > 0);
    Some(TransferProgress {
        downloaded,
        total,
        rate: num(fields[3]),
        eta: num(fields[4]).map(std::time::Duration::from_secs_f64),
    })
}

/// Delete leftover `.part` files for a stem. Returns how many were removed.
pub fn remove_partials(dir: &Path, file_stem: &str) -> usize {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };
    let prefix = format!("{file_stem}.");
    entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            let name = p.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
            name.starts_with(&prefix) && name.ends_with(".part")
        })
        .filter(|p| std::fs::remove_file(p).is_ok())
        .count()
}
