//! The site-extractor adapter.
//!
//! The core talks to the extractor tool (`yt-dlp` or compatible) through the
//! `Extractor` port: a synchronous metadata probe and a long-running download
//! subprocess that streams progress lines and resumes partial files.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::process::{Child, Command};

use grabbit_core::StorageError;

/// Probe timeout; a site that will not answer metadata in a minute will not
/// download either.
const PROBE_TIMEOUT: Duration = Duration::from_secs(60);

/// Probe and spawn failures, classified for the operator.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("unsupported URL")]
    Unsupported,

    #[error("video unavailable")]
    Unavailable,

    #[error("access restricted: {0}")]
    Restricted(String),

    #[error("probe timed out")]
    Timeout,

    #[error("extractor tool is not installed")]
    NotInstalled,

    #[error("{0}")]
    Other(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// One downloadable format reported by the probe.
#[derive(Clone, Debug, Serialize)]
pub struct ProbeFormat {
    pub format_id: String,
    pub ext: String,
    pub resolution: String,
    pub height: Option<u32>,
    pub width: Option<u32>,
    pub filesize: Option<u64>,
    pub has_audio: bool,
    pub label: String,
}

/// Metadata for a URL, formats sorted by height descending.
#[derive(Clone, Debug, Serialize)]
pub struct ProbeInfo {
    pub title: String,
    pub ext: String,
    pub duration: Option<f64>,
    pub filesize: Option<u64>,
    pub uploader: Option<String>,
    pub formats: Vec<ProbeFormat>,
    /// The first (best) format after sorting.
    pub best_format_id: String,
}

/// Everything needed to launch one download subprocess.
#[derive(Clone, Debug)]
pub struct SpawnSpec {
    pub url: String,
    /// Output folder; the extractor writes `<folder>/<title>.<ext>`.
    pub output_dir: PathBuf,
    /// Concrete format id; `None` lets the extractor pick.
    pub format_id: Option<String>,
    /// Netscape cookie jar for access-restricted sites.
    pub cookies_file: Option<PathBuf>,
}

/// Port over the external extractor tool.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Fetch metadata for a URL without downloading.
    async fn probe(&self, url: &str) -> Result<ProbeInfo, ExtractError>;

    /// Launch the download subprocess with stdout/stderr piped.
    fn spawn(&self, spec: &SpawnSpec) -> std::io::Result<Child>;
}

/// `yt-dlp` implementation of the extractor port.
pub struct YtDlp {
    binary: PathBuf,
}

impl YtDlp {
    #[must_use]
    pub fn new(binary: PathBuf) -> Self {
        Self { binary }
    }

    /// Locate the binary: `YTDLP_PATH` override, then `$PATH`.
    #[must_use]
    pub fn locate() -> Option<Self> {
        if let Ok(path) = std::env::var("YTDLP_PATH") {
            let path = PathBuf::from(path.trim());
            if path.is_file() {
                return Some(Self::new(path));
            }
        }
        which::which("yt-dlp").ok().map(Self::new)
    }
}

#[async_trait]
impl Extractor for YtDlp {
    async fn probe(&self, url: &str) -> Result<ProbeInfo, ExtractError> {
        let mut command = Command::new(&self.binary);
        command
            .arg("--dump-json")
            .arg("--no-download")
            .arg(url)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = tokio::time::timeout(PROBE_TIMEOUT, command.output())
            .await
            .map_err(|_| ExtractError::Timeout)?
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    ExtractError::NotInstalled
                } else {
                    ExtractError::Other(e.to_string())
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_probe_error(&stderr));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_probe_output(&stdout)
    }

    fn spawn(&self, spec: &SpawnSpec) -> std::io::Result<Child> {
        let template = spec.output_dir.join("%(title)s.%(ext)s");

        let mut command = Command::new(&self.binary);
        command
            .arg("--newline") // progress on separate lines
            .arg("-c") // resume partial files
            .arg("-o")
            .arg(&template)
            .arg("--no-mtime");

        if let Some(cookies) = &spec.cookies_file {
            command.arg("--cookies").arg(cookies);
        }

        // Chosen format plus best audio, falling back to the format alone
        // when it already carries audio.
        if let Some(format) = spec.format_id.as_deref().filter(|f| *f != "best") {
            command.arg("-f").arg(format!("{format}+bestaudio/best/{format}"));
        }

        command
            .arg(&spec.url)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        command.spawn()
    }
}

/// Map the probe's stderr onto the failure taxonomy.
fn classify_probe_error(stderr: &str) -> ExtractError {
    if stderr.contains("Unsupported URL") {
        return ExtractError::Unsupported;
    }
    if stderr.contains("Video unavailable") {
        return ExtractError::Unavailable;
    }
    if stderr.contains("Private video")
        || stderr.contains("Sign in")
        || stderr.contains("age-restricted")
    {
        return ExtractError::Restricted(first_line(stderr));
    }
    let message = first_line(stderr);
    if message.is_empty() {
        ExtractError::Other("unknown extractor error".to_string())
    } else {
        ExtractError::Other(message)
    }
}

fn first_line(s: &str) -> String {
    s.lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("")
        .chars()
        .take(200)
        .collect()
}

/// Parse the probe's JSON document into `ProbeInfo`.
fn parse_probe_output(raw: &str) -> Result<ProbeInfo, ExtractError> {
    let info: serde_json::Value = serde_json::from_str(raw.trim())
        .map_err(|_| ExtractError::Other("failed to parse probe output".to_string()))?;

    let title = info["title"].as_str().unwrap_or("Unknown").to_string();
    let ext = info["ext"].as_str().unwrap_or("mp4").to_string();
    let filesize = info["filesize"]
        .as_u64()
        .or_else(|| info["filesize_approx"].as_u64());

    let mut formats = Vec::new();
    let mut seen = std::collections::HashSet::new();
    for fmt in info["formats"].as_array().map(Vec::as_slice).unwrap_or(&[]) {
        let vcodec = fmt["vcodec"].as_str().unwrap_or("none");
        let acodec = fmt["acodec"].as_str().unwrap_or("none");
        let has_video = vcodec != "none" && !vcodec.is_empty();
        let has_audio = acodec != "none" && !acodec.is_empty();
        let Some(height) = fmt["height"].as_u64() else {
            continue;
        };
        if !has_video {
            continue;
        }

        #[allow(clippy::cast_possible_truncation)]
        let height = height as u32;
        let format_ext = fmt["ext"].as_str().unwrap_or("mp4").to_string();
        if !seen.insert((height, format_ext.clone())) {
            continue;
        }

        let resolution = format!("{height}p");
        #[allow(clippy::cast_possible_truncation)]
        let width = fmt["width"].as_u64().map(|w| w as u32);
        formats.push(ProbeFormat {
            format_id: fmt["format_id"].as_str().unwrap_or("").to_string(),
            label: format!(
                "{resolution} ({}){}",
                format_ext.to_uppercase(),
                if has_audio { "" } else { " - no audio" }
            ),
            ext: format_ext,
            resolution,
            height: Some(height),
            width,
            filesize: fmt["filesize"].as_u64().or_else(|| fmt["filesize_approx"].as_u64()),
            has_audio,
        });
    }

    formats.sort_by(|a, b| b.height.cmp(&a.height));

    if formats.is_empty() {
        formats.push(ProbeFormat {
            format_id: "best".to_string(),
            ext: ext.clone(),
            resolution: "best".to_string(),
            height: None,
            width: None,
            filesize,
            has_audio: true,
            label: "Best available".to_string(),
        });
    }

    let best_format_id = formats[0].format_id.clone();

    Ok(ProbeInfo {
        title,
        ext,
        duration: info["duration"].as_f64(),
        filesize,
        uploader: info["uploader"].as_str().map(str::to_string),
        formats,
        best_format_id,
    })
}
