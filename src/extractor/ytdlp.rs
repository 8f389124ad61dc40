use std::{
  path::{Path, PathBuf},
  process::Stdio,
  sync::Arc,
};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::{process::Command, sync::Semaphore};
use tracing::{debug, info};

use crate::{
  config::Config,
  error::ErrorKind,
  options::YtdlpOptions,
  platform::Platform,
  util::redact_proxy,
  Error, Result,
};

use super::{Extraction, Extractor, Request};

const FALLBACK_EXTENSIONS: &[&str] = &["mp4", "mkv", "webm"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
  Primary,
  Generic,
}

// run yt-dlp command line to download the video into the job's directory.
// requires yt-dlp executable to be in PATH (or YTDLP_BIN).
pub struct Ytdlp {
  mode: Mode,
  config: Config,
  slots: Arc<Semaphore>,
}

#[derive(Debug, Default, Deserialize)]
struct Info {
  title: Option<String>,
  #[serde(rename = "_filename")]
  filename: Option<PathBuf>,
  #[serde(default)]
  requested_downloads: Vec<RequestedDownload>,
  #[serde(default)]
  entries: Vec<Option<Info>>,
}

#[derive(Debug, Deserialize)]
struct RequestedDownload {
  filepath: Option<PathBuf>,
  #[serde(rename = "_filename")]
  filename: Option<PathBuf>,
}

impl Info {
  // playlists resolve to their first entry
  fn into_video(self) -> Info {
    if self.entries.is_empty() {
      return self;
    }

    self
      .entries
      .into_iter()
      .flatten()
      .next()
      .map(Info::into_video)
      .unwrap_or_default()
  }

  fn reported_path(&self) -> Option<&Path> {
    self
      .requested_downloads
      .iter()
      .rev()
      .find_map(|d| d.filepath.as_deref().or(d.filename.as_deref()))
      .or(self.filename.as_deref())
  }
}

impl Ytdlp {
  pub fn primary(config: &Config, slots: Arc<Semaphore>) -> Self {
    Self {
      mode: Mode::Primary,
      config: config.clone(),
      slots,
    }
  }

  pub fn generic(config: &Config, slots: Arc<Semaphore>) -> Self {
    Self {
      mode: Mode::Generic,
      config: config.clone(),
      slots,
    }
  }

  fn options(&self, platform: Platform) -> YtdlpOptions {
    match self.mode {
      Mode::Primary => YtdlpOptions::for_platform(platform, &self.config),
      Mode::Generic => YtdlpOptions::generic(platform, &self.config),
    }
  }

  async fn run(&self, req: &Request) -> Result<Vec<u8>> {
    let opts = self.options(req.platform);
    let mut cmd = Command::new(&self.config.ytdlp_bin);
    cmd
      .args(opts.to_args(req))
      .stdin(Stdio::null())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .kill_on_drop(true);

    if let Some(proxy) = &opts.proxy {
      debug!(proxy = %redact_proxy(proxy), "using proxy");
    }

    let guard = self
      .slots
      .acquire()
      .await
      .map_err(|e| Error::Server(e.to_string()))?;
    let timeout = self.config.extract_timeout;
    let output = tokio::time::timeout(timeout, cmd.output())
      .await
      .map_err(|_| Error::Timeout("yt-dlp", timeout))??;
    drop(guard);

    detect_error(&output.stderr, output.status.success())?;
    Ok(output.stdout)
  }
}

#[async_trait]
impl Extractor for Ytdlp {
  fn name(&self) -> &'static str {
    match self.mode {
      Mode::Primary => "yt-dlp",
      Mode::Generic => "yt-dlp-generic",
    }
  }

  fn recovers(&self, err: &Error) -> bool {
    match self.mode {
      Mode::Primary => false,
      Mode::Generic => matches!(
        err.kind(),
        ErrorKind::AuthRequired | ErrorKind::Fatal
      ),
    }
  }

  async fn extract(&self, req: &Request) -> Result<Extraction> {
    info!(extractor = self.name(), url = %req.url, "running yt-dlp");

    let stdout = self.run(req).await?;
    let info: Info = serde_json::from_slice(&stdout)?;
    let info = info.into_video();

    let path = locate_file(info.reported_path(), req)
      .ok_or_else(|| Error::MissingFile(req.file_path("*")))?;

    debug!(path = %path.display(), "yt-dlp produced file");
    Ok(Extraction {
      path,
      title: info.title,
    })
  }
}

fn detect_error(stderr: &[u8], success: bool) -> Result<()> {
  let s = String::from_utf8_lossy(stderr);
  if s.contains("ERROR:") {
    return Err(Error::from_ytdlp(&s));
  }

  if !success {
    let s = s.trim();
    return Err(if s.is_empty() {
      Error::Extraction("yt-dlp exited with an error".to_string())
    } else {
      Error::from_ytdlp(s)
    });
  }

  Ok(())
}

// The reported name may predate the merge/remux step, so look for the same
// stem with the usual container extensions, then for anything the job wrote.
fn locate_file(reported: Option<&Path>, req: &Request) -> Option<PathBuf> {
  if let Some(path) = reported {
    if path.is_file() {
      return Some(path.to_path_buf());
    }

    let found = FALLBACK_EXTENSIONS
      .iter()
      .map(|ext| path.with_extension(ext))
      .find(|p| p.is_file());
    if found.is_some() {
      return found;
    }
  }

  newest_job_file(req)
}

fn newest_job_file(req: &Request) -> Option<PathBuf> {
  let prefix = format!("{}_", req.prefix);
  std::fs::read_dir(&req.download_dir)
    .ok()?
    .filter_map(|entry| entry.ok())
    .filter(|entry| {
      let name = entry.file_name();
      let name = name.to_string_lossy();
      name.starts_with(&prefix)
        && !name.ends_with(".part")
        && !name.ends_with(".ytdl")
    })
    .filter_map(|entry| {
      let meta = entry.metadata().ok()?;
      meta
        .is_file()
        .then(|| (meta.modified().ok(), entry.path()))
    })
    .max_by_key(|(modified, _)| *modified)
    .map(|(_, path)| path)
}
