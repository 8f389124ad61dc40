use std::{
  path::{Path, PathBuf},
  process::Stdio,
  time::Duration,
};

use tokio::process::Command;
use tracing::{info, warn};

use crate::{config::Config, Result};

/// Re-encodes downloads to baseline H.264/AAC mp4, which every Telegram
/// client can play inline.
pub struct Transcoder {
  bin: String,
  timeout: Duration,
}

impl Transcoder {
  pub fn new(config: &Config) -> Self {
    Self {
      bin: config.ffmpeg_bin.clone(),
      timeout: config.transcode_timeout,
    }
  }

  pub fn output_path(input: &Path) -> PathBuf {
    let stem = input.with_extension("");
    let mut name = stem.into_os_string();
    name.push("_processed.mp4");
    PathBuf::from(name)
  }

  fn args(input: &Path, output: &Path) -> Vec<std::ffi::OsString> {
    let mut args: Vec<std::ffi::OsString> = vec!["-i".into(), input.into()];
    args.extend(
      [
        "-c:v", "libx264", "-profile:v", "baseline", "-level", "3.0",
        "-pix_fmt", "yuv420p", "-preset", "medium", "-crf", "23", "-c:a",
        "aac", "-b:a", "128k", "-movflags", "+faststart", "-y",
      ]
      .into_iter()
      .map(Into::into),
    );
    args.push(output.into());
    args
  }

  /// Returns the file to send: the transcoded one when ffmpeg produced a
  /// non-empty output, otherwise the untouched input.
  pub async fn transcode(&self, input: &Path) -> Result<PathBuf> {
    let output = Self::output_path(input);
    info!(input = %input.display(), "transcoding");

    let mut cmd = Command::new(&self.bin);
    cmd
      .args(Self::args(input, &output))
      .stdin(Stdio::null())
      .stdout(Stdio::null())
      .stderr(Stdio::piped())
      .kill_on_drop(true);

    match tokio::time::timeout(self.timeout, cmd.output()).await {
      Ok(Ok(out)) if !out.status.success() => {
        let stderr = String::from_utf8_lossy(&out.stderr);
        let tail = stderr.lines().last().unwrap_or_default();
        warn!(status = %out.status, %tail, "ffmpeg failed");
      }
      Ok(Ok(_)) => {}
      Ok(Err(e)) => warn!(error = %e, bin = %self.bin, "could not run ffmpeg"),
      Err(_) => warn!(timeout = ?self.timeout, "ffmpeg timed out"),
    }

    let produced = tokio::fs::metadata(&output)
      .await
      .map(|m| m.is_file() && m.len() > 0)
      .unwrap_or(false);

    if !produced {
      tokio::fs::remove_file(&output).await.ok();
      return Ok(input.to_path_buf());
    }

    tokio::fs::remove_file(input).await?;
    Ok(output)
  }
}
