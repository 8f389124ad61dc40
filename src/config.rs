use std::{
  net::SocketAddr, path::PathBuf, str::FromStr, time::Duration,
};

use crate::{retry::RetryPolicy, Error, Result};

/// Runtime settings, read once from the environment at startup.
#[derive(Debug, Clone)]
pub struct Config {
  pub bot_token: String,
  pub download_dir: PathBuf,
  pub cookies_dir: PathBuf,
  pub cookies_from_browser: Option<String>,
  pub ytdlp_bin: String,
  pub ffmpeg_bin: String,
  pub ytdlp_proxy: Option<String>,
  pub ytdlp_concurrency: usize,
  pub max_concurrent_jobs: usize,
  pub max_upload_mb: u64,
  pub retry: RetryPolicy,
  pub extract_timeout: Duration,
  pub transcode_timeout: Duration,
  pub status_addr: Option<SocketAddr>,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      bot_token: String::new(),
      download_dir: PathBuf::from("downloads"),
      cookies_dir: PathBuf::from("."),
      cookies_from_browser: None,
      ytdlp_bin: "yt-dlp".to_string(),
      ffmpeg_bin: "ffmpeg".to_string(),
      ytdlp_proxy: None,
      ytdlp_concurrency: 1,
      max_concurrent_jobs: 2,
      max_upload_mb: 50,
      retry: RetryPolicy::default(),
      extract_timeout: Duration::from_secs(600),
      transcode_timeout: Duration::from_secs(600),
      status_addr: None,
    }
  }
}

impl Config {
  pub fn from_env() -> Result<Self> {
    Self::from_lookup(|key| std::env::var(key).ok())
  }

  fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
    let defaults = Self::default();
    let get = |key: &str| get(key).filter(|v| !v.trim().is_empty());

    let bot_token = get("TELEGRAM_BOT_TOKEN").ok_or_else(|| {
      Error::Config("TELEGRAM_BOT_TOKEN", "not set".to_string())
    })?;

    let retry = RetryPolicy {
      max_attempts: parse_or(
        "RETRY_ATTEMPTS",
        get("RETRY_ATTEMPTS"),
        defaults.retry.max_attempts,
      )?,
      base_delay: Duration::from_millis(parse_or(
        "RETRY_BASE_DELAY_MS",
        get("RETRY_BASE_DELAY_MS"),
        defaults.retry.base_delay.as_millis() as u64,
      )?),
    };

    let status_addr = get("STATUS_ADDR")
      .map(|v| parse("STATUS_ADDR", &v))
      .transpose()?;

    let config = Self {
      bot_token,
      download_dir: get("DOWNLOAD_DIR")
        .map(PathBuf::from)
        .unwrap_or(defaults.download_dir),
      cookies_dir: get("COOKIES_DIR")
        .map(PathBuf::from)
        .unwrap_or(defaults.cookies_dir),
      cookies_from_browser: get("COOKIES_FROM_BROWSER"),
      ytdlp_bin: get("YTDLP_BIN").unwrap_or(defaults.ytdlp_bin),
      ffmpeg_bin: get("FFMPEG_BIN").unwrap_or(defaults.ffmpeg_bin),
      ytdlp_proxy: get("YTDLP_PROXY"),
      ytdlp_concurrency: parse_or(
        "YTDLP_CONCURRENCY",
        get("YTDLP_CONCURRENCY"),
        defaults.ytdlp_concurrency,
      )?
      .max(1),
      max_concurrent_jobs: parse_or(
        "MAX_CONCURRENT_JOBS",
        get("MAX_CONCURRENT_JOBS"),
        defaults.max_concurrent_jobs,
      )?
      .max(1),
      max_upload_mb: parse_or(
        "MAX_UPLOAD_MB",
        get("MAX_UPLOAD_MB"),
        defaults.max_upload_mb,
      )?,
      retry,
      extract_timeout: Duration::from_secs(parse_or(
        "EXTRACT_TIMEOUT_SECS",
        get("EXTRACT_TIMEOUT_SECS"),
        defaults.extract_timeout.as_secs(),
      )?),
      transcode_timeout: Duration::from_secs(parse_or(
        "TRANSCODE_TIMEOUT_SECS",
        get("TRANSCODE_TIMEOUT_SECS"),
        defaults.transcode_timeout.as_secs(),
      )?),
      status_addr,
    };

    // the download dir is wiped at startup
    if config.download_dir == config.cookies_dir {
      return Err(Error::Config(
        "DOWNLOAD_DIR",
        format!(
          "{} is also COOKIES_DIR and would be purged",
          config.download_dir.display()
        ),
      ));
    }

    Ok(config)
  }

  pub fn max_upload_bytes(&self) -> u64 {
    self.max_upload_mb * 1024 * 1024
  }
}

fn parse<T>(key: &'static str, value: &str) -> Result<T>
where
  T: FromStr,
  T::Err: std::fmt::Display,
{
  value
    .trim()
    .parse()
    .map_err(|e: T::Err| Error::Config(key, format!("{value:?}: {e}")))
}

fn parse_or<T>(
  key: &'static str,
  value: Option<String>,
  default: T,
) -> Result<T>
where
  T: FromStr,
  T::Err: std::fmt::Display,
{
  match value {
    Some(v) => parse(key, &v),
    None => Ok(default),
  }
}
