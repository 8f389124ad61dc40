use std::{path::PathBuf, time::Duration};

use crate::{platform::Platform, util::truncate_chars};

#[derive(Debug, thiserror::Error)]
pub enum Error {
  #[error("io error: {0}")]
  IO(#[from] std::io::Error),
  #[error("invalid yt-dlp output: {0}")]
  Json(#[from] serde_json::Error),
  #[error("http error: {0}")]
  Http(#[from] reqwest::Error),
  #[error("telegram error: {0}")]
  Telegram(#[from] teloxide::RequestError),
  #[error("authentication required: {0}")]
  AuthRequired(String),
  #[error("transient failure: {0}")]
  Transient(String),
  #[error("extraction failed: {0}")]
  Extraction(String),
  #[error("downloaded file not found: {0}")]
  MissingFile(PathBuf),
  #[error("{0} timed out after {1:?}")]
  Timeout(&'static str, Duration),
  #[error("video is too large ({size_mb:.1}MB > {limit_mb}MB)")]
  TooLarge { size_mb: f64, limit_mb: u64 },
  #[error("upload failed: {0}")]
  Upload(String),
  #[error("invalid config {0}: {1}")]
  Config(&'static str, String),
  #[error("server error: {0}")]
  Server(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Coarse classification used by the retry policy and the fallback chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
  AuthRequired,
  Transient,
  Fatal,
}

// matched against lowercased text
const AUTH_MARKERS: &[&str] = &[
  "requiring login",
  "login required",
  "log in for access",
  "sign in to confirm",
  "use --cookies",
];

const TRANSIENT_MARKERS: &[&str] = &[
  "http error 429",
  "http error 5",
  "timed out",
  "connection reset",
  "temporary failure",
  "unable to download webpage",
];

impl Error {
  /// Turns a yt-dlp error report into a classified error.
  /// Only the `ERROR:` lines decide the class, so retry warnings printed
  /// before the final error do not count.
  pub fn from_ytdlp(stderr: &str) -> Self {
    let errors: Vec<&str> = stderr
      .lines()
      .filter(|line| line.contains("ERROR:"))
      .collect();

    let message = errors.last().copied().unwrap_or(stderr).trim().to_string();
    let haystack = if errors.is_empty() {
      stderr.to_lowercase()
    } else {
      errors.join("\n").to_lowercase()
    };
    let has = |markers: &[&str]| markers.iter().any(|m| haystack.contains(m));

    if has(AUTH_MARKERS) {
      Error::AuthRequired(message)
    } else if has(TRANSIENT_MARKERS) {
      Error::Transient(message)
    } else {
      Error::Extraction(message)
    }
  }

  pub fn kind(&self) -> ErrorKind {
    match self {
      Error::AuthRequired(_) => ErrorKind::AuthRequired,
      Error::Transient(_) | Error::Timeout(..) => ErrorKind::Transient,
      Error::Http(e) if e.is_timeout() || e.is_connect() => {
        ErrorKind::Transient
      }
      Error::Http(e) if e.status().is_some_and(|s| s.is_server_error()) => {
        ErrorKind::Transient
      }
      _ => ErrorKind::Fatal,
    }
  }

  /// Owned copy keeping the classification and message. Errors wrapping
  /// io or http failures are not `Clone`.
  pub fn detach(&self) -> Error {
    match self {
      Error::AuthRequired(m) => Error::AuthRequired(m.clone()),
      Error::Transient(m) => Error::Transient(m.clone()),
      Error::Extraction(m) => Error::Extraction(m.clone()),
      Error::MissingFile(p) => Error::MissingFile(p.clone()),
      Error::Timeout(what, d) => Error::Timeout(*what, *d),
      other if other.kind() == ErrorKind::Transient => {
        Error::Transient(other.to_string())
      }
      other => Error::Extraction(other.to_string()),
    }
  }

  /// The underlying failure text, without this error's own prefix.
  pub fn detail(&self) -> String {
    match self {
      Error::IO(e) => e.to_string(),
      Error::Json(e) => e.to_string(),
      Error::Http(e) => e.to_string(),
      Error::Telegram(e) => e.to_string(),
      Error::AuthRequired(m)
      | Error::Transient(m)
      | Error::Extraction(m)
      | Error::Upload(m)
      | Error::Server(m) => m.clone(),
      other => other.to_string(),
    }
  }

  /// Text shown to the user in the status message when a job fails.
  pub fn user_message(&self, platform: Platform) -> String {
    match self {
      Error::AuthRequired(_) => {
        let name = platform.display_name();
        let cookies = platform.cookie_file_name().unwrap_or("cookies.txt");
        format!(
          "Failed to download the video. This {name} video requires \
           authentication.\n\n\
           To fix this:\n\
           1. Log in to {name} in your browser\n\
           2. Export cookies to a file named '{cookies}'\n\
           3. Place the file in the bot's directory\n\
           4. Try downloading again"
        )
      }
      Error::TooLarge { size_mb, limit_mb } => format!(
        "Video is too large ({size_mb:.1}MB > {limit_mb}MB) for Telegram. \
         Try a shorter clip!"
      ),
      Error::Upload(reason) => format!(
        "Failed to send video. Error: {}...",
        truncate_chars(reason, 100)
      ),
      Error::Transient(_)
      | Error::Extraction(_)
      | Error::MissingFile(_)
      | Error::Timeout(..) => format!(
        "Failed to download the video: {}...",
        truncate_chars(&self.to_string(), 100)
      ),
      _ => format!(
        "Sorry, an error occurred: {}...",
        truncate_chars(&self.to_string(), 100)
      ),
    }
  }
}
