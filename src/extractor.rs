mod tiktok;
mod ytdlp;

use std::{path::PathBuf, sync::Arc};

use async_trait::async_trait;
use tokio::sync::Semaphore;

use crate::{config::Config, platform::Platform, Error, Result};

pub use tiktok::TikTokApi;
pub use ytdlp::Ytdlp;

/// Everything an extractor needs to fetch one URL.
#[derive(Debug, Clone)]
pub struct Request {
  pub url: String,
  pub platform: Platform,
  pub download_dir: PathBuf,
  /// Shared by every file written for this job; see `cleanup::sweep`.
  pub prefix: String,
}

impl Request {
  pub fn output_template(&self) -> String {
    format!(
      "{}/{}_%(title)s.%(ext)s",
      self.download_dir.display(),
      self.prefix
    )
  }

  pub fn file_path(&self, name: &str) -> PathBuf {
    self.download_dir.join(format!("{}_{}", self.prefix, name))
  }
}

#[derive(Debug, Clone)]
pub struct Extraction {
  pub path: PathBuf,
  pub title: Option<String>,
}

#[async_trait]
pub trait Extractor: Send + Sync {
  fn name(&self) -> &'static str;

  fn supports(&self, _platform: Platform) -> bool {
    true
  }

  /// Whether this strategy is worth trying after the first attempt of the
  /// chain failed with `err`.
  fn recovers(&self, _err: &Error) -> bool {
    false
  }

  async fn extract(&self, req: &Request) -> Result<Extraction>;
}

/// The fallback order: yt-dlp with platform options, the TikTok feed API,
/// then yt-dlp with the generic extractor.
pub fn default_chain(config: &Config) -> Vec<Arc<dyn Extractor>> {
  // ensure only a limited set of ytdlp processes at a time
  let slots = Arc::new(Semaphore::new(config.ytdlp_concurrency));

  vec![
    Arc::new(Ytdlp::primary(config, slots.clone())),
    Arc::new(TikTokApi::new()),
    Arc::new(Ytdlp::generic(config, slots)),
  ]
}

#[cfg(test)]
mod tests {
  use std::path::Path;

  use super::*;

  #[test]
  fn test_request_paths() {
    let req = Request {
      url: "https://youtu.be/x".into(),
      platform: Platform::YouTube,
      download_dir: PathBuf::from("downloads"),
      prefix: "1700000000-3".into(),
    };

    assert_eq!(
      req.output_template(),
      "downloads/1700000000-3_%(title)s.%(ext)s"
    );
    assert_eq!(
      req.file_path("tiktok_1.mp4"),
      Path::new("downloads/1700000000-3_tiktok_1.mp4")
    );
  }

  #[test]
  fn test_default_chain_order() {
    let chain = default_chain(&Config::default());
    let names: Vec<_> = chain.iter().map(|e| e.name()).collect();
    assert_eq!(names, ["yt-dlp", "tiktok-api", "yt-dlp-generic"]);

    let youtube: Vec<_> = chain
      .iter()
      .filter(|e| e.supports(Platform::YouTube))
      .map(|e| e.name())
      .collect();
    assert_eq!(youtube, ["yt-dlp", "yt-dlp-generic"]);
  }
}
