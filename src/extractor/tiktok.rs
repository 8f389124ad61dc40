use async_trait::async_trait;
use futures::StreamExt;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use tokio::{fs::File, io::AsyncWriteExt};
use tracing::info;

use crate::{error::ErrorKind, platform::Platform, Error, Result};

use super::{Extraction, Extractor, Request};

const FEED_API: &str =
  "https://api16-normal-c-useast1a.tiktokv.com/aweme/v1/feed/";
const APP_USER_AGENT: &str =
  "TikTok 26.2.0 rv:262018 (iPhone; iOS 14.4.2; en_US) Cronet";

static VIDEO_ID_REGEX: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"tiktok\.com/.*?/video/(\d+)").unwrap());

// Asks the mobile feed API for the watermark-free play address and
// downloads it directly. Used when yt-dlp wants a login.
pub struct TikTokApi {
  client: reqwest::Client,
  feed_url: String,
}

#[derive(Debug, Deserialize)]
struct FeedResp {
  #[serde(default)]
  aweme_list: Vec<Aweme>,
}

#[derive(Debug, Deserialize)]
struct Aweme {
  video: Option<Video>,
}

#[derive(Debug, Deserialize)]
struct Video {
  play_addr: Option<PlayAddr>,
}

#[derive(Debug, Deserialize)]
struct PlayAddr {
  #[serde(default)]
  url_list: Vec<String>,
}

impl FeedResp {
  fn play_url(self) -> Option<String> {
    self
      .aweme_list
      .into_iter()
      .next()?
      .video?
      .play_addr?
      .url_list
      .into_iter()
      .next()
  }
}

impl TikTokApi {
  pub fn new() -> Self {
    Self::with_feed_url(FEED_API)
  }

  pub fn with_feed_url(feed_url: impl Into<String>) -> Self {
    Self {
      client: reqwest::Client::new(),
      feed_url: feed_url.into(),
    }
  }

  async fn play_url(&self, video_id: &str) -> Result<String> {
    let resp = self
      .client
      .get(&self.feed_url)
      .query(&[("aweme_id", video_id)])
      .header("User-Agent", APP_USER_AGENT)
      .send()
      .await?
      .error_for_status()?;

    resp
      .json::<FeedResp>()
      .await?
      .play_url()
      .ok_or_else(|| {
        Error::Extraction(format!(
          "no play address for tiktok video {video_id}"
        ))
      })
  }
}

impl Default for TikTokApi {
  fn default() -> Self {
    Self::new()
  }
}

pub fn video_id(url: &str) -> Option<&str> {
  VIDEO_ID_REGEX
    .captures(url)
    .and_then(|c| c.get(1))
    .map(|m| m.as_str())
}

#[async_trait]
impl Extractor for TikTokApi {
  fn name(&self) -> &'static str {
    "tiktok-api"
  }

  fn supports(&self, platform: Platform) -> bool {
    platform == Platform::TikTok
  }

  fn recovers(&self, err: &Error) -> bool {
    err.kind() == ErrorKind::AuthRequired
  }

  async fn extract(&self, req: &Request) -> Result<Extraction> {
    let video_id = video_id(&req.url).ok_or_else(|| {
      Error::Extraction(format!("no tiktok video id in {}", req.url))
    })?;

    let play_url = self.play_url(video_id).await?;
    info!(video_id, "downloading tiktok video from feed api");

    let path = req.file_path(&format!("tiktok_{video_id}.mp4"));
    let mut stream = self
      .client
      .get(play_url)
      .send()
      .await?
      .error_for_status()?
      .bytes_stream();

    let mut file = File::create(&path).await?;
    while let Some(chunk) = stream.next().await {
      file.write_all(&chunk?).await?;
    }
    file.flush().await?;

    Ok(Extraction {
      path,
      title: Some(format!("TikTok_{video_id}")),
    })
  }
}

#[cfg(test)]
mod tests {
  use std::{collections::HashMap, net::SocketAddr, path::Path};

  use axum::{
    extract::Query,
    http::{HeaderMap, StatusCode},
    routing::get,
    Json, Router,
  };
  use serde_json::{json, Value};

  use super::*;

  const VIDEO_URL: &str = "https://www.tiktok.com/@someone/video/42";

  fn request(dir: &Path, url: &str) -> Request {
    Request {
      url: url.into(),
      platform: Platform::TikTok,
      download_dir: dir.to_path_buf(),
      prefix: "1-1".into(),
    }
  }

  // serves `app` on an ephemeral local port
  async fn stub(app: impl FnOnce(SocketAddr) -> Router) -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let server = axum::Server::from_tcp(listener)
      .unwrap()
      .serve(app(addr).into_make_service());
    tokio::spawn(server);
    addr
  }

  fn feed_api(addr: SocketAddr) -> TikTokApi {
    TikTokApi::with_feed_url(format!("http://{addr}/feed"))
  }

  #[test]
  fn test_video_id() {
    assert_eq!(
      video_id(
        "https://www.tiktok.com/@someone/video/7234567890123456789?x=1"
      ),
      Some("7234567890123456789")
    );
    assert_eq!(video_id("https://vm.tiktok.com/ZMabcdef/"), None);
  }

  #[test]
  fn test_play_url() {
    let json = r#"{
      "aweme_list": [
        {"video": {"play_addr": {"url_list": ["https://v16.example/a.mp4"]}}}
      ]
    }"#;
    let resp: FeedResp = serde_json::from_str(json).unwrap();
    assert_eq!(resp.play_url().as_deref(), Some("https://v16.example/a.mp4"));

    let empty: FeedResp =
      serde_json::from_str(r#"{"status_code": 0}"#).unwrap();
    assert_eq!(empty.play_url(), None);
  }

  #[test]
  fn test_only_recovers_auth() {
    let api = TikTokApi::new();
    assert!(api.supports(Platform::TikTok));
    assert!(!api.supports(Platform::Instagram));
    assert!(api.recovers(&Error::AuthRequired("login".into())));
    assert!(!api.recovers(&Error::Extraction("gone".into())));
  }

  #[tokio::test]
  async fn test_short_link_without_id() {
    let dir = tempfile::tempdir().unwrap();
    let req = request(dir.path(), "https://vm.tiktok.com/ZMabcdef/");
    let res = TikTokApi::new().extract(&req).await;
    assert!(matches!(res, Err(Error::Extraction(_))));
  }

  #[tokio::test]
  async fn test_downloads_play_address() {
    let addr = stub(|addr| {
      let feed = move |headers: HeaderMap,
                       Query(q): Query<HashMap<String, String>>| async move {
        let agent = headers
          .get("user-agent")
          .and_then(|v| v.to_str().ok())
          .unwrap_or_default();
        if q.get("aweme_id").map(String::as_str) != Some("42")
          || !agent.starts_with("TikTok ")
        {
          return Err(StatusCode::BAD_REQUEST);
        }
        let play = format!("http://{addr}/play/42.mp4");
        Ok(Json(json!({
          "aweme_list": [{"video": {"play_addr": {"url_list": [play]}}}]
        })))
      };

      Router::new()
        .route("/feed", get(feed))
        .route("/play/42.mp4", get(|| async { "tiktok video" }))
    })
    .await;

    let dir = tempfile::tempdir().unwrap();
    let extraction = feed_api(addr)
      .extract(&request(dir.path(), VIDEO_URL))
      .await
      .unwrap();

    assert_eq!(extraction.path, dir.path().join("1-1_tiktok_42.mp4"));
    assert_eq!(extraction.title.as_deref(), Some("TikTok_42"));
    assert_eq!(
      std::fs::read_to_string(&extraction.path).unwrap(),
      "tiktok video"
    );
  }

  #[tokio::test]
  async fn test_feed_error_status() {
    let addr = stub(|_| {
      Router::new()
        .route("/feed", get(|| async { StatusCode::FORBIDDEN }))
    })
    .await;

    let dir = tempfile::tempdir().unwrap();
    let err = feed_api(addr)
      .extract(&request(dir.path(), VIDEO_URL))
      .await
      .unwrap_err();
    assert!(matches!(err, Error::Http(_)), "{err:?}");
    assert_eq!(err.kind(), ErrorKind::Fatal);
    assert!(!dir.path().join("1-1_tiktok_42.mp4").exists());
  }

  #[tokio::test]
  async fn test_feed_without_play_address() {
    let addr = stub(|_| {
      let feed = || async {
        Json::<Value>(json!({"aweme_list": [{"video": {}}]}))
      };
      Router::new().route("/feed", get(feed))
    })
    .await;

    let dir = tempfile::tempdir().unwrap();
    let err = feed_api(addr)
      .extract(&request(dir.path(), VIDEO_URL))
      .await
      .unwrap_err();
    assert!(matches!(err, Error::Extraction(_)), "{err:?}");
  }

  #[tokio::test]
  async fn test_unreachable_feed_is_transient() {
    let dir = tempfile::tempdir().unwrap();
    let api = TikTokApi::with_feed_url("http://127.0.0.1:1/feed");
    let err = api
      .extract(&request(dir.path(), VIDEO_URL))
      .await
      .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transient);
  }
}
