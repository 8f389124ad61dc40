use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
  TikTok,
  Instagram,
  YouTube,
}

pub const SUPPORTED_PLATFORMS: &str = "YouTube, Instagram, or TikTok";

impl Platform {
  /// Plain substring match, checked in a fixed order.
  pub fn detect(url: &str) -> Option<Self> {
    if url.contains("tiktok.com") {
      Some(Platform::TikTok)
    } else if url.contains("instagram.com") {
      Some(Platform::Instagram)
    } else if url.contains("youtube.com") || url.contains("youtu.be") {
      Some(Platform::YouTube)
    } else {
      None
    }
  }

  pub fn display_name(self) -> &'static str {
    match self {
      Platform::TikTok => "TikTok",
      Platform::Instagram => "Instagram",
      Platform::YouTube => "YouTube",
    }
  }

  pub fn cookie_file_name(self) -> Option<&'static str> {
    match self {
      Platform::TikTok => Some("tiktok_cookies.txt"),
      Platform::Instagram => Some("instagram_cookies.txt"),
      Platform::YouTube => None,
    }
  }

  pub fn status_text(self) -> &'static str {
    match self {
      Platform::TikTok => "Downloading TikTok video (using authentication)...",
      Platform::Instagram => {
        "Downloading Instagram video in original quality..."
      }
      Platform::YouTube => "Downloading YouTube video in best quality...",
    }
  }
}

impl fmt::Display for Platform {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.display_name())
  }
}
