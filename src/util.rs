use once_cell::sync::Lazy;
use regex::Regex;

use crate::platform::Platform;

const MAX_TITLE_LEN: usize = 60;
const MAX_CAPTION_URL_LEN: usize = 50;

static UNSAFE_TITLE_CHARS: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"[^\w\s.-]").unwrap());

// used to remove cred info from proxy url before printing
static PROXY_AUTH_REGEX: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"//[^:/@]+(:[^@]+)?@").unwrap());

/// First `n` characters of `s`, never splitting a code point.
pub fn truncate_chars(s: &str, n: usize) -> &str {
  match s.char_indices().nth(n) {
    Some((idx, _)) => &s[..idx],
    None => s,
  }
}

// Telegram rejects some file names, so strip anything exotic and keep the
// name short.
pub fn clean_title(title: &str) -> String {
  let mut clean = UNSAFE_TITLE_CHARS.replace_all(title, "").into_owned();

  if clean.chars().count() > MAX_TITLE_LEN {
    clean = format!("{}...", truncate_chars(&clean, MAX_TITLE_LEN - 3));
  }

  if !clean.to_lowercase().ends_with(".mp4") {
    clean.push_str(".mp4");
  }

  clean
}

pub fn caption(platform: Platform, url: &str) -> String {
  format!(
    "Downloaded from {}: {}...",
    platform,
    truncate_chars(url, MAX_CAPTION_URL_LEN)
  )
}

pub fn document_caption(platform: Platform, url: &str) -> String {
  format!(
    "{} (Sent as file due to compatibility issues)",
    caption(platform, url)
  )
}

pub fn redact_proxy(proxy: &str) -> String {
  PROXY_AUTH_REGEX
    .replace(proxy, "//<REDACTED>@")
    .into_owned()
}

pub fn bytes_to_mb(bytes: u64) -> f64 {
  bytes as f64 / (1024.0 * 1024.0)
}
