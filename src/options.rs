use std::{
  ffi::OsString,
  path::{Path, PathBuf},
};

use rand::Rng;

use crate::{config::Config, extractor::Request, platform::Platform};

const BASE_FORMAT: &str = "bestvideo+bestaudio/best";
const TIKTOK_FORMAT: &str = "best[format_id!*=watermark]/best";
const YOUTUBE_FORMAT: &str =
  "bestvideo[ext=mp4][height<=1080]+bestaudio[ext=m4a]/best[ext=mp4]/best";

const TIKTOK_APP_VERSION: &str = "2022.7.0";
const TIKTOK_API_HOSTNAME: &str = "api22-normal-useast2a.tiktokv.com";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cookies {
  File(PathBuf),
  Browser(String),
}

/// One yt-dlp invocation's worth of options.
#[derive(Debug, Clone)]
pub struct YtdlpOptions {
  pub format: String,
  pub cookies: Option<Cookies>,
  pub extractor_args: Option<String>,
  pub force_generic: bool,
  pub proxy: Option<String>,
}

impl YtdlpOptions {
  fn base(config: &Config) -> Self {
    Self {
      format: BASE_FORMAT.to_string(),
      cookies: None,
      extractor_args: None,
      force_generic: false,
      proxy: config.ytdlp_proxy.clone(),
    }
  }

  pub fn for_platform(platform: Platform, config: &Config) -> Self {
    let mut opts = Self::base(config);
    opts.cookies = cookies_for(platform, config);

    match platform {
      Platform::TikTok => {
        opts.format = TIKTOK_FORMAT.to_string();
        opts.extractor_args = Some(format!(
          "tiktok:app_version={TIKTOK_APP_VERSION};device_id={};\
           api_hostname={TIKTOK_API_HOSTNAME}",
          random_device_id()
        ));
      }
      Platform::Instagram => {
        opts.format = BASE_FORMAT.to_string();
      }
      Platform::YouTube => {
        opts.format = YOUTUBE_FORMAT.to_string();
      }
    }

    opts
  }

  /// Last-resort options: any format, generic extractor.
  pub fn generic(platform: Platform, config: &Config) -> Self {
    let mut opts = Self::base(config);
    opts.cookies = cookies_for(platform, config);
    opts.format = "best".to_string();
    opts.force_generic = true;
    opts
  }

  pub fn to_args(&self, req: &Request) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
      "--dump-single-json".into(),
      "--no-simulate".into(),
      "--no-progress".into(),
      "--no-mtime".into(),
      "--playlist-items".into(),
      "1".into(),
      "-f".into(),
      self.format.clone().into(),
      "--merge-output-format".into(),
      "mp4".into(),
      "--remux-video".into(),
      "mp4".into(),
      // keep the pre-remux video around; the cleanup sweep removes it
      "-k".into(),
      "-o".into(),
      req.output_template().into(),
    ];

    match &self.cookies {
      Some(Cookies::File(path)) => {
        args.push("--cookies".into());
        args.push(path.clone().into());
      }
      Some(Cookies::Browser(browser)) => {
        args.push("--cookies-from-browser".into());
        args.push(browser.into());
      }
      None => {}
    }

    if let Some(extractor_args) = &self.extractor_args {
      args.push("--extractor-args".into());
      args.push(extractor_args.into());
    }

    if self.force_generic {
      args.push("--force-generic-extractor".into());
    }

    if let Some(proxy) = &self.proxy {
      args.push("--proxy".into());
      args.push(proxy.into());
    }

    args.push("--".into());
    args.push(req.url.clone().into());
    args
  }
}

fn cookies_for(platform: Platform, config: &Config) -> Option<Cookies> {
  let file_name = platform.cookie_file_name()?;
  cookie_file(&config.cookies_dir, file_name)
    .map(Cookies::File)
    .or_else(|| config.cookies_from_browser.clone().map(Cookies::Browser))
}

fn cookie_file(dir: &Path, name: &str) -> Option<PathBuf> {
  let path = dir.join(name);
  path.is_file().then_some(path)
}

fn random_device_id() -> String {
  rand::thread_rng()
    .gen_range(7_000_000_000_000_000_000u64..7_999_999_999_999_999_999)
    .to_string()
}
