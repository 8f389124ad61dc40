use std::{path::Path, sync::Arc};

use chrono::Utc;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::{
  cleanup,
  config::Config,
  error::ErrorKind,
  extractor::{self, Extraction, Extractor, Request},
  job::{JobId, JobRegistry, JobState},
  messenger::{Messenger, Upload},
  platform::{Platform, SUPPORTED_PLATFORMS},
  transcode::Transcoder,
  util::{bytes_to_mb, caption, clean_title, document_caption},
  Error, Result,
};

pub const GREETING: &str = "Hi! Send me an Instagram or TikTok link, and \
                            I’ll download the video without watermarks.";
pub const WORKING: &str =
  "Downloading your video without watermarks, please wait...";
pub const PROCESSING: &str = "Processing video to ensure compatibility...";
pub const SENDING: &str = "Processing complete! Sending to Telegram...";

pub fn invalid_url_prompt() -> String {
  format!("Please send a valid {SUPPORTED_PLATFORMS} URL.")
}

/// Turns one inbound URL into a video in the chat: extract, transcode,
/// send, clean up.
pub struct Relay {
  config: Config,
  extractors: Vec<Arc<dyn Extractor>>,
  transcoder: Transcoder,
  slots: Semaphore,
  jobs: Arc<JobRegistry>,
}

// Everything one job carries through the pipeline.
struct Job<'a, M: Messenger> {
  id: JobId,
  platform: Platform,
  url: &'a str,
  messenger: &'a M,
  status: &'a M::Status,
}

impl<M: Messenger> Job<'_, M> {
  // a failed status edit should never abort the job
  async fn update(&self, text: &str) {
    if let Err(e) = self.messenger.edit(self.status, text).await {
      warn!(job = %self.id, error = %e, "failed to update status message");
    }
  }
}

impl Relay {
  pub fn new(config: Config, jobs: Arc<JobRegistry>) -> Self {
    let extractors = extractor::default_chain(&config);
    Self::with_extractors(config, jobs, extractors)
  }

  pub fn with_extractors(
    config: Config,
    jobs: Arc<JobRegistry>,
    extractors: Vec<Arc<dyn Extractor>>,
  ) -> Self {
    Self {
      transcoder: Transcoder::new(&config),
      slots: Semaphore::new(config.max_concurrent_jobs),
      config,
      extractors,
      jobs,
    }
  }

  pub fn jobs(&self) -> &Arc<JobRegistry> {
    &self.jobs
  }

  pub async fn handle<M: Messenger>(
    &self,
    messenger: &M,
    text: &str,
  ) -> Result<()> {
    let url = text.trim();
    let Some(platform) = Platform::detect(url) else {
      messenger.reply(&invalid_url_prompt()).await?;
      return Ok(());
    };

    let status = messenger.reply(WORKING).await?;
    let id = self.jobs.register(url, platform);
    let job = Job {
      id,
      platform,
      url,
      messenger,
      status: &status,
    };
    info!(job = %id, %url, %platform, "new job");

    let prefix = format!("{}-{}", Utc::now().timestamp(), id);
    let result = match self.slots.acquire().await {
      Ok(_permit) => self.run(&job, &prefix).await,
      Err(e) => Err(Error::Server(e.to_string())),
    };

    let removed = cleanup::sweep(&self.config.download_dir, &prefix).await;
    if removed > 0 {
      info!(job = %id, removed, "cleaned up job files");
    }

    match result {
      Ok(()) => {
        self.jobs.transition(id, JobState::Done);
        job
          .update(&format!(
            "✅ {platform} video downloaded and sent successfully!"
          ))
          .await;
      }
      Err(e) => {
        error!(job = %id, %url, error = %e, "job failed");
        self.jobs.transition(id, JobState::Failed(e.to_string()));
        job.update(&e.user_message(platform)).await;
      }
    }

    Ok(())
  }

  async fn run<M: Messenger>(
    &self,
    job: &Job<'_, M>,
    prefix: &str,
  ) -> Result<()> {
    tokio::fs::create_dir_all(&self.config.download_dir).await?;

    let req = Request {
      url: job.url.to_string(),
      platform: job.platform,
      download_dir: self.config.download_dir.clone(),
      prefix: prefix.to_string(),
    };

    self.jobs.transition(job.id, JobState::Extracting);
    job.update(job.platform.status_text()).await;
    let extraction = self.extract(job, &req).await?;
    self.check_size(&extraction.path).await?;

    self.jobs.transition(job.id, JobState::Transcoding);
    job.update(PROCESSING).await;
    let path = self.transcoder.transcode(&extraction.path).await?;
    self.check_size(&path).await?;

    job.update(SENDING).await;
    self.jobs.transition(job.id, JobState::Sending);
    let title = extraction.title.unwrap_or_else(|| {
      path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
    });

    self.deliver(job, path.as_path(), &title).await
  }

  // Walks the extractor chain. The first supported extractor always runs;
  // later ones only when they can recover from the failure of that first
  // attempt. Once a fallback path has opened, a failing fallback does not
  // close it for the strategies after it.
  async fn extract<M: Messenger>(
    &self,
    job: &Job<'_, M>,
    req: &Request,
  ) -> Result<Extraction> {
    let mut first_err: Option<Error> = None;
    let mut announced = false;

    let chain = self
      .extractors
      .iter()
      .filter(|e| e.supports(job.platform));

    for extractor in chain {
      if let Some(err) = &first_err {
        if !extractor.recovers(err) {
          continue;
        }

        if !announced && err.kind() == ErrorKind::AuthRequired {
          job
            .update(&format!(
              "{} requires login. Trying alternative method...",
              job.platform
            ))
            .await;
          announced = true;
        }
        info!(job = %job.id, extractor = extractor.name(), "trying fallback");
      }

      let attempt = self
        .config
        .retry
        .run(extractor.name(), || extractor.extract(req))
        .await;

      match attempt {
        Ok(extraction) => return Ok(extraction),
        Err(e) => {
          warn!(
            job = %job.id,
            extractor = extractor.name(),
            error = %e,
            "extraction failed"
          );
          if first_err.is_none() {
            first_err = Some(e.detach());
          }
        }
      }
    }

    Err(first_err.unwrap_or_else(|| {
      Error::Extraction(format!("no extractor for {}", job.platform))
    }))
  }

  async fn check_size(&self, path: &Path) -> Result<()> {
    let size = tokio::fs::metadata(path).await?.len();
    if size <= self.config.max_upload_bytes() {
      return Ok(());
    }

    if let Err(e) = tokio::fs::remove_file(path).await {
      warn!(
        path = %path.display(),
        error = %e,
        "failed to delete oversized file"
      );
    }
    Err(Error::TooLarge {
      size_mb: bytes_to_mb(size),
      limit_mb: self.config.max_upload_mb,
    })
  }

  async fn deliver<M: Messenger>(
    &self,
    job: &Job<'_, M>,
    path: &Path,
    title: &str,
  ) -> Result<()> {
    let mut upload = Upload {
      path: path.to_path_buf(),
      file_name: clean_title(title),
      caption: caption(job.platform, job.url),
    };

    let video_err = match job.messenger.send_video(&upload).await {
      Ok(()) => return Ok(()),
      Err(e) => e,
    };
    warn!(job = %job.id, error = %video_err, "error sending as video");

    upload.caption = document_caption(job.platform, job.url);
    job.messenger.send_document(&upload).await.map_err(|e| {
      warn!(job = %job.id, error = %e, "error sending as document");
      Error::Upload(e.detail())
    })
  }
}
