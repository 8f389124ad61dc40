use std::{sync::Arc, time::Duration};

use teloxide::Bot;
use tokio_graceful_shutdown::{SubsystemBuilder, Toplevel};
use tracing_subscriber::EnvFilter;

mod cleanup;
mod config;
mod error;
mod extractor;
mod job;
mod messenger;
mod options;
mod platform;
mod relay;
mod retry;
mod status;
mod telegram;
#[cfg(all(test, unix))]
mod test_support;
mod transcode;
mod util;

pub use error::{Error, Result};

use crate::{config::Config, job::JobRegistry, relay::Relay};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
  dotenvy::dotenv().ok();

  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info")),
    )
    .init();

  let config = Config::from_env()?;
  cleanup::purge(&config.download_dir)?;

  let bot = Bot::new(&config.bot_token);
  let status_addr = config.status_addr;
  let relay = Arc::new(Relay::new(config, Arc::new(JobRegistry::default())));
  let jobs = relay.jobs().clone();

  Toplevel::new(move |s| async move {
    s.start(SubsystemBuilder::new("telegram", move |subsys| {
      telegram::run(subsys, bot, relay)
    }));

    if let Some(addr) = status_addr {
      s.start(SubsystemBuilder::new("status", move |subsys| {
        status::serve(subsys, addr, jobs)
      }));
    }
  })
  .catch_signals()
  .handle_shutdown_requests(SHUTDOWN_TIMEOUT)
  .await
  .map_err(|e| Error::Server(e.to_string()))
}
