use std::sync::Arc;

use async_trait::async_trait;
use teloxide::{
  dispatching::UpdateHandler,
  error_handlers::LoggingErrorHandler,
  prelude::*,
  types::{InputFile, MessageId, ReplyParameters},
  utils::command::BotCommands,
};
use tokio_graceful_shutdown::SubsystemHandle;
use tracing::{debug, error, info};

use crate::{
  messenger::{Messenger, Upload},
  platform::SUPPORTED_PLATFORMS,
  relay::{Relay, GREETING},
  Result,
};

// plain words that used to be treated as commands; never a URL
const IGNORED_TEXTS: &[&str] = &["help", "start"];

#[derive(BotCommands, Clone, Debug, PartialEq)]
#[command(
  rename_rule = "lowercase",
  description = "These commands are supported:"
)]
pub enum Command {
  #[command(description = "say hello.")]
  Start,
  #[command(description = "show supported links.")]
  Help,
}

/// A single Telegram chat, answering the message that started the job.
pub struct TelegramChat {
  bot: Bot,
  chat_id: ChatId,
  reply_to: MessageId,
}

impl TelegramChat {
  pub fn new(bot: Bot, msg: &Message) -> Self {
    Self {
      bot,
      chat_id: msg.chat.id,
      reply_to: msg.id,
    }
  }
}

fn input_file(upload: &Upload) -> InputFile {
  InputFile::file(upload.path.clone()).file_name(upload.file_name.clone())
}

#[async_trait]
impl Messenger for TelegramChat {
  type Status = MessageId;

  async fn reply(&self, text: &str) -> Result<MessageId> {
    let sent = self
      .bot
      .send_message(self.chat_id, text)
      .reply_parameters(ReplyParameters::new(self.reply_to))
      .await?;
    Ok(sent.id)
  }

  async fn edit(&self, status: &MessageId, text: &str) -> Result<()> {
    self
      .bot
      .edit_message_text(self.chat_id, *status, text)
      .await?;
    Ok(())
  }

  async fn send_video(&self, upload: &Upload) -> Result<()> {
    self
      .bot
      .send_video(self.chat_id, input_file(upload))
      .caption(upload.caption.clone())
      .supports_streaming(true)
      .await?;
    Ok(())
  }

  async fn send_document(&self, upload: &Upload) -> Result<()> {
    self
      .bot
      .send_document(self.chat_id, input_file(upload))
      .caption(upload.caption.clone())
      .await?;
    Ok(())
  }
}

pub fn help_text() -> String {
  format!(
    "{GREETING}\n\nSupported links: {SUPPORTED_PLATFORMS}.\n\n{}",
    Command::descriptions()
  )
}

pub fn schema() -> UpdateHandler<teloxide::RequestError> {
  Update::filter_message()
    .branch(
      dptree::entry()
        .filter_command::<Command>()
        .endpoint(on_command),
    )
    .branch(
      dptree::filter(|msg: Message| {
        msg
          .text()
          .is_some_and(|text| !IGNORED_TEXTS.contains(&text.trim()))
      })
      .endpoint(on_text),
    )
}

async fn on_command(
  bot: Bot,
  msg: Message,
  cmd: Command,
) -> ResponseResult<()> {
  let text = match cmd {
    Command::Start => GREETING.to_string(),
    Command::Help => help_text(),
  };

  bot
    .send_message(msg.chat.id, text)
    .reply_parameters(ReplyParameters::new(msg.id))
    .await?;
  Ok(())
}

async fn on_text(
  bot: Bot,
  msg: Message,
  relay: Arc<Relay>,
) -> ResponseResult<()> {
  let Some(text) = msg.text() else {
    return Ok(());
  };

  let chat = TelegramChat::new(bot, &msg);
  if let Err(e) = relay.handle(&chat, text).await {
    error!(chat = %msg.chat.id, error = %e, "failed to handle message");
  }
  Ok(())
}

/// Long-polls Telegram until shutdown is requested.
pub async fn run(
  subsys: SubsystemHandle,
  bot: Bot,
  relay: Arc<Relay>,
) -> Result<()> {
  let mut dispatcher = Dispatcher::builder(bot, schema())
    .dependencies(dptree::deps![relay])
    .default_handler(|upd| async move {
      debug!(update = ?upd.id, "unhandled update");
    })
    .error_handler(LoggingErrorHandler::with_custom_text(
      "error in update handler",
    ))
    .build();

  let token = dispatcher.shutdown_token();
  let stop = async move {
    subsys.on_shutdown_requested().await;
    info!("stopping telegram dispatcher");
    match token.shutdown() {
      Ok(done) => done.await,
      Err(e) => debug!(error = %e, "dispatcher was idle"),
    }
  };

  info!("telegram bot started");
  tokio::join!(dispatcher.dispatch(), stop);
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_commands() {
    let parse = |text: &str| Command::parse(text, "relay_bot").ok();
    assert_eq!(parse("/start"), Some(Command::Start));
    assert_eq!(parse("/help"), Some(Command::Help));
    assert!(Command::parse("https://youtu.be/x", "relay_bot").is_err());
  }

  #[test]
  fn test_help_text() {
    let help = help_text();
    assert!(help.starts_with(GREETING));
    assert!(help.contains("YouTube, Instagram, or TikTok"));
    assert!(help.contains("/start"));
  }
}
