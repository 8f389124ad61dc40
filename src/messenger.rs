use std::path::PathBuf;

use async_trait::async_trait;

use crate::Result;

/// A file ready to go back to the user.
#[derive(Debug, Clone)]
pub struct Upload {
  pub path: PathBuf,
  pub file_name: String,
  pub caption: String,
}

/// Outbound side of one conversation.
#[async_trait]
pub trait Messenger: Send + Sync {
  /// Handle to a message that can be edited later.
  type Status: Send + Sync;

  async fn reply(&self, text: &str) -> Result<Self::Status>;

  async fn edit(&self, status: &Self::Status, text: &str) -> Result<()>;

  async fn send_video(&self, upload: &Upload) -> Result<()>;

  async fn send_document(&self, upload: &Upload) -> Result<()>;
}
