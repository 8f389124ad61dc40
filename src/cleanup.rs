use std::path::Path;

use tracing::{debug, info, warn};

/// Deletes every file the job with `prefix` left in `dir`. Best effort:
/// failures are logged and skipped.
pub async fn sweep(dir: &Path, prefix: &str) -> usize {
  let prefix = format!("{prefix}_");
  let mut entries = match tokio::fs::read_dir(dir).await {
    Ok(entries) => entries,
    Err(e) => {
      debug!(dir = %dir.display(), error = %e, "nothing to sweep");
      return 0;
    }
  };

  let mut removed = 0;
  loop {
    let entry = match entries.next_entry().await {
      Ok(Some(entry)) => entry,
      Ok(None) => break,
      Err(e) => {
        warn!(error = %e, "error during cleanup");
        break;
      }
    };

    if !entry.file_name().to_string_lossy().starts_with(&prefix) {
      continue;
    }

    let path = entry.path();
    match tokio::fs::remove_file(&path).await {
      Ok(()) => removed += 1,
      Err(e) => {
        warn!(path = %path.display(), error = %e, "failed to delete file")
      }
    }
  }

  removed
}

/// Removes leftovers of earlier runs and makes sure `dir` exists.
pub fn purge(dir: &Path) -> std::io::Result<()> {
  std::fs::create_dir_all(dir)?;

  let mut removed = 0;
  for entry in std::fs::read_dir(dir)? {
    let entry = entry?;
    if entry.file_type()?.is_file() {
      std::fs::remove_file(entry.path())?;
      removed += 1;
    }
  }

  if removed > 0 {
    info!(dir = %dir.display(), removed, "purged stale downloads");
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn test_sweep_only_touches_own_prefix() {
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path();
    for name in [
      "1700000000-1_clip.webm",
      "1700000000-1_clip_processed.mp4",
      "1700000000-1_tiktok_42.mp4",
      // same second, different job
      "1700000000-12_clip.mp4",
      "1700000000-2_clip.mp4",
    ] {
      std::fs::write(p.join(name), b"x").unwrap();
    }

    assert_eq!(sweep(p, "1700000000-1").await, 3);

    let mut left: Vec<_> = std::fs::read_dir(p)
      .unwrap()
      .map(|e| e.unwrap().file_name().into_string().unwrap())
      .collect();
    left.sort();
    assert_eq!(left, ["1700000000-12_clip.mp4", "1700000000-2_clip.mp4"]);
  }

  #[tokio::test]
  async fn test_sweep_missing_dir() {
    let dir = tempfile::tempdir().unwrap();
    assert_eq!(sweep(&dir.path().join("nope"), "1-1").await, 0);
  }

  #[test]
  fn test_purge() {
    let dir = tempfile::tempdir().unwrap();
    let downloads = dir.path().join("downloads");
    purge(&downloads).unwrap();
    assert!(downloads.is_dir());

    std::fs::write(downloads.join("old.mp4"), b"x").unwrap();
    std::fs::create_dir(downloads.join("keep")).unwrap();
    purge(&downloads).unwrap();
    assert!(!downloads.join("old.mp4").exists());
    assert!(downloads.join("keep").is_dir());
  }
}
