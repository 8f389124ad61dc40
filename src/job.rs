use std::{
  collections::HashMap,
  fmt,
  sync::{
    atomic::{AtomicU64, Ordering},
    PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard,
  },
};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::platform::Platform;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct JobId(pub u64);

impl fmt::Display for JobId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "lowercase")]
pub enum JobState {
  Queued,
  Extracting,
  Transcoding,
  Sending,
  Done,
  Failed(String),
}

impl JobState {
  pub fn is_finished(&self) -> bool {
    matches!(self, JobState::Done | JobState::Failed(_))
  }
}

#[derive(Debug, Clone, Serialize)]
pub struct JobInfo {
  pub id: JobId,
  pub url: String,
  pub platform: Platform,
  #[serde(flatten)]
  pub state: JobState,
  pub started_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct Snapshot {
  pub active: Vec<JobInfo>,
  pub completed: u64,
  pub failed: u64,
}

/// In-flight jobs, plus counters for the ones that already left.
#[derive(Debug, Default)]
pub struct JobRegistry {
  next_id: AtomicU64,
  jobs: RwLock<HashMap<JobId, JobInfo>>,
  completed: AtomicU64,
  failed: AtomicU64,
}

impl JobRegistry {
  // every write leaves the map consistent, so a poisoned lock is still usable
  fn read(&self) -> RwLockReadGuard<'_, HashMap<JobId, JobInfo>> {
    self.jobs.read().unwrap_or_else(PoisonError::into_inner)
  }

  fn write(&self) -> RwLockWriteGuard<'_, HashMap<JobId, JobInfo>> {
    self.jobs.write().unwrap_or_else(PoisonError::into_inner)
  }

  pub fn register(&self, url: &str, platform: Platform) -> JobId {
    let id = JobId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
    let now = Utc::now();
    let info = JobInfo {
      id,
      url: url.to_string(),
      platform,
      state: JobState::Queued,
      started_at: now,
      updated_at: now,
    };

    self.write().insert(id, info);
    id
  }

  /// Moves a job to `state`. Finished jobs are dropped from the active
  /// set and counted.
  pub fn transition(&self, id: JobId, state: JobState) {
    let mut jobs = self.write();

    if state.is_finished() {
      if jobs.remove(&id).is_some() {
        let counter = match state {
          JobState::Done => &self.completed,
          _ => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
      }
      return;
    }

    if let Some(job) = jobs.get_mut(&id) {
      job.state = state;
      job.updated_at = Utc::now();
    }
  }

  pub fn get(&self, id: JobId) -> Option<JobInfo> {
    self.read().get(&id).cloned()
  }

  pub fn snapshot(&self) -> Snapshot {
    let mut active: Vec<_> = self.read().values().cloned().collect();
    active.sort_by_key(|job| job.id.0);

    Snapshot {
      active,
      completed: self.completed.load(Ordering::Relaxed),
      failed: self.failed.load(Ordering::Relaxed),
    }
  }
}
