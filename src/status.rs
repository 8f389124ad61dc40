use std::{net::SocketAddr, sync::Arc};

use axum::{
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
  routing::get,
  Json, Router,
};
use tokio_graceful_shutdown::SubsystemHandle;
use tracing::info;

use crate::{
  job::{JobId, JobInfo, JobRegistry, Snapshot},
  Error, Result,
};

pub fn router(jobs: Arc<JobRegistry>) -> Router {
  Router::new()
    .route("/health", get(health))
    .route("/jobs", get(list_jobs))
    .route("/jobs/:id", get(get_job))
    .with_state(jobs)
}

async fn health() -> impl IntoResponse {
  "ok".to_owned()
}

async fn list_jobs(State(jobs): State<Arc<JobRegistry>>) -> Json<Snapshot> {
  Json(jobs.snapshot())
}

async fn get_job(
  State(jobs): State<Arc<JobRegistry>>,
  Path(id): Path<u64>,
) -> Result<Json<JobInfo>, StatusCode> {
  jobs.get(JobId(id)).map(Json).ok_or(StatusCode::NOT_FOUND)
}

pub async fn serve(
  subsys: SubsystemHandle,
  addr: SocketAddr,
  jobs: Arc<JobRegistry>,
) -> Result<()> {
  let server = axum::Server::try_bind(&addr)
    .map_err(|e| Error::Server(format!("failed to bind {addr}: {e}")))?;

  info!(%addr, "status server listening");
  server
    .serve(router(jobs).into_make_service())
    .with_graceful_shutdown(subsys.on_shutdown_requested())
    .await
    .map_err(|e| Error::Server(e.to_string()))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{job::JobState, platform::Platform};

  #[tokio::test]
  async fn test_list_jobs() {
    let jobs = Arc::new(JobRegistry::default());
    let id = jobs.register("https://youtu.be/a", Platform::YouTube);
    jobs.register("https://tiktok.com/@a/video/1", Platform::TikTok);
    jobs.transition(id, JobState::Done);

    let Json(snapshot) = list_jobs(State(jobs)).await;
    assert_eq!(snapshot.active.len(), 1);
    assert_eq!(snapshot.active[0].platform, Platform::TikTok);
    assert_eq!(snapshot.completed, 1);
  }

  #[tokio::test]
  async fn test_get_job() {
    let jobs = Arc::new(JobRegistry::default());
    let id = jobs.register("https://youtu.be/a", Platform::YouTube);

    let Json(job) = get_job(State(jobs.clone()), Path(id.0)).await.unwrap();
    assert_eq!(job.state, JobState::Queued);

    let missing = get_job(State(jobs), Path(99)).await;
    assert_eq!(missing.unwrap_err(), StatusCode::NOT_FOUND);
  }
}
