use super::CancelHandle;
use crate::error::{ RelayError, Result };
use crate::models::image::{ TaskCreated, TaskPoll, TaskStatus };
use async_trait::async_trait;
use log::{ debug, info, warn };
use reqwest::Client as HttpClient;
use serde_json::Value;
use std::time::Duration;

/// Default interval between task-status polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2000);

/// Where task-status polls go. Split out so the polling loop runs against
/// scripted responses in tests.
#[async_trait]
pub trait TaskSource: Send + Sync {
    async fn fetch(&self, task_id: &str) -> Result<TaskPoll>;
}

/// Task endpoints exposed by the relay.
pub struct RelayTasks {
    http: HttpClient,
    base_url: String,
}

impl RelayTasks {
    /// `base_url` is the relay root, e.g. `http://127.0.0.1:7777`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { http: HttpClient::new(), base_url: base_url.into() }
    }

    /// Submits an image-synthesis request and returns the upstream task id.
    pub async fn create_task(&self, body: Value) -> Result<String> {
        let url = format!(
            "{}/api/v1/services/aigc/text2image/image-synthesis",
            self.base_url.trim_end_matches('/')
        );
        let resp = self.http.post(&url).json(&body).send().await?.error_for_status()?;
        let created = resp.json::<TaskCreated>().await?;

        created.output
            .map(|o| o.task_id)
            .filter(|id| !id.is_empty())
            .ok_or(RelayError::MissingTaskId)
    }
}

#[async_trait]
impl TaskSource for RelayTasks {
    async fn fetch(&self, task_id: &str) -> Result<TaskPoll> {
        let url = format!("{}/api/v1/tasks/{}", self.base_url.trim_end_matches('/'), task_id);
        let resp = self.http.get(&url).send().await?.error_for_status()?;
        Ok(resp.json::<TaskPoll>().await?)
    }
}

/// Polls a task until it reaches a terminal status.
///
/// SUCCEEDED resolves to the first result URL. FAILED stops the loop with an
/// error; no further requests are issued for that task id. Any other status
/// waits out the interval and polls again. A fetch failure aborts the loop
/// without retry.
pub async fn poll_task<S: TaskSource + ?Sized>(
    source: &S,
    task_id: &str,
    interval: Duration,
    cancel: &CancelHandle
) -> Result<String> {
    loop {
        if cancel.is_cancelled() {
            return Err(RelayError::Cancelled);
        }

        let poll = source.fetch(task_id).await?;
        let output = poll.output.ok_or_else(||
            RelayError::Upstream(format!("task {} poll returned no output", task_id))
        )?;

        match output.task_status {
            TaskStatus::Succeeded => {
                let url = output.results
                    .into_iter()
                    .find_map(|r| r.url)
                    .ok_or_else(|| RelayError::MissingResultUrl(task_id.to_string()))?;
                info!("Task {} succeeded: {}", task_id, url);
                return Ok(url);
            }
            TaskStatus::Failed => {
                warn!("Task {} failed upstream", task_id);
                return Err(RelayError::TaskFailed(task_id.to_string()));
            }
            status => {
                debug!("Task {} still {:?}, polling again", task_id, status);
            }
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(RelayError::Cancelled);
            }
            _ = tokio::time::sleep(interval) => {}
        }
    }
}
