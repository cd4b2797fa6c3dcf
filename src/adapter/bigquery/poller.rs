//! Async Job Polling
//!
//! 非同期ジョブのポーリング
//!
//! Drives submitted warehouse jobs to a terminal state by reloading their
//! status at a fixed interval. The remote jobs run concurrently server-side;
//! polling from this side is intentionally serialized round-robin to keep
//! aggregate polling pressure constant regardless of batch size.

use std::collections::VecDeque;
use std::time::Duration;

use log::{debug, info};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use google_cloud_bigquery::http::job::{Job, JobState as RemoteState, JobStatus};

use crate::adapter::bigquery::client::WarehouseService;
use crate::domain::entities::remote_job::{JobFailure, JobHandle, JobState};
use crate::error::{Result, TransferError};

/// デフォルトのポーリング間隔
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Generate a random job id, hex-encoded.
pub fn random_job_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Map a reloaded remote status onto the domain state machine. A DONE job
/// carrying an error payload is a failure.
fn interpret(status: &JobStatus) -> (JobState, Option<JobFailure>) {
    match &status.state {
        RemoteState::Pending => (JobState::Pending, None),
        RemoteState::Running => (JobState::Running, None),
        RemoteState::Done => match &status.error_result {
            Some(error) => (
                JobState::Failed,
                Some(JobFailure {
                    reason: error.reason.clone().unwrap_or_default(),
                    message: error.message.clone().unwrap_or_default(),
                }),
            ),
            None => (JobState::Done, None),
        },
    }
}

fn failure_error(handle: &JobHandle) -> TransferError {
    let failure = handle.failure().cloned().unwrap_or_else(|| JobFailure {
        reason: "unknown".to_string(),
        message: "job failed without an error payload".to_string(),
    });
    TransferError::job(handle.id(), failure.reason, failure.message)
}

/// 所有権排他のインフライトジョブ集合
///
/// ポーラーループだけが変更し、同じジョブを複数のポーラーで共有しない。
#[derive(Debug, Default)]
pub struct JobQueue {
    jobs: VecDeque<JobHandle>,
}

impl JobQueue {
    /// 空のキューを作成
    pub fn new() -> Self {
        Self::default()
    }

    /// ジョブを追加
    pub fn push(&mut self, handle: JobHandle) {
        self.jobs.push_back(handle);
    }

    /// キュー内のジョブ数を返す
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// キューが空かどうかを返す
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

/// 終端状態に達したジョブの結果
pub type PolledJob = (JobHandle, Result<Job>);

/// ジョブポーラー
///
/// 送信済みジョブを終端状態まで駆動する。キャンセルトークンにより
/// 長時間のポーリングを途中で中断できる。
pub struct JobPoller<'a, S: WarehouseService + ?Sized> {
    service: &'a S,
    interval: Duration,
    cancel: CancellationToken,
}

impl<'a, S: WarehouseService + ?Sized> JobPoller<'a, S> {
    /// 新しいポーラーを作成
    pub fn new(service: &'a S, interval: Duration) -> Self {
        Self {
            service,
            interval,
            cancel: CancellationToken::new(),
        }
    }

    /// キャンセルトークンを差し替える
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    async fn wait(&self, duration: Duration) -> Result<()> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(TransferError::Cancelled),
            _ = sleep(duration) => Ok(()),
        }
    }

    /// Issue the remote begin call. A synchronous rejection, or an error
    /// payload on the created job, surfaces as a submission error.
    pub async fn submit(&self, job: Job) -> Result<(JobHandle, Job)> {
        let created = self
            .service
            .create_job(job)
            .await
            .map_err(|e| TransferError::Submission(e.to_string()))?;

        if let Some(error) = &created.status.error_result {
            return Err(TransferError::Submission(format!(
                "{}: {}",
                error.reason.clone().unwrap_or_default(),
                error.message.clone().unwrap_or_default(),
            )));
        }

        let (state, _) = interpret(&created.status);
        let handle = JobHandle::new(
            created.job_reference.job_id.clone(),
            created.job_reference.location.clone(),
            state,
        );
        debug!("submitted job {} in state {:?}", handle.id(), state);
        Ok((handle, created))
    }

    /// Reload remote status at interval-spaced steps until the job is
    /// terminal. Returns the final job resource on success; a failed job
    /// surfaces as an error carrying the remote payload.
    ///
    /// # Panics
    ///
    /// Panics if the handle is already terminal; a terminal job must not be
    /// re-polled.
    pub async fn poll_until_terminal(&self, handle: &mut JobHandle) -> Result<Job> {
        assert!(
            !handle.is_terminal(),
            "job {} is already terminal and must not be re-polled",
            handle.id()
        );

        loop {
            self.wait(self.interval).await?;
            let job = self.reload(handle).await?;
            if handle.is_terminal() {
                return match handle.state() {
                    JobState::Failed => Err(failure_error(handle)),
                    _ => Ok(job),
                };
            }
        }
    }

    /// Submit a job and drive it to completion.
    pub async fn run(&self, job: Job) -> Result<Job> {
        let (mut handle, created) = self.submit(job).await?;
        if handle.is_terminal() {
            // Completed synchronously; the creation response is final.
            return match handle.state() {
                JobState::Failed => Err(failure_error(&handle)),
                _ => Ok(created),
            };
        }
        self.poll_until_terminal(&mut handle).await
    }

    /// Poll a batch of jobs round-robin: reload the oldest non-terminal
    /// job, sleep a fraction of the interval proportional to the queue
    /// size, re-enqueue it if still running, collect it when terminal.
    /// Results are returned in completion order; a failed job does not
    /// abort the rest of the batch.
    pub async fn poll_queue(&self, mut queue: JobQueue) -> Result<Vec<PolledJob>> {
        let mut completed = Vec::with_capacity(queue.len());

        while let Some(mut handle) = queue.jobs.pop_front() {
            let in_flight = (queue.len() + 1) as u32;
            self.wait(self.interval / in_flight).await?;

            match self.reload(&mut handle).await {
                Ok(job) => {
                    if handle.is_terminal() {
                        let result = match handle.state() {
                            JobState::Failed => Err(failure_error(&handle)),
                            _ => Ok(job),
                        };
                        let elapsed =
                            chrono::Utc::now().signed_duration_since(handle.submitted_at());
                        info!(
                            "job {} finished in state {:?} after {}s",
                            handle.id(),
                            handle.state(),
                            elapsed.num_seconds()
                        );
                        completed.push((handle, result));
                    } else {
                        queue.jobs.push_back(handle);
                    }
                }
                Err(e) => {
                    // Reload failure is a per-job transport error, not a
                    // batch abort.
                    completed.push((handle, Err(e)));
                }
            }
        }

        Ok(completed)
    }

    async fn reload(&self, handle: &mut JobHandle) -> Result<Job> {
        let job = self
            .service
            .get_job(handle.id(), handle.location())
            .await?;
        let (state, failure) = interpret(&job.status);
        handle.transition(state, failure);
        Ok(job)
    }
}
