//! # Remote Job State Machine
//!
//! リモート非同期ジョブの状態遷移モデル

use chrono::{DateTime, Utc};

/// リモートジョブの状態
///
/// 遷移は前方のみ: `Pending -> Running -> {Done | Failed}`。
/// 高速に完了するジョブのために中間状態の省略は許容する
/// （例: `Pending -> Done`）。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// サーバが受理し、まだ実行を開始していない
    Pending,
    /// 実行中
    Running,
    /// 正常終了（終端状態）
    Done,
    /// 異常終了（終端状態）
    Failed,
}

impl JobState {
    /// 終端状態かどうかを返す
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Done | JobState::Failed)
    }

    /// Ordering rank used to enforce forward-only transitions.
    fn rank(&self) -> u8 {
        match self {
            JobState::Pending => 0,
            JobState::Running => 1,
            JobState::Done | JobState::Failed => 2,
        }
    }
}

/// リモートサービスが返す構造化エラーペイロード
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobFailure {
    /// 失敗理由コード
    pub reason: String,
    /// 失敗メッセージ
    pub message: String,
}

/// 実行中のリモートジョブへのハンドル
///
/// submit時に作成され、ポーリング（reload）によってのみ状態が進む。
/// 終端状態に達したハンドルを再ポーリングするのはプログラミングエラー。
#[derive(Debug, Clone)]
pub struct JobHandle {
    id: String,
    location: Option<String>,
    state: JobState,
    failure: Option<JobFailure>,
    submitted_at: DateTime<Utc>,
}

impl JobHandle {
    /// submit直後のハンドルを作成
    pub fn new(id: impl Into<String>, location: Option<String>, state: JobState) -> Self {
        Self {
            id: id.into(),
            location,
            state,
            failure: None,
            submitted_at: Utc::now(),
        }
    }

    /// ジョブIDを返す
    pub fn id(&self) -> &str {
        &self.id
    }

    /// ジョブのロケーションを返す
    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    /// 現在の状態を返す
    pub fn state(&self) -> JobState {
        self.state
    }

    /// 終端状態かどうかを返す
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// 失敗ペイロードを返す（Failed時のみ）
    pub fn failure(&self) -> Option<&JobFailure> {
        self.failure.as_ref()
    }

    /// submitされた時刻を返す
    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }

    /// Advance the state machine with a freshly reloaded remote state.
    ///
    /// # Panics
    ///
    /// Panics if the handle is already terminal (a terminal job must never
    /// be re-polled) or if the transition would move backwards.
    pub fn transition(&mut self, next: JobState, failure: Option<JobFailure>) {
        assert!(
            !self.state.is_terminal(),
            "job {} already reached terminal state {:?} and must not be re-polled",
            self.id,
            self.state
        );
        assert!(
            next.rank() >= self.state.rank(),
            "job {} cannot move backwards from {:?} to {:?}",
            self.id,
            self.state,
            next
        );
        self.state = next;
        if next == JobState::Failed {
            self.failure = failure;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_transitions_to_done() {
        let mut handle = JobHandle::new("job-1", None, JobState::Pending);
        handle.transition(JobState::Running, None);
        handle.transition(JobState::Done, None);
        assert!(handle.is_terminal());
        assert_eq!(handle.state(), JobState::Done);
        assert!(handle.failure().is_none());
    }

    #[test]
    fn test_forward_transitions_to_failed() {
        let mut handle = JobHandle::new("job-2", Some("US".to_string()), JobState::Pending);
        handle.transition(JobState::Running, None);
        handle.transition(
            JobState::Failed,
            Some(JobFailure {
                reason: "invalidQuery".to_string(),
                message: "Syntax error".to_string(),
            }),
        );
        assert!(handle.is_terminal());
        assert_eq!(handle.failure().unwrap().reason, "invalidQuery");
    }

    #[test]
    fn test_fast_job_may_skip_running() {
        let mut handle = JobHandle::new("job-3", None, JobState::Pending);
        handle.transition(JobState::Done, None);
        assert!(handle.is_terminal());
    }

    #[test]
    fn test_state_may_stay_put_while_running() {
        let mut handle = JobHandle::new("job-4", None, JobState::Running);
        handle.transition(JobState::Running, None);
        assert_eq!(handle.state(), JobState::Running);
    }

    #[test]
    #[should_panic(expected = "must not be re-polled")]
    fn test_polling_terminal_job_panics() {
        let mut handle = JobHandle::new("job-5", None, JobState::Done);
        handle.transition(JobState::Done, None);
    }

    #[test]
    #[should_panic(expected = "cannot move backwards")]
    fn test_backwards_transition_panics() {
        let mut handle = JobHandle::new("job-6", None, JobState::Running);
        handle.transition(JobState::Pending, None);
    }

    #[test]
    fn test_terminal_detection() {
        assert!(!JobState::Pending.is_terminal());
        assert!(!JobState::Running.is_terminal());
        assert!(JobState::Done.is_terminal());
        assert!(JobState::Failed.is_terminal());
    }
}
