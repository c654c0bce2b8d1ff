use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::error::AppError;
use super::types::SourceKind;

/// ジョブ状態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Submitted,
    Running,
    Done,
    Error,
    Rejected,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::Running => "running",
            Self::Done => "done",
            Self::Error => "error",
            Self::Rejected => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error | Self::Rejected)
    }

    /// 許可された遷移のみ true
    ///
    /// ```text
    /// Submitted -> Running | Done | Error
    /// Running   -> Running | Done | Error | Rejected
    /// ```
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Submitted, Running)
                | (Submitted, Done)
                | (Submitted, Error)
                | (Running, Running)
                | (Running, Done)
                | (Running, Error)
                | (Running, Rejected)
        )
    }
}

/// ジョブ種別（どのバックエンドが受理したか）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobMode {
    Synchronous,
    Asynchronous,
}

/// 状態遷移の記録
#[derive(Debug, Clone, Serialize)]
pub struct JobTransition {
    pub local_id: Uuid,
    pub job_id: Option<String>,
    pub prev_status: JobStatus,
    pub new_status: JobStatus,
    pub timestamp: DateTime<Utc>,
}

/// 1 件の文字起こしリクエスト
#[derive(Debug, Clone, Serialize)]
pub struct Job {
    /// クライアント側の識別子（バックエンド ID が付く前から存在する）
    pub local_id: Uuid,
    /// バックエンドが採番した ID。投入前は None
    pub id: Option<String>,
    pub mode: Option<JobMode>,
    pub status: JobStatus,
    /// バックエンドの生ステータス文字列（表示用）
    pub backend_status: Option<String>,
    pub result: Option<String>,
    pub error_message: Option<String>,
    pub source_kind: SourceKind,
    pub source_label: String,
    pub language: String,
    pub poll_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn submitted(
        local_id: Uuid,
        source_kind: SourceKind,
        source_label: impl Into<String>,
        language: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            local_id,
            id: None,
            mode: None,
            status: JobStatus::Submitted,
            backend_status: None,
            result: None,
            error_message: None,
            source_kind,
            source_label: source_label.into(),
            language: language.into(),
            poll_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// 非同期バックエンドが ID を返した: Submitted → Running
    pub fn accept_async(
        &mut self,
        job_id: String,
        now: DateTime<Utc>,
    ) -> Result<JobTransition, AppError> {
        let transition = self.transition(JobStatus::Running, now)?;
        self.id = Some(job_id.clone());
        self.mode = Some(JobMode::Asynchronous);
        Ok(JobTransition {
            job_id: Some(job_id),
            ..transition
        })
    }

    /// 同期バックエンドが結果を返した: Submitted → Done
    pub fn complete_sync(
        &mut self,
        result: String,
        now: DateTime<Utc>,
    ) -> Result<JobTransition, AppError> {
        if self.status != JobStatus::Submitted {
            return Err(AppError::invalid_state(format!(
                "同期完了は {} 状態では適用できません",
                self.status.as_str()
            )));
        }
        let transition = self.transition(JobStatus::Done, now)?;
        self.mode = Some(JobMode::Synchronous);
        self.result = Some(result);
        Ok(transition)
    }

    /// ポーリングで中間状態を受信した: Running → Running
    pub fn record_progress(
        &mut self,
        raw_status: &str,
        now: DateTime<Utc>,
    ) -> Result<JobTransition, AppError> {
        if self.status != JobStatus::Running {
            return Err(AppError::invalid_state(format!(
                "進捗は {} 状態では記録できません",
                self.status.as_str()
            )));
        }
        let transition = self.transition(JobStatus::Running, now)?;
        self.backend_status = Some(raw_status.to_string());
        self.poll_count += 1;
        Ok(transition)
    }

    /// ポーリングで完了を受信した: Running → Done
    pub fn complete(
        &mut self,
        result: String,
        now: DateTime<Utc>,
    ) -> Result<JobTransition, AppError> {
        if self.status != JobStatus::Running {
            return Err(AppError::invalid_state(format!(
                "完了は {} 状態では適用できません",
                self.status.as_str()
            )));
        }
        let transition = self.transition(JobStatus::Done, now)?;
        self.backend_status = Some("done".to_string());
        self.result = Some(result);
        self.poll_count += 1;
        Ok(transition)
    }

    /// Error / Rejected への遷移
    pub fn fail(
        &mut self,
        status: JobStatus,
        message: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<JobTransition, AppError> {
        if !matches!(status, JobStatus::Error | JobStatus::Rejected) {
            return Err(AppError::internal(format!(
                "fail には error/rejected のみ指定できます: {}",
                status.as_str()
            )));
        }
        let transition = self.transition(status, now)?;
        self.error_message = Some(message.into());
        Ok(transition)
    }

    fn transition(
        &mut self,
        next: JobStatus,
        now: DateTime<Utc>,
    ) -> Result<JobTransition, AppError> {
        if !self.status.can_transition_to(next) {
            return Err(AppError::invalid_state(format!(
                "ジョブ状態 {} から {} へは遷移できません",
                self.status.as_str(),
                next.as_str()
            )));
        }
        let prev = self.status;
        self.status = next;
        self.updated_at = now;
        Ok(JobTransition {
            local_id: self.local_id,
            job_id: self.id.clone(),
            prev_status: prev,
            new_status: next,
            timestamp: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_job() -> Job {
        Job::submitted(
            Uuid::new_v4(),
            SourceKind::DirectUrl,
            "https://x/video",
            "en",
            Utc::now(),
        )
    }

    #[test]
    fn test_async_lifecycle() {
        let mut job = new_job();
        let t = job.accept_async("j1".into(), Utc::now()).unwrap();
        assert_eq!(t.prev_status, JobStatus::Submitted);
        assert_eq!(t.new_status, JobStatus::Running);
        assert_eq!(job.id.as_deref(), Some("j1"));
        assert_eq!(job.mode, Some(JobMode::Asynchronous));

        job.record_progress("transcribing", Utc::now()).unwrap();
        assert_eq!(job.backend_status.as_deref(), Some("transcribing"));
        assert_eq!(job.status, JobStatus::Running);

        job.complete("1\n00:00:00,000 --> 00:00:01,000\nHi\n".into(), Utc::now())
            .unwrap();
        assert_eq!(job.status, JobStatus::Done);
        assert!(job.result.is_some());
        assert_eq!(job.poll_count, 2);
    }

    #[test]
    fn test_sync_completion() {
        let mut job = new_job();
        job.complete_sync("subs".into(), Utc::now()).unwrap();
        assert_eq!(job.status, JobStatus::Done);
        assert_eq!(job.mode, Some(JobMode::Synchronous));
        assert!(job.id.is_none());
    }

    #[test]
    fn test_terminal_job_is_immutable() {
        let mut job = new_job();
        job.accept_async("j1".into(), Utc::now()).unwrap();
        job.fail(JobStatus::Rejected, "quota exceeded", Utc::now())
            .unwrap();

        let err = job.complete("late".into(), Utc::now()).unwrap_err();
        assert_eq!(err.code, crate::domain::error::ErrorCode::InvalidState);
        assert!(job.record_progress("running", Utc::now()).is_err());
        assert!(job.fail(JobStatus::Error, "x", Utc::now()).is_err());
        assert_eq!(job.status, JobStatus::Rejected);
        assert_eq!(job.error_message.as_deref(), Some("quota exceeded"));
        assert!(job.result.is_none());
    }

    #[test]
    fn test_rejected_requires_running() {
        let mut job = new_job();
        assert!(job.fail(JobStatus::Rejected, "no", Utc::now()).is_err());
        assert!(job.fail(JobStatus::Error, "submit failed", Utc::now()).is_ok());
    }

    #[test]
    fn test_sync_result_not_accepted_while_running() {
        let mut job = new_job();
        job.accept_async("j1".into(), Utc::now()).unwrap();
        assert!(job.complete_sync("x".into(), Utc::now()).is_err());
        assert!(job.record_progress("queued", Utc::now()).is_ok());
    }

    #[test]
    fn test_transition_table() {
        use JobStatus::*;
        for terminal in [Done, Error, Rejected] {
            for next in [Submitted, Running, Done, Error, Rejected] {
                assert!(!terminal.can_transition_to(next));
            }
        }
        assert!(!Submitted.can_transition_to(Rejected));
        assert!(!Running.can_transition_to(Submitted));
    }

    #[test]
    fn test_fail_rejects_non_failure_status() {
        let mut job = new_job();
        let err = job.fail(JobStatus::Done, "x", Utc::now()).unwrap_err();
        assert_eq!(err.code, crate::domain::error::ErrorCode::Internal);
    }
}
