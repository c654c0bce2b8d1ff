use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::watch;
use uuid::Uuid;

use super::busy::{BusyFlag, BusyHolder};
use crate::domain::error::{AppError, ErrorCode};
use crate::domain::events::UiEvent;
use crate::domain::job::{Job, JobStatus};
use crate::domain::settings::ClientSettings;
use crate::domain::subtitle::SubtitleDocument;
use crate::domain::types::{BackendStatus, Credential, JobSource, PollResponse, SubmitOutcome};
use crate::infra::gateway::{validate_submission, BackendGateway, GatewayError};
use crate::infra::metrics::{LatencyPhase, Metrics};
use crate::infra::presenter::StatusSink;
use crate::infra::scheduler::{schedule, ScheduledTask};

const GENERIC_FAILURE: &str = "文字起こしに失敗しました";
const GENERIC_REJECTED: &str = "バックエンドがジョブを拒否しました";

/// ポーリング設定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    /// None = 無制限
    pub max_attempts: Option<u32>,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_attempts: None,
        }
    }
}

impl From<&ClientSettings> for PollSettings {
    fn from(settings: &ClientSettings) -> Self {
        Self {
            interval: settings.poll_interval(),
            max_attempts: settings.max_poll_attempts,
        }
    }
}

/// 1 件の非同期ジョブに紐づくポーリング
#[derive(Debug)]
pub struct PollSession {
    pub id: Uuid,
    pub local_id: Uuid,
    pub job_id: String,
    pub attempts: u32,
    task: ScheduledTask,
}

impl PollSession {
    fn cancel(&self) {
        self.task.cancel();
    }
}

/// コントローラの可変状態。現在のジョブとポーリングセッション（最大 1 件）。
#[derive(Debug, Default)]
pub struct ControllerState {
    current: Option<Job>,
    session: Option<PollSession>,
}

#[derive(Debug, Clone, Copy)]
enum LaunchMode {
    Fresh,
    Supersede,
}

enum Submission {
    Completed(Job),
    Polling(Job),
    Failed(Job, AppError),
}

enum PollStep {
    Progress(Job),
    Finished(Job),
}

/// ジョブライフサイクルコントローラ
#[derive(Clone)]
pub struct JobController {
    inner: Arc<ControllerInner>,
}

struct ControllerInner {
    gateway: Arc<dyn BackendGateway>,
    busy: BusyFlag,
    sink: Arc<dyn StatusSink>,
    metrics: Arc<Metrics>,
    poll: PollSettings,
    state: Mutex<ControllerState>,
    current_tx: watch::Sender<Option<Job>>,
}

impl JobController {
    pub fn new(
        gateway: Arc<dyn BackendGateway>,
        busy: BusyFlag,
        sink: Arc<dyn StatusSink>,
        metrics: Arc<Metrics>,
        poll: PollSettings,
    ) -> Self {
        let (current_tx, _) = watch::channel(None);
        Self {
            inner: Arc::new(ControllerInner {
                gateway,
                busy,
                sink,
                metrics,
                poll,
                state: Mutex::new(ControllerState::default()),
                current_tx,
            }),
        }
    }

    /// 現在のジョブの変化を購読する
    pub fn subscribe(&self) -> watch::Receiver<Option<Job>> {
        self.inner.current_tx.subscribe()
    }

    pub fn current(&self) -> Option<Job> {
        self.inner.state.lock().current.clone()
    }

    pub fn is_polling(&self) -> bool {
        self.inner.state.lock().session.is_some()
    }

    pub fn active_session_id(&self) -> Option<Uuid> {
        self.inner.state.lock().session.as_ref().map(|s| s.id)
    }

    pub fn busy(&self) -> &BusyFlag {
        &self.inner.busy
    }

    /// 新しいジョブを開始する。busy 中は BusyError。
    pub async fn start_job(
        &self,
        source: JobSource,
        credential: Credential,
        language: &str,
    ) -> Result<Job, AppError> {
        self.launch(source, credential, language, LaunchMode::Fresh)
            .await
    }

    /// 実行中のジョブを破棄して新しいジョブを開始する。
    /// 翻訳の実行中は BusyError。
    pub async fn replace_job(
        &self,
        source: JobSource,
        credential: Credential,
        language: &str,
    ) -> Result<Job, AppError> {
        self.launch(source, credential, language, LaunchMode::Supersede)
            .await
    }

    /// 現在のジョブの追跡をやめる（ページ離脱相当）
    pub fn cancel(&self) -> bool {
        let inner = &self.inner;
        let job = {
            let mut state = inner.state.lock();
            if let Some(session) = state.session.take() {
                session.cancel();
            }
            let job = state.current.take();
            if job.is_some() {
                inner.current_tx.send_replace(None);
            }
            job
        };

        let Some(job) = job else {
            return false;
        };
        inner.release_busy(BusyHolder::Job(job.local_id));
        if !job.is_terminal() {
            inner.metrics.inc_jobs_cancelled();
            log::info!("ジョブをキャンセル: {}", job.local_id);
            inner
                .sink
                .emit(UiEvent::warning("ジョブの追跡を中止しました"));
        }
        true
    }

    async fn launch(
        &self,
        source: JobSource,
        credential: Credential,
        language: &str,
        mode: LaunchMode,
    ) -> Result<Job, AppError> {
        let inner = &self.inner;

        if let Err(e) = validate_submission(&source, &credential) {
            let err = AppError::from(e);
            inner.report_error(&err);
            return Err(err);
        }

        let local_id = Uuid::new_v4();
        let holder = BusyHolder::Job(local_id);
        let acquired = match mode {
            LaunchMode::Fresh => inner.busy.try_acquire(holder).map(|_| true),
            LaunchMode::Supersede => inner.supersede(holder),
        };
        match acquired {
            Ok(true) => inner.sink.emit(UiEvent::BusyChanged { busy: true }),
            Ok(false) => {}
            Err(err) => {
                inner.report_error(&err);
                return Err(err);
            }
        }

        let job = Job::submitted(
            local_id,
            source.kind(),
            source.label(),
            language,
            Utc::now(),
        );
        {
            let mut state = inner.state.lock();
            if let Some(session) = state.session.take() {
                session.cancel();
            }
            state.current = Some(job.clone());
            inner.current_tx.send_replace(Some(job.clone()));
        }
        inner.sink.emit(UiEvent::JobChanged { job: job.clone() });
        inner
            .sink
            .emit(UiEvent::info(format!("ジョブを送信中: {}", source.label())));
        inner.metrics.inc_jobs_started();
        log::info!("ジョブ送信: {local_id} ({:?}, {language})", source.kind());

        let outcome = inner.gateway.submit_job(&source, &credential, language).await;

        match inner.record_submission(local_id, outcome, credential) {
            Ok(Submission::Completed(job)) => {
                inner.finish(&job);
                Ok(job)
            }
            Ok(Submission::Polling(job)) => {
                inner.sink.emit(UiEvent::JobChanged { job: job.clone() });
                inner.sink.emit(UiEvent::info(format!(
                    "ジョブを受け付けました (ID: {})。ステータスを確認中...",
                    job.id.as_deref().unwrap_or("-")
                )));
                Ok(job)
            }
            Ok(Submission::Failed(job, err)) => {
                inner.finish(&job);
                inner.report_error(&err);
                Err(err)
            }
            Err(err) => {
                inner.release_busy(holder);
                Err(err)
            }
        }
    }
}

impl ControllerInner {
    /// 翻訳中でなければ busy を新ジョブへ引き継ぎ、旧セッションを無効化する。
    /// 新たに取得した場合は true。
    fn supersede(&self, holder: BusyHolder) -> Result<bool, AppError> {
        let mut state = self.state.lock();
        match self.busy.holder() {
            Some(prev @ BusyHolder::Job(prev_id)) => {
                if !self.busy.handover(prev, holder) {
                    return self.busy.try_acquire(holder).map(|_| true);
                }
                if let Some(session) = state.session.take() {
                    session.cancel();
                }
                self.metrics.inc_jobs_cancelled();
                log::info!("ジョブ {prev_id} を新しいジョブで置き換え");
                Ok(false)
            }
            _ => self.busy.try_acquire(holder).map(|_| true),
        }
    }

    fn record_submission(
        self: &Arc<Self>,
        local_id: Uuid,
        outcome: Result<SubmitOutcome, GatewayError>,
        credential: Credential,
    ) -> Result<Submission, AppError> {
        let mut state = self.state.lock();
        let ControllerState { current, session } = &mut *state;

        let Some(job) = current.as_mut().filter(|j| j.local_id == local_id) else {
            log::info!("破棄済みジョブの送信応答を無視: {local_id}");
            return Err(AppError::invalid_state("ジョブはキャンセルされました"));
        };

        let now = Utc::now();
        let submission = match outcome {
            Ok(SubmitOutcome::Completed { result }) => {
                job.complete_sync(result, now)?;
                Submission::Completed(job.clone())
            }
            Ok(SubmitOutcome::Accepted { job_id }) => {
                job.accept_async(job_id.clone(), now)?;

                let session_id = Uuid::new_v4();
                let weak = Arc::downgrade(self);
                let poll_job_id = job_id.clone();
                let task = schedule(self.poll.interval, move || {
                    let weak = weak.clone();
                    let job_id = poll_job_id.clone();
                    let credential = credential.clone();
                    async move {
                        match weak.upgrade() {
                            Some(inner) => inner.poll_once(session_id, &job_id, &credential).await,
                            None => ControlFlow::Break(()),
                        }
                    }
                });
                *session = Some(PollSession {
                    id: session_id,
                    local_id,
                    job_id,
                    attempts: 0,
                    task,
                });
                Submission::Polling(job.clone())
            }
            Err(e) => {
                let err = AppError::from(e);
                job.fail(JobStatus::Error, err.message.clone(), now)?;
                Submission::Failed(job.clone(), err)
            }
        };

        let snapshot = match &submission {
            Submission::Completed(job) | Submission::Polling(job) | Submission::Failed(job, _) => {
                job.clone()
            }
        };
        self.current_tx.send_replace(Some(snapshot));
        Ok(submission)
    }

    async fn poll_once(
        &self,
        session_id: Uuid,
        job_id: &str,
        credential: &Credential,
    ) -> ControlFlow<()> {
        let attempt = {
            let mut state = self.state.lock();
            match state.session.as_mut() {
                Some(s) if s.id == session_id => {
                    s.attempts += 1;
                    s.attempts
                }
                _ => return ControlFlow::Break(()),
            }
        };

        self.metrics.inc_polls_sent();
        log::debug!("ステータス問い合わせ #{attempt}: {job_id}");
        let response = self.gateway.poll_status(job_id, credential).await;
        self.apply_poll(session_id, response)
    }

    /// ポーリング応答を反映する。セッションが既に無効なら破棄する。
    fn apply_poll(
        &self,
        session_id: Uuid,
        response: Result<PollResponse, GatewayError>,
    ) -> ControlFlow<()> {
        let step = {
            let mut state = self.state.lock();
            let ControllerState { current, session } = &mut *state;

            let Some(active) = session.as_ref().filter(|s| s.id == session_id) else {
                log::debug!("無効なセッションの応答を破棄: {session_id}");
                return ControlFlow::Break(());
            };
            let attempts = active.attempts;
            let active_local_id = active.local_id;
            let Some(job) = current.as_mut().filter(|j| j.local_id == active_local_id) else {
                log::warn!("セッション {session_id} に対応するジョブがありません");
                if let Some(s) = session.take() {
                    s.cancel();
                }
                return ControlFlow::Break(());
            };

            let now = Utc::now();
            let applied = match response {
                Ok(PollResponse {
                    status: BackendStatus::Running(raw),
                    ..
                }) => match self.poll.max_attempts {
                    Some(max) if attempts >= max => job
                        .fail(
                            JobStatus::Error,
                            format!("{max} 回問い合わせてもジョブが完了しませんでした"),
                            now,
                        )
                        .map(|_| PollStep::Finished(job.clone())),
                    _ => job
                        .record_progress(&raw, now)
                        .map(|_| PollStep::Progress(job.clone())),
                },
                Ok(PollResponse {
                    status: BackendStatus::Done,
                    result: Some(result),
                    ..
                }) => job
                    .complete(result, now)
                    .map(|_| PollStep::Finished(job.clone())),
                Ok(PollResponse {
                    status: BackendStatus::Done,
                    result: None,
                    ..
                }) => job
                    .fail(
                        JobStatus::Error,
                        "完了が報告されましたが結果がありません",
                        now,
                    )
                    .map(|_| PollStep::Finished(job.clone())),
                Ok(PollResponse {
                    status: BackendStatus::Error,
                    error_message,
                    ..
                }) => job
                    .fail(
                        JobStatus::Error,
                        error_message.unwrap_or_else(|| GENERIC_FAILURE.to_string()),
                        now,
                    )
                    .map(|_| PollStep::Finished(job.clone())),
                Ok(PollResponse {
                    status: BackendStatus::Rejected,
                    error_message,
                    ..
                }) => job
                    .fail(
                        JobStatus::Rejected,
                        error_message.unwrap_or_else(|| GENERIC_REJECTED.to_string()),
                        now,
                    )
                    .map(|_| PollStep::Finished(job.clone())),
                // 通信失敗はリトライせずセッションを終了する
                Err(e) => job
                    .fail(JobStatus::Error, e.to_string(), now)
                    .map(|_| PollStep::Finished(job.clone())),
            };

            match applied {
                Ok(step) => {
                    if let PollStep::Finished(_) = step {
                        if let Some(s) = session.take() {
                            s.cancel();
                        }
                    }
                    let snapshot = match &step {
                        PollStep::Progress(job) | PollStep::Finished(job) => job.clone(),
                    };
                    self.current_tx.send_replace(Some(snapshot));
                    step
                }
                Err(err) => {
                    log::error!("ポーリング応答を適用できません: {err}");
                    let local_id = job.local_id;
                    if let Some(s) = session.take() {
                        s.cancel();
                    }
                    drop(state);
                    self.release_busy(BusyHolder::Job(local_id));
                    return ControlFlow::Break(());
                }
            }
        };

        match step {
            PollStep::Progress(job) => {
                let raw = job.backend_status.clone().unwrap_or_default();
                self.sink.emit(UiEvent::JobChanged { job });
                self.sink.emit(UiEvent::info(format!("ステータス: {raw}")));
                ControlFlow::Continue(())
            }
            PollStep::Finished(job) => {
                self.finish(&job);
                ControlFlow::Break(())
            }
        }
    }

    /// 終端状態に達したジョブの後始末（busy 解放・通知）
    fn finish(&self, job: &Job) {
        self.release_busy(BusyHolder::Job(job.local_id));
        self.sink.emit(UiEvent::JobChanged { job: job.clone() });

        let elapsed = (job.updated_at - job.created_at).num_milliseconds().max(0) as u64;
        match job.status {
            JobStatus::Done => {
                self.metrics.inc_jobs_completed();
                self.metrics.record_latency(LatencyPhase::Transcribe, elapsed);
                let text = job.result.as_deref().unwrap_or_default();
                let message = match SubtitleDocument::parse(text) {
                    Ok(doc) if doc.cue_count() > 0 => {
                        if !doc.is_time_ordered() {
                            log::warn!("字幕のタイムスタンプが時系列順ではありません");
                        }
                        format!("文字起こし完了（{} キュー）", doc.cue_count())
                    }
                    _ => "文字起こし完了".to_string(),
                };
                log::info!("ジョブ完了: {} ({elapsed}ms)", job.local_id);
                self.sink.emit(UiEvent::success(message));
            }
            JobStatus::Error | JobStatus::Rejected => {
                self.metrics.inc_jobs_failed();
                let message = job.error_message.as_deref().unwrap_or(GENERIC_FAILURE);
                log::warn!("ジョブ失敗 [{}]: {message}", job.status.as_str());
                self.sink.emit(UiEvent::danger(format!("エラー: {message}")));
            }
            JobStatus::Submitted | JobStatus::Running => {}
        }
    }

    fn release_busy(&self, holder: BusyHolder) {
        if self.busy.release(holder) {
            self.sink.emit(UiEvent::BusyChanged { busy: false });
        }
    }

    fn report_error(&self, err: &AppError) {
        self.metrics.inc_error(err.code);
        let status = match err.code {
            ErrorCode::Busy | ErrorCode::Validation => UiEvent::warning(err.message.clone()),
            _ => UiEvent::danger(err.message.clone()),
        };
        self.sink.emit(status);
        self.sink.emit(UiEvent::Error { error: err.clone() });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::gateway::ScriptedGateway;
    use crate::infra::presenter::RecordingSink;

    fn controller() -> (JobController, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::new());
        let controller = JobController::new(
            Arc::new(ScriptedGateway::new()),
            BusyFlag::new(),
            sink.clone(),
            Arc::new(Metrics::new()),
            PollSettings::default(),
        );
        (controller, sink)
    }

    #[test]
    fn test_poll_settings_from_client_settings() {
        let settings = ClientSettings {
            poll_interval_ms: 1_500,
            max_poll_attempts: Some(12),
            ..Default::default()
        };
        assert_eq!(
            PollSettings::from(&settings),
            PollSettings {
                interval: Duration::from_millis(1_500),
                max_attempts: Some(12),
            }
        );
        assert_eq!(PollSettings::default().interval, Duration::from_secs(5));
    }

    #[test]
    fn test_cancel_without_job_is_noop() {
        let (controller, sink) = controller();
        assert!(!controller.cancel());
        assert!(sink.events().is_empty());
    }

    #[test]
    fn test_supersede_refuses_translation_holder() {
        let (controller, _sink) = controller();
        let translation = BusyHolder::Translation(Uuid::new_v4());
        controller.busy().try_acquire(translation).unwrap();

        let err = controller
            .inner
            .supersede(BusyHolder::Job(Uuid::new_v4()))
            .unwrap_err();
        assert!(err.is_busy());
        assert_eq!(controller.busy().holder(), Some(translation));
    }

    #[test]
    fn test_supersede_hands_over_job_holder() {
        let (controller, _sink) = controller();
        let old = BusyHolder::Job(Uuid::new_v4());
        let new = BusyHolder::Job(Uuid::new_v4());
        controller.busy().try_acquire(old).unwrap();

        // 引き継ぎなので新規取得ではない
        assert!(!controller.inner.supersede(new).unwrap());
        assert_eq!(controller.busy().holder(), Some(new));
    }

    #[tokio::test]
    async fn test_submission_for_unknown_job_is_discarded() {
        let (controller, sink) = controller();
        let current = Job::submitted(
            Uuid::new_v4(),
            crate::domain::types::SourceKind::DirectUrl,
            "https://cdn.example/a.mp4",
            "hu",
            Utc::now(),
        );
        controller.inner.state.lock().current = Some(current.clone());

        let result = controller.inner.record_submission(
            Uuid::new_v4(),
            Ok(SubmitOutcome::Accepted {
                job_id: "stale".to_string(),
            }),
            Credential::new("k"),
        );

        let Err(err) = result else {
            panic!("stale submission must be rejected");
        };
        assert_eq!(err.code, ErrorCode::InvalidState);
        let after = controller.current().unwrap();
        assert_eq!(after.local_id, current.local_id);
        assert_eq!(after.status, JobStatus::Submitted);
        assert!(!controller.is_polling());
        assert!(sink.events().is_empty());
    }
}
