use std::sync::Arc;

use tokio::sync::watch;

use super::busy::BusyFlag;
use super::export::SubtitleExporter;
use super::job_controller::{JobController, PollSettings};
use super::links::{LinkResolution, LinkResolver};
use super::translation::TranslationRunner;
use crate::domain::error::AppError;
use crate::domain::job::{Job, JobStatus};
use crate::domain::settings::ClientSettings;
use crate::domain::subtitle::default_file_name;
use crate::domain::types::{
    ContextArtifact, Credential, CredentialName, ExportedFile, JobSource, Translation,
    UploadReceipt,
};
use crate::infra::gateway::{BackendGateway, HttpGateway};
use crate::infra::metrics::{Metrics, MetricsSummary};
use crate::infra::presenter::StatusSink;
use crate::infra::storage::{KeyStore, SqliteKeyStore};

/// アプリケーションサービス。UI 層から呼ばれる操作の入口。
pub struct AppService {
    settings: ClientSettings,
    key_store: Arc<dyn KeyStore>,
    controller: JobController,
    translator: TranslationRunner,
    links: LinkResolver,
    exporter: SubtitleExporter,
    metrics: Arc<Metrics>,
}

impl AppService {
    pub fn new(
        settings: ClientSettings,
        key_store: Arc<dyn KeyStore>,
        gateway: Arc<dyn BackendGateway>,
        sink: Arc<dyn StatusSink>,
    ) -> Self {
        let busy = BusyFlag::new();
        let metrics = Arc::new(Metrics::new());
        let controller = JobController::new(
            gateway.clone(),
            busy.clone(),
            sink.clone(),
            metrics.clone(),
            PollSettings::from(&settings),
        );
        let translator =
            TranslationRunner::new(gateway.clone(), busy, sink.clone(), metrics.clone());
        let links = LinkResolver::new(gateway.clone(), sink.clone());
        let exporter = SubtitleExporter::new(gateway.clone(), sink);

        log::info!(
            "AppService 初期化: gateway={}, poll={}ms",
            gateway.name(),
            settings.poll_interval_ms
        );

        Self {
            settings,
            key_store,
            controller,
            translator,
            links,
            exporter,
            metrics,
        }
    }

    /// 設定から HTTP ゲートウェイと SQLite キーストアを組み立てる
    pub fn from_settings(
        settings: ClientSettings,
        sink: Arc<dyn StatusSink>,
    ) -> Result<Self, AppError> {
        settings.validate()?;
        let gateway = HttpGateway::new(&settings.base_url)?;
        let key_store = SqliteKeyStore::open_or_default(settings.key_store_path.as_deref())?;
        Ok(Self::new(
            settings,
            Arc::new(key_store),
            Arc::new(gateway),
            sink,
        ))
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    // ==================== Credentials ====================

    pub fn set_credential(&self, name: CredentialName, value: &str) -> Result<(), AppError> {
        self.key_store.set(name, value)?;
        log::info!("資格情報を保存: {}", name.key());
        Ok(())
    }

    pub fn credential(&self, name: CredentialName) -> Result<Option<String>, AppError> {
        self.key_store.get(name)
    }

    /// 操作ごとにキーストアから読み出す（保持しない）
    fn require_credential(&self, name: CredentialName) -> Result<Credential, AppError> {
        match self.key_store.get(name)? {
            Some(value) if !value.trim().is_empty() => Ok(Credential::new(value)),
            _ => Err(AppError::validation(match name {
                CredentialName::Transcription => "文字起こし API キーが設定されていません",
                CredentialName::Translation => "翻訳 API キーが設定されていません",
            })),
        }
    }

    // ==================== Transcription ====================

    /// `language` が None なら設定の既定言語
    pub async fn start_transcription(
        &self,
        source: JobSource,
        language: Option<&str>,
    ) -> Result<Job, AppError> {
        let credential = self.require_credential(CredentialName::Transcription)?;
        let language = self.language(language);
        self.controller.start_job(source, credential, &language).await
    }

    /// 実行中のジョブを破棄してやり直す
    pub async fn restart_transcription(
        &self,
        source: JobSource,
        language: Option<&str>,
    ) -> Result<Job, AppError> {
        let credential = self.require_credential(CredentialName::Transcription)?;
        let language = self.language(language);
        self.controller
            .replace_job(source, credential, &language)
            .await
    }

    pub fn cancel_transcription(&self) -> bool {
        self.controller.cancel()
    }

    pub fn current_job(&self) -> Option<Job> {
        self.controller.current()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Job>> {
        self.controller.subscribe()
    }

    pub fn is_busy(&self) -> bool {
        self.controller.busy().is_busy()
    }

    // ==================== Translation ====================

    /// 完了済みジョブの字幕を翻訳する
    pub async fn translate_current_result(
        &self,
        target_language: &str,
        context: Option<&ContextArtifact>,
    ) -> Result<Translation, AppError> {
        let text = match self.controller.current() {
            Some(Job {
                status: JobStatus::Done,
                result: Some(result),
                ..
            }) => result,
            Some(job) if !job.is_terminal() => {
                return Err(AppError::busy(
                    "文字起こしジョブが実行中です。完了するまでお待ちください",
                ))
            }
            _ => return Err(AppError::validation("翻訳する字幕がありません")),
        };
        self.translate_text(&text, target_language, context).await
    }

    pub async fn translate_text(
        &self,
        text: &str,
        target_language: &str,
        context: Option<&ContextArtifact>,
    ) -> Result<Translation, AppError> {
        if text.trim().is_empty() {
            return Err(AppError::validation("翻訳するテキストがありません"));
        }
        let credential = self.require_credential(CredentialName::Translation)?;
        self.translator
            .translate(text, target_language, &credential, context)
            .await
    }

    pub fn last_translation(&self) -> Option<Translation> {
        self.translator.last()
    }

    // ==================== Links / Export ====================

    pub async fn resolve_download_links(&self, url: &str) -> Result<LinkResolution, AppError> {
        self.links.resolve(url).await
    }

    /// `file_name` が None ならジョブのソース名と言語から決める
    pub async fn export_subtitle(
        &self,
        text: &str,
        file_name: Option<&str>,
    ) -> Result<ExportedFile, AppError> {
        let file_name = self.file_name(file_name);
        self.exporter.export(text, Some(&file_name)).await
    }

    pub async fn upload_subtitle(
        &self,
        text: &str,
        file_name: Option<&str>,
    ) -> Result<UploadReceipt, AppError> {
        let file_name = self.file_name(file_name);
        self.exporter.upload(text, Some(&file_name)).await
    }

    // ==================== Metrics ====================

    pub fn get_metrics(&self) -> MetricsSummary {
        self.metrics.summary()
    }

    fn language(&self, language: Option<&str>) -> String {
        language
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .unwrap_or(self.settings.default_language.as_str())
            .to_string()
    }

    fn file_name(&self, file_name: Option<&str>) -> String {
        if let Some(name) = file_name.map(str::trim).filter(|n| !n.is_empty()) {
            return default_file_name(name, None);
        }
        match self.controller.current() {
            Some(job) => {
                let stem = job
                    .source_label
                    .rsplit(['/', '\\'])
                    .next()
                    .and_then(|name| name.split(['?', '#']).next())
                    .map(|name| name.rsplit_once('.').map_or(name, |(stem, _)| stem))
                    .unwrap_or_default();
                default_file_name(stem, Some(&job.language))
            }
            None => default_file_name("", None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::SubmitOutcome;
    use crate::infra::gateway::{GatewayCall, ScriptedGateway};
    use crate::infra::presenter::RecordingSink;
    use crate::infra::storage::MemoryKeyStore;

    fn service(gateway: Arc<ScriptedGateway>) -> AppService {
        AppService::new(
            ClientSettings::default(),
            Arc::new(MemoryKeyStore::new()),
            gateway,
            Arc::new(RecordingSink::new()),
        )
    }

    fn upload(name: &str) -> JobSource {
        JobSource::Upload {
            file_name: name.to_string(),
            bytes: vec![1, 2, 3],
            mime: Some("audio/mpeg".to_string()),
        }
    }

    #[tokio::test]
    async fn test_missing_credential_is_validation_error() {
        let gateway = Arc::new(ScriptedGateway::new());
        let svc = service(gateway.clone());
        let err = svc
            .start_transcription(upload("talk.mp3"), None)
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert!(gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn test_sync_transcription_then_translate() {
        let gateway = Arc::new(ScriptedGateway::new());
        gateway.push_submit(Ok(SubmitOutcome::Completed {
            result: "1\n00:00:00,000 --> 00:00:01,000\nSzia\n".to_string(),
        }));
        gateway.push_translation(Ok("1\n00:00:00,000 --> 00:00:01,000\nHi\n".to_string()));
        let svc = service(gateway.clone());
        svc.set_credential(CredentialName::Transcription, "t-key").unwrap();
        svc.set_credential(CredentialName::Translation, "x-key").unwrap();

        let job = svc.start_transcription(upload("talk.mp3"), None).await.unwrap();
        assert_eq!(job.status, JobStatus::Done);
        assert_eq!(job.language, "hu");

        let translation = svc.translate_current_result("en", None).await.unwrap();
        assert!(translation.text.contains("Hi"));
        assert_eq!(svc.last_translation(), Some(translation));
        assert!(!svc.is_busy());
        assert_eq!(
            gateway.calls(),
            vec![
                GatewayCall::Submit {
                    source: "talk.mp3".to_string(),
                    language: "hu".to_string()
                },
                GatewayCall::Translate {
                    target_language: "en".to_string()
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_translate_without_result_is_validation_error() {
        let gateway = Arc::new(ScriptedGateway::new());
        let svc = service(gateway);
        svc.set_credential(CredentialName::Translation, "x-key").unwrap();
        let err = svc.translate_current_result("en", None).await.unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_export_file_name_follows_current_job() {
        let gateway = Arc::new(ScriptedGateway::new());
        gateway.push_submit(Ok(SubmitOutcome::Completed {
            result: "1\n00:00:00,000 --> 00:00:01,000\nSzia\n".to_string(),
        }));
        let svc = service(gateway);
        svc.set_credential(CredentialName::Transcription, "t-key").unwrap();
        svc.start_transcription(
            JobSource::DirectUrl("https://cdn.example/media/lecture.mp4?sig=1".to_string()),
            Some("de"),
        )
        .await
        .unwrap();

        let file = svc.export_subtitle("1\n00:00:00,000 --> 00:00:01,000\nHallo\n", None)
            .await
            .unwrap();
        assert_eq!(file.file_name, "lecture_de.srt");
    }
}
