use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use parking_lot::Mutex;
use uuid::Uuid;

use super::busy::{BusyFlag, BusyHolder};
use crate::domain::error::{AppError, ErrorCode};
use crate::domain::events::UiEvent;
use crate::domain::types::{ContextArtifact, Credential, Translation};
use crate::infra::gateway::{validate_translation, BackendGateway};
use crate::infra::metrics::{LatencyPhase, Metrics};
use crate::infra::presenter::StatusSink;

/// 字幕テキストの一括翻訳。ポーリングもリトライもしない 1 往復の処理。
///
/// busy フラグを文字起こしジョブと共有するため、ジョブの投入中や
/// ポーリング中には実行できない。
pub struct TranslationRunner {
    gateway: Arc<dyn BackendGateway>,
    busy: BusyFlag,
    sink: Arc<dyn StatusSink>,
    metrics: Arc<Metrics>,
    last: Mutex<Option<Translation>>,
}

impl TranslationRunner {
    pub fn new(
        gateway: Arc<dyn BackendGateway>,
        busy: BusyFlag,
        sink: Arc<dyn StatusSink>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            gateway,
            busy,
            sink,
            metrics,
            last: Mutex::new(None),
        }
    }

    /// 直近に成功した翻訳
    pub fn last(&self) -> Option<Translation> {
        self.last.lock().clone()
    }

    pub async fn translate(
        &self,
        text: &str,
        target_language: &str,
        credential: &Credential,
        context: Option<&ContextArtifact>,
    ) -> Result<Translation, AppError> {
        // ネットワークに出る前に入力を検証する
        if let Err(e) = validate_translation(text, target_language, credential) {
            return Err(self.report(AppError::from(e)));
        }

        let guard = match self
            .busy
            .acquire(BusyHolder::Translation(Uuid::new_v4()), self.sink.clone())
        {
            Ok(guard) => guard,
            Err(e) => return Err(self.report(e)),
        };
        self.sink
            .emit(UiEvent::info(format!("翻訳中... ({target_language})")));
        log::info!(
            "翻訳開始: {} 文字 → {target_language} (context: {})",
            text.chars().count(),
            context.map(|c| c.file_name.as_str()).unwrap_or("-")
        );

        let started = Instant::now();
        let response = self
            .gateway
            .submit_translation(text, target_language, credential, context)
            .await;

        drop(guard);

        match response {
            Ok(translated) => {
                let elapsed = started.elapsed().as_millis() as u64;
                self.metrics.inc_translations_completed();
                self.metrics.record_latency(LatencyPhase::Translate, elapsed);
                log::info!("翻訳完了: {target_language} ({elapsed}ms)");

                let translation = Translation {
                    target_language: target_language.to_string(),
                    text: translated,
                    completed_at: Utc::now(),
                };
                *self.last.lock() = Some(translation.clone());
                self.sink.emit(UiEvent::TranslationReady {
                    target_language: translation.target_language.clone(),
                    text: translation.text.clone(),
                });
                self.sink.emit(UiEvent::success("翻訳が完了しました"));
                Ok(translation)
            }
            Err(e) => Err(self.report(AppError::from(e))),
        }
    }

    fn report(&self, err: AppError) -> AppError {
        self.metrics.inc_error(err.code);
        let status = match err.code {
            ErrorCode::Busy | ErrorCode::Validation => UiEvent::warning(err.message.clone()),
            _ => UiEvent::danger(format!("翻訳エラー: {}", err.message)),
        };
        self.sink.emit(status);
        self.sink.emit(UiEvent::Error { error: err.clone() });
        err
    }
}
