use std::sync::Arc;

use crate::domain::error::AppError;
use crate::domain::events::UiEvent;
use crate::domain::subtitle::default_file_name;
use crate::domain::types::{ExportedFile, UploadReceipt};
use crate::infra::gateway::BackendGateway;
use crate::infra::presenter::StatusSink;

/// 字幕ファイルの書き出しとストレージへのアップロード
pub struct SubtitleExporter {
    gateway: Arc<dyn BackendGateway>,
    sink: Arc<dyn StatusSink>,
}

impl SubtitleExporter {
    pub fn new(gateway: Arc<dyn BackendGateway>, sink: Arc<dyn StatusSink>) -> Self {
        Self { gateway, sink }
    }

    pub async fn export(&self, text: &str, file_name: Option<&str>) -> Result<ExportedFile, AppError> {
        let file_name = self.prepare(text, file_name)?;
        match self.gateway.export_subtitle(text, &file_name).await {
            Ok(file) => {
                log::info!("字幕を書き出し: {} ({} bytes)", file.file_name, file.bytes.len());
                self.sink
                    .emit(UiEvent::success(format!("{} を書き出しました", file.file_name)));
                Ok(file)
            }
            Err(e) => Err(self.fail(AppError::from(e))),
        }
    }

    pub async fn upload(&self, text: &str, file_name: Option<&str>) -> Result<UploadReceipt, AppError> {
        let file_name = self.prepare(text, file_name)?;
        self.sink.emit(UiEvent::info("アップロード中..."));
        match self.gateway.upload_to_storage(text, &file_name).await {
            Ok(receipt) => {
                log::info!(
                    "アップロード完了: {file_name} (id: {})",
                    receipt.identifier.as_deref().unwrap_or("-")
                );
                self.sink.emit(UiEvent::success("アップロードが完了しました"));
                Ok(receipt)
            }
            Err(e) => Err(self.fail(AppError::from(e))),
        }
    }

    fn prepare(&self, text: &str, file_name: Option<&str>) -> Result<String, AppError> {
        if text.trim().is_empty() {
            let err = AppError::validation("書き出す字幕がありません");
            self.sink.emit(UiEvent::warning(err.message.clone()));
            return Err(err);
        }
        Ok(default_file_name(file_name.unwrap_or_default(), None))
    }

    fn fail(&self, err: AppError) -> AppError {
        log::warn!("字幕の書き出し失敗: {err}");
        self.sink.emit(UiEvent::danger(err.message.clone()));
        self.sink.emit(UiEvent::Error { error: err.clone() });
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::ErrorCode;
    use crate::infra::gateway::{GatewayCall, GatewayError, ScriptedGateway};
    use crate::infra::presenter::RecordingSink;

    const SRT: &str = "1\n00:00:00,000 --> 00:00:01,500\nHello\n";

    fn exporter(gateway: Arc<ScriptedGateway>) -> SubtitleExporter {
        SubtitleExporter::new(gateway, Arc::new(RecordingSink::new()))
    }

    #[tokio::test]
    async fn test_export_uses_default_file_name() {
        let gateway = Arc::new(ScriptedGateway::new());
        let file = exporter(gateway.clone()).export(SRT, None).await.unwrap();
        assert_eq!(file.file_name, "subtitles.srt");
        assert_eq!(file.bytes, SRT.as_bytes());
        assert_eq!(
            gateway.calls(),
            vec![GatewayCall::Export {
                file_name: "subtitles.srt".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn test_export_normalises_extension() {
        let gateway = Arc::new(ScriptedGateway::new());
        let file = exporter(gateway).export(SRT, Some("talk_en.srt")).await.unwrap();
        assert_eq!(file.file_name, "talk_en.srt");
    }

    #[tokio::test]
    async fn test_blank_text_is_rejected() {
        let gateway = Arc::new(ScriptedGateway::new());
        let err = exporter(gateway.clone()).upload(" \n", None).await.unwrap_err();
        assert!(err.is_validation());
        assert!(gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn test_upload_failure_is_backend_error() {
        let gateway = Arc::new(ScriptedGateway::new());
        gateway.push_upload(Err(GatewayError::backend("drive quota exceeded")));
        let err = exporter(gateway).upload(SRT, Some("talk")).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::Backend);
        assert_eq!(err.message, "drive quota exceeded");
    }
}
