pub mod http;
mod scripted;

pub use http::{Endpoints, HttpGateway};
pub use scripted::{GatewayCall, ScriptedGateway};

use std::cmp::Ordering;

use async_trait::async_trait;

use crate::domain::error::AppError;
use crate::domain::types::{
    ContextArtifact, Credential, DownloadLink, ExportedFile, JobSource, PollResponse,
    SubmitOutcome, UploadReceipt,
};

/// ゲートウェイエラー
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    /// 必須入力の欠落（送信前に検出）
    #[error("{0}")]
    Validation(String),
    /// 通信失敗（接続不可、切断など）
    #[error("通信エラー: {0}")]
    Transport(String),
    /// リモートが失敗を報告。メッセージはそのまま表示する
    #[error("{message}")]
    Backend { status: Option<u16>, message: String },
    /// リモートは成功したが使える結果が 0 件
    #[error("{0}")]
    Empty(String),
}

impl GatewayError {
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            status: None,
            message: message.into(),
        }
    }
}

impl From<GatewayError> for AppError {
    fn from(e: GatewayError) -> Self {
        match e {
            GatewayError::Validation(msg) => AppError::validation(msg),
            GatewayError::Transport(msg) => AppError::transport(msg),
            GatewayError::Backend { message, .. } => AppError::backend(message),
            GatewayError::Empty(msg) => AppError::backend(msg),
        }
    }
}

/// バックエンドへの全リクエストをまとめる境界。呼び出し間で状態を持たない。
#[async_trait]
pub trait BackendGateway: Send + Sync {
    /// 文字起こしジョブを投入する
    async fn submit_job(
        &self,
        source: &JobSource,
        credential: &Credential,
        language: &str,
    ) -> Result<SubmitOutcome, GatewayError>;

    /// ジョブ状態を問い合わせる（読み取りのみ、冪等）
    async fn poll_status(
        &self,
        job_id: &str,
        credential: &Credential,
    ) -> Result<PollResponse, GatewayError>;

    async fn submit_translation(
        &self,
        text: &str,
        target_language: &str,
        credential: &Credential,
        context: Option<&ContextArtifact>,
    ) -> Result<String, GatewayError>;

    /// サイズ降順（サイズ不明は末尾）で返す
    async fn resolve_download_links(&self, url: &str) -> Result<Vec<DownloadLink>, GatewayError>;

    async fn export_subtitle(
        &self,
        text: &str,
        file_name: &str,
    ) -> Result<ExportedFile, GatewayError>;

    async fn upload_to_storage(
        &self,
        text: &str,
        file_name: &str,
    ) -> Result<UploadReceipt, GatewayError>;

    fn name(&self) -> &str;
}

pub fn validate_submission(source: &JobSource, credential: &Credential) -> Result<(), GatewayError> {
    if source.is_empty() {
        return Err(GatewayError::Validation(
            "メディアソースが指定されていません".to_string(),
        ));
    }
    if credential.is_blank() {
        return Err(GatewayError::Validation(
            "文字起こし API キーが指定されていません".to_string(),
        ));
    }
    Ok(())
}

pub fn validate_translation(
    text: &str,
    target_language: &str,
    credential: &Credential,
) -> Result<(), GatewayError> {
    if text.trim().is_empty() {
        return Err(GatewayError::Validation(
            "翻訳するテキストがありません".to_string(),
        ));
    }
    if credential.is_blank() {
        return Err(GatewayError::Validation(
            "翻訳 API キーが指定されていません".to_string(),
        ));
    }
    if target_language.trim().is_empty() {
        return Err(GatewayError::Validation(
            "翻訳先の言語が指定されていません".to_string(),
        ));
    }
    Ok(())
}

/// 使えるリンクだけを残し、サイズ降順に並べる（サイズ不明は末尾、同順位は元の順序）
pub fn order_links(links: Vec<DownloadLink>) -> Result<Vec<DownloadLink>, GatewayError> {
    let mut usable: Vec<DownloadLink> = links
        .into_iter()
        .filter(|l| !l.url.trim().is_empty())
        .collect();

    if usable.is_empty() {
        return Err(GatewayError::Empty(
            "ダウンロード可能なリンクが見つかりませんでした".to_string(),
        ));
    }

    usable.sort_by(|a, b| match (a.size_bytes, b.size_bytes) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
    Ok(usable)
}
