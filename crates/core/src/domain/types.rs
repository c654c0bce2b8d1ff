use serde::{Deserialize, Serialize};

/// 資格情報の論理名（キーストアの固定キー）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialName {
    Transcription,
    Translation,
}

impl CredentialName {
    pub fn key(&self) -> &'static str {
        match self {
            Self::Transcription => "transcription_api_key",
            Self::Translation => "translation_api_key",
        }
    }

    pub fn all() -> [CredentialName; 2] {
        [Self::Transcription, Self::Translation]
    }
}

/// ユーザーが入力した API キー。Debug 出力では値を伏せる。
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Credential(***)")
    }
}

impl From<&str> for Credential {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// 文字起こし対象のメディア
#[derive(Debug, Clone)]
pub enum JobSource {
    /// アップロードされたファイル
    Upload {
        file_name: String,
        bytes: Vec<u8>,
        mime: Option<String>,
    },
    /// メディアへの直接 URL
    DirectUrl(String),
    /// サーバー側で解決が必要なページ URL
    PageUrl(String),
    /// 外部ストレージへ先にアップロードし、発行されたファイル URL で投入する
    StorageUpload {
        file_name: String,
        bytes: Vec<u8>,
        mime: Option<String>,
    },
}

impl JobSource {
    pub fn kind(&self) -> SourceKind {
        match self {
            Self::Upload { .. } => SourceKind::Upload,
            Self::DirectUrl(_) => SourceKind::DirectUrl,
            Self::PageUrl(_) => SourceKind::PageUrl,
            Self::StorageUpload { .. } => SourceKind::StorageUpload,
        }
    }

    /// 表示用ラベル（ファイル名または URL）
    pub fn label(&self) -> &str {
        match self {
            Self::Upload { file_name, .. } | Self::StorageUpload { file_name, .. } => file_name,
            Self::DirectUrl(url) | Self::PageUrl(url) => url,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Upload { bytes, .. } | Self::StorageUpload { bytes, .. } => bytes.is_empty(),
            Self::DirectUrl(url) | Self::PageUrl(url) => url.trim().is_empty(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Upload,
    DirectUrl,
    PageUrl,
    StorageUpload,
}

/// 翻訳に添付する任意のコンテキストファイル
#[derive(Debug, Clone)]
pub struct ContextArtifact {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub mime: Option<String>,
}

/// ジョブ投入の結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// 非同期バックエンドが ID のみを返した
    Accepted { job_id: String },
    /// 同期バックエンドが結果を即時返した
    Completed { result: String },
}

/// バックエンドが報告するジョブ状態（制御上の分類）
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendStatus {
    /// 中間状態。生の文字列は表示用に保持する
    Running(String),
    Done,
    Error,
    Rejected,
}

impl BackendStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "done" | "completed" => Self::Done,
            "rejected" => Self::Rejected,
            "error" | "failed" | "expired" | "deleted" => Self::Error,
            _ => Self::Running(raw.trim().to_string()),
        }
    }
}

/// ステータス問い合わせの応答
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollResponse {
    pub status: BackendStatus,
    pub result: Option<String>,
    pub error_message: Option<String>,
}

impl PollResponse {
    pub fn running(raw: impl Into<String>) -> Self {
        Self {
            status: BackendStatus::Running(raw.into()),
            result: None,
            error_message: None,
        }
    }

    pub fn done(result: impl Into<String>) -> Self {
        Self {
            status: BackendStatus::Done,
            result: Some(result.into()),
            error_message: None,
        }
    }

    pub fn rejected(message: Option<&str>) -> Self {
        Self {
            status: BackendStatus::Rejected,
            result: None,
            error_message: message.map(str::to_string),
        }
    }

    pub fn error(message: Option<&str>) -> Self {
        Self {
            status: BackendStatus::Error,
            result: None,
            error_message: message.map(str::to_string),
        }
    }
}

/// ダウンロードリンク解決の 1 件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadLink {
    pub label: String,
    #[serde(default)]
    pub ext: Option<String>,
    #[serde(default)]
    pub size_bytes: Option<u64>,
    pub url: String,
}

/// 字幕エクスポートで受け取ったファイル
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// ストレージアップロードの受領情報
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadReceipt {
    pub identifier: Option<String>,
}

/// 完了した翻訳
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Translation {
    pub target_language: String,
    pub text: String,
    pub completed_at: chrono::DateTime<chrono::Utc>,
}
