use serde::Serialize;

/// アプリケーション共通エラーコード
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorCode {
    /// 必須入力の欠落（ネットワーク呼び出し前に検出）
    #[serde(rename = "E_VALIDATION")]
    Validation,
    /// 通信失敗
    #[serde(rename = "E_TRANSPORT")]
    Transport,
    /// リモートサービスが失敗を報告
    #[serde(rename = "E_BACKEND")]
    Backend,
    /// busy フラグが立っている間の操作
    #[serde(rename = "E_BUSY")]
    Busy,
    #[serde(rename = "E_INVALID_STATE")]
    InvalidState,
    #[serde(rename = "E_STORAGE")]
    Storage,
    #[serde(rename = "E_INTERNAL")]
    Internal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "E_VALIDATION",
            Self::Transport => "E_TRANSPORT",
            Self::Backend => "E_BACKEND",
            Self::Busy => "E_BUSY",
            Self::InvalidState => "E_INVALID_STATE",
            Self::Storage => "E_STORAGE",
            Self::Internal => "E_INTERNAL",
        }
    }
}

/// アプリケーションエラー（イベントペイロード兼用）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppError {
    pub code: ErrorCode,
    pub message: String,
    pub recoverable: bool,
}

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::Validation,
            message: msg.into(),
            recoverable: true,
        }
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::Transport,
            message: msg.into(),
            recoverable: true,
        }
    }

    /// バックエンドのメッセージはそのままユーザーに表示する
    pub fn backend(msg: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::Backend,
            message: msg.into(),
            recoverable: true,
        }
    }

    pub fn busy(msg: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::Busy,
            message: msg.into(),
            recoverable: true,
        }
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::InvalidState,
            message: msg.into(),
            recoverable: true,
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::Internal,
            message: msg.into(),
            recoverable: false,
        }
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::Storage,
            message: msg.into(),
            recoverable: false,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.code == ErrorCode::Busy
    }

    pub fn is_validation(&self) -> bool {
        self.code == ErrorCode::Validation
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {}
