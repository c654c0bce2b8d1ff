use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::AppError;

/// クライアント設定（環境変数から上書き可能）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientSettings {
    /// バックエンドのベース URL
    pub base_url: String,
    /// ポーリング間隔（ミリ秒）
    pub poll_interval_ms: u64,
    /// ポーリング回数の上限。None = 無制限
    pub max_poll_attempts: Option<u32>,
    /// 文字起こしのデフォルト言語
    pub default_language: String,
    /// キーストア（SQLite）のパス。None = データディレクトリ既定値
    pub key_store_path: Option<String>,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:5000".to_string(),
            poll_interval_ms: 5_000,
            max_poll_attempts: None,
            default_language: "hu".to_string(),
            key_store_path: None,
        }
    }
}

impl ClientSettings {
    pub const ENV_BASE_URL: &'static str = "SF_BASE_URL";
    pub const ENV_POLL_INTERVAL_MS: &'static str = "SF_POLL_INTERVAL_MS";
    pub const ENV_MAX_POLL_ATTEMPTS: &'static str = "SF_MAX_POLL_ATTEMPTS";
    pub const ENV_DEFAULT_LANGUAGE: &'static str = "SF_DEFAULT_LANGUAGE";
    pub const ENV_DB_PATH: &'static str = "SF_DB_PATH";

    /// 既定値に環境変数を重ねる
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Self::default();

        if let Some(url) = lookup(Self::ENV_BASE_URL) {
            settings.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(raw) = lookup(Self::ENV_POLL_INTERVAL_MS) {
            settings.poll_interval_ms = parse_number(Self::ENV_POLL_INTERVAL_MS, &raw)?;
        }
        if let Some(raw) = lookup(Self::ENV_MAX_POLL_ATTEMPTS) {
            let value: u32 = parse_number(Self::ENV_MAX_POLL_ATTEMPTS, &raw)?;
            settings.max_poll_attempts = (value > 0).then_some(value);
        }
        if let Some(lang) = lookup(Self::ENV_DEFAULT_LANGUAGE) {
            settings.default_language = lang;
        }
        settings.key_store_path = lookup(Self::ENV_DB_PATH);

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.base_url.trim().is_empty() {
            return Err(AppError::validation("base_url が空です"));
        }
        if self.poll_interval_ms == 0 {
            return Err(AppError::validation("poll_interval_ms は 1 以上が必要です"));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, AppError> {
    raw.trim()
        .parse()
        .map_err(|_| AppError::validation(format!("{key} の値が不正です: {raw}")))
}
