use serde::Serialize;

use super::error::AppError;
use super::job::Job;
use super::types::DownloadLink;

/// イベント名定数
pub const STATUS: &str = "status";
pub const JOB_CHANGED: &str = "job_changed";
pub const BUSY_CHANGED: &str = "busy_changed";
pub const TRANSLATION_READY: &str = "translation_ready";
pub const LINKS_RESOLVED: &str = "links_resolved";
pub const ERROR: &str = "error";

/// ステータス表示の重要度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Danger,
}

/// UI 層へ送るイベント
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum UiEvent {
    /// ステータス行
    Status { severity: Severity, message: String },
    /// 現在のジョブが変化した
    JobChanged { job: Job },
    /// busy フラグが変化した
    BusyChanged { busy: bool },
    TranslationReady { target_language: String, text: String },
    LinksResolved { links: Vec<DownloadLink> },
    Error { error: AppError },
}

impl UiEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Status { .. } => STATUS,
            Self::JobChanged { .. } => JOB_CHANGED,
            Self::BusyChanged { .. } => BUSY_CHANGED,
            Self::TranslationReady { .. } => TRANSLATION_READY,
            Self::LinksResolved { .. } => LINKS_RESOLVED,
            Self::Error { .. } => ERROR,
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::Status {
            severity: Severity::Info,
            message: message.into(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::Status {
            severity: Severity::Success,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::Status {
            severity: Severity::Warning,
            message: message.into(),
        }
    }

    pub fn danger(message: impl Into<String>) -> Self {
        Self::Status {
            severity: Severity::Danger,
            message: message.into(),
        }
    }
}
