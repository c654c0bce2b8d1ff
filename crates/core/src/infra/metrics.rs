use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use crate::domain::error::ErrorCode;

const LATENCY_CAP: usize = 500;
const RECENT_LIMIT: usize = 20;

/// 計測対象の区間
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LatencyPhase {
    /// 投入から終端状態まで
    Transcribe,
    Translate,
}

/// プロセス内のカウンタとレイテンシ。永続化しない。
#[derive(Default)]
pub struct Metrics {
    counters: Mutex<Counters>,
    samples: Mutex<VecDeque<LatencySample>>,
}

#[derive(Debug, Default, Clone, Copy)]
struct Counters {
    jobs_started: u64,
    jobs_completed: u64,
    jobs_failed: u64,
    jobs_cancelled: u64,
    polls_sent: u64,
    translations_completed: u64,
    errors: ErrorCounts,
}

#[derive(Debug, Clone, Serialize)]
pub struct LatencySample {
    pub phase: LatencyPhase,
    pub duration_ms: u64,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ErrorCounts {
    pub validation: u64,
    pub transport: u64,
    pub backend: u64,
    pub busy: u64,
    pub other: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSummary {
    pub jobs_started: u64,
    pub jobs_completed: u64,
    pub jobs_failed: u64,
    pub jobs_cancelled: u64,
    pub polls_sent: u64,
    pub translations_completed: u64,
    pub errors: ErrorCounts,
    pub avg_transcribe_ms: Option<f64>,
    pub avg_translate_ms: Option<f64>,
    /// 新しい順
    pub recent: Vec<LatencySample>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_jobs_started(&self) {
        self.counters.lock().jobs_started += 1;
    }

    pub fn inc_jobs_completed(&self) {
        self.counters.lock().jobs_completed += 1;
    }

    pub fn inc_jobs_failed(&self) {
        self.counters.lock().jobs_failed += 1;
    }

    pub fn inc_jobs_cancelled(&self) {
        self.counters.lock().jobs_cancelled += 1;
    }

    pub fn inc_polls_sent(&self) {
        self.counters.lock().polls_sent += 1;
    }

    pub fn inc_translations_completed(&self) {
        self.counters.lock().translations_completed += 1;
    }

    pub fn inc_error(&self, code: ErrorCode) {
        let mut counters = self.counters.lock();
        let errors = &mut counters.errors;
        let slot = match code {
            ErrorCode::Validation => &mut errors.validation,
            ErrorCode::Transport => &mut errors.transport,
            ErrorCode::Backend => &mut errors.backend,
            ErrorCode::Busy => &mut errors.busy,
            ErrorCode::InvalidState | ErrorCode::Storage | ErrorCode::Internal => {
                &mut errors.other
            }
        };
        *slot += 1;
    }

    /// 古いものから捨てて最大 `LATENCY_CAP` 件を保持する
    pub fn record_latency(&self, phase: LatencyPhase, duration_ms: u64) {
        let mut samples = self.samples.lock();
        if samples.len() == LATENCY_CAP {
            samples.pop_front();
        }
        samples.push_back(LatencySample {
            phase,
            duration_ms,
            recorded_at: Utc::now(),
        });
    }

    pub fn summary(&self) -> MetricsSummary {
        let c = *self.counters.lock();
        let samples = self.samples.lock();

        let average = |phase: LatencyPhase| {
            let (sum, n) = samples
                .iter()
                .filter(|s| s.phase == phase)
                .fold((0u64, 0u64), |(sum, n), s| (sum + s.duration_ms, n + 1));
            (n > 0).then(|| sum as f64 / n as f64)
        };

        MetricsSummary {
            jobs_started: c.jobs_started,
            jobs_completed: c.jobs_completed,
            jobs_failed: c.jobs_failed,
            jobs_cancelled: c.jobs_cancelled,
            polls_sent: c.polls_sent,
            translations_completed: c.translations_completed,
            errors: c.errors,
            avg_transcribe_ms: average(LatencyPhase::Transcribe),
            avg_translate_ms: average(LatencyPhase::Translate),
            recent: samples.iter().rev().take(RECENT_LIMIT).cloned().collect(),
        }
    }
}
