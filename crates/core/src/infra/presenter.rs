use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::domain::events::{Severity, UiEvent};

/// UI 層への出力先 trait。状態遷移を受け取って表示するだけの受け口。
pub trait StatusSink: Send + Sync {
    fn emit(&self, event: UiEvent);
}

/// log クレート経由で表示する
pub struct LogSink;

impl StatusSink for LogSink {
    fn emit(&self, event: UiEvent) {
        match &event {
            UiEvent::Status { severity, message } => match severity {
                Severity::Info | Severity::Success => log::info!("{message}"),
                Severity::Warning => log::warn!("{message}"),
                Severity::Danger => log::error!("{message}"),
            },
            UiEvent::JobChanged { job } => log::debug!(
                "[{}] job {} ({}) → {}",
                event.name(),
                job.local_id,
                job.id.as_deref().unwrap_or("-"),
                job.backend_status.as_deref().unwrap_or(job.status.as_str())
            ),
            UiEvent::Error { error } => log::error!("[{}] {}", event.name(), error),
            other => log::debug!("[{}]", other.name()),
        }
    }
}

/// mpsc チャネルへ転送する（UI スレッドで受信する用）
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<UiEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<UiEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl StatusSink for ChannelSink {
    fn emit(&self, event: UiEvent) {
        if let Err(e) = self.tx.send(event) {
            log::debug!("イベント送信失敗 [{}]: 受信側が閉じています", e.0.name());
        }
    }
}

/// 受信したイベントを溜めておく
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<UiEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<UiEvent> {
        self.events.lock().clone()
    }

    /// ステータス行のメッセージのみ
    pub fn messages(&self) -> Vec<(Severity, String)> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                UiEvent::Status { severity, message } => Some((*severity, message.clone())),
                _ => None,
            })
            .collect()
    }

    /// busy フラグの変化履歴
    pub fn busy_history(&self) -> Vec<bool> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                UiEvent::BusyChanged { busy } => Some(*busy),
                _ => None,
            })
            .collect()
    }
}

impl StatusSink for RecordingSink {
    fn emit(&self, event: UiEvent) {
        self.events.lock().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_sink_forwards() {
        let (sink, mut rx) = ChannelSink::new();
        sink.emit(UiEvent::info("hello"));
        sink.emit(UiEvent::BusyChanged { busy: true });

        match rx.recv().await.unwrap() {
            UiEvent::Status { severity, message } => {
                assert_eq!(severity, Severity::Info);
                assert_eq!(message, "hello");
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(matches!(
            rx.recv().await.unwrap(),
            UiEvent::BusyChanged { busy: true }
        ));
    }

    #[test]
    fn test_channel_sink_survives_closed_receiver() {
        let (sink, rx) = ChannelSink::new();
        drop(rx);
        sink.emit(UiEvent::warning("nobody listening"));
    }

    #[test]
    fn test_log_sink_accepts_every_event() {
        let sink = LogSink;
        sink.emit(UiEvent::success("done"));
        sink.emit(UiEvent::BusyChanged { busy: true });
        sink.emit(UiEvent::Error {
            error: crate::domain::error::AppError::transport("connection refused"),
        });
    }

    #[test]
    fn test_recording_sink() {
        let sink = RecordingSink::new();
        sink.emit(UiEvent::danger("boom"));
        sink.emit(UiEvent::BusyChanged { busy: false });
        assert_eq!(sink.events().len(), 2);
        assert_eq!(sink.messages(), vec![(Severity::Danger, "boom".to_string())]);
        assert_eq!(sink.busy_history(), vec![false]);
    }
}
