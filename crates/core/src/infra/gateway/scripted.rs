use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use super::{order_links, validate_submission, validate_translation, BackendGateway, GatewayError};
use crate::domain::types::{
    ContextArtifact, Credential, DownloadLink, ExportedFile, JobSource, PollResponse,
    SubmitOutcome, UploadReceipt,
};

/// 記録された呼び出し
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCall {
    Submit { source: String, language: String },
    Poll { job_id: String },
    Translate { target_language: String },
    ResolveLinks { url: String },
    Export { file_name: String },
    Upload { file_name: String },
}

/// 台本どおりに応答するゲートウェイ。ネットワークを使わない。
///
/// 応答キューが空の場合、投入は `Empty`、ポーリングは `running` を返す。
/// ゲートを設定した呼び出しは対応する `release_*` まで応答を保留する。
/// 投入の台本は呼び出し順に割り当てられ、保留中でも順序は変わらない。
#[derive(Default)]
pub struct ScriptedGateway {
    calls: Mutex<Vec<GatewayCall>>,
    submits: Mutex<VecDeque<Result<SubmitOutcome, GatewayError>>>,
    submit_gates: Mutex<HashMap<String, Arc<Notify>>>,
    polls: Mutex<HashMap<String, VecDeque<Result<PollResponse, GatewayError>>>>,
    poll_gates: Mutex<HashMap<String, Arc<Notify>>>,
    translations: Mutex<VecDeque<Result<String, GatewayError>>>,
    translation_gate: Mutex<Option<Arc<Notify>>>,
    links: Mutex<VecDeque<Result<Vec<DownloadLink>, GatewayError>>>,
    links_gate: Mutex<Option<Arc<Notify>>>,
    uploads: Mutex<VecDeque<Result<UploadReceipt, GatewayError>>>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_submit(&self, outcome: Result<SubmitOutcome, GatewayError>) -> &Self {
        self.submits.lock().push_back(outcome);
        self
    }

    pub fn push_poll(&self, job_id: &str, response: Result<PollResponse, GatewayError>) -> &Self {
        self.polls
            .lock()
            .entry(job_id.to_string())
            .or_default()
            .push_back(response);
        self
    }

    pub fn push_translation(&self, response: Result<String, GatewayError>) -> &Self {
        self.translations.lock().push_back(response);
        self
    }

    pub fn push_links(&self, response: Result<Vec<DownloadLink>, GatewayError>) -> &Self {
        self.links.lock().push_back(response);
        self
    }

    pub fn push_upload(&self, response: Result<UploadReceipt, GatewayError>) -> &Self {
        self.uploads.lock().push_back(response);
        self
    }

    /// 指定ソース（ラベル一致）の投入応答を保留する
    pub fn hold_submits(&self, label: &str) {
        self.submit_gates
            .lock()
            .insert(label.to_string(), Arc::new(Notify::new()));
    }

    pub fn release_submit(&self, label: &str) {
        if let Some(gate) = self.submit_gates.lock().get(label) {
            gate.notify_one();
        }
    }

    /// 指定ジョブのポーリング応答を保留する
    pub fn hold_polls(&self, job_id: &str) {
        self.poll_gates
            .lock()
            .insert(job_id.to_string(), Arc::new(Notify::new()));
    }

    /// 保留中のポーリング応答を 1 件解放する
    pub fn release_poll(&self, job_id: &str) {
        if let Some(gate) = self.poll_gates.lock().get(job_id) {
            gate.notify_one();
        }
    }

    /// 翻訳応答を保留する
    pub fn hold_translations(&self) {
        *self.translation_gate.lock() = Some(Arc::new(Notify::new()));
    }

    pub fn release_translation(&self) {
        if let Some(gate) = self.translation_gate.lock().as_ref() {
            gate.notify_one();
        }
    }

    pub fn hold_links(&self) {
        *self.links_gate.lock() = Some(Arc::new(Notify::new()));
    }

    pub fn release_links(&self) {
        if let Some(gate) = self.links_gate.lock().as_ref() {
            gate.notify_one();
        }
    }

    pub fn calls(&self) -> Vec<GatewayCall> {
        self.calls.lock().clone()
    }

    pub fn poll_count(&self, job_id: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| matches!(c, GatewayCall::Poll { job_id: id } if id == job_id))
            .count()
    }

    pub fn submit_count(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| matches!(c, GatewayCall::Submit { .. }))
            .count()
    }

    fn record(&self, call: GatewayCall) {
        self.calls.lock().push(call);
    }
}

#[async_trait]
impl BackendGateway for ScriptedGateway {
    async fn submit_job(
        &self,
        source: &JobSource,
        credential: &Credential,
        language: &str,
    ) -> Result<SubmitOutcome, GatewayError> {
        validate_submission(source, credential)?;
        self.record(GatewayCall::Submit {
            source: source.label().to_string(),
            language: language.to_string(),
        });
        let outcome = self
            .submits
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(GatewayError::Empty("no scripted submit".to_string())));
        let gate = self.submit_gates.lock().get(source.label()).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        outcome
    }

    async fn poll_status(
        &self,
        job_id: &str,
        _credential: &Credential,
    ) -> Result<PollResponse, GatewayError> {
        self.record(GatewayCall::Poll {
            job_id: job_id.to_string(),
        });
        let gate = self.poll_gates.lock().get(job_id).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.polls
            .lock()
            .get_mut(job_id)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Ok(PollResponse::running("running")))
    }

    async fn submit_translation(
        &self,
        text: &str,
        target_language: &str,
        credential: &Credential,
        _context: Option<&ContextArtifact>,
    ) -> Result<String, GatewayError> {
        validate_translation(text, target_language, credential)?;
        self.record(GatewayCall::Translate {
            target_language: target_language.to_string(),
        });
        let gate = self.translation_gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.translations
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(format!("[{target_language}] {text}")))
    }

    async fn resolve_download_links(&self, url: &str) -> Result<Vec<DownloadLink>, GatewayError> {
        self.record(GatewayCall::ResolveLinks {
            url: url.to_string(),
        });
        let gate = self.links_gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        let scripted = self.links.lock().pop_front().unwrap_or_else(|| Ok(Vec::new()));
        order_links(scripted?)
    }

    async fn export_subtitle(
        &self,
        text: &str,
        file_name: &str,
    ) -> Result<ExportedFile, GatewayError> {
        self.record(GatewayCall::Export {
            file_name: file_name.to_string(),
        });
        Ok(ExportedFile {
            file_name: file_name.to_string(),
            bytes: text.as_bytes().to_vec(),
        })
    }

    async fn upload_to_storage(
        &self,
        _text: &str,
        file_name: &str,
    ) -> Result<UploadReceipt, GatewayError> {
        self.record(GatewayCall::Upload {
            file_name: file_name.to_string(),
        });
        self.uploads.lock().pop_front().unwrap_or_else(|| {
            Ok(UploadReceipt {
                identifier: Some(format!("scripted-{file_name}")),
            })
        })
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_validation_happens_before_recording() {
        let gw = ScriptedGateway::new();
        let err = gw
            .submit_job(&JobSource::DirectUrl(String::new()), &"abc".into(), "en")
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Validation(_)));
        assert!(gw.calls().is_empty());
    }

    #[tokio::test]
    async fn test_polls_default_to_running() {
        let gw = ScriptedGateway::new();
        gw.push_poll("j1", Ok(PollResponse::done("subs")));
        let first = gw.poll_status("j1", &"k".into()).await.unwrap();
        assert_eq!(first.result.as_deref(), Some("subs"));
        let second = gw.poll_status("j1", &"k".into()).await.unwrap();
        assert_eq!(second, PollResponse::running("running"));
        assert_eq!(gw.poll_count("j1"), 2);
    }

    #[tokio::test]
    async fn test_held_submit_keeps_call_order() {
        let gw = Arc::new(ScriptedGateway::new());
        gw.push_submit(Ok(SubmitOutcome::Accepted {
            job_id: "first".into(),
        }));
        gw.push_submit(Ok(SubmitOutcome::Accepted {
            job_id: "second".into(),
        }));
        gw.hold_submits("https://x/a");

        let held = {
            let gw = gw.clone();
            tokio::spawn(async move {
                gw.submit_job(&JobSource::DirectUrl("https://x/a".into()), &"k".into(), "en")
                    .await
            })
        };
        while gw.submit_count() == 0 {
            tokio::task::yield_now().await;
        }
        let second = gw
            .submit_job(&JobSource::DirectUrl("https://x/b".into()), &"k".into(), "en")
            .await
            .unwrap();
        assert_eq!(second, SubmitOutcome::Accepted { job_id: "second".into() });
        assert!(!held.is_finished());

        gw.release_submit("https://x/a");
        let first = held.await.unwrap().unwrap();
        assert_eq!(first, SubmitOutcome::Accepted { job_id: "first".into() });
    }

    #[test]
    fn test_name() {
        assert_eq!(ScriptedGateway::new().name(), "scripted");
    }
}
