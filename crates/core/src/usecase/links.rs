use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::domain::error::AppError;
use crate::domain::events::UiEvent;
use crate::domain::types::DownloadLink;
use crate::infra::gateway::{BackendGateway, GatewayError};
use crate::infra::presenter::StatusSink;

/// ダウンロードリンク解決の結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkResolution {
    /// サイズ降順
    Found(Vec<DownloadLink>),
    /// 例外ではなく表示用メッセージとして扱う
    NoResults { message: String },
}

/// ページ URL からダウンロード候補を取得する。
/// 実行中の再要求は BusyError（ボタン無効化に相当）。
pub struct LinkResolver {
    gateway: Arc<dyn BackendGateway>,
    sink: Arc<dyn StatusSink>,
    in_flight: AtomicBool,
}

impl LinkResolver {
    pub fn new(gateway: Arc<dyn BackendGateway>, sink: Arc<dyn StatusSink>) -> Self {
        Self {
            gateway,
            sink,
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn is_resolving(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub async fn resolve(&self, url: &str) -> Result<LinkResolution, AppError> {
        let url = url.trim();
        if url.is_empty() {
            let err = AppError::validation("URL を入力してください");
            self.sink.emit(UiEvent::warning(err.message.clone()));
            return Err(err);
        }
        let Some(guard) = InFlight::enter(&self.in_flight) else {
            let err = AppError::busy("リンクを取得中です");
            self.sink.emit(UiEvent::warning(err.message.clone()));
            return Err(err);
        };

        self.sink.emit(UiEvent::info("リンクを取得中..."));
        let response = self.gateway.resolve_download_links(url).await;
        drop(guard);

        match response {
            Ok(links) => {
                log::info!("リンク {} 件を取得: {url}", links.len());
                self.sink.emit(UiEvent::LinksResolved {
                    links: links.clone(),
                });
                self.sink
                    .emit(UiEvent::success(format!("{} 件のリンクが見つかりました", links.len())));
                Ok(LinkResolution::Found(links))
            }
            Err(GatewayError::Empty(message)) => {
                log::info!("リンクなし: {url}");
                self.sink.emit(UiEvent::warning(message.clone()));
                Ok(LinkResolution::NoResults { message })
            }
            Err(e) => {
                let err = AppError::from(e);
                log::warn!("リンク取得失敗: {err}");
                self.sink.emit(UiEvent::danger(err.message.clone()));
                self.sink.emit(UiEvent::Error { error: err.clone() });
                Err(err)
            }
        }
    }
}

/// drop 時に実行中フラグを下ろす
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn enter(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
