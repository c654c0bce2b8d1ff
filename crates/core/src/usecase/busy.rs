use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::error::AppError;
use crate::domain::events::UiEvent;
use crate::infra::presenter::StatusSink;

/// busy フラグの保持者
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum BusyHolder {
    /// 文字起こしジョブ（投入〜ポーリング終了まで）
    Job(Uuid),
    Translation(Uuid),
}

/// ジョブ投入・ポーリング・翻訳を直列化する唯一の排他フラグ。
///
/// 解放は保持者が一致する場合のみ有効。古いセッションの後始末が
/// 新しい保持者のフラグを下ろしてしまうことはない。
#[derive(Debug, Clone, Default)]
pub struct BusyFlag {
    holder: Arc<Mutex<Option<BusyHolder>>>,
}

impl BusyFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_busy(&self) -> bool {
        self.holder.lock().is_some()
    }

    pub fn holder(&self) -> Option<BusyHolder> {
        *self.holder.lock()
    }

    /// 空いていれば取得。使用中なら BusyError
    pub fn try_acquire(&self, holder: BusyHolder) -> Result<(), AppError> {
        let mut current = self.holder.lock();
        match *current {
            Some(existing) => Err(AppError::busy(busy_message(existing))),
            None => {
                *current = Some(holder);
                Ok(())
            }
        }
    }

    /// 取得してガードを返す。ガードが破棄されると解放され、
    /// `BusyChanged` が sink に通知される。
    pub fn acquire(
        &self,
        holder: BusyHolder,
        sink: Arc<dyn StatusSink>,
    ) -> Result<BusyGuard, AppError> {
        self.try_acquire(holder)?;
        sink.emit(UiEvent::BusyChanged { busy: true });
        Ok(BusyGuard {
            flag: self.clone(),
            holder,
            sink,
        })
    }

    /// `from` が保持している場合のみ `to` に引き継ぐ
    pub fn handover(&self, from: BusyHolder, to: BusyHolder) -> bool {
        let mut current = self.holder.lock();
        if *current == Some(from) {
            *current = Some(to);
            true
        } else {
            false
        }
    }

    /// `holder` が保持している場合のみ解放する
    pub fn release(&self, holder: BusyHolder) -> bool {
        let mut current = self.holder.lock();
        if *current == Some(holder) {
            *current = None;
            true
        } else {
            false
        }
    }
}

/// 保持中の busy フラグ。await の途中で future が破棄されても
/// drop 時に必ず解放される。
#[must_use = "ガードを破棄すると busy は即座に解放されます"]
pub struct BusyGuard {
    flag: BusyFlag,
    holder: BusyHolder,
    sink: Arc<dyn StatusSink>,
}

impl std::fmt::Debug for BusyGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BusyGuard")
            .field("flag", &self.flag)
            .field("holder", &self.holder)
            .finish_non_exhaustive()
    }
}

impl BusyGuard {
    pub fn holder(&self) -> BusyHolder {
        self.holder
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        if self.flag.release(self.holder) {
            self.sink.emit(UiEvent::BusyChanged { busy: false });
        } else {
            log::debug!("busy は既に解放済み: {:?}", self.holder);
        }
    }
}

fn busy_message(existing: BusyHolder) -> &'static str {
    match existing {
        BusyHolder::Job(_) => "文字起こしジョブが実行中です。完了するまでお待ちください",
        BusyHolder::Translation(_) => "翻訳が実行中です。完了するまでお待ちください",
    }
}
