//! 文字起こしジョブのライフサイクル管理クライアント。
//!
//! - `domain`: ジョブ状態機械・設定・エラーなど I/O を持たない型
//! - `infra`: バックエンドゲートウェイ、キーストア、スケジューラ、表示先
//! - `usecase`: コントローラ、翻訳、リンク解決、書き出し、`AppService`

pub mod domain;
pub mod infra;
pub mod usecase;
