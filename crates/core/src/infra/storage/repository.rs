use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};

use super::KeyStore;
use crate::domain::error::AppError;
use crate::domain::types::CredentialName;

/// SQLite キーストア（settings テーブルに key/value で保存）
pub struct SqliteKeyStore {
    conn: Mutex<Connection>,
}

impl SqliteKeyStore {
    /// 新規接続（ファイルパス指定）
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let conn = Connection::open(path.as_ref())
            .map_err(|e| AppError::storage(format!("DB接続に失敗: {e}")))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    /// in-memory DB（テスト用）
    pub fn open_in_memory() -> Result<Self, AppError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| AppError::storage(format!("in-memory DB作成に失敗: {e}")))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    /// 既定の場所（ローカルデータディレクトリ配下）
    pub fn default_path() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("subflow")
            .join("keys.db")
    }

    /// `path` が None なら既定の場所に作成する
    pub fn open_or_default(path: Option<&str>) -> Result<Self, AppError> {
        let path = match path {
            Some(p) => PathBuf::from(p),
            None => {
                let path = Self::default_path();
                if let Some(dir) = path.parent() {
                    std::fs::create_dir_all(dir).map_err(|e| {
                        AppError::storage(format!("データディレクトリ作成に失敗: {e}"))
                    })?;
                }
                path
            }
        };
        log::info!("キーストア: {}", path.display());
        Self::open(path)
    }

    /// スキーママイグレーション
    fn migrate(&self) -> Result<(), AppError> {
        self.conn
            .lock()
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS settings (
                    key   TEXT PRIMARY KEY,
                    value TEXT NOT NULL
                );
                ",
            )
            .map_err(|e| AppError::storage(format!("マイグレーション失敗: {e}")))?;
        Ok(())
    }
}

impl KeyStore for SqliteKeyStore {
    fn get(&self, name: CredentialName) -> Result<Option<String>, AppError> {
        self.conn
            .lock()
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![name.key()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| AppError::storage(format!("キー読み取り失敗: {e}")))
    }

    fn set(&self, name: CredentialName, value: &str) -> Result<(), AppError> {
        self.conn
            .lock()
            .execute(
                "INSERT INTO settings (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![name.key(), value],
            )
            .map_err(|e| AppError::storage(format!("キー保存失敗: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_missing_key() {
        let store = SqliteKeyStore::open_in_memory().unwrap();
        assert!(store.get(CredentialName::Transcription).unwrap().is_none());
    }

    #[test]
    fn test_set_and_get() {
        let store = SqliteKeyStore::open_in_memory().unwrap();
        store.set(CredentialName::Transcription, "sm-key").unwrap();
        store.set(CredentialName::Translation, "deepl-key").unwrap();

        assert_eq!(
            store.get(CredentialName::Transcription).unwrap().as_deref(),
            Some("sm-key")
        );
        assert_eq!(
            store.get(CredentialName::Translation).unwrap().as_deref(),
            Some("deepl-key")
        );
    }

    #[test]
    fn test_set_overwrites() {
        let store = SqliteKeyStore::open_in_memory().unwrap();
        store.set(CredentialName::Translation, "old").unwrap();
        store.set(CredentialName::Translation, "new").unwrap();
        assert_eq!(
            store.get(CredentialName::Translation).unwrap().as_deref(),
            Some("new")
        );
    }

    #[test]
    fn test_value_stored_verbatim() {
        let store = SqliteKeyStore::open_in_memory().unwrap();
        store.set(CredentialName::Transcription, "  spaced  ").unwrap();
        assert_eq!(
            store.get(CredentialName::Transcription).unwrap().as_deref(),
            Some("  spaced  ")
        );
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys.db");
        {
            let store = SqliteKeyStore::open(&path).unwrap();
            store.set(CredentialName::Transcription, "persisted").unwrap();
        }
        let store = SqliteKeyStore::open(&path).unwrap();
        assert_eq!(
            store.get(CredentialName::Transcription).unwrap().as_deref(),
            Some("persisted")
        );
    }

    #[test]
    fn test_open_or_default_with_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("explicit.db");
        let store = SqliteKeyStore::open_or_default(path.to_str()).unwrap();
        store.set(CredentialName::Translation, "x").unwrap();
        assert!(path.exists());
    }
}
