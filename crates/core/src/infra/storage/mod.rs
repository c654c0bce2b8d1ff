mod memory;
mod repository;

pub use memory::MemoryKeyStore;
pub use repository::SqliteKeyStore;

use crate::domain::error::AppError;
use crate::domain::types::CredentialName;

/// 資格情報の永続化境界。検証も変換も行わない。
pub trait KeyStore: Send + Sync {
    fn get(&self, name: CredentialName) -> Result<Option<String>, AppError>;
    fn set(&self, name: CredentialName, value: &str) -> Result<(), AppError>;
}
