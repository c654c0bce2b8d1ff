use std::collections::HashMap;

use parking_lot::Mutex;

use super::KeyStore;
use crate::domain::error::AppError;
use crate::domain::types::CredentialName;

/// プロセス内のみのキーストア
#[derive(Default)]
pub struct MemoryKeyStore {
    entries: Mutex<HashMap<CredentialName, String>>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyStore for MemoryKeyStore {
    fn get(&self, name: CredentialName) -> Result<Option<String>, AppError> {
        Ok(self.entries.lock().get(&name).cloned())
    }

    fn set(&self, name: CredentialName, value: &str) -> Result<(), AppError> {
        self.entries.lock().insert(name, value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryKeyStore::new();
        assert!(store.get(CredentialName::Translation).unwrap().is_none());
        store.set(CredentialName::Translation, "k").unwrap();
        assert_eq!(
            store.get(CredentialName::Translation).unwrap().as_deref(),
            Some("k")
        );
        assert!(store.get(CredentialName::Transcription).unwrap().is_none());
    }
}
