//! Key-value store abstraction.
//!
//! Keys are `/`-separated relative paths such as `jobs/<id>/status.json`.
//! Implementations must make `put` atomic: a concurrent or crashed writer
//! never leaves a partially written value visible to `get`.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};

use crate::error::{StorageError, StorageResult};

/// Durable byte store addressed by string keys.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a value. Missing keys are `Ok(None)`.
    async fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Write a value atomically, replacing any previous one.
    async fn put(&self, key: &str, value: &[u8]) -> StorageResult<()>;

    /// Remove a value. Returns whether it existed.
    async fn delete(&self, key: &str) -> StorageResult<bool>;

    /// List every key starting with `prefix`, sorted.
    async fn list_prefix(&self, prefix: &str) -> StorageResult<Vec<String>>;
}

/// Reject keys that could escape the store root or alias another key.
pub fn validate_key(key: &str) -> StorageResult<()> {
    let valid = !key.is_empty()
        && !key.contains('\\')
        && !key.contains('\0')
        && key
            .split('/')
            .all(|segment| !segment.is_empty() && segment != "." && segment != "..");

    if valid {
        Ok(())
    } else {
        Err(StorageError::invalid_key(key))
    }
}

/// Read and decode a JSON value.
pub async fn get_json<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> StorageResult<Option<T>> {
    match store.get(key).await? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

/// Encode and write a JSON value.
pub async fn put_json<T: Serialize + Sync>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> StorageResult<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    store.put(key, &bytes).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_key() {
        assert!(validate_key("jobs/abc/status.json").is_ok());
        assert!(validate_key("a").is_ok());

        for bad in ["", "/abs", "jobs//x", "jobs/../etc", "./x", "a\\b", "trailing/"] {
            assert!(validate_key(bad).is_err(), "{bad:?} should be rejected");
        }
    }
}
