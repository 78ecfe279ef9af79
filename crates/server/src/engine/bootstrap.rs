//! Bootstrap: an alternate catch-up path for a new device that does
//! not wait for a peer to observe and fulfil its DumpRequest.

use hishtory_data::{EncHistoryEntry, StorageAdapter};

use crate::error::AppError;

/// Bootstrap(userId, deviceId) -> every entry for `userId`, deduplicated by
/// `EncryptedId`, regardless of destination device.
pub async fn bootstrap(adapter: &dyn StorageAdapter, user_id: &str) -> Result<Vec<EncHistoryEntry>, AppError> {
    if user_id.is_empty() {
        return Err(AppError::invalid("user_id is required"));
    }
    Ok(adapter.bootstrap_entries(user_id).await?)
}

#[cfg(test)]
mod tests {
    use hishtory_data::{InMemoryAdapter, UnixMillis};

    use super::*;
    use crate::engine::{fan_out, registry};

    #[tokio::test]
    async fn bootstrap_requires_a_user_id() {
        let adapter = InMemoryAdapter::new();
        let err = bootstrap(&adapter, "").await.unwrap_err();
        assert!(matches!(err, AppError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn bootstrap_covers_every_destination_device() {
        let adapter = InMemoryAdapter::new();
        registry::register(&adapter, None, "u1", "d1", "127.0.0.1").await.unwrap();
        registry::register(&adapter, None, "u1", "d2", "127.0.0.1").await.unwrap();
        let entry = EncHistoryEntry {
            encrypted_data: b"ciphertext".to_vec(),
            nonce: b"nonce".to_vec(),
            device_id: "d1".to_owned(),
            user_id: "u1".to_owned(),
            date: UnixMillis::now(),
            encrypted_id: "e1".to_owned(),
            read_count: 0,
        };
        fan_out::submit(&adapter, &[entry], "d1").await.unwrap();

        let entries = bootstrap(&adapter, "u1").await.unwrap();
        assert_eq!(entries.len(), 1);
    }
}
