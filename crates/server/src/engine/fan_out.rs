//! Fan-Out Engine: duplicates each submitted entry into a queued
//! row per registered device of the owning user.

use hishtory_data::{EncHistoryEntry, StorageAdapter, SubmitResponse};

use crate::error::AppError;

/// Submit(entries, sourceDeviceId) -> SubmitResponse.
pub async fn submit(
    adapter: &dyn StorageAdapter,
    entries: &[EncHistoryEntry],
    source_device_id: &str,
) -> Result<SubmitResponse, AppError> {
    if entries.is_empty() {
        return Ok(SubmitResponse::default());
    }

    let user_id = &entries[0].user_id;
    if entries.iter().any(|e| &e.user_id != user_id) {
        return Err(AppError::invalid("all submitted entries must share one user_id"));
    }

    let devices = adapter.devices_for_user(user_id).await?;
    if devices.is_empty() {
        return Err(hishtory_data::DataError::NotFound.into());
    }

    adapter.fan_out_entries(entries, &devices, source_device_id).await?;

    let dump_requests = adapter
        .list_dump_requests(user_id)
        .await?
        .into_iter()
        .filter(|r| r.requesting_device_id != source_device_id)
        .collect();
    let deletion_requests = adapter.get_deletion_requests(user_id, source_device_id).await?;

    Ok(SubmitResponse { dump_requests, deletion_requests })
}

#[cfg(test)]
mod tests {
    use hishtory_data::{InMemoryAdapter, UnixMillis};

    use super::*;
    use crate::engine::registry;

    fn entry(user_id: &str, device_id: &str, encrypted_id: &str) -> EncHistoryEntry {
        EncHistoryEntry {
            encrypted_data: b"ciphertext".to_vec(),
            nonce: b"nonce".to_vec(),
            device_id: device_id.to_owned(),
            user_id: user_id.to_owned(),
            date: UnixMillis::now(),
            encrypted_id: encrypted_id.to_owned(),
            read_count: 0,
        }
    }

    #[tokio::test]
    async fn submit_rejects_mixed_users() {
        let adapter = InMemoryAdapter::new();
        registry::register(&adapter, None, "u1", "d1", "127.0.0.1").await.unwrap();
        let entries = [entry("u1", "d1", "e1"), entry("u2", "d1", "e2")];
        let err = submit(&adapter, &entries, "d1").await.unwrap_err();
        assert!(matches!(err, AppError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn submit_fans_out_to_every_device() {
        let adapter = InMemoryAdapter::new();
        registry::register(&adapter, None, "u1", "d1", "127.0.0.1").await.unwrap();
        registry::register(&adapter, None, "u1", "d2", "127.0.0.1").await.unwrap();

        submit(&adapter, &[entry("u1", "d1", "e1")], "d1").await.unwrap();

        let rows_d1 = adapter.query_entries("u1", "d1", hishtory_data::READ_LIMIT).await.unwrap();
        let rows_d2 = adapter.query_entries("u1", "d2", hishtory_data::READ_LIMIT).await.unwrap();
        assert_eq!(rows_d2.len(), 1);
        assert_eq!(rows_d1.len(), 1);
    }

    #[tokio::test]
    async fn submit_with_no_registered_devices_is_not_found() {
        let adapter = InMemoryAdapter::new();
        let err = submit(&adapter, &[entry("u1", "d1", "e1")], "d1").await.unwrap_err();
        assert!(matches!(err, AppError::Data(hishtory_data::DataError::NotFound)));
    }
}
