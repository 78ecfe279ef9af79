//! Dump Coordinator: the state machine that lets a newly registered
//! device catch up from an existing peer instead of the coordinator ever
//! holding plaintext.

use hishtory_data::{DumpRequest, EncHistoryEntry, StorageAdapter};

use crate::error::AppError;

/// SubmitDump(entries, userId, requestingDeviceId, sourceDeviceId):
/// rewrites each entry to the requester's queue and retires the
/// DumpRequest. `source_device_id` identifies the peer fulfilling the
/// dump; the engine does not otherwise consume it.
pub async fn submit_dump(
    adapter: &dyn StorageAdapter,
    entries: &[EncHistoryEntry],
    user_id: &str,
    requesting_device_id: &str,
    _source_device_id: &str,
) -> Result<(), AppError> {
    if entries.iter().any(|e| e.user_id != user_id) {
        return Err(AppError::invalid("all dumped entries must belong to user_id"));
    }

    let rewritten: Vec<EncHistoryEntry> = entries
        .iter()
        .cloned()
        .map(|mut e| {
            e.device_id = requesting_device_id.to_owned();
            e.read_count = 0;
            e
        })
        .collect();

    adapter.write_dump_entries(&rewritten).await?;
    adapter.delete_dump_request(user_id, requesting_device_id).await?;
    Ok(())
}

/// GetPendingDumpRequests(userId, callerDeviceId): every dump request for
/// the user except the caller's own.
pub async fn pending_dump_requests(adapter: &dyn StorageAdapter, user_id: &str, caller_device_id: &str) -> Result<Vec<DumpRequest>, AppError> {
    let requests = adapter
        .list_dump_requests(user_id)
        .await?
        .into_iter()
        .filter(|r| r.requesting_device_id != caller_device_id)
        .collect();
    Ok(requests)
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
    async fn registering_a_second_device_creates_a_dump_request_for_it_only() {
        let adapter = InMemoryAdapter::new();
        registry::register(&adapter, None, "u1", "d1", "127.0.0.1").await.unwrap();
        registry::register(&adapter, None, "u1", "d2", "127.0.0.1").await.unwrap();

        let for_d2 = pending_dump_requests(&adapter, "u1", "d2").await.unwrap();
        assert!(for_d2.is_empty());
        let for_d1 = pending_dump_requests(&adapter, "u1", "d1").await.unwrap();
        assert_eq!(for_d1.len(), 1);
        assert_eq!(for_d1[0].requesting_device_id, "d2");
    }

    #[tokio::test]
    async fn submit_dump_rewrites_entries_to_the_requester_and_retires_the_request() {
        let adapter = InMemoryAdapter::new();
        registry::register(&adapter, None, "u1", "d1", "127.0.0.1").await.unwrap();
        registry::register(&adapter, None, "u1", "d2", "127.0.0.1").await.unwrap();

        submit_dump(&adapter, &[entry("u1", "d1", "e1")], "u1", "d2", "d1").await.unwrap();

        let remaining = pending_dump_requests(&adapter, "u1", "d1").await.unwrap();
        assert!(remaining.is_empty());

        let rows = adapter.query_entries("u1", "d2", hishtory_data::READ_LIMIT).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].device_id, "d2");
    }
}
