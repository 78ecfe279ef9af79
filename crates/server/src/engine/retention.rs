//! Retention Engine & Query path. Pruning runs from the periodic
//! maintainer; `query` runs per-request and dispatches the read-count
//! increment onto a background task so the response is never blocked by it.

use hishtory_data::{EncHistoryEntry, StorageAdapter, READ_LIMIT};

use crate::error::AppError;

/// Query(userId, deviceId) -> entries. Before reading, re-applies this
/// destination's own pending deletion requests by erasing matching rows
/// from its queue. `AddDeletionRequest` already does this eagerly across
/// every destination at acceptance time, but a destination's own copy can
/// still arrive after that eager pass (a delayed or partially fanned-out
/// write); the lazy pass here is the backstop that guarantees a device
/// never reads a revoked entry regardless of write ordering. It does not
/// increment the deletion request's `read_count` — that only happens when
/// a client calls `GetDeletionRequests` directly.
pub async fn query(adapter: &dyn StorageAdapter, user_id: &str, device_id: &str) -> Result<Vec<EncHistoryEntry>, AppError> {
    if user_id.is_empty() || device_id.is_empty() {
        return Err(AppError::invalid("user_id and device_id are required"));
    }

    let pending = adapter.pending_deletion_messages(user_id, device_id).await?;
    if !pending.is_empty() {
        adapter.delete_matching_entries(user_id, &pending).await?;
    }

    let rows = adapter.query_entries(user_id, device_id, READ_LIMIT).await?;
    Ok(rows)
}

/// Dispatches the read-count increment for the rows just returned by
/// [`query`] onto a background task: the response must not wait on this
/// update.
pub fn increment_read_counts_in_background(adapter: std::sync::Arc<dyn StorageAdapter>, user_id: String, device_id: String, encrypted_ids: Vec<String>) {
    if encrypted_ids.is_empty() {
        return;
    }
    tokio::spawn(async move {
        if let Err(e) = adapter.increment_read_counts(&user_id, &device_id, &encrypted_ids).await {
            tracing::warn!(error = ?e, %user_id, %device_id, "failed to increment read counts");
        }
    });
}

/// Periodic prune pass: drops rows and deletion-request copies past
/// their respective retry limits. Runs from the Periodic Maintainer.
pub async fn prune(adapter: &dyn StorageAdapter, entry_limit: i32, deletion_limit: i32) -> Result<(u64, u64), AppError> {
    let entries_removed = adapter.prune_entries(entry_limit).await?;
    let deletions_removed = adapter.prune_deletion_requests(deletion_limit).await?;
    Ok((entries_removed, deletions_removed))
}

/// Deep clean (prod-only): drops rows older than `older_than` owned
/// by single-device users.
pub async fn deep_clean(adapter: &dyn StorageAdapter, older_than: hishtory_data::UnixMillis) -> Result<u64, AppError> {
    Ok(adapter.deep_clean_entries(older_than).await?)
}

#[cfg(test)]
mod tests {
    use hishtory_data::{InMemoryAdapter, UnixMillis, PRUNE_DELETION_LIMIT, PRUNE_ENTRY_LIMIT};

    use super::*;
    use crate::engine::registry;

    #[tokio::test]
    async fn query_rejects_missing_ids() {
        let adapter = InMemoryAdapter::new();
        let err = query(&adapter, "u1", "").await.unwrap_err();
        assert!(matches!(err, AppError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn prune_reports_both_counts() {
        let adapter = InMemoryAdapter::new();
        registry::register(&adapter, None, "u1", "d1", "127.0.0.1").await.unwrap();
        let (entries_removed, deletions_removed) = prune(&adapter, PRUNE_ENTRY_LIMIT, PRUNE_DELETION_LIMIT).await.unwrap();
        assert_eq!(entries_removed, 0);
        assert_eq!(deletions_removed, 0);
    }

    #[tokio::test]
    async fn increment_read_counts_in_background_is_a_noop_for_empty_ids() {
        let adapter: std::sync::Arc<dyn hishtory_data::StorageAdapter> = std::sync::Arc::new(InMemoryAdapter::new());
        increment_read_counts_in_background(adapter, "u1".to_owned(), "d1".to_owned(), Vec::new());
    }

    #[tokio::test]
    async fn deep_clean_is_a_noop_with_no_entries() {
        let adapter = InMemoryAdapter::new();
        let removed = deep_clean(&adapter, UnixMillis::now()).await.unwrap();
        assert_eq!(removed, 0);
    }

    #[tokio::test]
    async fn query_lazily_erases_a_row_that_arrives_after_the_eager_deletion_pass() {
        use hishtory_data::{DeletionRequest, DeletionRequestMessage, EncHistoryEntry};

        let adapter = InMemoryAdapter::new();
        registry::register(&adapter, None, "u1", "d1", "127.0.0.1").await.unwrap();
        registry::register(&adapter, None, "u1", "d2", "127.0.0.1").await.unwrap();

        let request = DeletionRequest {
            user_id: "u1".to_owned(),
            destination_device_id: String::new(),
            send_time: UnixMillis::now(),
            messages: vec![DeletionRequestMessage { device_id: String::new(), date: UnixMillis(0), entry_id: Some("e1".to_owned()) }],
            read_count: 0,
        };
        adapter.add_deletion_request(request, &["d1".to_owned(), "d2".to_owned()]).await.unwrap();

        // A copy for the already-revoked entry shows up at d2 only after the
        // eager erase ran, simulating a delayed or racing fan-out write.
        let late_entry = EncHistoryEntry {
            encrypted_data: b"ciphertext".to_vec(),
            nonce: b"nonce".to_vec(),
            device_id: "d2".to_owned(),
            user_id: "u1".to_owned(),
            date: UnixMillis::now(),
            encrypted_id: "e1".to_owned(),
            read_count: 0,
        };
        adapter.fan_out_entries(&[late_entry], &["d2".to_owned()], "d1").await.unwrap();

        assert!(query(&adapter, "u1", "d2").await.unwrap().is_empty());
    }
}
