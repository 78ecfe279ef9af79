//! Deletion Propagator: fans a deletion request out to one pending
//! copy per device and eagerly erases matching ciphertexts.

use hishtory_data::{DeletionRequest, StorageAdapter};

use crate::error::AppError;

/// AddDeletionRequest(request): persists one copy per device of
/// `request.user_id` and eagerly erases matching rows from the queue
/// store.
pub async fn add_deletion_request(adapter: &dyn StorageAdapter, mut request: DeletionRequest) -> Result<(), AppError> {
    if request.user_id.is_empty() {
        return Err(AppError::invalid("user_id is required"));
    }
    request.read_count = 0;

    let devices = adapter.devices_for_user(&request.user_id).await?;
    adapter.add_deletion_request(request, &devices).await?;
    Ok(())
}

/// GetDeletionRequests(userId, deviceId): reads and increments pending
/// deletion-request copies addressed to `deviceId`.
pub async fn get_deletion_requests(adapter: &dyn StorageAdapter, user_id: &str, device_id: &str) -> Result<Vec<DeletionRequest>, AppError> {
    if user_id.is_empty() || device_id.is_empty() {
        return Err(AppError::invalid("user_id and device_id are required"));
    }
    Ok(adapter.get_deletion_requests(user_id, device_id).await?)
}

#[cfg(test)]
mod tests {
    use hishtory_data::{DeletionRequestMessage, InMemoryAdapter, UnixMillis};

    use super::*;
    use crate::engine::{fan_out, registry, retention};

    fn entry(user_id: &str, device_id: &str, encrypted_id: &str) -> hishtory_data::EncHistoryEntry {
        hishtory_data::EncHistoryEntry {
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
    async fn add_deletion_request_erases_matching_rows_before_the_next_query() {
        let adapter = InMemoryAdapter::new();
        registry::register(&adapter, None, "u1", "d1", "127.0.0.1").await.unwrap();
        registry::register(&adapter, None, "u1", "d2", "127.0.0.1").await.unwrap();
        fan_out::submit(&adapter, &[entry("u1", "d1", "e1")], "d1").await.unwrap();

        let request = DeletionRequest {
            user_id: "u1".to_owned(),
            destination_device_id: String::new(),
            send_time: UnixMillis::now(),
            messages: vec![DeletionRequestMessage { device_id: String::new(), date: UnixMillis(0), entry_id: Some("e1".to_owned()) }],
            read_count: 0,
        };
        add_deletion_request(&adapter, request).await.unwrap();

        assert!(retention::query(&adapter, "u1", "d2").await.unwrap().is_empty());
        let requests = get_deletion_requests(&adapter, "u1", "d2").await.unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].read_count, 1);
    }
}
