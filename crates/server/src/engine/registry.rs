//! Device Registry: bounded-growth (user, device) tracking and
//! dump-request synthesis on registration.

use hishtory_data::{DataError, Device, DumpRequest, StorageAdapter, UnixMillis};

use crate::error::AppError;

/// Registers `(user_id, device_id)`. Enforces `max_num_users` against new
/// users only; re-registration of an existing pair is tolerated (the
/// backend surfaces `DataError::Conflict`, which the router's `Writer`
/// turns into a 200, matching the idempotent-retry contract).
///
/// When this registration brings a second device onto a user that already
/// had one, synthesizes the `DumpRequest` that lets the new device catch up.
pub async fn register(
    adapter: &dyn StorageAdapter,
    max_num_users: Option<u32>,
    user_id: &str,
    device_id: &str,
    client_ip: &str,
) -> Result<(), AppError> {
    if user_id.is_empty() || device_id.is_empty() {
        return Err(AppError::invalid("user_id and device_id are required"));
    }

    let had_peers = !adapter.devices_for_user(user_id).await?.is_empty();

    if !had_peers {
        if let Some(max) = max_num_users {
            let distinct = adapter.distinct_user_count().await?;
            if distinct >= max as u64 {
                return Err(AppError::Data(DataError::CapacityExceeded));
            }
        }
    }

    let device = Device {
        user_id: user_id.to_owned(),
        device_id: device_id.to_owned(),
        registration_ip: client_ip.to_owned(),
        registration_date: UnixMillis::now(),
    };
    match adapter.insert_device(device).await {
        Ok(_) => {}
        Err(DataError::Conflict) => return Ok(()),
        Err(e) => return Err(e.into()),
    }

    if had_peers {
        adapter
            .create_dump_request(DumpRequest {
                user_id: user_id.to_owned(),
                requesting_device_id: device_id.to_owned(),
                request_time: UnixMillis::now(),
            })
            .await?;
    }
    Ok(())
}

/// Unregister(userId, deviceId): removes the device row and its queue,
/// deletion-request, and dump-request footprint.
pub async fn unregister(adapter: &dyn StorageAdapter, user_id: &str, device_id: &str) -> Result<(), AppError> {
    if user_id.is_empty() || device_id.is_empty() {
        return Err(AppError::invalid("user_id and device_id are required"));
    }
    adapter.remove_device(user_id, device_id).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use hishtory_data::InMemoryAdapter;

    use super::*;

    #[tokio::test]
    async fn rejects_missing_ids() {
        let adapter = InMemoryAdapter::new();
        let err = register(&adapter, None, "", "d1", "127.0.0.1").await.unwrap_err();
        assert!(matches!(err, AppError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn new_user_is_not_capped_by_zero_max() {
        let adapter = InMemoryAdapter::new();
        let err = register(&adapter, Some(0), "u1", "d1", "127.0.0.1").await.unwrap_err();
        assert!(matches!(err, AppError::Data(DataError::CapacityExceeded)));
    }

    #[tokio::test]
    async fn existing_user_registration_ignores_the_cap() {
        let adapter = InMemoryAdapter::new();
        register(&adapter, Some(1), "u1", "d1", "127.0.0.1").await.unwrap();
        register(&adapter, Some(1), "u1", "d2", "127.0.0.1").await.unwrap();
        assert_eq!(adapter.devices_for_user("u1").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn unregister_removes_the_device() {
        let adapter = InMemoryAdapter::new();
        register(&adapter, None, "u1", "d1", "127.0.0.1").await.unwrap();
        unregister(&adapter, "u1", "d1").await.unwrap();
        assert!(adapter.devices_for_user("u1").await.unwrap().is_empty());
    }
}
