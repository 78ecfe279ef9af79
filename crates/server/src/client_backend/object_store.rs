//! Object-store implementation of [`super::ClientBackend`]: performs the
//! same semantics as the coordinator's engines directly against a bucket,
//! via `hishtory_data::ObjectStoreAdapter`, with no HTTP listener involved.

use async_trait::async_trait;
use hishtory_data::{config::ObjectStoreConfig, DeletionRequest, EncHistoryEntry, ObjectStoreAdapter, StorageAdapter, SubmitResponse};

use super::ClientBackend;
use crate::error::AppError;
use crate::engine;

pub struct ObjectStoreClientBackend {
    adapter: ObjectStoreAdapter,
}

impl ObjectStoreClientBackend {
    pub async fn connect(config: &ObjectStoreConfig) -> Result<Self, AppError> {
        let adapter = ObjectStoreAdapter::connect(config).await?;
        Ok(Self { adapter })
    }
}

#[async_trait]
impl ClientBackend for ObjectStoreClientBackend {
    async fn register_device(&self, user_id: &str, device_id: &str) -> Result<(), AppError> {
        engine::registry::register(&self.adapter, None, user_id, device_id, "").await
    }

    async fn bootstrap(&self, user_id: &str) -> Result<Vec<EncHistoryEntry>, AppError> {
        engine::bootstrap::bootstrap(&self.adapter, user_id).await
    }

    async fn submit_entries(&self, entries: &[EncHistoryEntry], source_device_id: &str) -> Result<SubmitResponse, AppError> {
        engine::fan_out::submit(&self.adapter, entries, source_device_id).await
    }

    async fn submit_dump(&self, entries: &[EncHistoryEntry], user_id: &str, requesting_device_id: &str, source_device_id: &str) -> Result<(), AppError> {
        engine::dump::submit_dump(&self.adapter, entries, user_id, requesting_device_id, source_device_id).await
    }

    async fn query_entries(&self, user_id: &str, device_id: &str) -> Result<Vec<EncHistoryEntry>, AppError> {
        engine::retention::query(&self.adapter, user_id, device_id).await
    }

    async fn get_deletion_requests(&self, user_id: &str, device_id: &str) -> Result<Vec<DeletionRequest>, AppError> {
        engine::deletion::get_deletion_requests(&self.adapter, user_id, device_id).await
    }

    async fn add_deletion_request(&self, request: DeletionRequest) -> Result<(), AppError> {
        engine::deletion::add_deletion_request(&self.adapter, request).await
    }

    async fn uninstall(&self, user_id: &str, device_id: &str) -> Result<(), AppError> {
        engine::registry::unregister(&self.adapter, user_id, device_id).await
    }

    async fn ping(&self) -> Result<(), AppError> {
        self.adapter.num_connections().await?;
        Ok(())
    }
}
