//! Client Backend Adapter: the nine sync operations exposed as an
//! abstract interface with two implementations, so a client can talk to a
//! coordinator over HTTP or directly against an object-store bucket
//! without the rest of its code caring which.

mod http;
mod object_store;

pub use http::HttpClientBackend;
pub use object_store::ObjectStoreClientBackend;

use async_trait::async_trait;
use hishtory_data::{DeletionRequest, EncHistoryEntry, SubmitResponse};

use crate::error::AppError;

#[async_trait]
pub trait ClientBackend: Send + Sync {
    async fn register_device(&self, user_id: &str, device_id: &str) -> Result<(), AppError>;
    async fn bootstrap(&self, user_id: &str) -> Result<Vec<EncHistoryEntry>, AppError>;
    async fn submit_entries(&self, entries: &[EncHistoryEntry], source_device_id: &str) -> Result<SubmitResponse, AppError>;
    async fn submit_dump(&self, entries: &[EncHistoryEntry], user_id: &str, requesting_device_id: &str, source_device_id: &str) -> Result<(), AppError>;
    async fn query_entries(&self, user_id: &str, device_id: &str) -> Result<Vec<EncHistoryEntry>, AppError>;
    async fn get_deletion_requests(&self, user_id: &str, device_id: &str) -> Result<Vec<DeletionRequest>, AppError>;
    async fn add_deletion_request(&self, request: DeletionRequest) -> Result<(), AppError>;
    async fn uninstall(&self, user_id: &str, device_id: &str) -> Result<(), AppError>;
    async fn ping(&self) -> Result<(), AppError>;
}

/// Selects which [`ClientBackend`] implementation a client process should
/// build, mirroring `ServerConfig`'s own `HISHTORY_`-prefixed loading style.
#[derive(Debug, Clone)]
pub enum BackendType {
    Http { base_url: String },
    ObjectStore(hishtory_data::config::ObjectStoreConfig),
}
