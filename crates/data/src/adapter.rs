use async_trait::async_trait;

use crate::error::DataResult;
use crate::model::{DeletionRequest, DeletionRequestMessage, Device, DumpRequest, EncHistoryEntry};
use crate::time::UnixMillis;

/// What kind of request touched a `(user, device)` pair, for [`UsageUpdate`].
#[derive(Debug, Clone, Copy)]
pub enum UsageKind {
    Submit { num_entries: i64 },
    Query,
}

/// An advisory usage observation recorded by the Request Router on every
/// request. Never consulted by protocol logic, only by operators.
#[derive(Debug, Clone)]
pub struct UsageUpdate {
    pub user_id: String,
    pub device_id: String,
    pub ip: Option<String>,
    pub version: Option<String>,
    pub kind: UsageKind,
}

/// Uniform CRUD surface over encrypted entries, devices, dump requests,
/// deletion requests and usage records.
///
/// Implementations differ in the atomicity and fan-out details they can
/// offer: the relational adapter commits an entire submission as one
/// transaction and includes the source device in the fan-out target set;
/// the object-store adapter fans out per-object writes non-atomically and
/// excludes the source device. Both satisfy the same observable properties
/// because `EncryptedId` deduplicates on the client.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    /// Registers `device` for its user. Returns `Ok(true)` if this is the
    /// first device ever seen for that user (so callers should not create a
    /// dump request), `Ok(false)` if at least one peer already existed.
    ///
    /// Re-registration of an existing `(user_id, device_id)` is tolerated
    /// (idempotent) by the object-store adapter and surfaces
    /// [`crate::error::DataError::Conflict`] from the relational adapter.
    async fn insert_device(&self, device: Device) -> DataResult<bool>;

    async fn remove_device(&self, user_id: &str, device_id: &str) -> DataResult<()>;

    async fn devices_for_user(&self, user_id: &str) -> DataResult<Vec<String>>;

    /// Number of distinct users known to the store, used to enforce
    /// `HISHTORY_MAX_NUM_USERS`.
    async fn distinct_user_count(&self) -> DataResult<u64>;

    async fn create_dump_request(&self, request: DumpRequest) -> DataResult<()>;

    async fn delete_dump_request(&self, user_id: &str, requesting_device_id: &str) -> DataResult<()>;

    /// All dump requests for `user_id`. Callers filter out requests whose
    /// `requesting_device_id` matches the caller.
    async fn list_dump_requests(&self, user_id: &str) -> DataResult<Vec<DumpRequest>>;

    /// Fans `entries` out to every device in `devices`, producing one row
    /// per `(entry, device)` pair with `read_count` reset to zero. Whether
    /// `source_device_id` itself receives a copy is backend-defined.
    async fn fan_out_entries(&self, entries: &[EncHistoryEntry], devices: &[String], source_device_id: &str) -> DataResult<()>;

    /// Writes `entries` into `requesting_device_id`'s queue only, as part of
    /// `SubmitDump`. Entries have already been rewritten to carry
    /// `requesting_device_id` as their `device_id`.
    async fn write_dump_entries(&self, entries: &[EncHistoryEntry]) -> DataResult<()>;

    /// Rows destined for `device_id` with `read_count < read_limit`.
    async fn query_entries(&self, user_id: &str, device_id: &str, read_limit: i32) -> DataResult<Vec<EncHistoryEntry>>;

    /// Increments `read_count` for the given `(user_id, device_id,
    /// encrypted_id)` rows. May be invoked after the response carrying
    /// these rows has already been sent.
    async fn increment_read_counts(&self, user_id: &str, device_id: &str, encrypted_ids: &[String]) -> DataResult<()>;

    /// Every entry belonging to `user_id`, regardless of destination
    /// device, deduplicated by `encrypted_id`.
    async fn bootstrap_entries(&self, user_id: &str) -> DataResult<Vec<EncHistoryEntry>>;

    /// Deletes rows with `read_count > limit`. Returns the number removed.
    async fn prune_entries(&self, limit: i32) -> DataResult<u64>;

    /// Optional deep clean: removes entries older than `older_than`
    /// belonging to single-device, long-idle users. Returns the number
    /// removed.
    async fn deep_clean_entries(&self, older_than: UnixMillis) -> DataResult<u64>;

    /// Accepts a deletion request: persists one copy per device in
    /// `devices` and eagerly erases matching rows from the queue store.
    async fn add_deletion_request(&self, request: DeletionRequest, devices: &[String]) -> DataResult<()>;

    /// Erases rows matching any of `messages`, keyed by `encrypted_id` where
    /// present and by `(user_id, device_id, date)` otherwise.
    async fn delete_matching_entries(&self, user_id: &str, messages: &[DeletionRequestMessage]) -> DataResult<()>;

    /// Deletion request copies addressed to `device_id`, with `read_count`
    /// incremented as a side effect of the read.
    async fn get_deletion_requests(&self, user_id: &str, device_id: &str) -> DataResult<Vec<DeletionRequest>>;

    /// Messages of deletion requests addressed to `device_id`, without
    /// incrementing their `read_count`. Used by the query path to re-apply
    /// pending deletions against this destination's own queue before
    /// reading it, independently of the client ever calling
    /// `get_deletion_requests` directly.
    async fn pending_deletion_messages(&self, user_id: &str, device_id: &str) -> DataResult<Vec<DeletionRequestMessage>>;

    /// Deletes deletion request copies with `read_count > limit`. Returns
    /// the number removed.
    async fn prune_deletion_requests(&self, limit: i32) -> DataResult<u64>;

    /// Best-effort operational bookkeeping; errors must never fail the
    /// calling request.
    async fn record_usage(&self, update: UsageUpdate) -> DataResult<()>;

    /// Test-only: wipes all entry rows. Backs `/api/v1/wipe-db-entries`
    /// under `HISHTORY_TEST=1`.
    async fn wipe_entries(&self) -> DataResult<()>;

    /// Test-only: reports the number of connections currently checked out
    /// of the backing store, for `/api/v1/get-num-connections`.
    async fn num_connections(&self) -> DataResult<u64>;
}
