use serde::{Deserialize, Serialize};

use crate::time::UnixMillis;

/// Read-count threshold past which a queued entry is eligible for delivery.
///
/// Entries with `read_count >= READ_LIMIT` are no longer returned by `Query`,
/// even though they linger in the store until the next prune pass.
pub const READ_LIMIT: i32 = 5;

/// Rows are pruned once their read count exceeds this.
pub const PRUNE_ENTRY_LIMIT: i32 = 10;

/// Deletion request copies are pruned once their read count exceeds this.
pub const PRUNE_DELETION_LIMIT: i32 = 100;

/// Nominal chunk size for batched relational inserts, kept below common
/// bind-parameter limits.
pub const FANOUT_CHUNK_SIZE: usize = 1000;

/// One encrypted command record queued for delivery to one device.
///
/// A single logical submission becomes one `EncHistoryEntry` per destination
/// device, all sharing `encrypted_id` and `user_id` and differing only in
/// `device_id` (and `read_count`, which starts at zero).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EncHistoryEntry {
    pub encrypted_data: Vec<u8>,
    pub nonce: Vec<u8>,
    pub device_id: String,
    pub user_id: String,
    pub date: UnixMillis,
    pub encrypted_id: String,
    #[serde(default)]
    pub read_count: i32,
}

/// A `(user, device)` registration. The set of devices for a user defines
/// the fan-out target set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Device {
    pub user_id: String,
    pub device_id: String,
    pub registration_ip: String,
    pub registration_date: UnixMillis,
}

/// A pending request for a full history dump, created when a device
/// registers into a user that already owns at least one other device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DumpRequest {
    pub user_id: String,
    pub requesting_device_id: String,
    pub request_time: UnixMillis,
}

/// One `{DeviceId, Date, EntryId}` tuple identifying a target entry of a
/// deletion request. Across revisions of the wire protocol either the
/// `(device_id, date)` pair or `entry_id` alone may be populated; consumers
/// should accept whichever is present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeletionRequestMessage {
    #[serde(default)]
    pub device_id: String,
    #[serde(default)]
    pub date: UnixMillis,
    #[serde(default, rename = "EntryId")]
    pub entry_id: Option<String>,
}

/// An instruction to erase a set of entries from all destinations. When
/// accepted, one copy is created per registered device of `user_id`; each
/// destination's copy is delivered at-least-once and pruned once its
/// `read_count` exceeds [`PRUNE_DELETION_LIMIT`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeletionRequest {
    pub user_id: String,
    #[serde(default)]
    pub destination_device_id: String,
    pub send_time: UnixMillis,
    pub messages: Vec<DeletionRequestMessage>,
    #[serde(default)]
    pub read_count: i32,
}

/// Advisory `(user, device)` operational counters. Never affects protocol
/// semantics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UsageData {
    pub user_id: String,
    pub device_id: String,
    pub last_used: UnixMillis,
    pub last_ip: String,
    pub num_entries_handled: i64,
    pub last_queried: UnixMillis,
    pub num_queries: i64,
    pub version: String,
}

/// Response to a `Submit` call: dump requests and pending deletion requests
/// piggybacked to the submitting device so it need not poll separately.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SubmitResponse {
    pub dump_requests: Vec<DumpRequest>,
    pub deletion_requests: Vec<DeletionRequest>,
}
