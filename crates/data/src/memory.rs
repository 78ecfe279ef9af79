//! In-memory `StorageAdapter`, enabled by `HISHTORY_TEST=1`. Used by
//! the coordinator's own test suite and by `/api/v1/wipe-db-entries` /
//! `/api/v1/get-num-connections` in test mode. Fan-out mirrors the
//! relational adapter's semantics (every registered device, including the
//! source, receives a queued copy) since this backend exists to make
//! protocol behavior deterministic and easy to assert against, not to
//! model a particular production backend.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::adapter::{StorageAdapter, UsageKind, UsageUpdate};
use crate::error::DataResult;
use crate::model::{DeletionRequest, DeletionRequestMessage, Device, DumpRequest, EncHistoryEntry};
use crate::time::UnixMillis;

#[derive(Default)]
struct State {
    devices: Vec<Device>,
    entries: Vec<EncHistoryEntry>,
    dump_requests: Vec<DumpRequest>,
    deletion_requests: Vec<DeletionRequest>,
    usage: HashMap<(String, String), (UnixMillis, String, i64, UnixMillis, i64, String)>,
}

#[derive(Default)]
pub struct InMemoryAdapter {
    state: Mutex<State>,
}

impl InMemoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }
}

fn matches_message(entry: &EncHistoryEntry, message: &DeletionRequestMessage) -> bool {
    match &message.entry_id {
        Some(entry_id) => entry.encrypted_id == *entry_id,
        None => entry.device_id == message.device_id && entry.date == message.date,
    }
}

#[async_trait]
impl StorageAdapter for InMemoryAdapter {
    async fn insert_device(&self, device: Device) -> DataResult<bool> {
        let mut state = self.state.lock();
        let was_new_user = !state.devices.iter().any(|d| d.user_id == device.user_id);
        state.devices.push(device);
        Ok(was_new_user)
    }

    async fn remove_device(&self, user_id: &str, device_id: &str) -> DataResult<()> {
        let mut state = self.state.lock();
        state.devices.retain(|d| !(d.user_id == user_id && d.device_id == device_id));
        state.entries.retain(|e| !(e.user_id == user_id && e.device_id == device_id));
        state
            .deletion_requests
            .retain(|r| !(r.user_id == user_id && r.destination_device_id == device_id));
        state
            .dump_requests
            .retain(|r| !(r.user_id == user_id && r.requesting_device_id == device_id));
        Ok(())
    }

    async fn devices_for_user(&self, user_id: &str) -> DataResult<Vec<String>> {
        let state = self.state.lock();
        Ok(state.devices.iter().filter(|d| d.user_id == user_id).map(|d| d.device_id.clone()).collect())
    }

    async fn distinct_user_count(&self) -> DataResult<u64> {
        let state = self.state.lock();
        let mut users: Vec<&str> = state.devices.iter().map(|d| d.user_id.as_str()).collect();
        users.sort_unstable();
        users.dedup();
        Ok(users.len() as u64)
    }

    async fn create_dump_request(&self, request: DumpRequest) -> DataResult<()> {
        let mut state = self.state.lock();
        let exists = state
            .dump_requests
            .iter()
            .any(|r| r.user_id == request.user_id && r.requesting_device_id == request.requesting_device_id);
        if !exists {
            state.dump_requests.push(request);
        }
        Ok(())
    }

    async fn delete_dump_request(&self, user_id: &str, requesting_device_id: &str) -> DataResult<()> {
        let mut state = self.state.lock();
        state
            .dump_requests
            .retain(|r| !(r.user_id == user_id && r.requesting_device_id == requesting_device_id));
        Ok(())
    }

    async fn list_dump_requests(&self, user_id: &str) -> DataResult<Vec<DumpRequest>> {
        let state = self.state.lock();
        Ok(state.dump_requests.iter().filter(|r| r.user_id == user_id).cloned().collect())
    }

    async fn fan_out_entries(&self, entries: &[EncHistoryEntry], devices: &[String], _source_device_id: &str) -> DataResult<()> {
        let mut state = self.state.lock();
        for entry in entries {
            for device_id in devices {
                let mut row = entry.clone();
                row.device_id = device_id.clone();
                row.read_count = 0;
                state.entries.push(row);
            }
        }
        Ok(())
    }

    async fn write_dump_entries(&self, entries: &[EncHistoryEntry]) -> DataResult<()> {
        let mut state = self.state.lock();
        state.entries.extend(entries.iter().cloned());
        Ok(())
    }

    async fn query_entries(&self, user_id: &str, device_id: &str, read_limit: i32) -> DataResult<Vec<EncHistoryEntry>> {
        let state = self.state.lock();
        Ok(state
            .entries
            .iter()
            .filter(|e| e.user_id == user_id && e.device_id == device_id && e.read_count < read_limit)
            .cloned()
            .collect())
    }

    async fn increment_read_counts(&self, user_id: &str, device_id: &str, encrypted_ids: &[String]) -> DataResult<()> {
        let mut state = self.state.lock();
        for entry in state.entries.iter_mut() {
            if entry.user_id == user_id && entry.device_id == device_id && encrypted_ids.contains(&entry.encrypted_id) {
                entry.read_count += 1;
            }
        }
        Ok(())
    }

    async fn bootstrap_entries(&self, user_id: &str) -> DataResult<Vec<EncHistoryEntry>> {
        let state = self.state.lock();
        let mut seen = HashMap::new();
        for entry in state.entries.iter().filter(|e| e.user_id == user_id) {
            seen.entry(entry.encrypted_id.clone()).or_insert_with(|| entry.clone());
        }
        Ok(seen.into_values().collect())
    }

    async fn prune_entries(&self, limit: i32) -> DataResult<u64> {
        let mut state = self.state.lock();
        let before = state.entries.len();
        state.entries.retain(|e| e.read_count <= limit);
        Ok((before - state.entries.len()) as u64)
    }

    async fn deep_clean_entries(&self, older_than: UnixMillis) -> DataResult<u64> {
        let mut state = self.state.lock();
        let single_device_users: Vec<String> = {
            let mut counts: HashMap<&str, u32> = HashMap::new();
            for d in &state.devices {
                *counts.entry(d.user_id.as_str()).or_default() += 1;
            }
            counts.into_iter().filter(|(_, n)| *n == 1).map(|(u, _)| u.to_owned()).collect()
        };
        let before = state.entries.len();
        state
            .entries
            .retain(|e| !(single_device_users.contains(&e.user_id) && e.date < older_than));
        Ok((before - state.entries.len()) as u64)
    }

    async fn add_deletion_request(&self, request: DeletionRequest, devices: &[String]) -> DataResult<()> {
        let mut state = self.state.lock();
        for device_id in devices {
            let mut copy = request.clone();
            copy.destination_device_id = device_id.clone();
            copy.read_count = 0;
            state.deletion_requests.push(copy);
        }
        let user_id = request.user_id.clone();
        state.entries.retain(|e| !(e.user_id == user_id && request.messages.iter().any(|m| matches_message(e, m))));
        Ok(())
    }

    async fn delete_matching_entries(&self, user_id: &str, messages: &[DeletionRequestMessage]) -> DataResult<()> {
        let mut state = self.state.lock();
        state
            .entries
            .retain(|e| !(e.user_id == user_id && messages.iter().any(|m| matches_message(e, m))));
        Ok(())
    }

    async fn get_deletion_requests(&self, user_id: &str, device_id: &str) -> DataResult<Vec<DeletionRequest>> {
        let mut state = self.state.lock();
        for request in state.deletion_requests.iter_mut() {
            if request.user_id == user_id && request.destination_device_id == device_id {
                request.read_count += 1;
            }
        }
        Ok(state
            .deletion_requests
            .iter()
            .filter(|r| r.user_id == user_id && r.destination_device_id == device_id)
            .cloned()
            .collect())
    }

    async fn pending_deletion_messages(&self, user_id: &str, device_id: &str) -> DataResult<Vec<DeletionRequestMessage>> {
        let state = self.state.lock();
        Ok(state
            .deletion_requests
            .iter()
            .filter(|r| r.user_id == user_id && r.destination_device_id == device_id)
            .flat_map(|r| r.messages.clone())
            .collect())
    }

    async fn prune_deletion_requests(&self, limit: i32) -> DataResult<u64> {
        let mut state = self.state.lock();
        let before = state.deletion_requests.len();
        state.deletion_requests.retain(|r| r.read_count <= limit);
        Ok((before - state.deletion_requests.len()) as u64)
    }

    async fn record_usage(&self, update: UsageUpdate) -> DataResult<()> {
        let mut state = self.state.lock();
        let now = UnixMillis::now();
        let key = (update.user_id, update.device_id);
        let entry = state.usage.entry(key).or_insert((now, String::new(), 0, UnixMillis(0), 0, String::new()));
        entry.0 = now;
        if let Some(ip) = update.ip {
            entry.1 = ip;
        }
        if let Some(version) = update.version {
            entry.5 = version;
        }
        match update.kind {
            UsageKind::Submit { num_entries } => entry.2 += num_entries,
            UsageKind::Query => {
                entry.3 = now;
                entry.4 += 1;
            }
        }
        Ok(())
    }

    async fn wipe_entries(&self) -> DataResult<()> {
        self.state.lock().entries.clear();
        Ok(())
    }

    async fn num_connections(&self) -> DataResult<u64> {
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PRUNE_ENTRY_LIMIT, READ_LIMIT};

    fn device(user_id: &str, device_id: &str) -> Device {
        Device {
            user_id: user_id.to_owned(),
            device_id: device_id.to_owned(),
            registration_ip: "127.0.0.1".to_owned(),
            registration_date: UnixMillis::now(),
        }
    }

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
    async fn second_device_triggers_dump_request() {
        let adapter = InMemoryAdapter::new();
        assert!(adapter.insert_device(device("u1", "d1")).await.unwrap());
        assert!(!adapter.insert_device(device("u1", "d2")).await.unwrap());
    }

    #[tokio::test]
    async fn query_respects_read_limit() {
        let adapter = InMemoryAdapter::new();
        adapter.insert_device(device("u1", "d1")).await.unwrap();
        adapter.fan_out_entries(&[entry("u1", "d1", "e1")], &["d1".to_owned()], "d1").await.unwrap();

        for _ in 0..5 {
            let rows = adapter.query_entries("u1", "d1", READ_LIMIT).await.unwrap();
            assert_eq!(rows.len(), 1);
            adapter.increment_read_counts("u1", "d1", &["e1".to_owned()]).await.unwrap();
        }
        let rows = adapter.query_entries("u1", "d1", READ_LIMIT).await.unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn deletion_request_eagerly_erases_matching_entries() {
        let adapter = InMemoryAdapter::new();
        adapter.insert_device(device("u1", "d1")).await.unwrap();
        adapter.insert_device(device("u1", "d2")).await.unwrap();
        adapter
            .fan_out_entries(&[entry("u1", "d1", "e1")], &["d1".to_owned(), "d2".to_owned()], "d1")
            .await
            .unwrap();

        let request = DeletionRequest {
            user_id: "u1".to_owned(),
            destination_device_id: String::new(),
            send_time: UnixMillis::now(),
            messages: vec![DeletionRequestMessage { device_id: String::new(), date: UnixMillis(0), entry_id: Some("e1".to_owned()) }],
            read_count: 0,
        };
        adapter.add_deletion_request(request, &["d1".to_owned(), "d2".to_owned()]).await.unwrap();

        assert!(adapter.query_entries("u1", "d2", READ_LIMIT).await.unwrap().is_empty());

        let requests = adapter.get_deletion_requests("u1", "d2").await.unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].read_count, 1);
    }

    #[tokio::test]
    async fn prune_removes_exhausted_entries() {
        let adapter = InMemoryAdapter::new();
        adapter.insert_device(device("u1", "d1")).await.unwrap();
        adapter.fan_out_entries(&[entry("u1", "d1", "e1")], &["d1".to_owned()], "d1").await.unwrap();

        for _ in 0..=PRUNE_ENTRY_LIMIT {
            adapter.increment_read_counts("u1", "d1", &["e1".to_owned()]).await.unwrap();
        }
        let removed = adapter.prune_entries(PRUNE_ENTRY_LIMIT).await.unwrap();
        assert_eq!(removed, 1);
    }

    #[tokio::test]
    async fn bootstrap_returns_every_entry_regardless_of_destination() {
        let adapter = InMemoryAdapter::new();
        adapter.insert_device(device("u1", "d1")).await.unwrap();
        adapter.insert_device(device("u1", "d2")).await.unwrap();
        adapter
            .fan_out_entries(&[entry("u1", "d1", "e1")], &["d1".to_owned(), "d2".to_owned()], "d1")
            .await
            .unwrap();

        let entries = adapter.bootstrap_entries("u1").await.unwrap();
        assert_eq!(entries.len(), 1);
    }
}
