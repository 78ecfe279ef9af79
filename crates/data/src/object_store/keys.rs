use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{TimeZone, Utc};

use crate::model::{DeletionRequest, EncHistoryEntry};

pub fn root_prefix(prefix: &Option<String>) -> String {
    match prefix {
        Some(p) if !p.is_empty() => format!("{}/", p.trim_end_matches('/')),
        _ => String::new(),
    }
}

pub fn user_root(prefix: &Option<String>, user_id: &str) -> String {
    format!("{}{user_id}/", root_prefix(prefix))
}

pub fn user_id_from_prefix(prefix: &Option<String>, common_prefix: &str) -> String {
    let root = root_prefix(prefix);
    common_prefix.trim_start_matches(root.as_str()).trim_end_matches('/').to_owned()
}

pub fn devices_key(prefix: &Option<String>, user_id: &str) -> String {
    format!("{}devices.json", user_root(prefix, user_id))
}

pub fn entries_prefix(prefix: &Option<String>, user_id: &str) -> String {
    format!("{}entries/", user_root(prefix, user_id))
}

pub fn master_entry_key(prefix: &Option<String>, user_id: &str, entry: &EncHistoryEntry) -> String {
    let date = date_partition(entry.date.get());
    format!("{}{date}/{}.json", entries_prefix(prefix, user_id), entry.encrypted_id)
}

pub fn inbox_device_prefix(prefix: &Option<String>, user_id: &str, device_id: &str) -> String {
    format!("{}inbox/{device_id}/", user_root(prefix, user_id))
}

pub fn inbox_entry_key(prefix: &Option<String>, user_id: &str, device_id: &str, entry: &EncHistoryEntry) -> String {
    let ts = timestamp_compact(entry.date.get());
    format!("{}{ts}_{}.json", inbox_device_prefix(prefix, user_id, device_id), entry.encrypted_id)
}

pub fn dump_requests_prefix(prefix: &Option<String>, user_id: &str) -> String {
    format!("{}dump_requests/", user_root(prefix, user_id))
}

pub fn dump_request_key(prefix: &Option<String>, user_id: &str, requesting_device_id: &str) -> String {
    format!("{}{requesting_device_id}.json", dump_requests_prefix(prefix, user_id))
}

pub fn deletions_device_prefix(prefix: &Option<String>, user_id: &str, device_id: &str) -> String {
    format!("{}deletions/{device_id}/", user_root(prefix, user_id))
}

pub fn deletion_request_key(prefix: &Option<String>, user_id: &str, destination_device_id: &str, request: &DeletionRequest) -> String {
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).expect("system clock before unix epoch").as_nanos();
    let entry_id = request.messages.iter().find_map(|m| m.entry_id.clone()).unwrap_or_else(|| "batch".to_owned());
    format!("{}{nanos}_{entry_id}.json", deletions_device_prefix(prefix, user_id, destination_device_id))
}

fn date_partition(unix_millis: i64) -> String {
    Utc.timestamp_millis_opt(unix_millis)
        .single()
        .unwrap_or_else(Utc::now)
        .format("%Y-%m-%d")
        .to_string()
}

fn timestamp_compact(unix_millis: i64) -> String {
    Utc.timestamp_millis_opt(unix_millis)
        .single()
        .unwrap_or_else(Utc::now)
        .format("%Y%m%dT%H%M%SZ")
        .to_string()
}
