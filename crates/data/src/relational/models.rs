use diesel::prelude::*;

use crate::model::{DeletionRequest, DeletionRequestMessage, Device, DumpRequest, EncHistoryEntry};
use crate::schema::*;
use crate::time::UnixMillis;

#[derive(Queryable, Identifiable, Debug, Clone)]
#[diesel(table_name = devices)]
pub struct DbDevice {
    pub id: i64,
    pub user_id: String,
    pub device_id: String,
    pub registration_ip: String,
    pub registration_date: UnixMillis,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = devices)]
pub struct NewDbDevice {
    pub user_id: String,
    pub device_id: String,
    pub registration_ip: String,
    pub registration_date: UnixMillis,
}

impl From<Device> for NewDbDevice {
    fn from(d: Device) -> Self {
        Self {
            user_id: d.user_id,
            device_id: d.device_id,
            registration_ip: d.registration_ip,
            registration_date: d.registration_date,
        }
    }
}

#[derive(Queryable, Identifiable, Debug, Clone)]
#[diesel(table_name = enc_history_entries)]
pub struct DbEncHistoryEntry {
    pub id: i64,
    pub encrypted_data: Vec<u8>,
    pub nonce: Vec<u8>,
    pub device_id: String,
    pub user_id: String,
    pub date: UnixMillis,
    pub encrypted_id: String,
    pub read_count: i32,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = enc_history_entries)]
pub struct NewDbEncHistoryEntry {
    pub encrypted_data: Vec<u8>,
    pub nonce: Vec<u8>,
    pub device_id: String,
    pub user_id: String,
    pub date: UnixMillis,
    pub encrypted_id: String,
    pub read_count: i32,
}

impl From<DbEncHistoryEntry> for EncHistoryEntry {
    fn from(row: DbEncHistoryEntry) -> Self {
        Self {
            encrypted_data: row.encrypted_data,
            nonce: row.nonce,
            device_id: row.device_id,
            user_id: row.user_id,
            date: row.date,
            encrypted_id: row.encrypted_id,
            read_count: row.read_count,
        }
    }
}

pub fn new_row_for_device(entry: &EncHistoryEntry, device_id: &str) -> NewDbEncHistoryEntry {
    NewDbEncHistoryEntry {
        encrypted_data: entry.encrypted_data.clone(),
        nonce: entry.nonce.clone(),
        device_id: device_id.to_owned(),
        user_id: entry.user_id.clone(),
        date: entry.date,
        encrypted_id: entry.encrypted_id.clone(),
        read_count: 0,
    }
}

#[derive(Queryable, Identifiable, Debug, Clone)]
#[diesel(table_name = dump_requests)]
pub struct DbDumpRequest {
    pub id: i64,
    pub user_id: String,
    pub requesting_device_id: String,
    pub request_time: UnixMillis,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = dump_requests)]
pub struct NewDbDumpRequest {
    pub user_id: String,
    pub requesting_device_id: String,
    pub request_time: UnixMillis,
}

impl From<DumpRequest> for NewDbDumpRequest {
    fn from(r: DumpRequest) -> Self {
        Self {
            user_id: r.user_id,
            requesting_device_id: r.requesting_device_id,
            request_time: r.request_time,
        }
    }
}

impl From<DbDumpRequest> for DumpRequest {
    fn from(row: DbDumpRequest) -> Self {
        Self {
            user_id: row.user_id,
            requesting_device_id: row.requesting_device_id,
            request_time: row.request_time,
        }
    }
}

#[derive(Queryable, Identifiable, Debug, Clone)]
#[diesel(table_name = deletion_requests)]
pub struct DbDeletionRequest {
    pub id: i64,
    pub user_id: String,
    pub destination_device_id: String,
    pub send_time: UnixMillis,
    pub messages_json: String,
    pub read_count: i32,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = deletion_requests)]
pub struct NewDbDeletionRequest {
    pub user_id: String,
    pub destination_device_id: String,
    pub send_time: UnixMillis,
    pub messages_json: String,
    pub read_count: i32,
}

pub fn new_deletion_row(request: &DeletionRequest, destination_device_id: &str) -> NewDbDeletionRequest {
    NewDbDeletionRequest {
        user_id: request.user_id.clone(),
        destination_device_id: destination_device_id.to_owned(),
        send_time: request.send_time,
        messages_json: serde_json::to_string(&request.messages).expect("messages serialize"),
        read_count: 0,
    }
}

impl TryFrom<DbDeletionRequest> for DeletionRequest {
    type Error = serde_json::Error;

    fn try_from(row: DbDeletionRequest) -> Result<Self, Self::Error> {
        let messages: Vec<DeletionRequestMessage> = serde_json::from_str(&row.messages_json)?;
        Ok(Self {
            user_id: row.user_id,
            destination_device_id: row.destination_device_id,
            send_time: row.send_time,
            messages,
            read_count: row.read_count,
        })
    }
}

#[derive(Queryable, Identifiable, Debug, Clone)]
#[diesel(table_name = usage_data)]
pub struct DbUsageData {
    pub id: i64,
    pub user_id: String,
    pub device_id: String,
    pub last_used: UnixMillis,
    pub last_ip: String,
    pub num_entries_handled: i64,
    pub last_queried: UnixMillis,
    pub num_queries: i64,
    pub version: String,
}
