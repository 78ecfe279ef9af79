//! Relational `StorageAdapter` implementation, backed by `diesel` over
//! either Postgres or SQLite (selected at compile time via Cargo feature).
//! Per-device queueing is modeled as N inserted rows at submit time rather
//! than a single row with a device bitmap.

mod models;

use std::collections::HashMap;

use async_trait::async_trait;
use diesel::prelude::*;
use diesel::upsert::excluded;

use crate::adapter::{StorageAdapter, UsageKind, UsageUpdate};
use crate::db::{DieselPool, PooledConn};
use crate::error::{DataError, DataResult};
use crate::model::{DeletionRequest, DeletionRequestMessage, Device, DumpRequest, EncHistoryEntry, FANOUT_CHUNK_SIZE};
use crate::schema::*;
use crate::time::UnixMillis;

use models::{new_deletion_row, new_row_for_device, DbDeletionRequest, DbDumpRequest, DbEncHistoryEntry, NewDbDevice, NewDbDumpRequest};

pub struct RelationalAdapter {
    pool: DieselPool,
}

impl RelationalAdapter {
    pub fn new(pool: DieselPool) -> Self {
        Self { pool }
    }

    /// Runs a blocking diesel closure on the blocking thread pool, since
    /// diesel's synchronous connections would otherwise stall the async
    /// runtime.
    async fn with_conn<F, T>(&self, f: F) -> DataResult<T>
    where
        F: FnOnce(&mut PooledConn) -> DataResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            f(&mut conn)
        })
        .await
        .map_err(|e| DataError::Backend(format!("blocking task panicked: {e}")))?
    }
}

#[async_trait]
impl StorageAdapter for RelationalAdapter {
    async fn insert_device(&self, device: Device) -> DataResult<bool> {
        self.with_conn(move |conn| {
            conn.transaction(|conn| {
                let existing: i64 = devices::table
                    .filter(devices::user_id.eq(&device.user_id))
                    .count()
                    .get_result(conn)?;
                diesel::insert_into(devices::table)
                    .values(NewDbDevice::from(device))
                    .execute(conn)?;
                Ok(existing == 0)
            })
        })
        .await
    }

    async fn remove_device(&self, user_id: &str, device_id: &str) -> DataResult<()> {
        let (user_id, device_id) = (user_id.to_owned(), device_id.to_owned());
        self.with_conn(move |conn| {
            conn.transaction(|conn| {
                diesel::delete(
                    devices::table
                        .filter(devices::user_id.eq(&user_id))
                        .filter(devices::device_id.eq(&device_id)),
                )
                .execute(conn)?;
                diesel::delete(
                    enc_history_entries::table
                        .filter(enc_history_entries::user_id.eq(&user_id))
                        .filter(enc_history_entries::device_id.eq(&device_id)),
                )
                .execute(conn)?;
                diesel::delete(
                    deletion_requests::table
                        .filter(deletion_requests::user_id.eq(&user_id))
                        .filter(deletion_requests::destination_device_id.eq(&device_id)),
                )
                .execute(conn)?;
                diesel::delete(
                    dump_requests::table
                        .filter(dump_requests::user_id.eq(&user_id))
                        .filter(dump_requests::requesting_device_id.eq(&device_id)),
                )
                .execute(conn)?;
                Ok(())
            })
        })
        .await
    }

    async fn devices_for_user(&self, user_id: &str) -> DataResult<Vec<String>> {
        let user_id = user_id.to_owned();
        self.with_conn(move |conn| {
            devices::table
                .filter(devices::user_id.eq(&user_id))
                .select(devices::device_id)
                .load::<String>(conn)
                .map_err(Into::into)
        })
        .await
    }

    async fn distinct_user_count(&self) -> DataResult<u64> {
        self.with_conn(move |conn| {
            let count: i64 = devices::table
                .select(diesel::dsl::count_distinct(devices::user_id))
                .get_result(conn)?;
            Ok(count as u64)
        })
        .await
    }

    async fn create_dump_request(&self, request: DumpRequest) -> DataResult<()> {
        self.with_conn(move |conn| {
            diesel::insert_into(dump_requests::table)
                .values(NewDbDumpRequest::from(request))
                .on_conflict((dump_requests::user_id, dump_requests::requesting_device_id))
                .do_nothing()
                .execute(conn)?;
            Ok(())
        })
        .await
    }

    async fn delete_dump_request(&self, user_id: &str, requesting_device_id: &str) -> DataResult<()> {
        let (user_id, requesting_device_id) = (user_id.to_owned(), requesting_device_id.to_owned());
        self.with_conn(move |conn| {
            diesel::delete(
                dump_requests::table
                    .filter(dump_requests::user_id.eq(&user_id))
                    .filter(dump_requests::requesting_device_id.eq(&requesting_device_id)),
            )
            .execute(conn)?;
            Ok(())
        })
        .await
    }

    async fn list_dump_requests(&self, user_id: &str) -> DataResult<Vec<DumpRequest>> {
        let user_id = user_id.to_owned();
        self.with_conn(move |conn| {
            let rows: Vec<DbDumpRequest> = dump_requests::table
                .filter(dump_requests::user_id.eq(&user_id))
                .load(conn)?;
            Ok(rows.into_iter().map(DumpRequest::from).collect())
        })
        .await
    }

    async fn fan_out_entries(&self, entries: &[EncHistoryEntry], devices: &[String], _source_device_id: &str) -> DataResult<()> {
        // The relational adapter fans out to every registered device,
        // including the submitting one.
        let rows: Vec<_> = entries
            .iter()
            .flat_map(|entry| devices.iter().map(move |device_id| new_row_for_device(entry, device_id)))
            .collect();
        self.with_conn(move |conn| {
            conn.transaction(|conn| {
                for chunk in rows.chunks(FANOUT_CHUNK_SIZE) {
                    diesel::insert_into(enc_history_entries::table).values(chunk).execute(conn)?;
                }
                Ok(())
            })
        })
        .await
    }

    async fn write_dump_entries(&self, entries: &[EncHistoryEntry]) -> DataResult<()> {
        let rows: Vec<_> = entries.iter().map(|e| new_row_for_device(e, &e.device_id)).collect();
        self.with_conn(move |conn| {
            conn.transaction(|conn| {
                for chunk in rows.chunks(FANOUT_CHUNK_SIZE) {
                    diesel::insert_into(enc_history_entries::table).values(chunk).execute(conn)?;
                }
                Ok(())
            })
        })
        .await
    }

    async fn query_entries(&self, user_id: &str, device_id: &str, read_limit: i32) -> DataResult<Vec<EncHistoryEntry>> {
        let (user_id, device_id) = (user_id.to_owned(), device_id.to_owned());
        self.with_conn(move |conn| {
            let rows: Vec<DbEncHistoryEntry> = enc_history_entries::table
                .filter(enc_history_entries::user_id.eq(&user_id))
                .filter(enc_history_entries::device_id.eq(&device_id))
                .filter(enc_history_entries::read_count.lt(read_limit))
                .load(conn)?;
            Ok(rows.into_iter().map(EncHistoryEntry::from).collect())
        })
        .await
    }

    async fn increment_read_counts(&self, user_id: &str, device_id: &str, encrypted_ids: &[String]) -> DataResult<()> {
        let (user_id, device_id, encrypted_ids) = (user_id.to_owned(), device_id.to_owned(), encrypted_ids.to_vec());
        self.with_conn(move |conn| {
            diesel::update(
                enc_history_entries::table
                    .filter(enc_history_entries::user_id.eq(&user_id))
                    .filter(enc_history_entries::device_id.eq(&device_id))
                    .filter(enc_history_entries::encrypted_id.eq_any(&encrypted_ids)),
            )
            .set(enc_history_entries::read_count.eq(enc_history_entries::read_count + 1))
            .execute(conn)?;
            Ok(())
        })
        .await
    }

    async fn bootstrap_entries(&self, user_id: &str) -> DataResult<Vec<EncHistoryEntry>> {
        let user_id = user_id.to_owned();
        self.with_conn(move |conn| {
            let rows: Vec<DbEncHistoryEntry> = enc_history_entries::table
                .filter(enc_history_entries::user_id.eq(&user_id))
                .load(conn)?;
            let mut seen = HashMap::new();
            for row in rows {
                seen.entry(row.encrypted_id.clone()).or_insert(row);
            }
            Ok(seen.into_values().map(EncHistoryEntry::from).collect())
        })
        .await
    }

    async fn prune_entries(&self, limit: i32) -> DataResult<u64> {
        self.with_conn(move |conn| {
            let n = diesel::delete(enc_history_entries::table.filter(enc_history_entries::read_count.gt(limit))).execute(conn)?;
            Ok(n as u64)
        })
        .await
    }

    async fn deep_clean_entries(&self, older_than: UnixMillis) -> DataResult<u64> {
        self.with_conn(move |conn| {
            conn.transaction(|conn| {
                let single_device_users: Vec<String> = devices::table
                    .group_by(devices::user_id)
                    .having(diesel::dsl::count(devices::id).eq(1))
                    .select(devices::user_id)
                    .load(conn)?;

                let mut eligible = Vec::new();
                for user_id in single_device_users {
                    let last_used: Option<UnixMillis> = usage_data::table
                        .filter(usage_data::user_id.eq(&user_id))
                        .select(usage_data::last_used)
                        .order(usage_data::last_used.desc())
                        .first(conn)
                        .optional()?;
                    if last_used.map(|t| t < older_than).unwrap_or(true) {
                        eligible.push(user_id);
                    }
                }

                let mut total = 0u64;
                for user_id in eligible {
                    let n = diesel::delete(
                        enc_history_entries::table
                            .filter(enc_history_entries::user_id.eq(&user_id))
                            .filter(enc_history_entries::date.lt(older_than)),
                    )
                    .execute(conn)?;
                    total += n as u64;
                }
                Ok(total)
            })
        })
        .await
    }

    async fn add_deletion_request(&self, request: DeletionRequest, devices: &[String]) -> DataResult<()> {
        let rows: Vec<_> = devices.iter().map(|device_id| new_deletion_row(&request, device_id)).collect();
        let messages = request.messages.clone();
        let user_id = request.user_id.clone();
        self.with_conn(move |conn| {
            conn.transaction(|conn| {
                diesel::insert_into(deletion_requests::table).values(&rows).execute(conn)?;
                delete_matching_entries_blocking(conn, &user_id, &messages)?;
                Ok(())
            })
        })
        .await
    }

    async fn delete_matching_entries(&self, user_id: &str, messages: &[DeletionRequestMessage]) -> DataResult<()> {
        let (user_id, messages) = (user_id.to_owned(), messages.to_vec());
        self.with_conn(move |conn| delete_matching_entries_blocking(conn, &user_id, &messages)).await
    }

    async fn get_deletion_requests(&self, user_id: &str, device_id: &str) -> DataResult<Vec<DeletionRequest>> {
        let (user_id, device_id) = (user_id.to_owned(), device_id.to_owned());
        self.with_conn(move |conn| {
            conn.transaction(|conn| {
                diesel::update(
                    deletion_requests::table
                        .filter(deletion_requests::user_id.eq(&user_id))
                        .filter(deletion_requests::destination_device_id.eq(&device_id)),
                )
                .set(deletion_requests::read_count.eq(deletion_requests::read_count + 1))
                .execute(conn)?;

                let rows: Vec<DbDeletionRequest> = deletion_requests::table
                    .filter(deletion_requests::user_id.eq(&user_id))
                    .filter(deletion_requests::destination_device_id.eq(&device_id))
                    .load(conn)?;
                rows.into_iter()
                    .map(DeletionRequest::try_from)
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(DataError::from)
            })
        })
        .await
    }

    async fn pending_deletion_messages(&self, user_id: &str, device_id: &str) -> DataResult<Vec<DeletionRequestMessage>> {
        let (user_id, device_id) = (user_id.to_owned(), device_id.to_owned());
        self.with_conn(move |conn| {
            let rows: Vec<DbDeletionRequest> = deletion_requests::table
                .filter(deletion_requests::user_id.eq(&user_id))
                .filter(deletion_requests::destination_device_id.eq(&device_id))
                .load(conn)?;
            let mut messages = Vec::new();
            for row in rows {
                messages.extend(serde_json::from_str::<Vec<DeletionRequestMessage>>(&row.messages_json)?);
            }
            Ok(messages)
        })
        .await
    }

    async fn prune_deletion_requests(&self, limit: i32) -> DataResult<u64> {
        self.with_conn(move |conn| {
            let n = diesel::delete(deletion_requests::table.filter(deletion_requests::read_count.gt(limit))).execute(conn)?;
            Ok(n as u64)
        })
        .await
    }

    async fn record_usage(&self, update: UsageUpdate) -> DataResult<()> {
        self.with_conn(move |conn| {
            let now = UnixMillis::now();
            let ip = update.ip.unwrap_or_default();
            let version = update.version.unwrap_or_default();
            match update.kind {
                UsageKind::Submit { num_entries } => {
                    diesel::insert_into(usage_data::table)
                        .values((
                            usage_data::user_id.eq(&update.user_id),
                            usage_data::device_id.eq(&update.device_id),
                            usage_data::last_used.eq(now),
                            usage_data::last_ip.eq(&ip),
                            usage_data::num_entries_handled.eq(num_entries),
                            usage_data::version.eq(&version),
                        ))
                        .on_conflict((usage_data::user_id, usage_data::device_id))
                        .do_update()
                        .set((
                            usage_data::last_used.eq(now),
                            usage_data::last_ip.eq(excluded(usage_data::last_ip)),
                            usage_data::num_entries_handled.eq(usage_data::num_entries_handled + num_entries),
                            usage_data::version.eq(excluded(usage_data::version)),
                        ))
                        .execute(conn)?;
                }
                UsageKind::Query => {
                    diesel::insert_into(usage_data::table)
                        .values((
                            usage_data::user_id.eq(&update.user_id),
                            usage_data::device_id.eq(&update.device_id),
                            usage_data::last_used.eq(now),
                            usage_data::last_ip.eq(&ip),
                            usage_data::last_queried.eq(now),
                            usage_data::num_queries.eq(1i64),
                            usage_data::version.eq(&version),
                        ))
                        .on_conflict((usage_data::user_id, usage_data::device_id))
                        .do_update()
                        .set((
                            usage_data::last_used.eq(now),
                            usage_data::last_ip.eq(excluded(usage_data::last_ip)),
                            usage_data::last_queried.eq(now),
                            usage_data::num_queries.eq(usage_data::num_queries + 1),
                            usage_data::version.eq(excluded(usage_data::version)),
                        ))
                        .execute(conn)?;
                }
            }
            Ok(())
        })
        .await
    }

    async fn wipe_entries(&self) -> DataResult<()> {
        self.with_conn(move |conn| {
            diesel::delete(enc_history_entries::table).execute(conn)?;
            Ok(())
        })
        .await
    }

    async fn num_connections(&self) -> DataResult<u64> {
        Ok(self.pool.state().connections as u64)
    }
}

fn delete_matching_entries_blocking(conn: &mut PooledConn, user_id: &str, messages: &[DeletionRequestMessage]) -> DataResult<()> {
    for message in messages {
        if let Some(entry_id) = &message.entry_id {
            diesel::delete(
                enc_history_entries::table
                    .filter(enc_history_entries::user_id.eq(user_id))
                    .filter(enc_history_entries::encrypted_id.eq(entry_id)),
            )
            .execute(conn)?;
        } else {
            diesel::delete(
                enc_history_entries::table
                    .filter(enc_history_entries::user_id.eq(user_id))
                    .filter(enc_history_entries::device_id.eq(&message.device_id))
                    .filter(enc_history_entries::date.eq(message.date)),
            )
            .execute(conn)?;
        }
    }
    Ok(())
}
