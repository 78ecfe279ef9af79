//! Storage adapters and domain model for the hishtory sync coordinator.
//!
//! This crate owns every persistent entity described in the data model
//! (encrypted entries, devices, dump requests, deletion requests, usage
//! records) behind the [`adapter::StorageAdapter`] trait, plus two
//! concrete backends: a relational one (`diesel` over Postgres or SQLite)
//! and an object-store one (S3-compatible, via `aws-sdk-s3`). Engines in
//! the `hishtory-server` crate hold no durable state of their own.

pub mod adapter;
pub mod config;
pub mod db;
pub mod error;
pub mod memory;
pub mod model;
pub mod object_store;
pub mod relational;
pub mod schema;
pub mod time;

pub use adapter::{StorageAdapter, UsageKind, UsageUpdate};
pub use error::{DataError, DataResult};
pub use memory::InMemoryAdapter;
pub use model::*;
pub use object_store::ObjectStoreAdapter;
pub use relational::RelationalAdapter;
pub use time::UnixMillis;
