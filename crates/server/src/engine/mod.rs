//! The synchronization engines named in the component table: thin,
//! stateless functions over a `&dyn StorageAdapter`. None of these hold
//! state of their own; all durable state lives in the adapter.

pub mod bootstrap;
pub mod deletion;
pub mod dump;
pub mod fan_out;
pub mod registry;
pub mod retention;
