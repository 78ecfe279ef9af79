use std::sync::{Arc, OnceLock, RwLock};

use hishtory_data::StorageAdapter;

/// The process-wide storage adapter. Set once in `main` before the listener
/// starts accepting connections; engines and handlers take `&dyn
/// StorageAdapter` so they stay adapter-agnostic and easy to unit test
/// against `hishtory_data::InMemoryAdapter`.
pub static ADAPTER: OnceLock<Arc<dyn StorageAdapter>> = OnceLock::new();

/// The only other process-wide mutable state: a cached release
/// version string refreshed periodically by the maintainer and served by
/// `/api/v1/download` and `/api/v1/banner`.
static RELEASE_VERSION: RwLock<Option<String>> = RwLock::new(None);

pub fn set_adapter(adapter: Arc<dyn StorageAdapter>) {
    ADAPTER.set(adapter).unwrap_or_else(|_| panic!("adapter should only be set once"));
}

pub fn adapter() -> &'static Arc<dyn StorageAdapter> {
    ADAPTER.get().expect("adapter should be initialized before use")
}

pub fn cached_release_version() -> Option<String> {
    RELEASE_VERSION.read().expect("release version lock poisoned").clone()
}

pub fn set_cached_release_version(version: String) {
    *RELEASE_VERSION.write().expect("release version lock poisoned") = Some(version);
}
