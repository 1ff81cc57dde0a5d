//! Corrupt-tolerant whole-value snapshots on top of [`KeyValueStorage`].
//!
//! Reads never fail: a missing key, an unavailable store, invalid JSON or a
//! value of the wrong shape all come back as `None`. Writes never fail
//! either; a store that rejects the write is logged and otherwise ignored,
//! leaving the caller's in-memory state authoritative.

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::traits::KeyValueStorage;

/// Cached identity (`StoredIdentity` as JSON).
pub const IDENTITY_KEY: &str = "user_identity";

/// Last known anonymous id (JSON string; bare digits from older clients are accepted).
pub const ANONYMOUS_ID_KEY: &str = "anonymous_user_id";

/// Pending portfolio-save queue (JSON array, oldest first).
pub const PENDING_SAVES_KEY: &str = "pending_portfolio_saves_v1";

/// Access token in the durable store (raw string).
pub const ACCESS_TOKEN_KEY: &str = "auth_access_token";

/// Read the raw string under `key`.
pub fn read_raw(storage: &dyn KeyValueStorage, key: &str) -> Option<String> {
    match storage.get_item(key) {
        Ok(value) => value,
        Err(e) => {
            tracing::debug!(storage = storage.name(), key, "read failed, treating as absent: {e}");
            None
        }
    }
}

/// Read and decode the JSON value under `key`.
pub fn read_json<T: DeserializeOwned>(storage: &dyn KeyValueStorage, key: &str) -> Option<T> {
    let raw = read_raw(storage, key)?;
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::debug!(storage = storage.name(), key, "discarding malformed snapshot: {e}");
            None
        }
    }
}

/// Store `value` verbatim under `key`. Returns whether the store accepted it.
pub fn write_raw(storage: &dyn KeyValueStorage, key: &str, value: &str) -> bool {
    match storage.set_item(key, value) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(storage = storage.name(), key, "write failed: {e}");
            false
        }
    }
}

/// Encode `value` as JSON and store it under `key`. Returns whether it was stored.
pub fn write_json<T: Serialize + ?Sized>(storage: &dyn KeyValueStorage, key: &str, value: &T) -> bool {
    match serde_json::to_string(value) {
        Ok(json) => write_raw(storage, key, &json),
        Err(e) => {
            tracing::warn!(key, "failed to encode snapshot: {e}");
            false
        }
    }
}

/// Remove `key`. Returns whether the store accepted the removal.
pub fn remove(storage: &dyn KeyValueStorage, key: &str) -> bool {
    match storage.remove_item(key) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(storage = storage.name(), key, "remove failed: {e}");
            false
        }
    }
}
