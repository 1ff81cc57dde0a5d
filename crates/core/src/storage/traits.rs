use crate::errors::CoreError;

/// String key/value storage scoped to one browser tab (or one native session).
///
/// Mirrors the Web Storage API: every call may fail when storage is disabled
/// or full, and callers are expected to degrade rather than propagate.
/// Implementations must be cheap to call repeatedly; the services re-read
/// snapshots before every mutation because another tab may have changed them.
pub trait KeyValueStorage: Send + Sync {
    /// Human-readable name of this backend (for logs).
    fn name(&self) -> &str;

    fn get_item(&self, key: &str) -> Result<Option<String>, CoreError>;

    fn set_item(&self, key: &str, value: &str) -> Result<(), CoreError>;

    fn remove_item(&self, key: &str) -> Result<(), CoreError>;
}
