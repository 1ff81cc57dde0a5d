use std::sync::Arc;

use crate::storage::snapshot::{self, ACCESS_TOKEN_KEY};
use crate::storage::traits::KeyValueStorage;

/// Remembers the access token across reloads in the durable store.
///
/// Acquiring the token is the login layer's job; this only keeps it.
#[derive(Clone)]
pub struct TokenStore {
    durable: Arc<dyn KeyValueStorage>,
}

impl TokenStore {
    pub fn new(durable: Arc<dyn KeyValueStorage>) -> Self {
        Self { durable }
    }

    /// The stored token, if any. An empty string counts as none.
    #[must_use]
    pub fn load(&self) -> Option<String> {
        snapshot::read_raw(self.durable.as_ref(), ACCESS_TOKEN_KEY).filter(|t| !t.is_empty())
    }

    /// Store `token`, or remove the stored one when `None` (or empty).
    pub fn persist(&self, token: Option<&str>) {
        match token.filter(|t| !t.is_empty()) {
            Some(token) => {
                snapshot::write_raw(self.durable.as_ref(), ACCESS_TOKEN_KEY, token);
            }
            None => {
                snapshot::remove(self.durable.as_ref(), ACCESS_TOKEN_KEY);
            }
        }
    }
}
