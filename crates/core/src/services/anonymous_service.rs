use std::sync::Arc;

use crate::models::identity::AnonymousUserId;
use crate::storage::snapshot::{self, ANONYMOUS_ID_KEY};
use crate::storage::traits::KeyValueStorage;

/// The "last known anonymous id" store.
///
/// Independent of the identity cache: it remembers the anonymous session id
/// even while a registered identity is cached, so that a later sync can hand
/// it to the server for reconciliation.
///
/// Reads the per-tab store first and falls back to an optional durable store
/// written by older clients. A value found only in the durable store is
/// migrated into the per-tab store on adoption.
#[derive(Clone)]
pub struct AnonymousIdStore {
    session: Arc<dyn KeyValueStorage>,
    legacy: Option<Arc<dyn KeyValueStorage>>,
}

impl AnonymousIdStore {
    pub fn new(session: Arc<dyn KeyValueStorage>, legacy: Option<Arc<dyn KeyValueStorage>>) -> Self {
        Self { session, legacy }
    }

    /// Look up the last known anonymous id without creating one.
    #[must_use]
    pub fn peek(&self) -> Option<AnonymousUserId> {
        read_id(self.session.as_ref())
            .or_else(|| self.legacy.as_deref().and_then(|legacy| read_id(legacy)))
    }

    /// Return the last known anonymous id, migrating a legacy value or
    /// generating (and persisting) a fresh one when none is stored.
    pub fn get_or_create(&self) -> AnonymousUserId {
        if let Some(id) = read_id(self.session.as_ref()) {
            return id;
        }
        if let Some(id) = self.legacy.as_deref().and_then(|legacy| read_id(legacy)) {
            self.persist(&id);
            return id;
        }

        let id = AnonymousUserId::generate();
        snapshot::write_json(self.session.as_ref(), ANONYMOUS_ID_KEY, id.as_str());
        id
    }

    /// Record `id` as the last known anonymous id and drop any legacy copy.
    pub fn persist(&self, id: &AnonymousUserId) {
        snapshot::write_json(self.session.as_ref(), ANONYMOUS_ID_KEY, id.as_str());
        if let Some(legacy) = &self.legacy {
            snapshot::remove(legacy.as_ref(), ANONYMOUS_ID_KEY);
        }
    }

    /// Forget the anonymous id everywhere (logout).
    pub fn reset(&self) {
        snapshot::remove(self.session.as_ref(), ANONYMOUS_ID_KEY);
        if let Some(legacy) = &self.legacy {
            snapshot::remove(legacy.as_ref(), ANONYMOUS_ID_KEY);
        }
    }
}

/// Accepts a JSON string or bare digits; anything else reads as absent.
fn read_id(storage: &dyn KeyValueStorage) -> Option<AnonymousUserId> {
    let raw = snapshot::read_raw(storage, ANONYMOUS_ID_KEY)?;
    let value = serde_json::from_str::<String>(&raw).unwrap_or(raw);
    AnonymousUserId::parse(&value)
}
