use futures::future::{FutureExt, Shared};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::api::traits::IdentityApi;
use crate::errors::CoreError;
use crate::models::identity::{AnonymousUserId, AuthUserId, StoredIdentity};
use crate::storage::snapshot::{self, IDENTITY_KEY};
use crate::storage::traits::KeyValueStorage;

use super::anonymous_service::AnonymousIdStore;

#[cfg(not(target_arch = "wasm32"))]
type SyncFuture = futures::future::BoxFuture<'static, ()>;
#[cfg(target_arch = "wasm32")]
type SyncFuture = futures::future::LocalBoxFuture<'static, ()>;

/// Handle to the one identity sync currently running. Every concurrent
/// caller awaits a clone of it.
type SyncHandle = Shared<SyncFuture>;

/// Derives, caches and reconciles the canonical user id for this session.
///
/// Local derivation (`get_canonical_user_id`) is synchronous and never touches
/// the network. Reconciliation with the backend (`sync_user_identity`) is
/// single-flight: calls made while a sync is running share its outcome, and a
/// call made after it finished starts a new one.
///
/// A registered identity stays cached until it is cleared or a different
/// registered id is supplied; an anonymous hint never demotes it.
#[derive(Clone)]
pub struct IdentityReconciler {
    inner: Arc<Inner>,
}

struct Inner {
    storage: Arc<dyn KeyValueStorage>,
    anonymous: AnonymousIdStore,
    api: Arc<dyn IdentityApi>,
    /// `None` means "not known yet"; the next read re-hydrates from storage.
    cached: Mutex<Option<StoredIdentity>>,
    in_flight: Mutex<Option<SyncHandle>>,
}

impl IdentityReconciler {
    pub fn new(
        storage: Arc<dyn KeyValueStorage>,
        anonymous: AnonymousIdStore,
        api: Arc<dyn IdentityApi>,
    ) -> Self {
        let inner = Inner {
            storage,
            anonymous,
            api,
            cached: Mutex::new(None),
            in_flight: Mutex::new(None),
        };
        inner.get_cached_user_identity();
        Self {
            inner: Arc::new(inner),
        }
    }

    /// The cached identity, re-read from storage if nothing is cached in memory.
    /// A corrupt or invalid snapshot reads as `None`.
    #[must_use]
    pub fn get_cached_user_identity(&self) -> Option<StoredIdentity> {
        self.inner.get_cached_user_identity()
    }

    /// Forget the cached identity, in memory and in storage.
    pub fn clear_cached_user_identity(&self) {
        let mut cached = self.inner.lock_cache();
        *cached = None;
        snapshot::remove(self.inner.storage.as_ref(), IDENTITY_KEY);
    }

    /// Resolve the id the rest of the application should use right now.
    ///
    /// First match wins:
    /// 1. a cached registered identity, unless `auth_user_id` names a different one;
    /// 2. with no `auth_user_id`, a cached anonymous identity;
    /// 3. a registered identity built from `auth_user_id` (persisted);
    /// 4. the last known anonymous id (adopted and persisted);
    /// 5. a freshly generated anonymous id (persisted in both stores).
    pub fn get_canonical_user_id(&self, auth_user_id: Option<&AuthUserId>) -> String {
        let inner = &self.inner;
        let requested = auth_user_id.and_then(AuthUserId::to_registered_identity);

        if let Some(cached) = inner.get_cached_user_identity() {
            let keep = match &requested {
                None => true,
                Some(candidate) => cached.is_registered() && cached.user_id == candidate.user_id,
            };
            if keep {
                return cached.user_id;
            }
        }

        if let Some(identity) = requested {
            let user_id = identity.user_id.clone();
            inner.persist_identity(identity);
            return user_id;
        }

        if let Some(anonymous) = inner.anonymous.peek() {
            inner.persist_identity(StoredIdentity::anonymous(&anonymous));
            return anonymous.into();
        }

        let generated = AnonymousUserId::generate();
        inner.anonymous.persist(&generated);
        inner.persist_identity(StoredIdentity::anonymous(&generated));
        generated.into()
    }

    /// Ask the backend which identity this client is and cache the answer.
    ///
    /// Never fails: errors are logged and the previous cache stays in place.
    /// If a sync is already running, this awaits that one instead of sending
    /// a second request (the `access_token` of the later call is then unused).
    pub async fn sync_user_identity(&self, access_token: Option<&str>) {
        let handle = {
            let mut slot = self.inner.lock_in_flight();
            match slot.as_ref() {
                Some(running) => running.clone(),
                None => {
                    let handle = self.start_sync(access_token.map(str::to_owned));
                    *slot = Some(handle.clone());
                    handle
                }
            }
        };
        handle.await;
    }

    /// Whether an identity sync is currently running.
    #[must_use]
    pub fn is_syncing(&self) -> bool {
        self.inner.lock_in_flight().is_some()
    }

    /// The task holds only a `Weak` to the reconciler while the request is
    /// pending, so an abandoned sync cannot keep it alive through `in_flight`.
    fn start_sync(&self, access_token: Option<String>) -> SyncHandle {
        let weak = Arc::downgrade(&self.inner);
        let task = async move {
            let Some((api, candidate)) = weak.upgrade().map(|inner| inner.sync_request()) else {
                return;
            };
            let result = api
                .fetch_identity(access_token.as_deref(), candidate.as_ref())
                .await
                .and_then(StoredIdentity::try_from);

            if let Some(inner) = weak.upgrade() {
                inner.apply_sync_result(result);
                *inner.lock_in_flight() = None;
            }
        };

        #[cfg(not(target_arch = "wasm32"))]
        let task: SyncFuture = task.boxed();
        #[cfg(target_arch = "wasm32")]
        let task: SyncFuture = task.boxed_local();

        task.shared()
    }
}

impl Inner {
    fn lock_cache(&self) -> MutexGuard<'_, Option<StoredIdentity>> {
        self.cached.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_in_flight(&self) -> MutexGuard<'_, Option<SyncHandle>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn get_cached_user_identity(&self) -> Option<StoredIdentity> {
        let mut cached = self.lock_cache();
        if cached.is_none() {
            *cached = read_stored_identity(self.storage.as_ref());
        }
        cached.clone()
    }

    fn persist_identity(&self, identity: StoredIdentity) {
        let mut cached = self.lock_cache();
        snapshot::write_json(self.storage.as_ref(), IDENTITY_KEY, &identity);
        *cached = Some(identity);
    }

    /// Backend handle plus the anonymous id to offer as `current_id`.
    fn sync_request(&self) -> (Arc<dyn IdentityApi>, Option<AnonymousUserId>) {
        let candidate = self
            .get_cached_user_identity()
            .and_then(|identity| identity.anonymous_id())
            .or_else(|| self.anonymous.peek());
        (Arc::clone(&self.api), candidate)
    }

    fn apply_sync_result(&self, result: Result<StoredIdentity, CoreError>) {
        match result {
            Ok(identity) => {
                if let Some(anonymous) = identity.anonymous_id() {
                    self.anonymous.persist(&anonymous);
                }
                tracing::debug!(kind = %identity.kind, "user identity synchronized");
                self.persist_identity(identity);
            }
            Err(e) => {
                tracing::warn!("Failed to synchronize user identity: {e}");
            }
        }
    }
}

fn read_stored_identity(storage: &dyn KeyValueStorage) -> Option<StoredIdentity> {
    let identity: StoredIdentity = snapshot::read_json(storage, IDENTITY_KEY)?;
    match identity.validate() {
        Ok(identity) => Some(identity),
        Err(e) => {
            tracing::debug!("discarding cached identity: {e}");
            None
        }
    }
}
