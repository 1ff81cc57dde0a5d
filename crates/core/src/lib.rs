pub mod api;
pub mod errors;
pub mod models;
pub mod services;
pub mod storage;

use std::sync::Arc;

use api::http::HttpBackend;
use api::traits::{IdentityApi, PortfolioSaveApi};
use errors::CoreError;
use models::{
    identity::{AuthUserId, StoredIdentity},
    pending_save::PendingPortfolioSave,
    settings::ClientConfig,
};
use services::{
    anonymous_service::AnonymousIdStore, identity_service::IdentityReconciler,
    save_queue_service::SaveQueue, token_service::TokenStore,
};
use storage::{memory::MemoryStorage, traits::KeyValueStorage};

/// Main entry point for the advisor client's session core.
///
/// Owns the identity reconciler, the pending-save queue and the token store
/// for one tab. The UI calls in through this type; it never touches the
/// persisted snapshots directly.
#[must_use]
pub struct AdvisorSession {
    identity: IdentityReconciler,
    save_queue: SaveQueue,
    anonymous: AnonymousIdStore,
    tokens: TokenStore,
}

impl std::fmt::Debug for AdvisorSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdvisorSession")
            .field("identity", &self.identity.get_cached_user_identity())
            .field("pending_saves", &self.save_queue.len())
            .field("flushing", &self.save_queue.is_flushing())
            .finish()
    }
}

impl AdvisorSession {
    /// Create a session talking to the HTTP backend described by `config`.
    ///
    /// `session` is the per-tab store (identity, anonymous id, pending saves).
    /// `durable` is the origin-wide store (access token, legacy anonymous id);
    /// without one, an in-memory store stands in.
    pub fn new(
        config: &ClientConfig,
        session: Arc<dyn KeyValueStorage>,
        durable: Option<Arc<dyn KeyValueStorage>>,
    ) -> Self {
        let backend = Arc::new(HttpBackend::new(config));
        Self::with_backends(config, session, durable, backend.clone(), backend)
    }

    /// Create a session over explicit backend implementations.
    pub fn with_backends(
        config: &ClientConfig,
        session: Arc<dyn KeyValueStorage>,
        durable: Option<Arc<dyn KeyValueStorage>>,
        identity_api: Arc<dyn IdentityApi>,
        save_api: Arc<dyn PortfolioSaveApi>,
    ) -> Self {
        let durable_or_memory: Arc<dyn KeyValueStorage> = match &durable {
            Some(store) => Arc::clone(store),
            None => Arc::new(MemoryStorage::new()),
        };

        let anonymous = AnonymousIdStore::new(Arc::clone(&session), durable);
        let identity = IdentityReconciler::new(Arc::clone(&session), anonymous.clone(), identity_api);
        let save_queue = SaveQueue::new(session, save_api, config.max_pending_saves);
        let tokens = TokenStore::new(durable_or_memory);

        Self {
            identity,
            save_queue,
            anonymous,
            tokens,
        }
    }

    // ── Identity ────────────────────────────────────────────────────

    /// The id the application should use for this session right now.
    /// Synchronous; never touches the network.
    pub fn get_canonical_user_id(&self, auth_user_id: Option<&AuthUserId>) -> String {
        self.identity.get_canonical_user_id(auth_user_id)
    }

    /// Reconcile the cached identity with the backend. Never fails; safe to
    /// fire and forget. Concurrent calls share one request.
    pub async fn sync_user_identity(&self, access_token: Option<&str>) {
        self.identity.sync_user_identity(access_token).await;
    }

    #[must_use]
    pub fn get_cached_user_identity(&self) -> Option<StoredIdentity> {
        self.identity.get_cached_user_identity()
    }

    pub fn clear_cached_user_identity(&self) {
        self.identity.clear_cached_user_identity();
    }

    #[must_use]
    pub fn identity(&self) -> &IdentityReconciler {
        &self.identity
    }

    // ── Pending Portfolio Saves ─────────────────────────────────────

    /// Queue a portfolio save for when the user has an account.
    /// Invalid entries are dropped silently.
    pub fn enqueue_pending_portfolio_save(&self, entry: PendingPortfolioSave) {
        self.save_queue.enqueue(entry);
    }

    /// Commit queued saves with `access_token`. The only operation here
    /// that reports failure; the caller decides when to retry.
    pub async fn flush_pending_portfolio_saves(
        &self,
        access_token: Option<&str>,
    ) -> Result<usize, CoreError> {
        self.save_queue.flush(access_token).await
    }

    #[must_use]
    pub fn pending_portfolio_saves(&self) -> Vec<PendingPortfolioSave> {
        self.save_queue.pending()
    }

    #[must_use]
    pub fn save_queue(&self) -> &SaveQueue {
        &self.save_queue
    }

    // ── Access Token & Login State ──────────────────────────────────

    #[must_use]
    pub fn load_access_token(&self) -> Option<String> {
        self.tokens.load()
    }

    pub fn persist_access_token(&self, access_token: Option<&str>) {
        self.tokens.persist(access_token);
    }

    /// Handle a freshly issued access token: remember it, reconcile identity,
    /// then commit whatever saves were queued while anonymous.
    /// Returns the number of saves committed.
    pub async fn complete_login(&self, access_token: &str) -> Result<usize, CoreError> {
        self.tokens.persist(Some(access_token));
        self.identity.sync_user_identity(Some(access_token)).await;
        self.save_queue.flush(Some(access_token)).await
    }

    /// Forget everything tied to the current user: token, cached identity,
    /// last known anonymous id and pending saves.
    pub fn logout(&self) {
        self.tokens.persist(None);
        self.identity.clear_cached_user_identity();
        self.anonymous.reset();
        self.save_queue.clear();
    }
}
