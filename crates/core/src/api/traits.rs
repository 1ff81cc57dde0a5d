use async_trait::async_trait;

use crate::errors::CoreError;
use crate::models::identity::{AnonymousUserId, IdentityResponse};
use crate::models::pending_save::SaveConfirmation;

/// Backend identity service.
///
/// Given an optional bearer token and the best local anonymous-id guess,
/// answers with the identity the server considers canonical for this client.
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait IdentityApi: Send + Sync {
    async fn fetch_identity(
        &self,
        access_token: Option<&str>,
        current_id: Option<&AnonymousUserId>,
    ) -> Result<IdentityResponse, CoreError>;
}

/// Backend endpoint that persists a portfolio computed for an anonymous
/// session under the account owning `access_token`.
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait PortfolioSaveApi: Send + Sync {
    async fn save_portfolio(
        &self,
        access_token: &str,
        session_user_id: &str,
        portfolio_name: &str,
    ) -> Result<SaveConfirmation, CoreError>;
}
