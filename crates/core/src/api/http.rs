use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
#[cfg(not(target_arch = "wasm32"))]
use std::time::Duration;

use crate::errors::CoreError;
use crate::models::identity::{AnonymousUserId, IdentityResponse};
use crate::models::pending_save::SaveConfirmation;
use crate::models::settings::ClientConfig;

use super::traits::{IdentityApi, PortfolioSaveApi};

/// Origin used to resolve a relative `api_base` (e.g. the default `/api`).
pub const DEFAULT_ORIGIN: &str = "http://localhost";

const IDENTITY_PATH: &str = "/users/identity";
const SAVE_PORTFOLIO_PATH: &str = "/portfolios/save-to-db";

/// The advisor backend over HTTP.
///
/// - `GET  /users/identity?current_id=…`: identity reconciliation
/// - `POST /portfolios/save-to-db`: commit a pending portfolio save
///
/// Both accept an optional `Authorization: Bearer` header. Error bodies carry
/// a `detail` (or `message`) field that becomes the error text.
pub struct HttpBackend {
    client: Client,
    api_base: String,
}

impl HttpBackend {
    pub fn new(config: &ClientConfig) -> Self {
        let builder = Client::builder();
        #[cfg(not(target_arch = "wasm32"))]
        let builder = builder.timeout(Duration::from_secs(config.request_timeout_secs));
        Self {
            client: builder.build().unwrap_or_else(|_| Client::new()),
            api_base: config.api_base.clone(),
        }
    }

    #[must_use]
    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    fn with_auth(request: RequestBuilder, access_token: Option<&str>) -> RequestBuilder {
        match access_token {
            Some(token) if !token.is_empty() => request.bearer_auth(token),
            _ => request,
        }
    }
}

// ── Wire types ──────────────────────────────────────────────────────

#[derive(Serialize)]
struct SavePortfolioBody<'a> {
    user_id: &'a str,
    portfolio_name: &'a str,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    detail: Option<serde_json::Value>,
    #[serde(default)]
    message: Option<serde_json::Value>,
}

impl ErrorBody {
    fn into_message(self) -> Option<String> {
        [self.detail, self.message]
            .into_iter()
            .flatten()
            .find_map(|value| match value {
                serde_json::Value::Null => None,
                serde_json::Value::String(s) if s.trim().is_empty() => None,
                serde_json::Value::String(s) => Some(s),
                other => Some(other.to_string()),
            })
    }
}

/// Join `api_base` and `path`, resolve against [`DEFAULT_ORIGIN`] when the
/// base is relative, and append the query parameters that have a value.
pub fn build_url(
    api_base: &str,
    path: &str,
    params: &[(&str, Option<&str>)],
) -> Result<Url, CoreError> {
    let path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    };
    let raw = format!("{}{path}", api_base.trim_end_matches('/'));

    let lower = raw.to_ascii_lowercase();
    let parsed = if lower.starts_with("http://") || lower.starts_with("https://") {
        Url::parse(&raw)
    } else {
        Url::parse(DEFAULT_ORIGIN).and_then(|origin| origin.join(&raw))
    };
    let mut url =
        parsed.map_err(|e| CoreError::InvalidConfig(format!("Invalid API URL '{raw}': {e}")))?;

    let present: Vec<(&str, &str)> = params
        .iter()
        .filter_map(|(key, value)| value.map(|v| (*key, v)))
        .collect();
    if !present.is_empty() {
        url.query_pairs_mut().extend_pairs(present);
    }

    Ok(url)
}

async fn handle_response<T: DeserializeOwned>(response: Response) -> Result<T, CoreError> {
    let status = response.status();
    if !status.is_success() {
        let detail = response
            .json::<ErrorBody>()
            .await
            .ok()
            .and_then(ErrorBody::into_message);
        return Err(CoreError::Api {
            status: status.as_u16(),
            message: detail
                .unwrap_or_else(|| format!("Request failed with status {}", status.as_u16())),
        });
    }

    response
        .json::<T>()
        .await
        .map_err(|e| CoreError::Deserialization(format!("Unexpected response body: {e}")))
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl IdentityApi for HttpBackend {
    async fn fetch_identity(
        &self,
        access_token: Option<&str>,
        current_id: Option<&AnonymousUserId>,
    ) -> Result<IdentityResponse, CoreError> {
        let url = build_url(
            &self.api_base,
            IDENTITY_PATH,
            &[("current_id", current_id.map(AnonymousUserId::as_str))],
        )?;

        let request = Self::with_auth(self.client.get(url), access_token);
        // Anonymous sessions are tracked by cookie as well; send it along.
        #[cfg(target_arch = "wasm32")]
        let request = request.fetch_credentials_include();

        handle_response(request.send().await?).await
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl PortfolioSaveApi for HttpBackend {
    async fn save_portfolio(
        &self,
        access_token: &str,
        session_user_id: &str,
        portfolio_name: &str,
    ) -> Result<SaveConfirmation, CoreError> {
        let url = build_url(&self.api_base, SAVE_PORTFOLIO_PATH, &[])?;
        let body = SavePortfolioBody {
            user_id: session_user_id,
            portfolio_name,
        };

        let response = self
            .client
            .post(url)
            .bearer_auth(access_token)
            .json(&body)
            .send()
            .await?;

        handle_response(response).await
    }
}
