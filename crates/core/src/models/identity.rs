use chrono::Utc;
use serde::{Deserialize, Deserializer, Serialize};

use crate::errors::CoreError;

/// Number of digits in the random part of a generated anonymous id.
const ANONYMOUS_SUFFIX_DIGITS: usize = 6;
const ANONYMOUS_SUFFIX_MODULUS: u32 = 1_000_000;

/// A locally generated, unauthenticated user id.
///
/// Always a non-empty string of ASCII decimal digits: a millisecond timestamp
/// followed by a zero-padded random suffix. Two tabs opened in the same
/// millisecond collide only if they also draw the same suffix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AnonymousUserId(String);

impl AnonymousUserId {
    /// Structural check only: non-empty and digits-only. No trimming.
    #[must_use]
    pub fn is_valid(raw: &str) -> bool {
        !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit())
    }

    /// Trim and validate a raw value.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        Self::is_valid(trimmed).then(|| Self(trimmed.to_string()))
    }

    /// Generate a fresh id from the current time and a random suffix.
    #[must_use]
    pub fn generate() -> Self {
        let millis = Utc::now().timestamp_millis().max(0);
        let suffix = random_suffix();
        Self(format!(
            "{millis}{suffix:0width$}",
            width = ANONYMOUS_SUFFIX_DIGITS
        ))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn random_suffix() -> u32 {
    let mut bytes = [0u8; 4];
    match getrandom::getrandom(&mut bytes) {
        Ok(()) => u32::from_le_bytes(bytes) % ANONYMOUS_SUFFIX_MODULUS,
        // No entropy source: the sub-millisecond clock is the best we have.
        Err(_) => Utc::now().timestamp_subsec_nanos() % ANONYMOUS_SUFFIX_MODULUS,
    }
}

impl TryFrom<String> for AnonymousUserId {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| {
            CoreError::MalformedIdentity(format!("'{value}' is not a digits-only anonymous id"))
        })
    }
}

impl From<AnonymousUserId> for String {
    fn from(id: AnonymousUserId) -> Self {
        id.0
    }
}

impl std::fmt::Display for AnonymousUserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Whether an identity is a local anonymous session or a server-known account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityKind {
    Anonymous,
    Registered,
}

impl std::fmt::Display for IdentityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IdentityKind::Anonymous => write!(f, "anonymous"),
            IdentityKind::Registered => write!(f, "registered"),
        }
    }
}

/// The cached identity snapshot, mirrored into per-tab storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredIdentity {
    pub user_id: String,
    pub kind: IdentityKind,
    #[serde(default, deserialize_with = "lenient_user_number")]
    pub registered_user_id: Option<i64>,
}

impl StoredIdentity {
    pub fn anonymous(id: &AnonymousUserId) -> Self {
        Self {
            user_id: id.as_str().to_string(),
            kind: IdentityKind::Anonymous,
            registered_user_id: None,
        }
    }

    pub fn registered(user_id: impl Into<String>, registered_user_id: Option<i64>) -> Self {
        Self {
            user_id: user_id.into(),
            kind: IdentityKind::Registered,
            registered_user_id,
        }
    }

    #[must_use]
    pub fn is_registered(&self) -> bool {
        self.kind == IdentityKind::Registered
    }

    /// The anonymous id this identity stands for, if it is anonymous.
    #[must_use]
    pub fn anonymous_id(&self) -> Option<AnonymousUserId> {
        match self.kind {
            IdentityKind::Anonymous => AnonymousUserId::parse(&self.user_id),
            IdentityKind::Registered => None,
        }
    }

    /// Reject shapes that cannot be trusted as a cache entry.
    pub fn validate(self) -> Result<Self, CoreError> {
        match self.kind {
            IdentityKind::Anonymous if !AnonymousUserId::is_valid(&self.user_id) => {
                Err(CoreError::MalformedIdentity(format!(
                    "anonymous identity with non-numeric id '{}'",
                    self.user_id
                )))
            }
            IdentityKind::Anonymous => Ok(Self {
                registered_user_id: None,
                ..self
            }),
            IdentityKind::Registered if self.user_id.trim().is_empty() => Err(
                CoreError::MalformedIdentity("registered identity with empty id".into()),
            ),
            IdentityKind::Registered => Ok(self),
        }
    }
}

/// Body returned by the backend identity endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityResponse {
    pub user_id: String,
    pub kind: IdentityKind,
    #[serde(default, deserialize_with = "lenient_user_number")]
    pub registered_user_id: Option<i64>,
}

impl TryFrom<IdentityResponse> for StoredIdentity {
    type Error = CoreError;

    fn try_from(response: IdentityResponse) -> Result<Self, Self::Error> {
        StoredIdentity {
            user_id: response.user_id,
            kind: response.kind,
            registered_user_id: response.registered_user_id,
        }
        .validate()
    }
}

/// An authenticated-user id handed over by the login layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthUserId {
    Number(i64),
    Text(String),
}

impl AuthUserId {
    /// Build the registered identity this id denotes.
    /// Returns `None` for text that is blank after trimming.
    #[must_use]
    pub fn to_registered_identity(&self) -> Option<StoredIdentity> {
        match self {
            AuthUserId::Number(n) => Some(StoredIdentity::registered(n.to_string(), Some(*n))),
            AuthUserId::Text(text) => {
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    return None;
                }
                Some(StoredIdentity::registered(trimmed, trimmed.parse::<i64>().ok()))
            }
        }
    }
}

impl From<i64> for AuthUserId {
    fn from(n: i64) -> Self {
        AuthUserId::Number(n)
    }
}

impl From<&str> for AuthUserId {
    fn from(s: &str) -> Self {
        AuthUserId::Text(s.to_string())
    }
}

impl From<String> for AuthUserId {
    fn from(s: String) -> Self {
        AuthUserId::Text(s)
    }
}

/// Accept any JSON value for a numeric account id; anything that isn't an
/// integral number becomes `None` instead of failing the whole document.
fn lenient_user_number<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        serde_json::Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && f.fract() == 0.0)
                .filter(|f| *f >= i64::MIN as f64 && *f < i64::MAX as f64)
                .map(|f| f as i64)
        }),
        _ => None,
    }))
}
