use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::identity::AnonymousUserId;

/// One deferred "save this portfolio under a real account" request,
/// recorded while the user was still anonymous.
///
/// Field names are camelCase on disk so snapshots written by older clients
/// keep loading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingPortfolioSave {
    /// Anonymous session that produced the portfolio.
    pub session_user_id: String,

    /// Display name the portfolio will be saved under.
    pub portfolio_name: String,

    /// When the save was requested (epoch milliseconds on disk).
    #[serde(with = "lenient_millis")]
    pub created_at: DateTime<Utc>,
}

impl PendingPortfolioSave {
    /// Create an entry stamped with the current time.
    pub fn new(session_user_id: impl Into<String>, portfolio_name: impl Into<String>) -> Self {
        Self {
            session_user_id: session_user_id.into(),
            portfolio_name: portfolio_name.into(),
            created_at: Utc::now(),
        }
    }

    /// Trim both text fields and check them.
    /// Returns `None` when the session id is not an anonymous id or the name is blank.
    #[must_use]
    pub fn normalized(self) -> Option<Self> {
        let session_user_id = AnonymousUserId::parse(&self.session_user_id)?;
        let portfolio_name = self.portfolio_name.trim();
        if portfolio_name.is_empty() {
            return None;
        }
        Some(Self {
            session_user_id: session_user_id.into(),
            portfolio_name: portfolio_name.to_string(),
            created_at: self.created_at,
        })
    }
}

/// Backend acknowledgement for a committed save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveConfirmation {
    pub message: String,
    pub portfolio_id: i64,
    pub portfolio_name: String,
}

/// Epoch-millisecond timestamps as written by any client. Integers are
/// written back; on read any finite JSON number is accepted and truncated.
mod lenient_millis {
    use chrono::{DateTime, Utc};
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(value.timestamp_millis())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        let millis = match &value {
            serde_json::Value::Number(n) => n.as_i64().or_else(|| {
                n.as_f64()
                    .filter(|f| f.is_finite())
                    .map(f64::trunc)
                    .filter(|f| *f >= i64::MIN as f64 && *f < i64::MAX as f64)
                    .map(|f| f as i64)
            }),
            _ => None,
        }
        .ok_or_else(|| D::Error::custom(format!("createdAt must be a finite number, got {value}")))?;

        DateTime::from_timestamp_millis(millis)
            .ok_or_else(|| D::Error::custom(format!("createdAt {millis} is out of range")))
    }
}
