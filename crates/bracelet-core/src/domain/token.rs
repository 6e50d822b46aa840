//! OAuth token and access-token claims
//!
//! The platform issues JWT access tokens. The client never verifies their
//! signature; it only reads the payload segment to learn the subject (user
//! id), the role and the expiry, which drives the early refresh window.

use std::fmt;

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use super::errors::DomainError;

/// base64url that tolerates both padded and unpadded input.
const JWT_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Claims read from the access token's payload segment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenClaims {
    /// Subject: the authenticated user's id
    pub user_id: Option<i64>,
    pub role: Option<String>,
    /// Expiry, in seconds since the epoch
    pub exp: Option<i64>,
}

#[derive(Deserialize)]
struct RawClaims {
    sub: Option<serde_json::Value>,
    role: Option<String>,
    exp: Option<serde_json::Value>,
}

fn claim_as_i64(value: Option<serde_json::Value>) -> Option<i64> {
    match value? {
        serde_json::Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        serde_json::Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

impl TokenClaims {
    /// Decodes the middle segment of a `header.payload.signature` token.
    pub fn decode(access_token: &str) -> Result<Self, DomainError> {
        let payload = access_token
            .split('.')
            .nth(1)
            .filter(|segment| !segment.is_empty())
            .ok_or_else(|| DomainError::InvalidToken("missing payload segment".into()))?;

        let bytes = JWT_ENGINE
            .decode(payload)
            .map_err(|e| DomainError::InvalidToken(format!("payload is not base64url: {e}")))?;

        let raw: RawClaims = serde_json::from_slice(&bytes)
            .map_err(|e| DomainError::InvalidToken(format!("payload is not JSON: {e}")))?;

        Ok(Self {
            user_id: claim_as_i64(raw.sub),
            role: raw.role,
            exp: claim_as_i64(raw.exp),
        })
    }

    /// Encodes claims into an unsigned `header.payload.` token. Used to
    /// fabricate tokens for local tooling and tests.
    pub fn encode_unsigned(&self) -> String {
        let header = JWT_ENGINE.encode(br#"{"alg":"none","typ":"JWT"}"#);
        let mut payload = serde_json::Map::new();
        if let Some(sub) = self.user_id {
            payload.insert("sub".into(), sub.into());
        }
        if let Some(role) = &self.role {
            payload.insert("role".into(), role.clone().into());
        }
        if let Some(exp) = self.exp {
            payload.insert("exp".into(), exp.into());
        }
        let payload = JWT_ENGINE.encode(serde_json::Value::Object(payload).to_string());
        format!("{header}.{payload}.")
    }
}

/// Wire shape of a token, as returned by `/oauth/token` and as persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenRecord {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i64>,
}

/// An OAuth token together with its decoded claims.
///
/// Construction fails if the access token payload cannot be decoded, so a
/// live `OauthToken` always has claims.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "TokenRecord", into = "TokenRecord")]
pub struct OauthToken {
    access_token: String,
    refresh_token: Option<String>,
    token_type: Option<String>,
    expires_in: Option<i64>,
    claims: TokenClaims,
}

impl OauthToken {
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        token_type: Option<String>,
        expires_in: Option<i64>,
    ) -> Result<Self, DomainError> {
        let access_token = access_token.into();
        let claims = TokenClaims::decode(&access_token)?;
        Ok(Self {
            access_token,
            refresh_token,
            token_type,
            expires_in,
            claims,
        })
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref()
    }

    pub fn token_type(&self) -> Option<&str> {
        self.token_type.as_deref()
    }

    pub fn expires_in(&self) -> Option<i64> {
        self.expires_in
    }

    pub fn claims(&self) -> &TokenClaims {
        &self.claims
    }

    pub fn user_id(&self) -> Option<i64> {
        self.claims.user_id
    }

    pub fn user_role(&self) -> Option<&str> {
        self.claims.role.as_deref()
    }

    /// Expiry instant from the `exp` claim.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.claims
            .exp
            .and_then(|exp| Utc.timestamp_opt(exp, 0).single())
    }

    /// Returns true if the token is past its expiry at `now`.
    ///
    /// Tokens without an `exp` claim never expire.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().is_some_and(|exp| now >= exp)
    }

    /// Returns true if `now` is inside the refresh window, i.e. the token
    /// expires within `margin` or already has.
    pub fn needs_refresh(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        self.expires_at().is_some_and(|exp| now + margin >= exp)
    }

    /// Value for the `Authorization` header.
    pub fn authorization(&self) -> String {
        format!("Bearer {}", self.access_token)
    }
}

impl fmt::Debug for OauthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OauthToken")
            .field("access_token", &"<redacted>")
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("token_type", &self.token_type)
            .field("claims", &self.claims)
            .finish()
    }
}

impl TryFrom<TokenRecord> for OauthToken {
    type Error = DomainError;

    fn try_from(record: TokenRecord) -> Result<Self, Self::Error> {
        OauthToken::new(
            record.access_token,
            record.refresh_token,
            record.token_type,
            record.expires_in,
        )
    }
}

impl From<OauthToken> for TokenRecord {
    fn from(token: OauthToken) -> Self {
        TokenRecord {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            token_type: token.token_type,
            expires_in: token.expires_in,
        }
    }
}
