//! Hub HTTP client.
//!
//! Blocking reqwest client (no Tokio runtime required).
//! Posts form-encoded bodies; signed calls carry a [`SignedEnvelope`].
//! Stateless: no retries, no status judgement. Callers decide what a
//! response means.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::signing::{envelope_signature, verify_envelope_signature, SigningIdentity};
use crate::store::{SiteCredentials, UserCredentials};

pub const USER_AGENT: &str = concat!("sitehub/", env!("CARGO_PKG_VERSION"));

/// Error type for hub operations.
#[derive(Debug)]
pub enum HubError {
    /// Credential store unreadable or unwritable
    Configuration(String),
    /// Request could not be sent or no response received
    Transport(String),
    /// Hub answered, but not with HTTP 200
    Http(u16, String),
    /// Response malformed or missing expected fields
    Protocol(String),
    /// Operation attempted before the required registration state
    NotRegistered(String),
}

impl std::fmt::Display for HubError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HubError::Configuration(msg) => write!(f, "Configuration error: {}", msg),
            HubError::Transport(msg) => write!(f, "Network error: {}", msg),
            HubError::Http(code, msg) => write!(f, "HTTP {}: {}", code, msg),
            HubError::Protocol(msg) => write!(f, "Protocol error: {}", msg),
            HubError::NotRegistered(msg) => write!(f, "Not registered: {}", msg),
        }
    }
}

impl std::error::Error for HubError {}

// ── Responses ───────────────────────────────────────────────────────

/// A hub answer: status code plus the decoded JSON object body.
#[derive(Debug, Clone, PartialEq)]
pub struct HubResponse {
    pub status: u16,
    pub body: serde_json::Map<String, serde_json::Value>,
    /// Body text as received
    pub raw: String,
}

impl HubResponse {
    /// Decode a raw answer. An empty body is an empty object. A 200 whose
    /// body is not a JSON object is a protocol error; other statuses keep
    /// whatever text came back in `raw`.
    pub fn from_parts(status: u16, raw: String) -> Result<Self, HubError> {
        let body = if raw.trim().is_empty() {
            serde_json::Map::new()
        } else {
            match serde_json::from_str::<serde_json::Value>(&raw) {
                Ok(serde_json::Value::Object(map)) => map,
                Ok(_) if status == 200 => {
                    return Err(HubError::Protocol("response body is not a JSON object".into()));
                }
                Err(e) if status == 200 => {
                    return Err(HubError::Protocol(format!("invalid JSON in response: {}", e)));
                }
                _ => serde_json::Map::new(),
            }
        };

        Ok(Self { status, body, raw })
    }

    pub fn is_success(&self) -> bool {
        self.status == 200
    }

    /// Decode the body into a typed response record.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, HubError> {
        serde_json::from_value(serde_json::Value::Object(self.body.clone()))
            .map_err(|e| HubError::Protocol(e.to_string()))
    }

    /// `Ok(self)` for HTTP 200, otherwise [`HubError::Http`].
    pub fn require_success(self) -> Result<Self, HubError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(HubError::Http(self.status, self.raw))
        }
    }
}

/// Answer to `hub/site/register`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SiteRegistrationResponse {
    pub auth_token: Option<String>,
    pub secret: Option<String>,
}

impl SiteRegistrationResponse {
    /// Credentials, if the hub returned both halves.
    pub fn into_credentials(self) -> Option<SiteCredentials> {
        match (self.auth_token, self.secret) {
            (Some(auth_token), Some(secret)) if !auth_token.is_empty() && !secret.is_empty() => {
                Some(SiteCredentials { auth_token, secret })
            }
            _ => None,
        }
    }
}

/// Answer to `hub/user/register`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserRegistrationResponse {
    pub token: Option<String>,
    pub secret: Option<String>,
}

impl UserRegistrationResponse {
    pub fn into_credentials(self) -> Option<UserCredentials> {
        match (self.token, self.secret) {
            (Some(token), Some(secret)) if !token.is_empty() && !secret.is_empty() => {
                Some(UserCredentials { token, secret })
            }
            _ => None,
        }
    }
}

/// Answer to `hub/user/link`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LinkResponse {
    pub link_token: Option<String>,
}

// ── Envelope ────────────────────────────────────────────────────────

/// Signed request body. Field order is the wire order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedEnvelope {
    /// Compact JSON of the payload
    pub contents: String,
    /// Unix seconds at signing
    pub time: i64,
    pub auth_token: String,
    /// Lowercase hex HMAC-SHA1
    pub signature: String,
}

impl SignedEnvelope {
    /// Serialize `contents` and sign it as `identity` at `time`.
    pub fn seal<T: Serialize + ?Sized>(
        contents: &T,
        time: i64,
        identity: &dyn SigningIdentity,
    ) -> Result<Self, HubError> {
        let contents = serde_json::to_string(contents)
            .map_err(|e| HubError::Protocol(format!("cannot serialize contents: {}", e)))?;
        Ok(Self::from_json(contents, time, identity))
    }

    /// Sign already-serialized contents.
    pub fn from_json(contents: String, time: i64, identity: &dyn SigningIdentity) -> Self {
        let signature = envelope_signature(&contents, time, identity);
        Self {
            contents,
            time,
            auth_token: identity.token().to_string(),
            signature,
        }
    }

    /// True when `identity` names the token in this envelope and its secret
    /// reproduces the signature.
    pub fn verify(&self, identity: &dyn SigningIdentity) -> bool {
        self.auth_token == identity.token()
            && verify_envelope_signature(&self.contents, self.time, identity, &self.signature)
    }
}

// ── Client ──────────────────────────────────────────────────────────

/// Hub API client (blocking).
#[derive(Clone)]
pub struct SignedRequestClient {
    http: reqwest::blocking::Client,
    server: String,
    clock: Arc<dyn Clock>,
}

impl SignedRequestClient {
    /// Create a client for `server`. `timeout: None` means requests never
    /// time out on their own.
    pub fn new(
        server: impl Into<String>,
        timeout: Option<Duration>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, HubError> {
        let http = reqwest::blocking::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| HubError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self::with_http(server, http, clock))
    }

    /// Create a client around an already-configured reqwest client.
    pub fn with_http(
        server: impl Into<String>,
        http: reqwest::blocking::Client,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { http, server: server.into(), clock }
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    pub fn now(&self) -> i64 {
        self.clock.now()
    }

    /// `server` and `endpoint` joined by exactly one `/`.
    pub fn endpoint_url(&self, endpoint: &str) -> String {
        format!(
            "{}/{}",
            self.server.trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        )
    }

    /// Post unsigned form fields.
    pub fn post_form<T: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        fields: &T,
    ) -> Result<HubResponse, HubError> {
        if self.server.is_empty() {
            return Err(HubError::Configuration("no hub server configured".into()));
        }

        let url = self.endpoint_url(endpoint);
        log::debug!("POST {}", url);

        let response = self.http.post(&url)
            .form(fields)
            .send()
            .map_err(|e| HubError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let raw = response.text()
            .map_err(|e| HubError::Transport(format!("Failed to read response: {}", e)))?;

        HubResponse::from_parts(status, raw)
    }

    /// Sign `contents` as `identity` with the current time and post it.
    pub fn post_signed<T: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        contents: &T,
        identity: &dyn SigningIdentity,
    ) -> Result<HubResponse, HubError> {
        let envelope = SignedEnvelope::seal(contents, self.clock.now(), identity)?;
        self.post_envelope(endpoint, &envelope)
    }

    pub fn post_envelope(
        &self,
        endpoint: &str,
        envelope: &SignedEnvelope,
    ) -> Result<HubResponse, HubError> {
        self.post_form(endpoint, envelope)
    }
}
