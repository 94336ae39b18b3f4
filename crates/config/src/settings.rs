// Site-wide hub settings
// Loaded from ~/.config/sitehub/hub.json

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::{read_json, write_private};

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HubSettings {
    // Hub base URL
    #[serde(rename = "server")]
    pub server: String,

    // This site
    #[serde(rename = "site.url")]
    pub site_url: String,

    #[serde(rename = "site.title")]
    pub site_title: String,

    // Transport
    #[serde(rename = "http.timeoutSecs")]
    pub timeout_secs: Option<u64>,  // None = no timeout

    // Registration handshake
    #[serde(rename = "hub.registrationToken", skip_serializing_if = "Option::is_none")]
    pub registration_token: Option<String>,

    #[serde(rename = "hub.registrationTokenIssuedAt", skip_serializing_if = "Option::is_none")]
    pub registration_token_issued_at: Option<i64>,

    // Long-lived site credentials
    #[serde(rename = "hub.authToken", skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,

    #[serde(rename = "hub.secret", skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
}

impl HubSettings {
    /// Load settings from `path`, falling back to defaults when the file is absent.
    /// A file that exists but cannot be read or parsed is an error: it may hold
    /// credentials that must not be silently replaced.
    pub fn load_from(path: &Path) -> Result<Self, String> {
        Ok(read_json(path)?.unwrap_or_default())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), String> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| e.to_string())?;

        write_private(path, &json)
    }

    /// True when both the site auth token and secret are set and non-empty.
    pub fn has_site_credentials(&self) -> bool {
        non_empty(&self.auth_token) && non_empty(&self.secret)
    }
}

fn non_empty(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.is_empty())
}
