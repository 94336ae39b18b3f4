//! Trust store - long-lived site credentials and per-user credentials.
//!
//! Site credentials and the registration token live in the site-wide
//! settings (`hub.json`). User credentials live on the user record and are
//! written through the [`UserDirectory`]. Both collaborators are injected;
//! the file-backed and in-memory implementations are provided here.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use sitehub_config::{HubSettings, UserHubSettings, UserRecord, UserRegistry};

use crate::client::HubError;
use crate::signing::SigningIdentity;
use crate::token::RegistrationToken;

// ── Credentials ─────────────────────────────────────────────────────

/// Site-level credentials issued by the hub on site registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteCredentials {
    pub auth_token: String,
    pub secret: String,
}

/// Per-user credentials issued by the hub on user registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserCredentials {
    pub token: String,
    pub secret: String,
}

impl SigningIdentity for SiteCredentials {
    fn token(&self) -> &str {
        &self.auth_token
    }

    fn secret(&self) -> &str {
        &self.secret
    }
}

impl SigningIdentity for UserCredentials {
    fn token(&self) -> &str {
        &self.token
    }

    fn secret(&self) -> &str {
        &self.secret
    }
}

/// Where this site lives, as announced to the hub.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteIdentity {
    pub url: String,
    pub title: String,
}

// ── Collaborators ───────────────────────────────────────────────────

/// Site-wide configuration persistence.
pub trait ConfigStore: Send + Sync {
    fn load(&self) -> Result<HubSettings, HubError>;
    /// Must not return until the settings are durable.
    fn save(&self, settings: &HubSettings) -> Result<(), HubError>;
}

/// User identity persistence.
pub trait UserDirectory: Send + Sync {
    fn load_user(&self, id: &str) -> Result<Option<UserRecord>, HubError>;
    /// Insert or replace; must not return until the record is durable.
    fn save_user(&self, user: &UserRecord) -> Result<(), HubError>;
}

/// `hub.json` on disk.
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigStore for FileConfigStore {
    fn load(&self) -> Result<HubSettings, HubError> {
        HubSettings::load_from(&self.path).map_err(HubError::Configuration)
    }

    fn save(&self, settings: &HubSettings) -> Result<(), HubError> {
        settings.save_to(&self.path).map_err(HubError::Configuration)
    }
}

/// `users.json` on disk. Every lookup re-reads the file so callers always
/// see the latest stored credentials.
pub struct FileUserDirectory {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileUserDirectory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), write_lock: Mutex::new(()) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl UserDirectory for FileUserDirectory {
    fn load_user(&self, id: &str) -> Result<Option<UserRecord>, HubError> {
        let registry = UserRegistry::load_from(&self.path).map_err(HubError::Configuration)?;
        Ok(registry.get(id).cloned())
    }

    fn save_user(&self, user: &UserRecord) -> Result<(), HubError> {
        let _guard = self.write_lock.lock();
        let mut registry = UserRegistry::load_from(&self.path).map_err(HubError::Configuration)?;
        registry.upsert(user.clone());
        registry.save_to(&self.path).map_err(HubError::Configuration)
    }
}

/// In-memory settings, for embedding and tests.
#[derive(Default)]
pub struct MemoryConfigStore {
    settings: Mutex<HubSettings>,
}

impl MemoryConfigStore {
    pub fn new(settings: HubSettings) -> Self {
        Self { settings: Mutex::new(settings) }
    }
}

impl ConfigStore for MemoryConfigStore {
    fn load(&self) -> Result<HubSettings, HubError> {
        Ok(self.settings.lock().clone())
    }

    fn save(&self, settings: &HubSettings) -> Result<(), HubError> {
        *self.settings.lock() = settings.clone();
        Ok(())
    }
}

/// In-memory user records, for embedding and tests.
#[derive(Default)]
pub struct MemoryUserDirectory {
    users: Mutex<BTreeMap<String, UserRecord>>,
}

impl MemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }
}

impl UserDirectory for MemoryUserDirectory {
    fn load_user(&self, id: &str) -> Result<Option<UserRecord>, HubError> {
        Ok(self.users.lock().get(id).cloned())
    }

    fn save_user(&self, user: &UserRecord) -> Result<(), HubError> {
        self.users.lock().insert(user.id.clone(), user.clone());
        Ok(())
    }
}

// ── TrustStore ──────────────────────────────────────────────────────

pub struct TrustStore {
    config: Box<dyn ConfigStore>,
    users: Box<dyn UserDirectory>,
    // Serializes read-modify-write cycles on the settings.
    settings_lock: Mutex<()>,
}

impl TrustStore {
    pub fn new(config: impl ConfigStore + 'static, users: impl UserDirectory + 'static) -> Self {
        Self {
            config: Box::new(config),
            users: Box::new(users),
            settings_lock: Mutex::new(()),
        }
    }

    /// File-backed store rooted at `dir` (`hub.json` + `users.json`).
    pub fn open(dir: &Path) -> Self {
        Self::new(
            FileConfigStore::new(dir.join(sitehub_config::HUB_FILE)),
            FileUserDirectory::new(dir.join(sitehub_config::USERS_FILE)),
        )
    }

    /// Current site-wide settings.
    pub fn settings(&self) -> Result<HubSettings, HubError> {
        self.config.load()
    }

    fn update_settings(&self, apply: impl FnOnce(&mut HubSettings)) -> Result<(), HubError> {
        let _guard = self.settings_lock.lock();
        let mut settings = self.config.load()?;
        apply(&mut settings);
        self.config.save(&settings)
    }

    pub fn site_identity(&self) -> Result<SiteIdentity, HubError> {
        let settings = self.config.load()?;
        if settings.site_url.is_empty() {
            return Err(HubError::Configuration("site URL is not configured".into()));
        }
        Ok(SiteIdentity { url: settings.site_url, title: settings.site_title })
    }

    pub fn load_site_credentials(&self) -> Result<Option<SiteCredentials>, HubError> {
        let settings = self.config.load()?;
        match (settings.auth_token, settings.secret) {
            (Some(auth_token), Some(secret)) if !auth_token.is_empty() && !secret.is_empty() => {
                Ok(Some(SiteCredentials { auth_token, secret }))
            }
            _ => Ok(None),
        }
    }

    pub fn save_site_credentials(&self, auth_token: &str, secret: &str) -> Result<(), HubError> {
        self.update_settings(|s| {
            s.auth_token = Some(auth_token.to_string());
            s.secret = Some(secret.to_string());
        })
    }

    pub fn load_registration_token(&self) -> Result<Option<RegistrationToken>, HubError> {
        let settings = self.config.load()?;
        match (settings.registration_token, settings.registration_token_issued_at) {
            (Some(value), Some(issued_at)) if !value.is_empty() => {
                Ok(Some(RegistrationToken { value, issued_at }))
            }
            _ => Ok(None),
        }
    }

    pub fn save_registration_token(&self, token: &RegistrationToken) -> Result<(), HubError> {
        self.update_settings(|s| {
            s.registration_token = Some(token.value.clone());
            s.registration_token_issued_at = Some(token.issued_at);
        })
    }

    /// Return the stored registration token when `keep` accepts it, otherwise
    /// store and return the token produced by `mint`. The check and the write
    /// happen under one lock, so concurrent callers agree on a single token.
    /// The flag is true when a new token was minted.
    pub fn reuse_or_issue_registration_token(
        &self,
        keep: impl FnOnce(&RegistrationToken) -> bool,
        mint: impl FnOnce() -> Result<RegistrationToken, HubError>,
    ) -> Result<(RegistrationToken, bool), HubError> {
        let _guard = self.settings_lock.lock();
        let mut settings = self.config.load()?;

        if let (Some(value), Some(issued_at)) =
            (&settings.registration_token, settings.registration_token_issued_at)
        {
            let cached = RegistrationToken { value: value.clone(), issued_at };
            if !cached.value.is_empty() && keep(&cached) {
                return Ok((cached, false));
            }
        }

        let token = mint()?;
        settings.registration_token = Some(token.value.clone());
        settings.registration_token_issued_at = Some(token.issued_at);
        self.config.save(&settings)?;
        Ok((token, true))
    }

    /// Latest stored record for `user`, or the given record if the
    /// directory doesn't know it yet.
    pub fn refresh_user(&self, user: &UserRecord) -> Result<UserRecord, HubError> {
        Ok(self.users.load_user(&user.id)?.unwrap_or_else(|| user.clone()))
    }

    pub fn load_user_credentials(&self, user: &UserRecord) -> Result<Option<UserCredentials>, HubError> {
        let stored = self.users.load_user(&user.id)?;
        let hub = stored.as_ref().unwrap_or(user).hub.as_ref();
        Ok(hub
            .filter(|h| !h.token.is_empty() && !h.secret.is_empty())
            .map(|h| UserCredentials { token: h.token.clone(), secret: h.secret.clone() }))
    }

    /// Attach hub credentials to `user` and persist the record.
    /// Returns the stored record.
    pub fn save_user_credentials(
        &self,
        user: &UserRecord,
        token: &str,
        secret: &str,
    ) -> Result<UserRecord, HubError> {
        let mut record = self.refresh_user(user)?;
        record.hub = Some(UserHubSettings { token: token.to_string(), secret: secret.to_string() });
        self.users.save_user(&record)?;
        Ok(record)
    }

    pub fn is_user_registered(&self, user: &UserRecord) -> Result<bool, HubError> {
        Ok(self.load_user_credentials(user)?.is_some())
    }
}
