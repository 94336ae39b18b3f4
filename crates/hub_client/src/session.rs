//! Hub session - drives site registration, user registration and signed
//! calls on behalf of registered users.
//!
//! ```text
//! Unregistered ──register()──▶ SiteRegistered ──register_user(u)──▶ UserRegistered(u)
//! ```
//!
//! Site state is shared; user state is per user. The `try_*` methods return
//! typed errors. `connect`, `make_call` and `get_remote_link` log failures
//! and degrade to `false`/`None`.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use sitehub_config::UserRecord;

use crate::client::{
    HubError, HubResponse, LinkResponse, SignedRequestClient, SiteRegistrationResponse,
    UserRegistrationResponse,
};
use crate::clock::{Clock, SystemClock};
use crate::signing::link_signature;
use crate::store::{SiteCredentials, TrustStore, UserCredentials};
use crate::token::TokenIssuer;

pub const SITE_REGISTER_ENDPOINT: &str = "hub/site/register";
pub const USER_REGISTER_ENDPOINT: &str = "hub/user/register";
pub const USER_LINK_ENDPOINT: &str = "hub/user/link";

/// Local routes the hub calls back during registration. Served by the host
/// application, not by this crate.
pub const SITE_CALLBACK_ROUTE: &str = "hub/register/site";
pub const USER_CALLBACK_ROUTE: &str = "hub/register/user";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HubState {
    Unregistered,
    SiteRegistered,
    UserRegistered,
}

#[derive(Serialize)]
struct SiteRegistrationRequest<'a> {
    url: &'a str,
    title: &'a str,
    token: &'a str,
}

/// What the hub learns about a user. Hub credentials are never included.
#[derive(Serialize)]
struct UserProfile<'a> {
    id: &'a str,
    handle: &'a str,
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    email: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    profile_url: Option<&'a str>,
}

impl<'a> From<&'a UserRecord> for UserProfile<'a> {
    fn from(user: &'a UserRecord) -> Self {
        Self {
            id: &user.id,
            handle: &user.handle,
            name: &user.name,
            email: user.email.as_deref(),
            profile_url: user.profile_url.as_deref(),
        }
    }
}

#[derive(Serialize)]
struct LinkRequest<'a> {
    user: &'a str,
    endpoint: &'a str,
    callback: &'a str,
}

pub struct HubSession {
    client: SignedRequestClient,
    store: TrustStore,
    issuer: TokenIssuer,
    // Read-mostly after the first load.
    site: RwLock<Option<SiteCredentials>>,
    // At most one site registration in flight.
    registration: Mutex<()>,
}

impl HubSession {
    pub fn new(client: SignedRequestClient, store: TrustStore, issuer: TokenIssuer) -> Self {
        Self {
            client,
            store,
            issuer,
            site: RwLock::new(None),
            registration: Mutex::new(()),
        }
    }

    /// File-backed session rooted at `config_dir`, using the server and
    /// timeout from its `hub.json`.
    pub fn open(config_dir: &Path) -> Result<Self, HubError> {
        let store = TrustStore::open(config_dir);
        let settings = store.settings()?;
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let client = SignedRequestClient::new(
            settings.server,
            settings.timeout_secs.map(Duration::from_secs),
            clock.clone(),
        )?;
        Ok(Self::new(client, store, TokenIssuer::new(clock)))
    }

    pub fn store(&self) -> &TrustStore {
        &self.store
    }

    pub fn client(&self) -> &SignedRequestClient {
        &self.client
    }

    /// Site credentials, cached after the first successful load.
    pub fn site_credentials(&self) -> Result<Option<SiteCredentials>, HubError> {
        if let Some(creds) = self.site.read().clone() {
            return Ok(Some(creds));
        }
        let loaded = self.store.load_site_credentials()?;
        if let Some(creds) = &loaded {
            *self.site.write() = Some(creds.clone());
        }
        Ok(loaded)
    }

    pub fn state(&self, user: Option<&UserRecord>) -> Result<HubState, HubError> {
        if self.site_credentials()?.is_none() {
            return Ok(HubState::Unregistered);
        }
        match user {
            Some(user) if self.store.is_user_registered(user)? => Ok(HubState::UserRegistered),
            _ => Ok(HubState::SiteRegistered),
        }
    }

    /// The live registration token, minting one if needed. Waits for any
    /// site registration in flight so it hands out the token that was sent.
    pub fn registration_token(&self) -> Result<String, HubError> {
        let _guard = self.registration.lock();
        self.issuer.get_registration_token(&self.store)
    }

    // ── Connect ─────────────────────────────────────────────────────

    /// Register the site if needed, then `user` if given and needed.
    /// True only when the requested state was reached.
    pub fn connect(&self, user: Option<&UserRecord>) -> bool {
        match self.try_connect(user) {
            Ok(state) => {
                let target = if user.is_some() { HubState::UserRegistered } else { HubState::SiteRegistered };
                state == target
            }
            Err(e) => {
                log::warn!("Hub connect failed: {}", e);
                false
            }
        }
    }

    /// Like [`connect`](Self::connect), returning the state reached.
    /// A failed user registration is logged and reported as `SiteRegistered`.
    ///
    /// A 200 from the hub that carries no site credentials leaves the site
    /// `Unregistered` (not `SiteRegistered`) until the credentials arrive on
    /// [`SITE_CALLBACK_ROUTE`], since nothing can be signed before then.
    pub fn try_connect(&self, user: Option<&UserRecord>) -> Result<HubState, HubError> {
        let site = match self.site_credentials()? {
            Some(creds) => creds,
            None => match self.ensure_site_registered()? {
                Some(creds) => creds,
                None => return Ok(HubState::Unregistered),
            },
        };

        let Some(user) = user else {
            return Ok(HubState::SiteRegistered);
        };

        if self.store.is_user_registered(user)? {
            return Ok(HubState::UserRegistered);
        }

        match self.register_user_as(&site, user) {
            Ok(_) => Ok(HubState::UserRegistered),
            Err(e) => {
                log::warn!("Hub registration for user {} failed: {}", user.handle, e);
                Ok(HubState::SiteRegistered)
            }
        }
    }

    fn ensure_site_registered(&self) -> Result<Option<SiteCredentials>, HubError> {
        let _guard = self.registration.lock();
        // Another caller may have registered while we waited.
        if let Some(creds) = self.store.load_site_credentials()? {
            *self.site.write() = Some(creds.clone());
            return Ok(Some(creds));
        }
        self.register_locked()
    }

    // ── Site registration ───────────────────────────────────────────

    /// Register this site with the hub, replacing any stored credentials.
    ///
    /// `Ok(None)` means the hub accepted the request but sent no credentials
    /// back; they are then expected on [`SITE_CALLBACK_ROUTE`].
    pub fn register(&self) -> Result<Option<SiteCredentials>, HubError> {
        let _guard = self.registration.lock();
        self.register_locked()
    }

    fn register_locked(&self) -> Result<Option<SiteCredentials>, HubError> {
        let token = self.issuer.get_registration_token(&self.store)?;
        let site = self.store.site_identity()?;

        let response = self.client.post_form(
            SITE_REGISTER_ENDPOINT,
            &SiteRegistrationRequest { url: &site.url, title: &site.title, token: &token },
        )?.require_success()?;

        let Some(creds) = response.parse::<SiteRegistrationResponse>()?.into_credentials() else {
            log::info!(
                "Hub accepted site registration; awaiting credentials on {}",
                SITE_CALLBACK_ROUTE
            );
            return Ok(None);
        };

        self.store.save_site_credentials(&creds.auth_token, &creds.secret)?;
        *self.site.write() = Some(creds.clone());
        log::info!("Site {} registered with hub {}", site.url, self.client.server());

        Ok(Some(creds))
    }

    // ── User registration ───────────────────────────────────────────

    /// Register `user` with the hub, signing with the site credentials, and
    /// store the returned user credentials.
    pub fn register_user(&self, user: &UserRecord) -> Result<UserCredentials, HubError> {
        let site = self.site_credentials()?.ok_or_else(|| {
            HubError::NotRegistered("site is not registered with the hub".into())
        })?;
        self.register_user_as(&site, user)
    }

    fn register_user_as(&self, site: &SiteCredentials, user: &UserRecord) -> Result<UserCredentials, HubError> {
        let response = self.client
            .post_signed(USER_REGISTER_ENDPOINT, &UserProfile::from(user), site)?
            .require_success()?;

        let creds = response
            .parse::<UserRegistrationResponse>()?
            .into_credentials()
            .ok_or_else(|| {
                HubError::Protocol(format!("{} response is missing token or secret", USER_REGISTER_ENDPOINT))
            })?;

        self.store.save_user_credentials(user, &creds.token, &creds.secret)?;
        log::info!("User {} registered with hub", user.handle);

        Ok(creds)
    }

    pub fn user_is_registered(&self, user: &UserRecord) -> bool {
        self.store.is_user_registered(user).unwrap_or_else(|e| {
            log::warn!("Cannot read hub credentials for {}: {}", user.handle, e);
            false
        })
    }

    // ── Calls ───────────────────────────────────────────────────────

    fn user_credentials(&self, user: &UserRecord) -> Result<UserCredentials, HubError> {
        self.store.load_user_credentials(user)?.ok_or_else(|| {
            HubError::NotRegistered(format!("user {} has no hub credentials", user.handle))
        })
    }

    /// Sign `contents` with `user`'s credentials and post to `endpoint`.
    /// The raw response is returned whatever its status.
    pub fn try_make_call<T: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        contents: &T,
        user: &UserRecord,
    ) -> Result<HubResponse, HubError> {
        let creds = self.user_credentials(user)?;
        self.client.post_signed(endpoint, contents, &creds)
    }

    /// `None` if `user` is not registered (no request is made) or the call
    /// could not complete.
    pub fn make_call<T: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        contents: &T,
        user: &UserRecord,
    ) -> Option<HubResponse> {
        match self.try_make_call(endpoint, contents, user) {
            Ok(response) => Some(response),
            Err(HubError::NotRegistered(msg)) => {
                log::debug!("Skipping hub call to {}: {}", endpoint, msg);
                None
            }
            Err(e) => {
                log::warn!("Hub call to {} failed: {}", endpoint, e);
                None
            }
        }
    }

    /// A signed link that logs `user` into the hub page at `endpoint`.
    pub fn try_get_remote_link(
        &self,
        endpoint: &str,
        callback: &str,
        user: &UserRecord,
    ) -> Result<String, HubError> {
        let creds = self.user_credentials(user)?;
        let request = LinkRequest { user: &user.id, endpoint, callback };

        let response = self.client
            .post_signed(USER_LINK_ENDPOINT, &request, &creds)?
            .require_success()?;

        let link_token = response
            .parse::<LinkResponse>()?
            .link_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                HubError::Protocol(format!("{} response is missing link_token", USER_LINK_ENDPOINT))
            })?;

        let time = self.client.now();
        let signature = link_signature(&link_token, time, &creds.secret);
        let token: String = url::form_urlencoded::byte_serialize(link_token.as_bytes()).collect();

        Ok(format!(
            "{}?token={}&time={}&signature={}",
            self.client.endpoint_url(endpoint),
            token,
            time,
            signature
        ))
    }

    pub fn get_remote_link(&self, endpoint: &str, callback: &str, user: &UserRecord) -> Option<String> {
        match self.try_get_remote_link(endpoint, callback, user) {
            Ok(link) => Some(link),
            Err(e) => {
                log::warn!("Cannot build hub link for {}: {}", endpoint, e);
                None
            }
        }
    }
}
