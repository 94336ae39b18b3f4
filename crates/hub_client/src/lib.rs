//! Hub trust client.
//!
//! Establishes trust between this site and a hub, then signs calls to the
//! hub on behalf of individual users:
//!
//! - `token`   - short-lived registration token for the site handshake
//! - `client`  - HMAC-signed form posts and typed hub responses
//! - `store`   - site and per-user credentials over injected persistence
//! - `session` - the connect / register / call flow
//!
//! No retries. No background threads. Timeouts belong to the transport.

mod client;
mod clock;
mod session;
mod signing;
mod store;
mod token;

pub use client::{
    HubError, HubResponse, SignedEnvelope, SignedRequestClient,
    SiteRegistrationResponse, UserRegistrationResponse, LinkResponse,
    USER_AGENT,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use session::{
    HubSession, HubState,
    SITE_REGISTER_ENDPOINT, USER_REGISTER_ENDPOINT, USER_LINK_ENDPOINT,
    SITE_CALLBACK_ROUTE, USER_CALLBACK_ROUTE,
};
pub use signing::{
    SigningIdentity, hmac_sha1_hex, verify_hmac_sha1_hex,
    envelope_signature, verify_envelope_signature, link_signature,
};
pub use store::{
    TrustStore, SiteCredentials, UserCredentials, SiteIdentity,
    ConfigStore, UserDirectory,
    FileConfigStore, FileUserDirectory, MemoryConfigStore, MemoryUserDirectory,
};
pub use token::{TokenIssuer, RegistrationToken, REGISTRATION_TOKEN_TTL_SECS};

pub use sitehub_config::{HubSettings, UserRecord, UserHubSettings};
