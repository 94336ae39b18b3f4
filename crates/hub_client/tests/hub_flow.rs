//! End-to-end hub flows against an httpmock hub.
//!
//! Every test runs against a file-backed trust store in a temp directory and
//! a manual clock, so request bodies are byte-for-byte predictable.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use httpmock::prelude::*;
use sitehub_client::{
    link_signature, Clock, HubError, HubSession, HubSettings, HubState, ManualClock,
    SignedEnvelope, SignedRequestClient, SiteCredentials, TokenIssuer, TrustStore, UserRecord,
    REGISTRATION_TOKEN_TTL_SECS,
};

const NOW: i64 = 1_700_000_000;
const SITE_URL: &str = "https://blog.example.com/";
const SITE_TITLE: &str = "Example Blog";
const LIVE_TOKEN: &str = "00112233445566778899aabbccddeeff00112233445566778899aabbccddeeff";

fn site_creds() -> SiteCredentials {
    SiteCredentials { auth_token: "site-token".into(), secret: "site-secret".into() }
}

fn base_settings(server: &MockServer) -> HubSettings {
    HubSettings {
        server: server.base_url(),
        site_url: SITE_URL.into(),
        site_title: SITE_TITLE.into(),
        // A live token makes the registration body predictable
        registration_token: Some(LIVE_TOKEN.into()),
        registration_token_issued_at: Some(NOW - 10),
        ..Default::default()
    }
}

fn registered_settings(server: &MockServer) -> HubSettings {
    HubSettings {
        auth_token: Some("site-token".into()),
        secret: Some("site-secret".into()),
        ..base_settings(server)
    }
}

fn open_session(dir: &Path, settings: &HubSettings) -> HubSession {
    settings.save_to(&dir.join(sitehub_config::HUB_FILE)).unwrap();

    let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(NOW));
    let client = SignedRequestClient::new(settings.server.clone(), None, clock.clone()).unwrap();
    HubSession::new(client, TrustStore::open(dir), TokenIssuer::new(clock))
}

fn form(pairs: &[(&str, &str)]) -> String {
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (k, v) in pairs {
        serializer.append_pair(k, v);
    }
    serializer.finish()
}

fn envelope_form(envelope: &SignedEnvelope) -> String {
    let time = envelope.time.to_string();
    form(&[
        ("contents", envelope.contents.as_str()),
        ("time", time.as_str()),
        ("auth_token", envelope.auth_token.as_str()),
        ("signature", envelope.signature.as_str()),
    ])
}

fn profile_json(user: &UserRecord) -> String {
    format!(r#"{{"id":"{}","handle":"{}","name":"{}"}}"#, user.id, user.handle, user.name)
}

// ── Site registration ───────────────────────────────────────────────

#[test]
fn test_connect_registers_site_and_persists_credentials() {
    let server = MockServer::start();
    let dir = tempfile::tempdir().unwrap();

    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/hub/site/register")
            .body(form(&[("url", SITE_URL), ("title", SITE_TITLE), ("token", LIVE_TOKEN)]));
        then.status(200)
            .json_body(serde_json::json!({ "auth_token": "site-token", "secret": "site-secret" }));
    });

    let session = open_session(dir.path(), &base_settings(&server));
    assert_eq!(session.state(None).unwrap(), HubState::Unregistered);

    assert!(session.connect(None));
    mock.assert();

    assert_eq!(session.state(None).unwrap(), HubState::SiteRegistered);

    // Durable: a fresh store over the same directory sees the credentials
    let reopened = TrustStore::open(dir.path());
    assert_eq!(reopened.load_site_credentials().unwrap(), Some(site_creds()));
}

#[test]
fn test_connect_skips_registration_when_credentials_exist() {
    let server = MockServer::start();
    let dir = tempfile::tempdir().unwrap();

    let mock = server.mock(|when, then| {
        when.method(POST).path("/hub/site/register");
        then.status(500);
    });

    let session = open_session(dir.path(), &registered_settings(&server));
    assert!(session.connect(None));
    assert_eq!(session.try_connect(None).unwrap(), HubState::SiteRegistered);

    assert!(session.site_credentials().unwrap().is_some());
    mock.assert_hits(0);
}

#[test]
fn test_register_mints_token_when_cached_one_expired() {
    let server = MockServer::start();
    let dir = tempfile::tempdir().unwrap();

    let mut settings = base_settings(&server);
    settings.registration_token_issued_at = Some(NOW - REGISTRATION_TOKEN_TTL_SECS);

    server.mock(|when, then| {
        when.method(POST).path("/hub/site/register");
        then.status(200)
            .json_body(serde_json::json!({ "auth_token": "site-token", "secret": "site-secret" }));
    });

    let session = open_session(dir.path(), &settings);
    session.register().unwrap().unwrap();

    let stored = session.store().settings().unwrap();
    assert_ne!(stored.registration_token.as_deref(), Some(LIVE_TOKEN));
    assert_eq!(stored.registration_token_issued_at, Some(NOW));
}

#[test]
fn test_register_accepted_without_credentials() {
    let server = MockServer::start();
    let dir = tempfile::tempdir().unwrap();

    server.mock(|when, then| {
        when.method(POST).path("/hub/site/register");
        then.status(200);
    });

    let session = open_session(dir.path(), &base_settings(&server));
    assert_eq!(session.register().unwrap(), None);
    assert_eq!(session.try_connect(None).unwrap(), HubState::Unregistered);
    assert!(!session.connect(None));
}

#[test]
fn test_register_rejected() {
    let server = MockServer::start();
    let dir = tempfile::tempdir().unwrap();

    server.mock(|when, then| {
        when.method(POST).path("/hub/site/register");
        then.status(403).body("unknown site");
    });

    let session = open_session(dir.path(), &base_settings(&server));
    match session.register() {
        Err(HubError::Http(403, msg)) => assert_eq!(msg, "unknown site"),
        other => panic!("unexpected: {:?}", other),
    }
    assert!(!session.connect(None));
    assert!(session.store().load_site_credentials().unwrap().is_none());
}

#[test]
fn test_concurrent_connects_register_once() {
    let server = MockServer::start();
    let dir = tempfile::tempdir().unwrap();

    let mock = server.mock(|when, then| {
        when.method(POST).path("/hub/site/register");
        then.status(200)
            .delay(Duration::from_millis(100))
            .json_body(serde_json::json!({ "auth_token": "site-token", "secret": "site-secret" }));
    });

    let session = open_session(dir.path(), &base_settings(&server));
    std::thread::scope(|scope| {
        let a = scope.spawn(|| session.connect(None));
        let b = scope.spawn(|| session.connect(None));
        assert!(a.join().unwrap());
        assert!(b.join().unwrap());
    });

    mock.assert();
}

#[test]
fn test_concurrent_token_requests_share_one_token() {
    let server = MockServer::start();
    let dir = tempfile::tempdir().unwrap();
    let settings = HubSettings {
        registration_token: None,
        registration_token_issued_at: None,
        ..base_settings(&server)
    };
    let session = open_session(dir.path(), &settings);
    let barrier = std::sync::Barrier::new(16);

    let tokens: Vec<String> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..16)
            .map(|_| {
                scope.spawn(|| {
                    barrier.wait();
                    session.registration_token().unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let cached = TrustStore::open(dir.path()).load_registration_token().unwrap().unwrap();
    assert!(tokens.iter().all(|t| *t == cached.value), "{:?}", tokens);
}

// ── Transport timeout ───────────────────────────────────────────────

fn slow_registration(server: &MockServer) {
    server.mock(|when, then| {
        when.method(POST).path("/hub/site/register");
        then.status(200)
            .delay(Duration::from_secs(2))
            .json_body(serde_json::json!({ "auth_token": "site-token", "secret": "site-secret" }));
    });
}

#[test]
fn test_configured_timeout_is_applied() {
    let server = MockServer::start();
    slow_registration(&server);

    let dir = tempfile::tempdir().unwrap();
    let settings = HubSettings { timeout_secs: Some(1), ..base_settings(&server) };
    settings.save_to(&dir.path().join(sitehub_config::HUB_FILE)).unwrap();

    let session = HubSession::open(dir.path()).unwrap();
    match session.try_connect(None) {
        Err(HubError::Transport(_)) => {}
        other => panic!("expected transport error, got {:?}", other),
    }
    assert!(session.store().load_site_credentials().unwrap().is_none());
}

#[test]
fn test_no_timeout_unless_configured() {
    let server = MockServer::start();
    slow_registration(&server);

    let dir = tempfile::tempdir().unwrap();
    base_settings(&server).save_to(&dir.path().join(sitehub_config::HUB_FILE)).unwrap();

    let session = HubSession::open(dir.path()).unwrap();
    assert_eq!(session.try_connect(None).unwrap(), HubState::SiteRegistered);
    assert_eq!(session.store().load_site_credentials().unwrap(), Some(site_creds()));
}

// ── User registration ───────────────────────────────────────────────

#[test]
fn test_connect_registers_user() {
    let server = MockServer::start();
    let dir = tempfile::tempdir().unwrap();
    let user = UserRecord::new("alice", "Alice Example");

    let expected = SignedEnvelope::from_json(profile_json(&user), NOW, &site_creds());
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/hub/user/register")
            .body(envelope_form(&expected));
        then.status(200)
            .json_body(serde_json::json!({ "token": "user-token", "secret": "user-secret" }));
    });

    let session = open_session(dir.path(), &registered_settings(&server));
    assert!(!session.user_is_registered(&user));
    assert_eq!(session.state(Some(&user)).unwrap(), HubState::SiteRegistered);

    assert!(session.connect(Some(&user)));
    mock.assert();

    assert!(session.user_is_registered(&user));
    assert_eq!(session.state(Some(&user)).unwrap(), HubState::UserRegistered);

    // Second connect is a no-op for this user
    assert!(session.connect(Some(&user)));
    mock.assert();
}

#[test]
fn test_full_flow_from_scratch() {
    let server = MockServer::start();
    let dir = tempfile::tempdir().unwrap();
    let user = UserRecord::new("bob", "Bob Example");

    let site_mock = server.mock(|when, then| {
        when.method(POST).path("/hub/site/register");
        then.status(200)
            .json_body(serde_json::json!({ "auth_token": "site-token", "secret": "site-secret" }));
    });
    let user_mock = server.mock(|when, then| {
        when.method(POST).path("/hub/user/register");
        then.status(200)
            .json_body(serde_json::json!({ "token": "user-token", "secret": "user-secret" }));
    });

    let session = open_session(dir.path(), &base_settings(&server));
    assert!(session.connect(Some(&user)));

    site_mock.assert();
    user_mock.assert();
    assert_eq!(session.state(Some(&user)).unwrap(), HubState::UserRegistered);
}

#[test]
fn test_user_registration_failure_does_not_abort_connect() {
    let server = MockServer::start();
    let dir = tempfile::tempdir().unwrap();
    let user = UserRecord::new("alice", "Alice Example");

    server.mock(|when, then| {
        when.method(POST).path("/hub/user/register");
        then.status(500).body("boom");
    });

    let session = open_session(dir.path(), &registered_settings(&server));
    assert_eq!(session.try_connect(Some(&user)).unwrap(), HubState::SiteRegistered);
    assert!(!session.connect(Some(&user)));
    assert!(session.connect(None));
    assert!(!session.user_is_registered(&user));
}

#[test]
fn test_user_registration_without_credentials_is_protocol_error() {
    let server = MockServer::start();
    let dir = tempfile::tempdir().unwrap();
    let user = UserRecord::new("alice", "Alice Example");

    server.mock(|when, then| {
        when.method(POST).path("/hub/user/register");
        then.status(200).json_body(serde_json::json!({ "token": "user-token" }));
    });

    let session = open_session(dir.path(), &registered_settings(&server));
    assert!(matches!(session.register_user(&user), Err(HubError::Protocol(_))));
    assert!(!session.user_is_registered(&user));
}

// ── Calls ───────────────────────────────────────────────────────────

fn registered_user(session: &HubSession) -> UserRecord {
    let user = UserRecord::new("alice", "Alice Example");
    session.store().save_user_credentials(&user, "user-token", "user-secret").unwrap()
}

#[test]
fn test_make_call_signs_with_user_credentials() {
    let server = MockServer::start();
    let dir = tempfile::tempdir().unwrap();
    let session = open_session(dir.path(), &registered_settings(&server));
    let user = registered_user(&session);

    let contents = serde_json::json!({ "feed": "https://blog.example.com/feed" });
    let creds = session.store().load_user_credentials(&user).unwrap().unwrap();
    let expected = SignedEnvelope::seal(&contents, NOW, &creds).unwrap();
    assert_eq!(expected.auth_token, "user-token");

    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/hub/feeds/subscribe")
            .body(envelope_form(&expected));
        then.status(404).json_body(serde_json::json!({ "error": "no such feed" }));
    });

    // Raw response comes back whatever the status
    let resp = session.make_call("hub/feeds/subscribe", &contents, &user).unwrap();
    mock.assert();
    assert_eq!(resp.status, 404);
    assert_eq!(resp.body["error"], "no such feed");
}

#[test]
fn test_make_call_for_unregistered_user_makes_no_request() {
    let server = MockServer::start();
    let dir = tempfile::tempdir().unwrap();
    let session = open_session(dir.path(), &registered_settings(&server));
    let user = UserRecord::new("carol", "Carol Example");

    let mock = server.mock(|when, then| {
        when.method(POST).path("/hub/anything");
        then.status(200);
    });

    assert!(session.make_call("hub/anything", &serde_json::json!({}), &user).is_none());
    assert!(matches!(
        session.try_make_call("hub/anything", &serde_json::json!({}), &user),
        Err(HubError::NotRegistered(_))
    ));
    mock.assert_hits(0);
}

#[test]
fn test_remote_link() {
    let server = MockServer::start();
    let dir = tempfile::tempdir().unwrap();
    let session = open_session(dir.path(), &registered_settings(&server));
    let user = registered_user(&session);

    let contents = format!(
        r#"{{"user":"{}","endpoint":"hub/page/settings","callback":"https://blog.example.com/done"}}"#,
        user.id
    );
    let creds = session.store().load_user_credentials(&user).unwrap().unwrap();
    let expected = SignedEnvelope::from_json(contents, NOW, &creds);

    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/hub/user/link")
            .body(envelope_form(&expected));
        then.status(200).json_body(serde_json::json!({ "link_token": "lt 1/2" }));
    });

    let link = session
        .get_remote_link("hub/page/settings", "https://blog.example.com/done", &user)
        .unwrap();
    mock.assert();

    let signature = link_signature("lt 1/2", NOW, "user-secret");
    assert_eq!(
        link,
        format!(
            "{}/hub/page/settings?token=lt+1%2F2&time={}&signature={}",
            server.base_url(),
            NOW,
            signature
        )
    );
    assert!(link.contains("token=") && link.contains("time=") && link.contains("signature="));
}

#[test]
fn test_remote_link_without_link_token() {
    let server = MockServer::start();
    let dir = tempfile::tempdir().unwrap();
    let session = open_session(dir.path(), &registered_settings(&server));
    let user = registered_user(&session);

    server.mock(|when, then| {
        when.method(POST).path("/hub/user/link");
        then.status(200).json_body(serde_json::json!({ "status": "ok" }));
    });

    assert!(session.get_remote_link("hub/page", "https://blog.example.com/cb", &user).is_none());
    assert!(matches!(
        session.try_get_remote_link("hub/page", "https://blog.example.com/cb", &user),
        Err(HubError::Protocol(_))
    ));
}

#[test]
fn test_remote_link_when_hub_fails() {
    let server = MockServer::start();
    let dir = tempfile::tempdir().unwrap();
    let session = open_session(dir.path(), &registered_settings(&server));
    let user = registered_user(&session);

    server.mock(|when, then| {
        when.method(POST).path("/hub/user/link");
        then.status(503);
    });

    assert!(session.get_remote_link("hub/page", "https://blog.example.com/cb", &user).is_none());
}
