//! Hub commands: init, status, token, connect, call, link.
//!
//! `sitehub init`     - write server + site identity
//! `sitehub status`   - show site/user registration state
//! `sitehub token`    - print the live registration token
//! `sitehub connect`  - register site and user as needed
//! `sitehub call`     - signed call as a registered user
//! `sitehub link`     - signed hub login link for a user

use std::path::Path;

use serde::Serialize;
use sitehub_client::{HubError, HubSession, HubSettings, HubState, UserRecord};

use crate::exit_codes::*;
use crate::users::resolve_user;
use crate::CliError;

// ── Init ────────────────────────────────────────────────────────────

pub fn cmd_init(
    config_dir: &Path,
    server: String,
    site_url: String,
    title: String,
    timeout: Option<u64>,
) -> Result<(), CliError> {
    if !server.starts_with("http://") && !server.starts_with("https://") {
        return Err(CliError::args(format!("Invalid hub server URL: {}", server))
            .with_hint("use an absolute http(s) URL, e.g. https://hub.example.org/"));
    }

    let path = config_dir.join(sitehub_config::HUB_FILE);
    let mut settings = HubSettings::load_from(&path).map_err(|e| CliError {
        code: EXIT_HUB_CONFIG,
        message: e,
        hint: None,
    })?;

    if !settings.server.is_empty() && settings.server != server && settings.has_site_credentials() {
        eprintln!("warning: hub server changed; run `sitehub connect` after clearing stored credentials");
    }

    settings.server = server;
    settings.site_url = site_url;
    settings.site_title = title;
    settings.timeout_secs = timeout;

    settings.save_to(&path).map_err(|e| CliError {
        code: EXIT_HUB_CONFIG,
        message: e,
        hint: None,
    })?;

    eprintln!("Wrote {}", path.display());
    Ok(())
}

// ── Status ──────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct StatusReport {
    server: String,
    site_url: String,
    site_title: String,
    state: HubState,
    registration_token_issued_at: Option<String>,
    user: Option<UserStatus>,
}

#[derive(Debug, Serialize)]
struct UserStatus {
    id: String,
    handle: String,
    registered: bool,
}

pub fn cmd_status(config_dir: &Path, user: Option<String>, json: bool) -> Result<(), CliError> {
    let session = open_session(config_dir)?;
    let user = user.map(|key| resolve_user(config_dir, &key)).transpose()?;

    let settings = session.store().settings().map_err(hub_error)?;
    let state = session.state(user.as_ref()).map_err(hub_error)?;

    let report = StatusReport {
        server: settings.server,
        site_url: settings.site_url,
        site_title: settings.site_title,
        state,
        registration_token_issued_at: settings
            .registration_token_issued_at
            .and_then(|secs| chrono::DateTime::from_timestamp(secs, 0))
            .map(|dt| dt.to_rfc3339()),
        user: user.as_ref().map(|u| UserStatus {
            id: u.id.clone(),
            handle: u.handle.clone(),
            registered: state == HubState::UserRegistered,
        }),
    };

    if json {
        let out = serde_json::to_string_pretty(&report).map_err(|e| CliError::io(e.to_string()))?;
        println!("{}", out);
        return Ok(());
    }

    println!("server:  {}", display_or_unset(&report.server));
    println!("site:    {} ({})", display_or_unset(&report.site_url), report.site_title);
    println!("state:   {}", state_label(report.state));
    if let Some(issued) = &report.registration_token_issued_at {
        println!("token:   issued {}", issued);
    }
    if let Some(u) = &report.user {
        println!(
            "user:    {} ({})",
            u.handle,
            if u.registered { "registered" } else { "not registered" }
        );
    }
    Ok(())
}

fn display_or_unset(value: &str) -> &str {
    if value.is_empty() { "(not set)" } else { value }
}

fn state_label(state: HubState) -> &'static str {
    match state {
        HubState::Unregistered => "unregistered",
        HubState::SiteRegistered => "site registered",
        HubState::UserRegistered => "user registered",
    }
}

// ── Token ───────────────────────────────────────────────────────────

pub fn cmd_token(config_dir: &Path) -> Result<(), CliError> {
    let session = open_session(config_dir)?;
    let token = session.registration_token().map_err(hub_error)?;
    println!("{}", token);
    Ok(())
}

// ── Connect ─────────────────────────────────────────────────────────

pub fn cmd_connect(config_dir: &Path, user: Option<String>) -> Result<(), CliError> {
    let session = open_session(config_dir)?;
    let user: Option<UserRecord> = user.map(|key| resolve_user(config_dir, &key)).transpose()?;

    let state = session.try_connect(user.as_ref()).map_err(hub_error)?;
    eprintln!("{}", state_label(state));

    match (state, &user) {
        (HubState::Unregistered, _) => Err(CliError {
            code: EXIT_HUB_NOT_REGISTERED,
            message: "Hub accepted the site but has not issued credentials yet".into(),
            hint: Some("the hub delivers them to this site's registration callback; retry later".into()),
        }),
        (HubState::SiteRegistered, Some(u)) => Err(CliError {
            code: EXIT_HUB_NOT_REGISTERED,
            message: format!("User {} could not be registered with the hub", u.handle),
            hint: Some("rerun with -v for details".into()),
        }),
        _ => Ok(()),
    }
}

// ── Call ────────────────────────────────────────────────────────────

pub fn cmd_call(
    config_dir: &Path,
    endpoint: String,
    contents: String,
    user: String,
) -> Result<(), CliError> {
    let contents: serde_json::Value = serde_json::from_str(&contents)
        .map_err(|e| CliError::args(format!("Contents must be JSON: {}", e)))?;

    let session = open_session(config_dir)?;
    let user = resolve_user(config_dir, &user)?;

    let response = session
        .try_make_call(&endpoint, &contents, &user)
        .map_err(hub_error)?;

    let out = serde_json::to_string_pretty(&serde_json::Value::Object(response.body.clone()))
        .map_err(|e| CliError::io(e.to_string()))?;
    println!("{}", out);

    if !response.is_success() {
        return Err(CliError {
            code: EXIT_HUB_PROTOCOL,
            message: format!("Hub returned HTTP {}", response.status),
            hint: None,
        });
    }
    Ok(())
}

// ── Link ────────────────────────────────────────────────────────────

pub fn cmd_link(
    config_dir: &Path,
    endpoint: String,
    callback: String,
    user: String,
) -> Result<(), CliError> {
    let session = open_session(config_dir)?;
    let user = resolve_user(config_dir, &user)?;

    let link = session
        .try_get_remote_link(&endpoint, &callback, &user)
        .map_err(hub_error)?;
    println!("{}", link);
    Ok(())
}

// ── Helpers ─────────────────────────────────────────────────────────

fn open_session(config_dir: &Path) -> Result<HubSession, CliError> {
    HubSession::open(config_dir).map_err(hub_error)
}

pub(crate) fn hub_error(e: HubError) -> CliError {
    let code = hub_exit_code(&e);
    let hint = match &e {
        HubError::NotRegistered(_) => Some("run `sitehub connect --user <user>` first".to_string()),
        HubError::Configuration(_) => Some("check hub.json or run `sitehub init`".to_string()),
        _ => None,
    };
    CliError { code, message: e.to_string(), hint }
}
