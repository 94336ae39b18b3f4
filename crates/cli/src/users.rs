//! Local user commands: `sitehub user add`, `sitehub user list`.

use std::path::{Path, PathBuf};

use serde::Serialize;
use sitehub_client::TrustStore;
use sitehub_config::{UserRecord, UserRegistry};

use crate::exit_codes::EXIT_HUB_CONFIG;
use crate::hub::hub_error;
use crate::CliError;

fn users_path(config_dir: &Path) -> PathBuf {
    config_dir.join(sitehub_config::USERS_FILE)
}

fn load_registry(config_dir: &Path) -> Result<UserRegistry, CliError> {
    UserRegistry::load_from(&users_path(config_dir)).map_err(|e| CliError {
        code: EXIT_HUB_CONFIG,
        message: e,
        hint: None,
    })
}

/// Find a user by id or handle.
pub fn resolve_user(config_dir: &Path, key: &str) -> Result<UserRecord, CliError> {
    load_registry(config_dir)?
        .find(key)
        .cloned()
        .ok_or_else(|| {
            CliError::args(format!("Unknown user: {}", key))
                .with_hint("list users with `sitehub user list`")
        })
}

pub fn cmd_user_add(
    config_dir: &Path,
    handle: String,
    name: String,
    email: Option<String>,
    profile_url: Option<String>,
) -> Result<(), CliError> {
    let mut registry = load_registry(config_dir)?;
    if registry.iter().any(|u| u.handle == handle) {
        return Err(CliError::args(format!("User {} already exists", handle)));
    }

    let mut user = UserRecord::new(handle, name);
    user.email = email;
    user.profile_url = profile_url;
    let id = user.id.clone();

    registry.upsert(user);
    registry.save_to(&users_path(config_dir)).map_err(|e| CliError {
        code: EXIT_HUB_CONFIG,
        message: e,
        hint: None,
    })?;

    println!("{}", id);
    Ok(())
}

#[derive(Serialize)]
struct UserRow<'a> {
    id: &'a str,
    handle: &'a str,
    name: &'a str,
    registered: bool,
}

pub fn cmd_user_list(config_dir: &Path, json: bool) -> Result<(), CliError> {
    let registry = load_registry(config_dir)?;
    let store = TrustStore::open(config_dir);
    let rows = registry
        .iter()
        .map(|u| {
            Ok(UserRow {
                id: &u.id,
                handle: &u.handle,
                name: &u.name,
                registered: store.is_user_registered(u).map_err(hub_error)?,
            })
        })
        .collect::<Result<Vec<UserRow>, CliError>>()?;

    if json {
        let out = serde_json::to_string_pretty(&rows).map_err(|e| CliError::io(e.to_string()))?;
        println!("{}", out);
        return Ok(());
    }

    if rows.is_empty() {
        eprintln!("No users. Add one with `sitehub user add <handle> <name>`.");
        return Ok(());
    }
    for row in rows {
        println!(
            "{}  {:<16} {}{}",
            row.id,
            row.handle,
            row.name,
            if row.registered { "  [hub]" } else { "" }
        );
    }
    Ok(())
}
