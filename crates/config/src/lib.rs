// Configuration loading

pub mod settings;
pub mod users;

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

pub use settings::HubSettings;
pub use users::{UserHubSettings, UserRecord, UserRegistry};

/// Site-wide hub settings file name inside the config directory.
pub const HUB_FILE: &str = "hub.json";

/// Local user records file name inside the config directory.
pub const USERS_FILE: &str = "users.json";

/// Default config directory: `~/.config/sitehub`
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("sitehub")
}

/// Write a file that holds secrets.
/// Creates the parent directory if it doesn't exist.
/// The contents go to a 0600 temp file in the same directory, which is synced
/// and then renamed over `path`, so readers see either the old or the new file.
pub(crate) fn write_private(path: &Path, contents: &str) -> Result<(), String> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)
        .map_err(|e| format!("Failed to create config directory: {}", e))?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent)
        .map_err(|e| format!("Failed to create temp file in {}: {}", parent.display(), e))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let permissions = fs::Permissions::from_mode(0o600);
        tmp.as_file()
            .set_permissions(permissions)
            .map_err(|e| format!("Failed to set file permissions: {}", e))?;
    }

    tmp.write_all(contents.as_bytes())
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| format!("Failed to write {}: {}", path.display(), e))?;

    tmp.persist(path)
        .map_err(|e| format!("Failed to replace {}: {}", path.display(), e.error))?;

    Ok(())
}

/// Read a JSON config file, ignoring `//` comment lines.
/// Returns `Ok(None)` when the file does not exist. A file that exists but
/// holds no JSON is an error, never a default.
pub(crate) fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>, String> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(format!("Error reading {}: {}", path.display(), e)),
    };

    let cleaned: String = contents
        .lines()
        .filter(|line| !line.trim().starts_with("//"))
        .collect::<Vec<_>>()
        .join("\n");

    if cleaned.trim().is_empty() {
        return Err(format!("Error parsing {}: file is empty", path.display()));
    }

    serde_json::from_str(&cleaned)
        .map(Some)
        .map_err(|e| format!("Error parsing {}: {}", path.display(), e))
}
