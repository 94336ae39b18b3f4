// Local user records
// Loaded from ~/.config/sitehub/users.json

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::{read_json, write_private};

/// Per-user hub credentials, issued by the hub on user registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserHubSettings {
    pub token: String,
    pub secret: String,
}

/// A user of this site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    /// Stable identifier (UUID v4)
    pub id: String,
    pub handle: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_url: Option<String>,
    /// Hub credentials, absent until the user registers with the hub
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hub: Option<UserHubSettings>,
}

impl UserRecord {
    pub fn new(handle: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            handle: handle.into(),
            name: name.into(),
            email: None,
            profile_url: None,
            hub: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UserRegistry {
    pub version: u32,
    pub users: BTreeMap<String, UserRecord>,
}

impl Default for UserRegistry {
    fn default() -> Self {
        Self { version: 1, users: BTreeMap::new() }
    }
}

impl UserRegistry {
    /// Load the registry from `path`; empty when the file is absent.
    pub fn load_from(path: &Path) -> Result<Self, String> {
        Ok(read_json(path)?.unwrap_or_default())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), String> {
        let json = serde_json::to_string_pretty(self).map_err(|e| e.to_string())?;
        write_private(path, &json)
    }

    pub fn get(&self, id: &str) -> Option<&UserRecord> {
        self.users.get(id)
    }

    /// Look a user up by id, falling back to handle.
    pub fn find(&self, key: &str) -> Option<&UserRecord> {
        self.users
            .get(key)
            .or_else(|| self.users.values().find(|u| u.handle == key))
    }

    /// Insert or replace the record with the same id.
    pub fn upsert(&mut self, user: UserRecord) {
        self.users.insert(user.id.clone(), user);
    }

    pub fn iter(&self) -> impl Iterator<Item = &UserRecord> {
        self.users.values()
    }
}
