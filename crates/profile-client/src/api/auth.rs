use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use profile_shared::Role;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Session persisted between CLI invocations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSession {
    pub access_token: String,
    pub user_id: Uuid,
    pub role: Role,
}

impl StoredSession {
    /// Get the path to the session file
    fn session_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Could not find config directory")?
            .join("profile-cli");

        fs::create_dir_all(&config_dir)
            .context("Could not create config directory")?;

        Ok(config_dir.join("session.json"))
    }

    /// Load the session from disk
    pub fn load() -> Result<Option<Self>> {
        Self::load_from(&Self::session_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }

        let contents = fs::read_to_string(path)
            .context("Could not read session file")?;

        let session: Self = serde_json::from_str(&contents)
            .context("Could not parse session file")?;

        Ok(Some(session))
    }

    /// Save the session to disk
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::session_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let contents = serde_json::to_string_pretty(self)
            .context("Could not serialize session")?;

        fs::write(path, contents)
            .context("Could not write session file")?;

        Ok(())
    }

    /// Delete the stored session
    pub fn delete() -> Result<()> {
        Self::delete_at(&Self::session_path()?)
    }

    pub fn delete_at(path: &Path) -> Result<()> {
        if path.exists() {
            fs::remove_file(path)
                .context("Could not delete session file")?;
        }

        Ok(())
    }
}
