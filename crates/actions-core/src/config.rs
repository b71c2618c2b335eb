//! Repository settings.
//!
//! Read once at startup and passed explicitly to the repository and server
//! at construction time; there is no process-wide mutable state. Loaded
//! from an optional YAML file; every field has a default so a missing file
//! yields a working local setup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Path of the store file.
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,

    /// Seconds until a stored action expires (default: 31 days).
    #[serde(default = "default_item_ttl_s")]
    pub item_ttl_s: u32,

    /// Bounded retry count applied to every store transaction.
    #[serde(default = "default_store_retries")]
    pub store_retries: u32,
}

fn default_store_path() -> PathBuf {
    PathBuf::from("actions.redb")
}

fn default_item_ttl_s() -> u32 {
    60 * 60 * 24 * 31
}

fn default_store_retries() -> u32 {
    2
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            store_path: default_store_path(),
            item_ttl_s: default_item_ttl_s(),
            store_retries: default_store_retries(),
        }
    }
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&text)?)
    }

    /// Item TTL as a whole-second duration.
    pub fn ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::from(self.item_ttl_s))
    }
}
