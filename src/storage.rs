//! Whole-document persistence for the user list.
//!
//! Every backend loads and saves the complete collection; there are no partial
//! updates. Callers that need read-modify-write atomicity go through
//! [`crate::users::UserDirectory`], which serialises those cycles.

use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use crate::users::User;

#[async_trait]
pub trait UserStore: Send + Sync {
    fn name(&self) -> &str;
    async fn load(&self) -> Result<Vec<User>>;
    async fn save(&self, users: &[User]) -> Result<()>;
}

/// On-disk shape. Older files hold a bare array, newer ones wrap it.
#[derive(Deserialize)]
#[serde(untagged)]
enum Document {
    Bare(Vec<User>),
    Wrapped {
        #[serde(default)]
        users: Vec<User>,
    },
}

#[derive(Serialize)]
struct DocumentOut<'a> {
    users: &'a [User],
}

pub fn parse_document(raw: &str) -> Result<Vec<User>> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    let doc: Document = serde_json::from_str(raw).context("users document is not valid JSON")?;
    Ok(match doc {
        Document::Bare(users) => users,
        Document::Wrapped { users } => users,
    })
}

// ─── JSON File ──────────────────────────────────────────────────────────────

pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "users.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl UserStore for JsonFileStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn load(&self) -> Result<Vec<User>> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "users file missing, starting empty");
                return Ok(Vec::new());
            }
            Err(e) => {
                return Err(e).with_context(|| format!("reading {}", self.path.display()));
            }
        };
        parse_document(&raw).with_context(|| format!("parsing {}", self.path.display()))
    }

    async fn save(&self, users: &[User]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
        }
        let body = serde_json::to_vec_pretty(&DocumentOut { users })?;
        let tmp = self.temp_path();
        tokio::fs::write(&tmp, &body)
            .await
            .with_context(|| format!("writing {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("replacing {}", self.path.display()))?;
        debug!(path = %self.path.display(), count = users.len(), "users saved");
        Ok(())
    }
}

// ─── Memory ─────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryStore {
    users: Mutex<Vec<User>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_users(users: Vec<User>) -> Self {
        Self {
            users: Mutex::new(users),
        }
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn load(&self) -> Result<Vec<User>> {
        Ok(self.users.lock().await.clone())
    }

    async fn save(&self, users: &[User]) -> Result<()> {
        *self.users.lock().await = users.to_vec();
        Ok(())
    }
}
