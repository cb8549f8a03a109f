use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::auth::PasswordScheme;

// ─── Config ─────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    File,
    Memory,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub bind_addr: String,
    pub static_dir: PathBuf,
    pub jwt_secret: String,
    pub jwt_ttl: Duration,
    pub admin_username: String,
    pub admin_password: String,
    pub gemini_api_key: String,
    pub gemini_api_url: String,
    pub gemini_models: Vec<String>,
    pub llm_max_attempts: u32,
    pub llm_backoff_ms: u64,
    pub llm_deadline: Duration,
    pub users_file: PathBuf,
    pub storage: StorageKind,
    pub password_scheme: PasswordScheme,
    pub directives_file: PathBuf,
}

/// Secret-free view served by `GET /api/config`.
#[derive(Serialize)]
pub struct ConfigSummary {
    pub models: Vec<String>,
    pub has_api_key: bool,
    pub storage: StorageKind,
    pub password_scheme: PasswordScheme,
}

fn env_or(key: &str, default: &str) -> String {
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => default.to_string(),
    }
}

fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => v
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {}: {:?}", key, v)),
        _ => Ok(default),
    }
}

pub fn parse_models(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_string)
        .collect()
}

/// Token lifetimes beyond ten years are rejected so `iat + ttl` stays in range.
const MAX_TTL_HOURS: u64 = 24 * 365 * 10;

fn ttl_from_hours(hours: u64) -> Result<Duration> {
    let secs = hours
        .checked_mul(3600)
        .filter(|_| (1..=MAX_TTL_HOURS).contains(&hours))
        .with_context(|| format!("JWT_TTL_HOURS must be between 1 and {}, got {}", MAX_TTL_HOURS, hours))?;
    Ok(Duration::from_secs(secs))
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let jwt_secret = std::env::var("JWT_SECRET")
            .ok()
            .filter(|s| !s.is_empty())
            .context("JWT_SECRET must be set")?;

        let storage = match env_or("STORAGE", "file").to_lowercase().as_str() {
            "file" => StorageKind::File,
            "memory" => StorageKind::Memory,
            other => anyhow::bail!("unknown STORAGE backend: {}", other),
        };

        let password_scheme = env_or("PASSWORD_SCHEME", "base64").parse()?;

        let models = parse_models(&env_or("GEMINI_MODELS", "gemini-1.5-flash,gemini-1.5-pro"));
        if models.is_empty() {
            anyhow::bail!("GEMINI_MODELS lists no models");
        }

        Ok(Config {
            bind_addr: env_or("BIND_ADDR", "0.0.0.0:5001"),
            static_dir: PathBuf::from(env_or("STATIC_DIR", "./public")),
            jwt_secret,
            jwt_ttl: ttl_from_hours(env_parse::<u64>("JWT_TTL_HOURS", 6)?)?,
            admin_username: env_or("ADMIN_USERNAME", ""),
            admin_password: std::env::var("ADMIN_PASSWORD").unwrap_or_default(),
            gemini_api_key: env_or("GEMINI_API_KEY", ""),
            gemini_api_url: env_or(
                "GEMINI_API_URL",
                "https://generativelanguage.googleapis.com/v1beta",
            ),
            gemini_models: models,
            llm_max_attempts: env_parse("LLM_MAX_ATTEMPTS", 3)?,
            llm_backoff_ms: env_parse("LLM_BACKOFF_MS", 500)?,
            llm_deadline: Duration::from_secs(env_parse("LLM_DEADLINE_SECS", 60)?),
            users_file: PathBuf::from(env_or("USERS_FILE", "data/users.json")),
            storage,
            password_scheme,
            directives_file: PathBuf::from(env_or("DIRECTIVES_FILE", "ai-directives.json")),
        })
    }

    pub fn summary(&self) -> ConfigSummary {
        ConfigSummary {
            models: self.gemini_models.clone(),
            has_api_key: !self.gemini_api_key.is_empty(),
            storage: self.storage,
            password_scheme: self.password_scheme,
        }
    }

    /// Defaults suitable for tests: memory storage, no API key.
    pub fn for_tests() -> Self {
        Config {
            bind_addr: "127.0.0.1:0".to_string(),
            static_dir: PathBuf::from("./public"),
            jwt_secret: "test-secret".to_string(),
            jwt_ttl: Duration::from_secs(6 * 3600),
            admin_username: "admin".to_string(),
            admin_password: "hunter2".to_string(),
            gemini_api_key: String::new(),
            gemini_api_url: "http://127.0.0.1:9".to_string(),
            gemini_models: vec!["gemini-1.5-flash".to_string()],
            llm_max_attempts: 3,
            llm_backoff_ms: 1,
            llm_deadline: Duration::from_secs(5),
            users_file: PathBuf::from("data/users.json"),
            storage: StorageKind::Memory,
            password_scheme: PasswordScheme::Base64,
            directives_file: PathBuf::from("ai-directives.json"),
        }
    }
}
