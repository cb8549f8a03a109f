use std::future::{ready, Ready};
use std::str::FromStr;
use std::time::Duration;

use actix_web::dev::Payload;
use actix_web::{web, FromRequest, HttpRequest, HttpResponse};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::ApiError;
use crate::server::AppState;

pub const ROLE_ADMIN: &str = "admin";

// ─── Tokens ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claims {
    pub sub: String,
    pub role: String,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    pub fn new(subject: &str, role: &str, ttl: Duration) -> Self {
        let now = chrono::Utc::now().timestamp();
        Claims {
            sub: subject.to_string(),
            role: role.to_string(),
            iat: now,
            exp: now + ttl.as_secs() as i64,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == ROLE_ADMIN
    }
}

pub fn encode_claims(secret: &str, claims: &Claims) -> anyhow::Result<String> {
    let token = encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;
    Ok(token)
}

pub fn issue_token(secret: &str, subject: &str, role: &str, ttl: Duration) -> anyhow::Result<String> {
    encode_claims(secret, &Claims::new(subject, role, ttl))
}

/// Returns `None` for a bad signature, a malformed token or an expired one.
pub fn verify_token(secret: &str, token: &str) -> Option<Claims> {
    let validation = Validation::new(Algorithm::HS256);
    decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map(|data| data.claims)
        .ok()
}

pub fn bearer_token(req: &HttpRequest) -> Option<&str> {
    let value = req.headers().get("Authorization")?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Extractor that only succeeds for requests carrying a valid admin token.
#[derive(Debug)]
pub struct AdminClaims(pub Claims);

fn admin_from_request(req: &HttpRequest) -> Result<AdminClaims, ApiError> {
    let state = req
        .app_data::<web::Data<AppState>>()
        .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("app state not registered")))?;

    let claims = bearer_token(req)
        .and_then(|token| verify_token(&state.config.jwt_secret, token))
        .ok_or_else(ApiError::forbidden)?;

    if !claims.is_admin() {
        return Err(ApiError::forbidden());
    }
    Ok(AdminClaims(claims))
}

impl FromRequest for AdminClaims {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(admin_from_request(req))
    }
}

// ─── Passwords ──────────────────────────────────────────────────────────────

/// How user passwords are written to the store. Reading accepts both forms.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PasswordScheme {
    Base64,
    Plain,
}

impl FromStr for PasswordScheme {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "base64" => Ok(PasswordScheme::Base64),
            "plain" => Ok(PasswordScheme::Plain),
            other => anyhow::bail!("unknown PASSWORD_SCHEME: {}", other),
        }
    }
}

impl PasswordScheme {
    pub fn encode(&self, plain: &str) -> String {
        match self {
            PasswordScheme::Base64 => STANDARD.encode(plain.as_bytes()),
            PasswordScheme::Plain => plain.to_string(),
        }
    }

    /// Checks `input` against a stored value. Under `Base64` a record that
    /// decodes to UTF-8 is compared only in decoded form; anything else is a
    /// legacy plain record. Under `Plain` the verbatim value is tried first,
    /// then the decoded one for records written while `Base64` was active.
    pub fn matches(&self, stored: &str, input: &str) -> bool {
        if stored.is_empty() {
            return false;
        }
        let decoded = STANDARD
            .decode(stored.as_bytes())
            .ok()
            .filter(|d| std::str::from_utf8(d).is_ok());
        match (self, decoded) {
            (PasswordScheme::Base64, Some(decoded)) => constant_time_eq(&decoded, input.as_bytes()),
            (PasswordScheme::Base64, None) => constant_time_eq(stored.as_bytes(), input.as_bytes()),
            (PasswordScheme::Plain, decoded) => {
                constant_time_eq(stored.as_bytes(), input.as_bytes())
                    || decoded.is_some_and(|d| constant_time_eq(&d, input.as_bytes()))
            }
        }
    }
}

pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

// ─── Admin Login Endpoint ───────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

pub async fn admin_login(
    state: web::Data<AppState>,
    body: web::Json<LoginRequest>,
) -> Result<HttpResponse, ApiError> {
    let username = body.username.trim();
    if username.is_empty() || body.password.is_empty() {
        return Err(ApiError::bad_request("username and password are required"));
    }

    let cfg = &state.config;
    if cfg.admin_username.is_empty() || cfg.admin_password.is_empty() {
        warn!("[admin_login] ADMIN_USERNAME/ADMIN_PASSWORD not configured");
        return Err(ApiError::Unauthorized("invalid credentials".to_string()));
    }

    let user_ok = constant_time_eq(username.as_bytes(), cfg.admin_username.as_bytes());
    let pass_ok = constant_time_eq(body.password.as_bytes(), cfg.admin_password.as_bytes());
    if !(user_ok && pass_ok) {
        warn!(username, "[admin_login] rejected");
        return Err(ApiError::Unauthorized("invalid credentials".to_string()));
    }

    let token = issue_token(&cfg.jwt_secret, username, ROLE_ADMIN, cfg.jwt_ttl)?;
    info!(username, "[admin_login] token issued");
    Ok(HttpResponse::Ok().json(serde_json::json!({ "token": token })))
}
