use std::cmp::Ordering;
use std::sync::Arc;

use actix_web::{web, HttpResponse};
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::auth::{issue_token, AdminClaims, LoginRequest, PasswordScheme};
use crate::error::ApiError;
use crate::server::AppState;
use crate::storage::UserStore;

pub const DEFAULT_ROLE: &str = "user";
const MAX_PAGE_SIZE: usize = 100;

// ─── Records ────────────────────────────────────────────────────────────────

fn default_role() -> String {
    DEFAULT_ROLE.to_string()
}

/// A stored account. `pass` is kept in the form the password scheme wrote it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(default, alias = "_id")]
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default = "default_role")]
    pub role: String,
    #[serde(default, alias = "password")]
    pub pass: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// What the API returns for a user: everything but the password.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub id: String,
    pub username: String,
    pub email: String,
    pub role: String,
    pub full_name: String,
    pub created_at: Option<DateTime<Utc>>,
}

impl From<&User> for UserView {
    fn from(u: &User) -> Self {
        UserView {
            id: u.id.clone(),
            username: u.username.clone(),
            email: u.email.clone(),
            role: u.role.clone(),
            full_name: u.full_name.clone(),
            created_at: u.created_at,
        }
    }
}

fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

/// `u_<base36 millis>_<6 random base36 chars>`
pub fn new_user_id() -> String {
    let millis = Utc::now().timestamp_millis().max(0) as u64;
    let mut rng = rand::thread_rng();
    let suffix: String = (0..6)
        .map(|_| {
            let n = rng.gen_range(0..36u64);
            to_base36(n)
        })
        .collect();
    format!("u_{}_{}", to_base36(millis), suffix)
}

fn norm(s: &str) -> String {
    s.trim().to_lowercase()
}

// ─── Inputs ─────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    #[serde(default)]
    pub username: String,
    #[serde(default, alias = "pass")]
    pub password: String,
    pub email: Option<String>,
    pub role: Option<String>,
    pub full_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPatch {
    #[serde(default, alias = "_id")]
    pub id: String,
    pub username: Option<String>,
    #[serde(alias = "pass")]
    pub password: Option<String>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub full_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Username,
    Email,
    Role,
    CreatedAt,
}

impl SortKey {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "username" => Some(SortKey::Username),
            "email" => Some(SortKey::Email),
            "role" => Some(SortKey::Role),
            "createdAt" | "created_at" => Some(SortKey::CreatedAt),
            _ => None,
        }
    }

    fn compare(&self, a: &User, b: &User) -> Ordering {
        match self {
            SortKey::Username => norm(&a.username).cmp(&norm(&b.username)),
            SortKey::Email => norm(&a.email).cmp(&norm(&b.email)),
            SortKey::Role => norm(&a.role).cmp(&norm(&b.role)),
            SortKey::CreatedAt => a.created_at.cmp(&b.created_at),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    #[serde(alias = "q")]
    pub search: Option<String>,
    pub role: Option<String>,
    pub sort: Option<String>,
    pub dir: Option<String>,
    pub page: Option<usize>,
    pub limit: Option<usize>,
}

impl ListQuery {
    fn matches(&self, user: &User) -> bool {
        if let Some(role) = self.role.as_deref().map(str::trim).filter(|r| !r.is_empty()) {
            if user.role.trim() != role {
                return false;
            }
        }
        match self.search.as_deref().map(norm).filter(|q| !q.is_empty()) {
            None => true,
            Some(q) => [&user.username, &user.email, &user.role, &user.full_name]
                .iter()
                .any(|field| field.to_lowercase().contains(&q)),
        }
    }

    fn sort_key(&self) -> Result<Option<SortKey>, UserError> {
        match self.sort.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            None => Ok(None),
            Some(s) => SortKey::parse(s)
                .map(Some)
                .ok_or_else(|| UserError::Invalid(format!("unknown sort key: {}", s))),
        }
    }

    fn descending(&self) -> bool {
        matches!(self.dir.as_deref(), Some(d) if d.eq_ignore_ascii_case("desc"))
    }

    /// Filters and sorts, ignoring pagination.
    pub fn apply<'a>(&self, users: &'a [User]) -> Result<Vec<&'a User>, UserError> {
        let key = self.sort_key()?;
        let mut out: Vec<&User> = users.iter().filter(|u| self.matches(u)).collect();
        if let Some(key) = key {
            let desc = self.descending();
            out.sort_by(|a, b| {
                let ord = key.compare(a, b);
                if desc {
                    ord.reverse()
                } else {
                    ord
                }
            });
        }
        Ok(out)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserPage {
    pub ok: bool,
    pub users: Vec<UserView>,
    pub total: usize,
    pub page: usize,
    pub limit: Option<usize>,
}

// ─── Directory ──────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum UserError {
    #[error("{0}")]
    Invalid(String),
    #[error("username already exists")]
    Duplicate,
    #[error("user not found")]
    NotFound,
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl From<UserError> for ApiError {
    fn from(err: UserError) -> Self {
        match err {
            UserError::Invalid(msg) => ApiError::BadRequest(msg),
            UserError::Duplicate => ApiError::Conflict("username already exists".to_string()),
            UserError::NotFound => ApiError::NotFound("user not found".to_string()),
            UserError::Store(e) => ApiError::Internal(e),
        }
    }
}

/// User CRUD over a whole-document store. Each read-modify-write cycle holds
/// `lock`, so writers inside this process never overwrite each other.
pub struct UserDirectory {
    store: Arc<dyn UserStore>,
    scheme: PasswordScheme,
    lock: Mutex<()>,
}

impl UserDirectory {
    pub fn new(store: Arc<dyn UserStore>, scheme: PasswordScheme) -> Self {
        Self {
            store,
            scheme,
            lock: Mutex::new(()),
        }
    }

    /// Loads the collection, assigning ids and roles to records that lack
    /// them and persisting the repair.
    async fn load_normalized(&self) -> Result<Vec<User>, UserError> {
        let mut users = self.store.load().await?;
        let mut changed = false;
        for user in users.iter_mut() {
            if user.id.trim().is_empty() {
                user.id = new_user_id();
                changed = true;
            }
            if user.role.trim().is_empty() {
                user.role = default_role();
                changed = true;
            }
        }
        if changed {
            warn!("[users] repaired records without id or role");
            self.store.save(&users).await?;
        }
        Ok(users)
    }

    fn is_taken(users: &[User], username: &str, except_id: Option<&str>) -> bool {
        let wanted = norm(username);
        users
            .iter()
            .any(|u| norm(&u.username) == wanted && Some(u.id.as_str()) != except_id)
    }

    pub async fn list(&self, query: &ListQuery) -> Result<UserPage, UserError> {
        let users = {
            let _guard = self.lock.lock().await;
            self.load_normalized().await?
        };
        let filtered = query.apply(&users)?;
        let total = filtered.len();

        let limit = query.limit.map(|l| l.clamp(1, MAX_PAGE_SIZE));
        let page = query.page.unwrap_or(1).max(1);
        let views: Vec<UserView> = match limit {
            Some(limit) => filtered
                .into_iter()
                .skip((page - 1).saturating_mul(limit))
                .take(limit)
                .map(UserView::from)
                .collect(),
            None => filtered.into_iter().map(UserView::from).collect(),
        };

        Ok(UserPage {
            ok: true,
            users: views,
            total,
            page,
            limit,
        })
    }

    pub async fn create(&self, input: NewUser) -> Result<UserView, UserError> {
        let username = input.username.trim();
        if username.is_empty() || input.password.is_empty() {
            return Err(UserError::Invalid(
                "username and password are required".to_string(),
            ));
        }

        let _guard = self.lock.lock().await;
        let mut users = self.load_normalized().await?;
        if Self::is_taken(&users, username, None) {
            return Err(UserError::Duplicate);
        }

        let user = User {
            id: new_user_id(),
            username: username.to_string(),
            email: input.email.unwrap_or_default().trim().to_string(),
            role: input
                .role
                .map(|r| r.trim().to_string())
                .filter(|r| !r.is_empty())
                .unwrap_or_else(default_role),
            pass: self.scheme.encode(&input.password),
            full_name: input.full_name.unwrap_or_default(),
            created_at: Some(Utc::now()),
        };
        users.push(user.clone());
        self.store.save(&users).await?;
        info!(id = %user.id, username = %user.username, "[users] created");
        Ok(UserView::from(&user))
    }

    pub async fn update(&self, patch: UserPatch) -> Result<UserView, UserError> {
        let id = patch.id.trim();
        if id.is_empty() {
            return Err(UserError::Invalid("user id is required".to_string()));
        }

        let _guard = self.lock.lock().await;
        let mut users = self.load_normalized().await?;
        let idx = users
            .iter()
            .position(|u| u.id == id)
            .ok_or(UserError::NotFound)?;

        if let Some(username) = patch.username.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            if Self::is_taken(&users, username, Some(id)) {
                return Err(UserError::Duplicate);
            }
            users[idx].username = username.to_string();
        }
        if let Some(password) = patch.password.as_deref().filter(|p| !p.is_empty()) {
            users[idx].pass = self.scheme.encode(password);
        }
        if let Some(email) = patch.email {
            users[idx].email = email.trim().to_string();
        }
        if let Some(role) = patch.role.map(|r| r.trim().to_string()).filter(|r| !r.is_empty()) {
            users[idx].role = role;
        }
        if let Some(full_name) = patch.full_name {
            users[idx].full_name = full_name;
        }

        self.store.save(&users).await?;
        info!(id, "[users] updated");
        Ok(UserView::from(&users[idx]))
    }

    pub async fn delete(&self, id: &str) -> Result<(), UserError> {
        let id = id.trim();
        if id.is_empty() {
            return Err(UserError::Invalid("user id is required".to_string()));
        }

        let _guard = self.lock.lock().await;
        let mut users = self.load_normalized().await?;
        let before = users.len();
        users.retain(|u| u.id != id);
        if users.len() == before {
            return Err(UserError::NotFound);
        }
        self.store.save(&users).await?;
        info!(id, "[users] deleted");
        Ok(())
    }

    /// Case-insensitive username lookup followed by a password check.
    pub async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<UserView>, UserError> {
        let users = {
            let _guard = self.lock.lock().await;
            self.load_normalized().await?
        };
        let wanted = norm(username);
        Ok(users
            .iter()
            .find(|u| norm(&u.username) == wanted)
            .filter(|u| self.scheme.matches(&u.pass, password))
            .map(UserView::from))
    }

    pub async fn export_csv(&self, query: &ListQuery) -> Result<String, UserError> {
        let users = {
            let _guard = self.lock.lock().await;
            self.load_normalized().await?
        };
        let rows = query.apply(&users)?;
        Ok(to_csv(&rows))
    }
}

fn csv_field(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

pub fn to_csv(rows: &[&User]) -> String {
    let mut out = String::from("username,email,role\n");
    let body: Vec<String> = rows
        .iter()
        .map(|u| {
            [&u.username, &u.email, &u.role]
                .iter()
                .map(|f| csv_field(f))
                .collect::<Vec<_>>()
                .join(",")
        })
        .collect();
    out.push_str(&body.join("\n"));
    out
}

// ─── Users Endpoints ────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct IdParam {
    #[serde(default, alias = "_id")]
    pub id: String,
}

pub async fn list_users(
    _admin: AdminClaims,
    state: web::Data<AppState>,
    query: web::Query<ListQuery>,
) -> Result<HttpResponse, ApiError> {
    let page = state.users.list(&query).await?;
    Ok(HttpResponse::Ok().json(page))
}

pub async fn create_user(
    _admin: AdminClaims,
    state: web::Data<AppState>,
    body: web::Json<NewUser>,
) -> Result<HttpResponse, ApiError> {
    let user = state.users.create(body.into_inner()).await?;
    Ok(HttpResponse::Created().json(serde_json::json!({ "ok": true, "user": user })))
}

pub async fn update_user(
    _admin: AdminClaims,
    state: web::Data<AppState>,
    body: web::Json<UserPatch>,
) -> Result<HttpResponse, ApiError> {
    let user = state.users.update(body.into_inner()).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "ok": true, "user": user })))
}

/// The id may arrive as `?id=` or in a JSON body; the query string wins.
pub async fn delete_user(
    _admin: AdminClaims,
    state: web::Data<AppState>,
    query: web::Query<IdParam>,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    let mut id = query.into_inner().id;
    if id.trim().is_empty() && !body.is_empty() {
        let from_body: IdParam = serde_json::from_slice(&body)
            .map_err(|e| ApiError::bad_request(format!("Invalid request: {}", e)))?;
        id = from_body.id;
    }
    state.users.delete(&id).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "ok": true, "id": id.trim() })))
}

pub async fn export_users(
    _admin: AdminClaims,
    state: web::Data<AppState>,
    query: web::Query<ListQuery>,
) -> Result<HttpResponse, ApiError> {
    let csv = state.users.export_csv(&query).await?;
    Ok(HttpResponse::Ok()
        .content_type("text/csv; charset=utf-8")
        .insert_header(("Content-Disposition", "attachment; filename=\"users.csv\""))
        .body(csv))
}

// ─── User Login Endpoint ────────────────────────────────────────────────────

pub async fn user_login(
    state: web::Data<AppState>,
    body: web::Json<LoginRequest>,
) -> Result<HttpResponse, ApiError> {
    let username = body.username.trim();
    if username.is_empty() || body.password.is_empty() {
        return Err(ApiError::bad_request("username and password are required"));
    }

    let Some(user) = state.users.authenticate(username, &body.password).await? else {
        warn!(username, "[user_login] rejected");
        return Err(ApiError::Unauthorized("invalid credentials".to_string()));
    };

    let cfg = &state.config;
    let token = issue_token(&cfg.jwt_secret, &user.id, &user.role, cfg.jwt_ttl)?;
    info!(id = %user.id, "[user_login] token issued");
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "ok": true,
        "token": token,
        "user": user,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{JsonFileStore, MemoryStore};
    use futures::future::join_all;
    use tempfile::TempDir;

    fn directory() -> UserDirectory {
        UserDirectory::new(Arc::new(MemoryStore::new()), PasswordScheme::Base64)
    }

    fn new_user(username: &str, role: &str) -> NewUser {
        NewUser {
            username: username.to_string(),
            password: "secret".to_string(),
            email: Some(format!("{}@corp.example", username.to_lowercase())),
            role: Some(role.to_string()),
            full_name: None,
        }
    }

    #[test]
    fn ids_have_expected_shape() {
        let id = new_user_id();
        let parts: Vec<&str> = id.split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "u");
        assert_eq!(parts[2].len(), 6);
        assert_ne!(new_user_id(), new_user_id());
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
    }

    #[tokio::test]
    async fn create_rejects_duplicates_case_insensitively() {
        let dir = directory();
        dir.create(new_user("Mona", "user")).await.unwrap();
        let err = dir.create(new_user(" mona ", "user")).await.unwrap_err();
        assert!(matches!(err, UserError::Duplicate));
    }

    #[tokio::test]
    async fn create_requires_username_and_password() {
        let dir = directory();
        let mut input = new_user("sami", "user");
        input.password.clear();
        assert!(matches!(dir.create(input).await, Err(UserError::Invalid(_))));
    }

    #[tokio::test]
    async fn stored_password_is_encoded_and_hidden() {
        let store = Arc::new(MemoryStore::new());
        let dir = UserDirectory::new(store.clone(), PasswordScheme::Base64);
        let view = dir.create(new_user("sami", "user")).await.unwrap();

        let raw = store.load().await.unwrap();
        assert_eq!(raw[0].pass, "c2VjcmV0");
        let json = serde_json::to_string(&view).unwrap();
        assert!(!json.contains("c2VjcmV0"));
        assert!(!json.contains("pass"));
    }

    #[tokio::test]
    async fn update_is_partial_and_keeps_password_when_blank() {
        let dir = directory();
        let created = dir.create(new_user("sami", "user")).await.unwrap();

        let updated = dir
            .update(UserPatch {
                id: created.id.clone(),
                email: Some("new@corp.example".to_string()),
                password: Some(String::new()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(updated.username, "sami");
        assert_eq!(updated.email, "new@corp.example");
        assert!(dir.authenticate("sami", "secret").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn rename_to_taken_name_conflicts_but_self_rename_is_fine() {
        let dir = directory();
        let a = dir.create(new_user("alpha", "user")).await.unwrap();
        dir.create(new_user("beta", "user")).await.unwrap();

        let err = dir
            .update(UserPatch {
                id: a.id.clone(),
                username: Some("BETA".to_string()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, UserError::Duplicate));

        let ok = dir
            .update(UserPatch {
                id: a.id.clone(),
                username: Some("Alpha".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(ok.username, "Alpha");
    }

    #[tokio::test]
    async fn update_and_delete_unknown_id() {
        let dir = directory();
        let patch = UserPatch {
            id: "u_missing".to_string(),
            ..Default::default()
        };
        assert!(matches!(dir.update(patch).await, Err(UserError::NotFound)));
        assert!(matches!(dir.delete("u_missing").await, Err(UserError::NotFound)));
        assert!(matches!(dir.delete("  ").await, Err(UserError::Invalid(_))));
    }

    #[tokio::test]
    async fn list_filters_sorts_and_paginates() {
        let dir = directory();
        for (name, role) in [("carol", "user"), ("alice", "admin"), ("bob", "user"), ("dave", "user")] {
            dir.create(new_user(name, role)).await.unwrap();
        }

        let query = ListQuery {
            role: Some("user".to_string()),
            sort: Some("username".to_string()),
            dir: Some("desc".to_string()),
            page: Some(2),
            limit: Some(2),
            ..Default::default()
        };
        let page = dir.list(&query).await.unwrap();
        assert_eq!(page.total, 3);
        let names: Vec<&str> = page.users.iter().map(|u| u.username.as_str()).collect();
        assert_eq!(names, vec!["bob"]);

        let search = ListQuery {
            search: Some("CORP.example".to_string()),
            ..Default::default()
        };
        assert_eq!(dir.list(&search).await.unwrap().total, 4);

        let bad = ListQuery {
            sort: Some("password".to_string()),
            ..Default::default()
        };
        assert!(matches!(dir.list(&bad).await, Err(UserError::Invalid(_))));
    }

    #[tokio::test]
    async fn page_far_past_the_end_is_empty() {
        let dir = directory();
        dir.create(new_user("solo", "user")).await.unwrap();

        let query = ListQuery {
            page: Some(usize::MAX),
            limit: Some(100),
            ..Default::default()
        };
        let page = dir.list(&query).await.unwrap();
        assert_eq!(page.total, 1);
        assert!(page.users.is_empty());
        assert_eq!(page.page, usize::MAX);
    }

    #[tokio::test]
    async fn concurrent_writes_are_not_lost() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(JsonFileStore::new(tmp.path().join("users.json")));
        let dir = UserDirectory::new(store.clone(), PasswordScheme::Base64);

        let created = join_all((0..20).map(|i| dir.create(new_user(&format!("user{}", i), "user")))).await;
        let ids: Vec<String> = created.into_iter().map(|r| r.unwrap().id).collect();
        assert_eq!(store.load().await.unwrap().len(), 20);

        let updates = ids.iter().enumerate().map(|(i, id)| {
            dir.update(UserPatch {
                id: id.clone(),
                email: Some(format!("changed{}@corp.example", i)),
                ..Default::default()
            })
        });
        for result in join_all(updates).await {
            result.unwrap();
        }

        let stored = store.load().await.unwrap();
        assert_eq!(stored.len(), 20);
        for (i, id) in ids.iter().enumerate() {
            let user = stored.iter().find(|u| &u.id == id).unwrap();
            assert_eq!(user.email, format!("changed{}@corp.example", i));
        }
    }

    #[tokio::test]
    async fn concurrent_creates_of_one_name_have_a_single_winner() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(JsonFileStore::new(tmp.path().join("users.json")));
        let dir = UserDirectory::new(store.clone(), PasswordScheme::Base64);

        let names = ["dup", "DUP", " Dup ", "dUp", "dup", "duP", "Dup", "dup "];
        let results = join_all(names.iter().map(|name| dir.create(new_user(name, "user")))).await;

        let winners = results.iter().filter(|r| r.is_ok()).count();
        let conflicts = results
            .iter()
            .filter(|r| matches!(r, Err(UserError::Duplicate)))
            .count();
        assert_eq!(winners, 1);
        assert_eq!(conflicts, names.len() - 1);
        assert_eq!(store.load().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn legacy_records_are_repaired_on_load() {
        let legacy = User {
            id: String::new(),
            username: "old".to_string(),
            email: String::new(),
            role: String::new(),
            pass: "2222".to_string(),
            full_name: String::new(),
            created_at: None,
        };
        let store = Arc::new(MemoryStore::with_users(vec![legacy]));
        let dir = UserDirectory::new(store.clone(), PasswordScheme::Base64);

        let page = dir.list(&ListQuery::default()).await.unwrap();
        assert!(page.users[0].id.starts_with("u_"));
        assert_eq!(page.users[0].role, DEFAULT_ROLE);
        assert_eq!(store.load().await.unwrap()[0].id, page.users[0].id);

        assert!(dir.authenticate("OLD", "2222").await.unwrap().is_some());
        assert!(dir.authenticate("old", "nope").await.unwrap().is_none());
    }

    #[test]
    fn csv_quotes_every_field() {
        let user = User {
            id: "1".to_string(),
            username: "say \"hi\"".to_string(),
            email: "a,b@example.com".to_string(),
            role: "user".to_string(),
            pass: String::new(),
            full_name: String::new(),
            created_at: None,
        };
        let csv = to_csv(&[&user]);
        assert_eq!(
            csv,
            "username,email,role\n\"say \"\"hi\"\"\",\"a,b@example.com\",\"user\""
        );
    }
}
