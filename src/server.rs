use std::sync::Arc;

use actix_cors::Cors;
use actix_web::http::header;
use actix_web::{web, HttpResponse};
use anyhow::Result;
use tracing::{info, warn};

use crate::auth;
use crate::chat;
use crate::config::{Config, StorageKind};
use crate::error::ApiError;
use crate::gemini::{GeminiClient, TextGenerator};
use crate::persona::{self, Directives};
use crate::router::{ModelRouter, RetryPolicy};
use crate::storage::{JsonFileStore, MemoryStore, UserStore};
use crate::users::{self, UserDirectory};

const JSON_LIMIT: usize = 1_048_576;

// ─── App State ──────────────────────────────────────────────────────────────

pub struct AppState {
    pub config: Config,
    pub users: UserDirectory,
    /// `None` when no model API key is configured.
    pub router: Option<ModelRouter>,
    pub directives: Directives,
}

impl AppState {
    pub fn new(
        config: Config,
        store: Arc<dyn UserStore>,
        generator: Option<Arc<dyn TextGenerator>>,
        directives: Directives,
    ) -> Self {
        let users = UserDirectory::new(store, config.password_scheme);
        let router = generator.map(|generator| {
            let policy = RetryPolicy {
                max_attempts: config.llm_max_attempts,
                base_ms: config.llm_backoff_ms,
                ..RetryPolicy::default()
            };
            ModelRouter::new(generator, config.gemini_models.clone(), policy, config.llm_deadline)
        });
        AppState {
            config,
            users,
            router,
            directives,
        }
    }

    pub fn from_config(config: Config) -> Result<Self> {
        let store: Arc<dyn UserStore> = match config.storage {
            StorageKind::File => Arc::new(JsonFileStore::new(&config.users_file)),
            StorageKind::Memory => Arc::new(MemoryStore::new()),
        };

        let generator: Option<Arc<dyn TextGenerator>> = if config.gemini_api_key.is_empty() {
            warn!("GEMINI_API_KEY not set, /api/chat will answer 500");
            None
        } else {
            let client = GeminiClient::new(
                &config.gemini_api_url,
                &config.gemini_api_key,
                config.llm_deadline,
            )?;
            Some(Arc::new(client))
        };

        let directives = Directives::load(&config.directives_file);
        info!(
            storage = store.name(),
            models = ?config.gemini_models,
            "app state ready"
        );
        Ok(Self::new(config, store, generator, directives))
    }
}

// ─── Config Endpoint ────────────────────────────────────────────────────────

async fn get_config(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(state.config.summary())
}

async fn method_not_allowed() -> Result<HttpResponse, ApiError> {
    Err(ApiError::MethodNotAllowed)
}

// ─── Wiring ─────────────────────────────────────────────────────────────────

pub fn cors() -> Cors {
    Cors::default()
        .allow_any_origin()
        .send_wildcard()
        .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
        .allowed_headers(vec![header::CONTENT_TYPE, header::AUTHORIZATION])
        .max_age(3600)
}

pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(JSON_LIMIT)
        .error_handler(|err, _req| {
            let detail = err.to_string();
            warn!("[json_error] {}", detail);
            let response = HttpResponse::BadRequest().json(serde_json::json!({
                "error": format!("Invalid request: {}", detail)
            }));
            actix_web::error::InternalError::from_response(err, response).into()
        })
}

/// API routes. Static files are mounted separately so they stay last.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(json_config())
        .service(
            web::resource("/api/admin-auth")
                .route(web::post().to(auth::admin_login))
                .default_service(web::to(method_not_allowed)),
        )
        .service(
            web::resource("/api/admin/login")
                .route(web::post().to(auth::admin_login))
                .default_service(web::to(method_not_allowed)),
        )
        .service(
            web::resource("/api/login")
                .route(web::post().to(users::user_login))
                .default_service(web::to(method_not_allowed)),
        )
        .service(
            web::resource("/api/users/export")
                .route(web::get().to(users::export_users))
                .default_service(web::to(method_not_allowed)),
        )
        .service(
            web::resource("/api/users")
                .route(web::get().to(users::list_users))
                .route(web::post().to(users::create_user))
                .route(web::put().to(users::update_user))
                .route(web::delete().to(users::delete_user))
                .default_service(web::to(method_not_allowed)),
        )
        .service(
            web::resource("/api/chat")
                .route(web::post().to(chat::chat))
                .default_service(web::to(method_not_allowed)),
        )
        .route("/api/personas", web::get().to(persona::list_personas))
        .route("/api/config", web::get().to(get_config));
}
