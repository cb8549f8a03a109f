use actix_files as fs;
use actix_web::{middleware, web, App, HttpServer};
use tracing::info;
use tracing_subscriber::EnvFilter;

use smart_advisor::config::Config;
use smart_advisor::server::{self, AppState};

// ─── Main ───────────────────────────────────────────────────────────────────

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;
    let bind_addr = config.bind_addr.clone();
    let static_dir = config.static_dir.clone();
    let state = web::Data::new(AppState::from_config(config)?);

    info!("🚀 smart-advisor running at http://{}", bind_addr);

    HttpServer::new(move || {
        App::new()
            .wrap(middleware::Logger::default())
            .wrap(server::cors())
            .app_data(state.clone())
            .configure(server::configure)
            .service(fs::Files::new("/", &static_dir).index_file("index.html"))
    })
    .bind(&bind_addr)?
    .run()
    .await?;

    Ok(())
}
