use actix_cors::Cors;
use actix_web::{middleware::Compress, web, App, HttpServer};
use std::sync::Arc;
use tracing::{error, info, Level};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi; // bring trait into scope for ApiDoc::openapi()
use utoipa_swagger_ui::SwaggerUi;

use blogpoint::config::AppConfig;
use blogpoint::mail::build_mailer;
use blogpoint::openapi::ApiDoc;
use blogpoint::rate_limit::{RateLimitConfig, RateLimiterFacade};
use blogpoint::repo::Repo;
use blogpoint::storage::build_object_store;
use blogpoint::{config, tasks, AppState, SecurityHeaders};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load .env automatically only in debug builds; production sets the environment externally.
    if cfg!(debug_assertions) {
        let _ = dotenv::dotenv();
    }

    validate_env_vars();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    info!("Bootstrapping BlogPoint server");
    let cfg = Arc::new(AppConfig::from_env());
    info!("Frontend URL: {}", cfg.frontend_url);

    let repo: Arc<dyn Repo> = match build_repo(&cfg).await {
        Ok(repo) => repo,
        Err(e) => {
            error!(error = %e, "repository initialisation failed");
            std::process::exit(1);
        }
    };

    let store = match build_object_store(&cfg.storage).await {
        Ok(store) => store,
        Err(e) => {
            error!(error = %e, "object storage initialisation failed");
            std::process::exit(1);
        }
    };

    let mailer = match build_mailer(&cfg.smtp) {
        Ok(mailer) => mailer,
        Err(e) => {
            error!(error = %e, "mailer initialisation failed");
            std::process::exit(1);
        }
    };

    tasks::spawn_cleanup(repo.clone(), store.clone(), cfg.cleanup_interval, cfg.unverified_account_ttl);
    tasks::spawn_statistics(repo.clone(), cfg.statistics_interval);

    let state = AppState {
        repo,
        store,
        mailer,
        rate_limiter: Some(RateLimiterFacade::new(RateLimitConfig::from_env())),
        config: cfg.clone(),
    };
    let openapi = ApiDoc::openapi();
    let bind_addr = cfg.bind_addr.clone();

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allowed_origin(&state.config.frontend_url)
            .allowed_methods(["GET", "POST", "PATCH", "DELETE", "OPTIONS"])
            .allow_any_header()
            .supports_credentials()
            .max_age(3600);

        App::new()
            .wrap(TracingLogger::default())
            .wrap(Compress::default())
            .wrap(SecurityHeaders::new(&state.config))
            .wrap(cors)
            .app_data(web::Data::new(state.clone()))
            .configure(config)
            .service(SwaggerUi::new("/docs/{_:.*}").url("/docs/openapi.json", openapi.clone()))
    })
    .bind(&bind_addr)?;

    info!("Listening on http://{bind_addr}");
    server.run().await
}

#[cfg(feature = "postgres-store")]
async fn build_repo(cfg: &AppConfig) -> anyhow::Result<Arc<dyn Repo>> {
    use blogpoint::repo::pg::PgRepo;
    use sqlx::postgres::PgPoolOptions;

    let pool = PgPoolOptions::new()
        .max_connections(cfg.db_max_connections)
        .connect(&cfg.database_url)
        .await?;
    let repo = PgRepo::new(pool);
    repo.migrate().await?;
    info!("Using Postgres repository backend");
    Ok(Arc::new(repo))
}

#[cfg(all(feature = "inmem-store", not(feature = "postgres-store")))]
async fn build_repo(_cfg: &AppConfig) -> anyhow::Result<Arc<dyn Repo>> {
    info!("Using in-memory repository backend");
    Ok(Arc::new(blogpoint::repo::inmem::InMemRepo::new()))
}

/// Validate that required environment variables are set
fn validate_env_vars() {
    use std::env;

    let mut required = vec!["JWT_SECRET", "S3_ENDPOINT"];
    if cfg!(feature = "postgres-store") {
        required.push("DATABASE_URL");
    }

    let mut missing = Vec::new();
    for var in &required {
        if env::var(var).map(|v| v.is_empty()).unwrap_or(true) {
            missing.push(*var);
        }
    }

    if !missing.is_empty() {
        eprintln!("Missing required environment variables: {}", missing.join(", "));
        std::process::exit(1);
    }

    if let Ok(secret) = env::var("JWT_SECRET") {
        if secret.len() < 32 {
            eprintln!("JWT_SECRET must be at least 32 characters long for security");
            std::process::exit(1);
        }
    }

    if env::var("SMTP_HOST").map(|v| v.is_empty()).unwrap_or(true) {
        eprintln!("Warning: SMTP_HOST not set; verification emails will only be logged");
    }
}
