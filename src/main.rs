//! Application entry point for the `carhealth-diagnostics` client.
//!
//! This binary runs the long-lived diagnostics controller:
//! - Loading configuration from environment variables or `.env`
//! - Initializing structured logging/tracing
//! - Establishing a PostgreSQL connection pool for the document store
//! - Creating the document tables if they do not exist
//! - Restoring the session handed over by the external auth provider
//! - Resolving the user's samples and serving the headless API via axum
//!
//! # Environment Variables
//! - `DATABASE_URL` (**required**) – PostgreSQL connection string
//! - `PREDICT_API_URL` (**required**) – prediction service base URL
//! - `APP_LOG_LEVEL` (optional) – log verbosity (default: `debug`)
//! - `APP_SPAN_EVENTS` (optional) – span event mode for tracing
//!
//! See `config.rs` for the remaining optional settings.
use std::{env, io::IsTerminal, sync::Arc};

use anyhow::Result;
use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

use carhealth_diagnostics::{
    cache::{FileCache, LocalCache, AUTH_TOKEN_KEY},
    config, routes, schema,
    store::{DocumentStore, PgStore},
    DiagnosticsController, PredictionClient, SampleResolver, SessionState, SyncSettings, User,
};

// ---

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    init_tracing();
    dotenv().ok();

    let cfg = config::load_from_env()?;
    cfg.log_config();

    let pool = PgPoolOptions::new()
        .max_connections(cfg.db_pool_max)
        .connect(&cfg.db_url)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to connect to document store: {}", e))?;

    tracing::info!("Successfully connected to document store");

    schema::create_schema(&pool).await?;

    let store: Arc<dyn DocumentStore> = Arc::new(PgStore::new(pool));
    let cache: Arc<dyn LocalCache> = Arc::new(FileCache::new(&cfg.cache_path));

    let session = SessionState::new(cache.clone());
    let controller = DiagnosticsController::new(
        SampleResolver::new(store.clone(), cache.clone()),
        PredictionClient::new(&cfg.predict_url),
        session.clone(),
        SyncSettings::from_config(&cfg),
    );

    // held for the lifetime of the process
    let _session_watch = controller.watch_session();

    // A configured uid wins; otherwise resume the session persisted last run.
    let resumed = match cfg.session_uid.clone() {
        Some(uid) => Some(uid),
        None => cache.get(AUTH_TOKEN_KEY).await.unwrap_or_else(|e| {
            tracing::warn!("Could not read persisted session: {:#}", e);
            None
        }),
    };
    match resumed {
        Some(uid) => session.sign_in(User { uid, email: None }).await?,
        None => tracing::info!("No authenticated user, waiting for sign-in"),
    }

    let app = routes::router(controller, store);

    tracing::info!("Listening on {}", cfg.listen_addr);

    let listener = tokio::net::TcpListener::bind(cfg.listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ---

/// Install the global compact `tracing` subscriber.
///
/// `RUST_LOG` wins when set. Otherwise the level comes from `APP_LOG_LEVEL`
/// (see [`default_directives`]). `APP_SPAN_EVENTS` picks span events (`full`,
/// `enter_exit`, default close-only) and `FORCE_COLOR` overrides TTY detection.
fn init_tracing() {
    // ---
    let span_events = match env::var("APP_SPAN_EVENTS").as_deref() {
        Ok("full") => FmtSpan::FULL,
        Ok("enter_exit") => FmtSpan::ENTER | FmtSpan::EXIT,
        _ => FmtSpan::CLOSE,
    };

    let use_color = match env::var("FORCE_COLOR").as_deref() {
        Ok("1") | Ok("true") | Ok("yes") => true,
        Ok("0") | Ok("false") | Ok("no") => false,
        _ => std::io::stdout().is_terminal(),
    };

    let env_filter = if env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::new(default_directives(env::var("APP_LOG_LEVEL").ok().as_deref()))
    };

    tracing_subscriber::fmt()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(span_events)
        .with_env_filter(env_filter)
        .with_ansi(use_color)
        .compact()
        .init();
}

/// Filter used without `RUST_LOG`: the requested level (default `debug`) for
/// this crate, with SQL statements and HTTP client/server internals held back
/// so sync traffic stays readable.
fn default_directives(level: Option<&str>) -> String {
    // ---
    let level = match level {
        Some(l @ ("trace" | "debug" | "info" | "warn" | "error")) => l,
        _ => "debug",
    };
    format!("{level},sqlx::query=warn,hyper=info,reqwest=info")
}
