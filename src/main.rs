//! Quillpost - A small blog CMS

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use quillpost::{
    api::{self, AppState},
    config::Config,
    db,
    services::{
        generate_secret, mailer::DEFAULT_QUEUE_CAPACITY, mailer_from_config, FsImageStore,
        MailQueue, MessageVerifier,
    },
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "quillpost=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Quillpost...");

    // Load configuration
    let config = Config::load_with_env(Path::new("config.yml"))?;
    tracing::info!("Configuration loaded");

    // Initialize database
    let pool = db::create_pool(&config.database).await?;
    tracing::info!("Database connected: {:?}", config.database.driver);

    // Run migrations
    db::migrations::run_migrations(&pool).await?;
    tracing::info!("Database migrations completed");

    // Signing key for cookies and reset tokens
    let secret = match &config.auth.secret_key {
        Some(secret) => secret.clone(),
        None => {
            tracing::warn!(
                "auth.secret_key is not set; using an ephemeral key. Sessions and reset links will not survive a restart"
            );
            generate_secret()
        }
    };
    let verifier = Arc::new(MessageVerifier::new(secret.as_bytes()).context("Invalid auth.secret_key")?);

    // Outgoing mail is delivered by a background worker
    let mailer = mailer_from_config(&config.mail)?;
    let (mail_queue, _mail_worker) = MailQueue::start(mailer, DEFAULT_QUEUE_CAPACITY);
    tracing::info!(smtp = config.mail.enabled, "Mail queue started");

    let images = Arc::new(FsImageStore::new(config.upload.path.clone()));

    // Build application state
    let state = AppState::new(
        &config,
        pool.clone(),
        verifier,
        Arc::new(mail_queue),
        images,
    );

    if let Some(admin) = &config.auth.bootstrap_admin {
        state
            .user_service
            .ensure_bootstrap_admin(admin)
            .await
            .context("Failed to create bootstrap admin")?;
    }

    // Start rate limiter cleanup task (runs every 5 minutes)
    {
        let login_limiter = state.login_limiter.clone();
        let reset_limiter = state.reset_limiter.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(300));
            loop {
                interval.tick().await;
                login_limiter.cleanup().await;
                reset_limiter.cleanup().await;
            }
        });
    }

    // Build router
    let app = api::build_router(state, &config.server.cors_origin);

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    pool.close().await;
    Ok(())
}
