use std::sync::Arc;

use portcullis_authenticate::{
    app,
    config::{DataBrokerBackend, ServerConfig},
    db::PgDataBroker,
    directory::HttpDirectoryClient,
    oidc::OidcProvider,
    state::{Authenticate, AuthenticateState, Collaborators},
};
use portcullis_session::{DataBroker, DirectoryClient, DisabledDirectory, InMemoryDataBroker};
use sqlx::postgres::PgPoolOptions;
use tokio::signal::unix::{SignalKind, signal};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment
    let config = ServerConfig::from_env().expect("failed to load configuration");
    let cleanup_interval = config
        .cleanup_interval()
        .expect("invalid session cleanup interval");
    tracing::info!("Loaded configuration");

    let databroker = connect_databroker(&config).await;

    // Cleanup expired sessions on startup
    match databroker.delete_expired_sessions(chrono::Utc::now()).await {
        Ok(count) if count > 0 => {
            tracing::info!(
                deleted_sessions = count,
                "Cleaned up expired sessions on startup"
            );
        }
        Ok(_) => {}
        Err(e) => {
            tracing::warn!(error = %e, "Failed to cleanup expired sessions on startup");
        }
    }

    // Spawn periodic session cleanup task
    let cleanup_broker = Arc::clone(&databroker);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(cleanup_interval);
        loop {
            interval.tick().await;
            match cleanup_broker
                .delete_expired_sessions(chrono::Utc::now())
                .await
            {
                Ok(count) if count > 0 => {
                    tracing::debug!(deleted_sessions = count, "Periodic session cleanup");
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to cleanup expired sessions");
                }
            }
        }
    });

    let state = build_state(&config, Arc::clone(&databroker))
        .await
        .expect("failed to build authenticate state");
    let authenticate = Arc::new(Authenticate::new(state));

    // Reload keys, URLs and the identity provider on SIGHUP
    let reload_target = Arc::clone(&authenticate);
    let reload_broker = Arc::clone(&databroker);
    let mut hangup = signal(SignalKind::hangup()).expect("failed to install SIGHUP handler");
    tokio::spawn(async move {
        while hangup.recv().await.is_some() {
            tracing::info!("Reloading configuration");
            let config = match ServerConfig::from_env() {
                Ok(config) => config,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to reload configuration");
                    continue;
                }
            };
            match build_state(&config, Arc::clone(&reload_broker)).await {
                Ok(state) => {
                    reload_target.store(state);
                    tracing::info!("Configuration reloaded");
                }
                Err(e) => {
                    tracing::error!(error = %e, "Rejected reloaded configuration");
                }
            }
        }
    });

    let router = app::router(authenticate);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("failed to bind to address");

    tracing::info!("listening on http://{}", config.bind_addr);

    axum::serve(listener, router.into_make_service())
        .await
        .expect("server error");
}

/// Opens the configured storage backend, running migrations for postgres.
async fn connect_databroker(config: &ServerConfig) -> Arc<dyn DataBroker> {
    match config.databroker.backend {
        DataBrokerBackend::Memory => {
            tracing::warn!("Using in-memory databroker; sessions will not survive a restart");
            Arc::new(InMemoryDataBroker::new())
        }
        DataBrokerBackend::Postgres => {
            let database_url = config
                .database_url()
                .expect("postgres backend needs a database url");

            // Create database connection pool
            let db_pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(database_url)
                .await
                .expect("failed to connect to database");

            // Run migrations
            tracing::info!("Running database migrations...");
            sqlx::migrate!("./migrations")
                .run(&db_pool)
                .await
                .expect("failed to run migrations");

            Arc::new(PgDataBroker::new(db_pool))
        }
    }
}

/// Discovers the provider and derives a fresh snapshot from `config`.
async fn build_state(
    config: &ServerConfig,
    databroker: Arc<dyn DataBroker>,
) -> Result<AuthenticateState, String> {
    tracing::info!("Discovering OIDC provider...");
    let provider = OidcProvider::discover(config.oidc.clone())
        .await
        .map_err(|e| e.to_string())?;
    tracing::info!(
        provider = provider.config().provider_name(),
        issuer = provider.config().issuer_url(),
        "Discovered OIDC provider"
    );

    let directory: Arc<dyn DirectoryClient> =
        match config.directory_refresh_url().map_err(|e| e.to_string())? {
            Some(refresh_url) => Arc::new(HttpDirectoryClient::new(
                reqwest::Client::new(),
                refresh_url,
            )),
            None => Arc::new(DisabledDirectory),
        };

    AuthenticateState::new(
        config,
        Collaborators {
            provider: Arc::new(provider),
            databroker: Some(databroker),
            directory,
        },
    )
    .map_err(|e| e.to_string())
}
