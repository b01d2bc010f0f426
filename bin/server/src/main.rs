use keyward_platform_access::{
    AccountDirectory, LinkingEngine, MembershipVerifier, OutcomeApplier, SessionStore,
};
use keyward_server::{
    app,
    auth::{
        AppState, GitHubClient, GitHubOrgVerifier, GoogleClient, PgAccountDirectory,
        SessionRepository, github, google::GoogleError,
    },
    config::ServerConfig,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env()?;
    tracing::info!("Loaded configuration");

    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;

    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations").run(&db_pool).await?;

    let directory = PgAccountDirectory::new(db_pool.clone());
    let authorized_domains = config.linking.google().authorized_domains();
    let sync = directory.sync_email_domains(&authorized_domains).await?;
    tracing::info!(
        domains = authorized_domains.len(),
        added = sync.added,
        revoked = sync.revoked,
        "Synchronized authorized email domains"
    );

    let sessions: Arc<dyn SessionStore> = Arc::new(SessionRepository::new(db_pool.clone()));
    match sessions.delete_expired().await {
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

    let cleanup_sessions = sessions.clone();
    let cleanup_interval_secs = config.session.cleanup_interval_seconds;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(cleanup_interval_secs));
        loop {
            interval.tick().await;
            match cleanup_sessions.delete_expired().await {
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

    let github_http =
        github::http_client(Duration::from_secs(config.github.request_timeout_seconds))?;
    let github_api_url = config.linking.github().api_url().to_string();
    let verifier: Arc<dyn MembershipVerifier> =
        Arc::new(GitHubOrgVerifier::new(&github_api_url, github_http.clone()));

    let github_client = match GitHubClient::new(&config.github, &github_api_url, github_http) {
        Ok(client) => Some(client),
        Err(github::GitHubError::NotConfigured) => {
            tracing::info!("GitHub sign-in is not configured");
            None
        }
        Err(e) => return Err(e.into()),
    };

    tracing::info!("Discovering Google OpenID Connect provider...");
    let google_client = match GoogleClient::discover(&config.google).await {
        Ok(client) => Some(client),
        Err(GoogleError::NotConfigured) => {
            tracing::info!("Google sign-in is not configured");
            None
        }
        Err(e) => return Err(e.into()),
    };

    if github_client.is_none() && google_client.is_none() {
        tracing::warn!("No sign-in provider is configured");
    }

    let directory: Arc<dyn AccountDirectory> = Arc::new(directory);
    let engine = LinkingEngine::new(&config.linking, directory.clone(), verifier);
    let applier = OutcomeApplier::new(directory.clone(), config.linking.clone());

    let app_state = Arc::new(AppState {
        directory,
        sessions,
        engine,
        applier,
        github: github_client,
        google: google_client,
        linking: config.linking,
        session_config: config.session,
    });

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    tracing::info!("listening on http://{}", config.listen_addr);

    axum::serve(listener, app::router(app_state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutting down");
}
