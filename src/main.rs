use firebase_bootstrap::{Config, ConnectionManager, FirebaseBackend};
use mimalloc::MiMalloc;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let cfg = Config::load()?;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cfg.loglevel.clone()));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_level(true)
                .with_target(false),
        )
        .init();

    // Command-line path first, then FIREBASE_CREDENTIAL_PATH.
    let credential_path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .or_else(|| cfg.credential_path.clone());

    info!(
        project_id = %cfg.project_id.as_deref().unwrap_or("<unset>"),
        credential_path = %credential_path.as_ref().map(|p| p.display().to_string()).unwrap_or_else(|| "<none>".to_string()),
        inline_credentials = cfg.credentials_json.is_some(),
        proxy = %cfg.proxy.as_ref().map(|u| u.as_str()).unwrap_or("<none>"),
        loglevel = %cfg.loglevel
    );

    let backend = FirebaseBackend::new(&cfg)?;
    let manager = Arc::new(ConnectionManager::new(backend, cfg));

    if let Err(e) = manager.initialize(credential_path.as_deref()).await {
        warn!(kind = ?e.kind(), "Firebase is not ready");
        return Err(e.into());
    }

    let db = manager.database().await?;
    info!(documents_url = %db.documents_url(), "Firestore client ready");

    let bucket = manager.storage().await?;
    info!(bucket = %bucket.name(), url = %bucket.bucket_url(), "Storage bucket ready");

    manager.cleanup().await;
    Ok(())
}
