use std::process::ExitCode;

use tracing::{error, info};

use skyvault::auth::{MemorySessionCache, SessionManager};
use skyvault::file::{LocalObjectStore, UrlSigner};
use skyvault::{Config, Database};

#[tokio::main]
async fn main() -> ExitCode {
    // Load configuration
    let config = match Config::load_with_env("config.toml") {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config.toml: {e}");
            eprintln!("Using default configuration.");
            let mut config = Config::default();
            config.apply_env_overrides();
            config
        }
    };

    // Initialize logging
    if let Err(e) = skyvault::logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        skyvault::logging::init_console_only(&config.logging.level);
    }

    info!("skyvault maintenance pass");

    match run_maintenance(&config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, category = ?e.category(), "Maintenance pass failed");
            ExitCode::FAILURE
        }
    }
}

async fn run_maintenance(config: &Config) -> skyvault::Result<()> {
    config.validate()?;

    let db = Database::open(&config.database.path).await?;
    let store = LocalObjectStore::new(
        &config.storage.object_root,
        &config.storage.public_base_url,
        UrlSigner::new(&config.storage.signing_secret)?,
        config.storage.upload_url_ttl(),
    )?;
    let cache = MemorySessionCache::new();
    let sessions = SessionManager::from_config(&db, &cache, &config.session);

    skyvault::maintenance::run_pass(&db, &store, &sessions, &config.quota).await?;
    Ok(())
}
