//! projectionkit-schema: version table administration
//!
//! Creates or drops the version table of the configured backend.
//!
//! ## Usage
//! ```text
//! projectionkit-schema <provision|deprovision> [config.yaml]
//! ```
//!
//! ## Configuration
//! - PROJECTIONKIT_CONFIG: Path to a YAML config file (optional)
//! - PROJECTIONKIT__STORAGE__TYPE: postgres | sqlite | dynamo
//! - PROJECTIONKIT_LOG: Log filter (default: info)

use tracing::{error, info};

use projectionkit::config::{Config, StorageConfig, StorageType};
use projectionkit::storage::VersionStore;
use projectionkit::utils::bootstrap::init_tracing;

const USAGE: &str = "usage: projectionkit-schema <provision|deprovision> [config.yaml]";

#[derive(Debug, Clone, Copy)]
enum Action {
    Provision,
    Deprovision,
}

impl Action {
    fn parse(arg: &str) -> Option<Self> {
        match arg {
            "provision" => Some(Self::Provision),
            "deprovision" => Some(Self::Deprovision),
            _ => None,
        }
    }
}

async fn run<S: VersionStore>(store: S, action: Action) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        Action::Provision => store.provision().await?,
        Action::Deprovision => store.deprovision().await?,
    }
    Ok(())
}

async fn execute(config: &StorageConfig, action: Action) -> Result<(), Box<dyn std::error::Error>> {
    match config.storage_type {
        #[cfg(feature = "postgres")]
        StorageType::Postgres => {
            let store = projectionkit::storage::PostgresVersionStore::connect(
                &config.postgres.uri,
                config.postgres.max_connections,
            )
            .await?;
            run(store, action).await
        }
        #[cfg(feature = "sqlite")]
        StorageType::Sqlite => {
            let store =
                projectionkit::storage::SqliteVersionStore::connect(&config.sqlite.uri, 1).await?;
            run(store, action).await
        }
        #[cfg(feature = "dynamo")]
        StorageType::Dynamo => {
            let store = projectionkit::storage::DynamoVersionStore::connect(&config.dynamo).await?;
            run(store, action).await
        }
        #[allow(unreachable_patterns)]
        ref other => {
            error!(storage = ?other, "Storage backend not enabled in this build");
            Err(format!("storage backend {other:?} is not enabled").into())
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let mut args = std::env::args().skip(1);
    let action = args
        .next()
        .as_deref()
        .and_then(Action::parse)
        .ok_or(USAGE)?;
    let config_path = args.next();

    let config = Config::load(config_path.as_deref())?;

    info!(action = ?action, storage = ?config.storage.storage_type, "projectionkit-schema started");
    execute(&config.storage, action).await?;
    info!(action = ?action, "Schema action complete");

    Ok(())
}
