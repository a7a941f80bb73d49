use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::application::{EntityListingService, EntityStreamService, SessionCoordinator};
use crate::domain::error::{AppError, Result};
use crate::infrastructure::config::CoreConfig;
use crate::infrastructure::db::{
    NormalizedEntityRepository, ProjectRepository, ServiceDb, SessionRepository,
    SqliteShardOpener,
};
use crate::infrastructure::logging::init_tracing;

/// Everything the core needs, wired over one service store.
pub struct CoreServices {
    pub config: CoreConfig,
    pub db: Arc<ServiceDb>,
    pub coordinator: Arc<SessionCoordinator>,
    pub stream: Arc<EntityStreamService>,
    pub listing: Arc<EntityListingService>,
}

impl CoreServices {
    pub async fn init(config: CoreConfig) -> Result<Self> {
        let db = Arc::new(ServiceDb::connect(&config.database).await?);
        let pool = db.pool().clone();

        let coordinator = Arc::new(SessionCoordinator::new(
            Arc::new(SessionRepository::new(pool.clone())),
            config.sessions.clone(),
        ));
        let stream = Arc::new(EntityStreamService::new(
            Arc::new(ProjectRepository::new(pool.clone())),
            Arc::new(NormalizedEntityRepository::new(pool)),
            Arc::new(SqliteShardOpener::new(
                config.stream.catalog_names.clone(),
                config.database.busy_timeout(),
            )),
            config.stream.clone(),
        ));
        let listing = Arc::new(EntityListingService::new(stream.clone()));

        Ok(Self {
            config,
            db,
            coordinator,
            stream,
            listing,
        })
    }
}

/// Runs the periodic session reaper until Ctrl-C.
pub async fn run_reaper(config_file: Option<&Path>) -> Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing("info");

    let config = CoreConfig::load(config_file)?;
    let services = CoreServices::init(config).await?;

    let cancel = CancellationToken::new();
    let interval = services.config.sessions.reaper_interval();
    let reaper = services
        .coordinator
        .clone()
        .spawn_reaper(interval, cancel.clone());

    info!(db = %services.config.database.path.display(), "Reaper running, press Ctrl-C to stop");
    let signal = tokio::signal::ctrl_c().await;
    cancel.cancel();
    if let Err(err) = reaper.await {
        error!(error = %err, "Reaper task ended abnormally");
    }
    signal.map_err(|e| AppError::IoError(format!("Failed to listen for Ctrl-C: {e}")))
}
