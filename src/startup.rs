//! Startup composition: settings → pool → application state → metrics.

use std::future::Future;
use std::sync::Arc;

use thiserror::Error;
use tokio::runtime::Handle;
use tracing::{info, info_span};

use crate::config::{ConfigError, Database, DatabaseSettings, PoolError, Resolution, Settings};
use crate::constants::VERSION;
use crate::metrics::{self, Registry, RegistryError};
use crate::models::Models;
use crate::services::mailer::{MailError, Mailer};
use crate::state::AppState;

/// Failures that abort startup.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error("mailer setup failed: {0}")]
    Mailer(#[from] MailError),

    #[error("metrics registration failed: {0}")]
    Metrics(#[from] RegistryError),
}

/// Everything the serve loop needs.
pub struct Application {
    pub state: AppState,
    pub metrics: Arc<Registry>,
}

pub enum Launch {
    /// Print [`VERSION`] and exit without touching any resource.
    Version,
    Serve(Application),
}

/// Turns a resolution into a running application, opening the pool with
/// `open`.
pub async fn launch<O, Fut>(resolution: Resolution, open: O) -> Result<Launch, StartupError>
where
    O: FnOnce(DatabaseSettings) -> Fut,
    Fut: Future<Output = Result<Database, PoolError>>,
{
    match resolution {
        Resolution::Version => Ok(Launch::Version),
        Resolution::Run(settings) => {
            let db = open(settings.db.clone()).await?;
            info!("database connection pool established");
            build(settings, db).map(Launch::Serve)
        }
    }
}

/// Composes the application around an already opened pool.
///
/// Must run inside a Tokio runtime; the `tasks` metric reads its handle.
pub fn build(settings: Settings, db: Database) -> Result<Application, StartupError> {
    let mailer = Mailer::new(&settings.smtp)?;

    let registry = Registry::new();
    metrics::register_defaults(&registry, &db, Handle::current())?;

    let logger = info_span!("app", env = %settings.env, version = VERSION);
    let state = AppState::new(settings, logger, Models::new(db), mailer);

    Ok(Application {
        state,
        metrics: Arc::new(registry),
    })
}
