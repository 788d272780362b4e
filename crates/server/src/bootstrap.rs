use std::sync::Arc;
use std::time::Duration;

use mendflow_core::config::{AppConfig, ConfigError, LoadOptions};
use mendflow_core::domain::attachment::PrefixUrlResolver;
use mendflow_db::repositories::{
    NotificationStore, SqlAttachmentStore, SqlEstimateStore, SqlNotificationStore, SqlRequestStore,
    SqlUserStore,
};
use mendflow_db::{connect_with_settings, migrations, DbPool};
use mendflow_engine::WorkflowService;
use mendflow_notify::{NoopTransport, PushRelay, PushTransport, WebhookTransport};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub service: Arc<WorkflowService>,
    pub relay: PushRelay,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", "starting application bootstrap");

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(event_name = "system.bootstrap.database_connected", "database connection established");

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(event_name = "system.bootstrap.migrations_applied", "database migrations applied");

    let notifications: Arc<dyn NotificationStore> =
        Arc::new(SqlNotificationStore::new(db_pool.clone()));

    let service = Arc::new(WorkflowService::new(
        Arc::new(SqlRequestStore::new(db_pool.clone())),
        Arc::new(SqlEstimateStore::new(db_pool.clone())),
        Arc::new(SqlAttachmentStore::new(db_pool.clone())),
        Arc::clone(&notifications),
        Arc::new(SqlUserStore::new(db_pool.clone())),
        Arc::new(PrefixUrlResolver::new(config.attachments.public_base_url.clone())),
    ));

    // Config validation guarantees a webhook url whenever push is enabled.
    let transport: Arc<dyn PushTransport> = match config.push.webhook_url.as_ref() {
        Some(url) if config.push.enabled => {
            Arc::new(WebhookTransport::new(url.clone(), config.push.auth_token.clone()))
        }
        _ => Arc::new(NoopTransport),
    };

    let relay = PushRelay::new(
        notifications,
        transport,
        Duration::from_secs(config.push.poll_interval_secs),
        config.push.batch_size,
    );

    Ok(Application { config, db_pool, service, relay })
}
