//! Desktop wiring.

use crate::error::{CoreError, Result};
use crate::FileSyncService;
use bridge_desktop::{create_pool, DatabaseConfig, ReqwestHttpClient, SqliteSettingsStore};
use bridge_traits::http::HttpClient;
use core_auth::{
    AuthConfig, HttpTokenRefresher, LoopbackAuthenticator, SessionManager, SqliteCredentialStore,
};
use core_cache::{MetadataCache, SqliteFileCacheRepository};
use core_runtime::config::CoreConfig;
use core_runtime::events::EventBus;
use core_sync::{SyncCoordinator, TaskRunner};
use provider_google_drive::GoogleDriveConnector;
use std::sync::Arc;
use tracing::{info, instrument};

impl FileSyncService {
    /// Build a fully wired service for a desktop host.
    ///
    /// Opens (and migrates) the SQLite database, applies persisted sync
    /// settings, loads the cached listings and binds the task runner to the
    /// current tokio runtime. The session is not restored; call
    /// [`restore_session`](Self::restore_session) next.
    ///
    /// # Errors
    ///
    /// [`CoreError::InitializationFailed`] when called outside a tokio
    /// runtime or when the database or HTTP client cannot be created.
    #[instrument(skip(config))]
    pub async fn bootstrap(config: CoreConfig) -> Result<Self> {
        let runner = TaskRunner::try_current().ok_or_else(|| {
            CoreError::InitializationFailed("bootstrap must run inside a tokio runtime".to_string())
        })?;

        let http_client: Arc<dyn HttpClient> = match config.http_client.clone() {
            Some(client) => client,
            None => Arc::new(
                ReqwestHttpClient::new()
                    .map_err(|e| CoreError::InitializationFailed(e.to_string()))?,
            ),
        };

        let pool = create_pool(DatabaseConfig::new(&config.database_path))
            .await
            .map_err(|e| CoreError::InitializationFailed(e.to_string()))?;

        let settings_store = SqliteSettingsStore::new(pool.clone());
        let settings = config.sync.clone().load_overrides(&settings_store).await?;

        let event_bus = EventBus::default();
        let connector = Arc::new(GoogleDriveConnector::new(Arc::clone(&http_client)));

        let authenticator =
            LoopbackAuthenticator::new(Arc::clone(&http_client)).with_port(config.callback_port);
        let session = Arc::new(SessionManager::new(
            AuthConfig::from(&config),
            Arc::new(SqliteCredentialStore::new(pool.clone())),
            Arc::new(authenticator),
            Arc::new(HttpTokenRefresher::new(Arc::clone(&http_client))),
            connector.clone(),
            event_bus.clone(),
        ));

        let cache = MetadataCache::new().with_repository(Arc::new(SqliteFileCacheRepository::new(pool)));
        let hydrated = cache.hydrate().await?;

        let coordinator = Arc::new(SyncCoordinator::new(
            settings,
            Arc::clone(&session),
            connector,
            Arc::new(cache),
            event_bus.clone(),
        ));

        info!(cached_accounts = hydrated, "File sync core ready");

        Ok(FileSyncService::new(
            session,
            coordinator,
            runner.with_event_bus(event_bus.clone()),
            event_bus,
        ))
    }
}
