//! Core service façade and bootstrap helpers.
//!
//! [`FileSyncService`] is the single entry point a presentation layer talks
//! to. Every operation exists twice: as an `async fn` for callers already on
//! the runtime, and as a `spawn_*` variant that runs on the [`TaskRunner`]
//! and hands back a [`TaskHandle`] so an interactive thread never blocks on
//! network or disk I/O.
//!
//! Desktop apps enable the `desktop-shims` feature (the default) and call
//! [`FileSyncService::bootstrap`], which wires SQLite storage, the reqwest
//! HTTP client, the Google Drive connector and the loopback sign-in.

pub mod error;

#[cfg(feature = "desktop-shims")]
mod bootstrap;

pub use error::{CoreError, Result};

pub use core_auth::AuthOutcome;
pub use core_cache::FileRecord;
pub use core_runtime::config::CoreConfig;
pub use core_runtime::events::{EventSeverity, EventStream};
pub use core_sync::{ProgressReporter, TaskError, TaskEvent, TaskHandle, TaskRunner};

use core_auth::SessionManager;
use core_runtime::events::{CoreEvent, EventBus};
use core_sync::SyncCoordinator;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast::Receiver;

/// Primary façade exposed to host applications.
#[derive(Clone)]
pub struct FileSyncService {
    session: Arc<SessionManager>,
    coordinator: Arc<SyncCoordinator>,
    runner: TaskRunner,
    event_bus: EventBus,
}

impl FileSyncService {
    pub fn new(
        session: Arc<SessionManager>,
        coordinator: Arc<SyncCoordinator>,
        runner: TaskRunner,
        event_bus: EventBus,
    ) -> Self {
        Self {
            session,
            coordinator,
            runner,
            event_bus,
        }
    }

    /// Subscribe to auth, sync and task events.
    pub fn events(&self) -> Receiver<CoreEvent> {
        self.event_bus.subscribe()
    }

    /// Subscribe to events at `min_severity` or above, e.g.
    /// [`EventSeverity::Error`] for a host that only surfaces failures.
    pub fn event_stream(&self, min_severity: EventSeverity) -> EventStream {
        EventStream::at_least(self.event_bus.subscribe(), min_severity)
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    pub fn coordinator(&self) -> &Arc<SyncCoordinator> {
        &self.coordinator
    }

    pub fn runner(&self) -> &TaskRunner {
        &self.runner
    }

    // ------------------------------------------------------------------
    // Session
    // ------------------------------------------------------------------

    pub async fn restore_session(&self) -> Result<bool> {
        Ok(self.session.restore_session().await?)
    }

    pub async fn authenticate(&self) -> Result<AuthOutcome> {
        Ok(self.session.authenticate().await?)
    }

    /// Returns `false` when the logout could not be persisted; the session
    /// is closed in memory either way.
    pub async fn logout(&self) -> bool {
        self.session.logout().await
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_authenticated()
    }

    pub fn current_user(&self) -> Option<String> {
        self.session.current_user()
    }

    // ------------------------------------------------------------------
    // Files
    // ------------------------------------------------------------------

    pub async fn list_files(&self, page_size: Option<u32>, use_cache: bool) -> Result<Vec<FileRecord>> {
        Ok(self.coordinator.list_files(page_size, use_cache).await?)
    }

    pub async fn upload_file(&self, path: &Path, remote_name: Option<&str>) -> Result<String> {
        Ok(self.coordinator.upload_file(path, remote_name).await?)
    }

    pub async fn download_file(
        &self,
        file_id: &str,
        file_name: &str,
        dest_dir: &Path,
        progress: &(dyn Fn(u8) + Send + Sync),
    ) -> Result<PathBuf> {
        Ok(self
            .coordinator
            .download_file(file_id, file_name, dest_dir, progress)
            .await?)
    }

    pub async fn invalidate_cache(&self) -> Result<()> {
        Ok(self.coordinator.invalidate_cache().await?)
    }

    // ------------------------------------------------------------------
    // Background variants
    // ------------------------------------------------------------------

    pub fn spawn_restore_session(&self) -> TaskHandle<bool> {
        let session = Arc::clone(&self.session);
        self.runner.submit_named("restore_session", move |_| async move {
            session.restore_session().await.map_err(CoreError::from)
        })
    }

    pub fn spawn_authenticate(&self) -> TaskHandle<AuthOutcome> {
        let session = Arc::clone(&self.session);
        self.runner.submit_named("authenticate", move |_| async move {
            session.authenticate().await.map_err(CoreError::from)
        })
    }

    pub fn spawn_logout(&self) -> TaskHandle<bool> {
        let session = Arc::clone(&self.session);
        self.runner.submit_named("logout", move |_| async move {
            Ok::<_, CoreError>(session.logout().await)
        })
    }

    pub fn spawn_is_authenticated(&self) -> TaskHandle<bool> {
        let session = Arc::clone(&self.session);
        self.runner.submit_named("is_authenticated", move |_| async move {
            Ok::<_, CoreError>(session.is_authenticated())
        })
    }

    pub fn spawn_current_user(&self) -> TaskHandle<Option<String>> {
        let session = Arc::clone(&self.session);
        self.runner.submit_named("current_user", move |_| async move {
            Ok::<_, CoreError>(session.current_user())
        })
    }

    pub fn spawn_list_files(&self, page_size: Option<u32>, use_cache: bool) -> TaskHandle<Vec<FileRecord>> {
        let coordinator = Arc::clone(&self.coordinator);
        self.runner.submit_named("list_files", move |_| async move {
            coordinator
                .list_files(page_size, use_cache)
                .await
                .map_err(CoreError::from)
        })
    }

    pub fn spawn_upload_file(&self, path: PathBuf, remote_name: Option<String>) -> TaskHandle<String> {
        let coordinator = Arc::clone(&self.coordinator);
        self.runner.submit_named("upload_file", move |_| async move {
            coordinator
                .upload_file(&path, remote_name.as_deref())
                .await
                .map_err(CoreError::from)
        })
    }

    /// Progress arrives as [`TaskEvent::Progress`] on the returned handle.
    pub fn spawn_download_file(
        &self,
        file_id: String,
        file_name: String,
        dest_dir: PathBuf,
    ) -> TaskHandle<PathBuf> {
        let coordinator = Arc::clone(&self.coordinator);
        self.runner.submit_named("download_file", move |progress| async move {
            coordinator
                .download_file(&file_id, &file_name, &dest_dir, &|percent| {
                    progress.report(percent)
                })
                .await
                .map_err(CoreError::from)
        })
    }

    pub fn spawn_invalidate_cache(&self) -> TaskHandle<()> {
        let coordinator = Arc::clone(&self.coordinator);
        self.runner.submit_named("invalidate_cache", move |_| async move {
            coordinator.invalidate_cache().await.map_err(CoreError::from)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::storage::{
        AccountInfoProvider, MediaChunk, NewRemoteFile, RemoteFile, StorageProvider,
    };
    use core_auth::{
        AuthConfig, Authenticator, ClientSecrets, Credential, CredentialStore, SessionRecord,
        TokenRefresher,
    };
    use core_cache::MetadataCache;
    use core_runtime::config::SyncSettings;
    use mockall::mock;

    mock! {
        Store {}

        #[async_trait]
        impl CredentialStore for Store {
            async fn save_session(&self, account: &str, credential: &Credential) -> core_auth::Result<()>;
            async fn active_session(&self) -> core_auth::Result<Option<SessionRecord>>;
            async fn deactivate(&self, account: &str) -> core_auth::Result<()>;
            async fn list_sessions(&self) -> core_auth::Result<Vec<SessionRecord>>;
        }
    }

    mock! {
        Auth {}

        #[async_trait]
        impl Authenticator for Auth {
            async fn authorize(&self, secrets: &ClientSecrets, scopes: &[String]) -> core_auth::Result<Credential>;
        }
    }

    mock! {
        Refresher {}

        #[async_trait]
        impl TokenRefresher for Refresher {
            async fn refresh(&self, credential: &Credential) -> core_auth::Result<Credential>;
        }
    }

    mock! {
        Drive {}

        #[async_trait]
        impl StorageProvider for Drive {
            async fn list_files(&self, access_token: &str, page_size: u32) -> BridgeResult<Vec<RemoteFile>>;
            async fn get_metadata(&self, access_token: &str, file_id: &str) -> BridgeResult<RemoteFile>;
            async fn download_chunk(
                &self,
                access_token: &str,
                file_id: &str,
                offset: u64,
                length: u64,
            ) -> BridgeResult<MediaChunk>;
            async fn create_file(&self, access_token: &str, file: NewRemoteFile) -> BridgeResult<RemoteFile>;
        }

        #[async_trait]
        impl AccountInfoProvider for Drive {
            async fn current_account(&self, access_token: &str) -> BridgeResult<String>;
        }
    }

    fn service(store: MockStore, drive: MockDrive) -> FileSyncService {
        let event_bus = EventBus::default();
        let drive = Arc::new(drive);
        let session = Arc::new(SessionManager::new(
            AuthConfig::new("missing-credentials.json"),
            Arc::new(store),
            Arc::new(MockAuth::new()),
            Arc::new(MockRefresher::new()),
            drive.clone(),
            event_bus.clone(),
        ));
        let coordinator = Arc::new(SyncCoordinator::new(
            SyncSettings::default(),
            Arc::clone(&session),
            drive,
            Arc::new(MetadataCache::new()),
            event_bus.clone(),
        ));
        let runner = TaskRunner::try_current()
            .unwrap()
            .with_event_bus(event_bus.clone());

        FileSyncService::new(session, coordinator, runner, event_bus)
    }

    #[tokio::test]
    async fn test_spawned_listing_without_session_fails_once() {
        let mut drive = MockDrive::new();
        drive.expect_list_files().never();

        let service = service(MockStore::new(), drive);
        let mut handle = service.spawn_list_files(None, true);

        match handle.next_event().await {
            Some(TaskEvent::Failed(message)) => assert!(message.contains("Not authenticated")),
            other => panic!("unexpected event: {:?}", other),
        }
        assert_eq!(handle.next_event().await, None);
    }

    #[tokio::test]
    async fn test_spawned_restore_without_persisted_session() {
        let mut store = MockStore::new();
        store.expect_active_session().times(1).returning(|| Ok(None));

        let service = service(store, MockDrive::new());
        assert_eq!(service.spawn_restore_session().wait().await, Ok(false));
        assert_eq!(service.spawn_is_authenticated().wait().await, Ok(false));
        assert_eq!(service.spawn_current_user().wait().await, Ok(None));
    }

    #[tokio::test]
    async fn test_spawned_logout_is_idempotent() {
        let service = service(MockStore::new(), MockDrive::new());

        assert_eq!(service.spawn_logout().wait().await, Ok(true));
        assert_eq!(service.spawn_logout().wait().await, Ok(true));
    }

    #[tokio::test]
    async fn test_error_stream_skips_routine_events() {
        let service = service(MockStore::new(), MockDrive::new());
        let mut failures = service.event_stream(EventSeverity::Error);

        let _ = service.authenticate().await;

        match failures.recv().await.unwrap() {
            CoreEvent::Auth(core_runtime::events::AuthEvent::AuthError { message, .. }) => {
                assert!(!message.is_empty())
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_authenticate_without_client_secrets_is_configuration_error() {
        let service = service(MockStore::new(), MockDrive::new());

        let error = service.authenticate().await.unwrap_err();
        assert!(matches!(
            error,
            CoreError::Auth(core_auth::AuthError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_upload_without_session_requires_sign_in() {
        let mut drive = MockDrive::new();
        drive.expect_create_file().never();

        let service = service(MockStore::new(), drive);
        let error = service
            .upload_file(Path::new("/tmp/whatever.txt"), None)
            .await
            .unwrap_err();

        assert!(error.requires_sign_in());
    }
}
