//! Core service façade and bootstrap helpers.
//!
//! This crate wires host-provided bridge implementations (HTTP, process
//! execution, clock) and a catalog into the sync engine. Desktop hosts
//! typically enable the `desktop-shims` feature and call
//! [`bootstrap_desktop`], which builds the reqwest HTTP client, the tokio
//! process runner and the SQLite catalog from a [`SyncEngineConfig`].

pub mod error;

pub use error::{CoreError, Result};

pub use core_runtime::config::SyncEngineConfig;
pub use core_sync::{MountScanResult, ProgressCallback, ScanResult, SignedUrlKind, UploadOutcome};

use std::path::Path;
use std::sync::Arc;

use bridge_traits::{Clock, HttpClient, ProcessRunner, RemoteStorage, SystemClock};
use core_library::Catalog;
use core_runtime::events::{CoreEvent, EventBus, Receiver};
use core_sync::{SyncCoordinator, SyncDependencies};
use provider_alist::AlistClient;
use tracing::info;

/// Aggregated handle to all bridge dependencies the core requires.
pub struct CoreDependencies {
    pub process_runner: Arc<dyn ProcessRunner>,
    pub catalog: Arc<dyn Catalog>,
    /// Required when the configuration names a remote.
    pub http_client: Option<Arc<dyn HttpClient>>,
    pub clock: Arc<dyn Clock>,
    pub event_bus: EventBus,
}

impl CoreDependencies {
    /// Construct a dependency bundle with the system clock and a fresh event bus.
    pub fn new(process_runner: Arc<dyn ProcessRunner>, catalog: Arc<dyn Catalog>) -> Self {
        Self {
            process_runner,
            catalog,
            http_client: None,
            clock: Arc::new(SystemClock),
            event_bus: EventBus::default(),
        }
    }

    pub fn with_http_client(mut self, http_client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(http_client);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = event_bus;
        self
    }
}

/// Primary façade exposed to host applications.
#[derive(Clone)]
pub struct CoreService {
    coordinator: Arc<SyncCoordinator>,
}

impl CoreService {
    /// Create a new service from the provided dependencies.
    ///
    /// # Errors
    ///
    /// `CoreError::CapabilityMissing` when a remote is configured but no HTTP
    /// client was supplied.
    pub fn new(config: SyncEngineConfig, deps: CoreDependencies) -> Result<Self> {
        let remote_storage: Option<Arc<dyn RemoteStorage>> = match (&config.remote, deps.http_client)
        {
            (Some(remote), Some(http)) => {
                Some(Arc::new(AlistClient::new(http, remote)) as Arc<dyn RemoteStorage>)
            }
            (Some(_), None) => {
                return Err(CoreError::CapabilityMissing {
                    capability: "HttpClient".to_string(),
                    message: "a remote is configured but no HTTP client was provided".to_string(),
                })
            }
            (None, _) => None,
        };

        let coordinator = SyncCoordinator::new(
            config,
            SyncDependencies {
                catalog: deps.catalog,
                process_runner: deps.process_runner,
                remote_storage,
                clock: deps.clock,
                event_bus: deps.event_bus,
            },
        );

        Ok(Self {
            coordinator: Arc::new(coordinator),
        })
    }

    /// The underlying coordinator.
    pub fn coordinator(&self) -> Arc<SyncCoordinator> {
        Arc::clone(&self.coordinator)
    }

    /// Subscribe to scan and catalog events.
    pub fn subscribe_events(&self) -> Receiver<CoreEvent> {
        self.coordinator.event_bus().subscribe()
    }

    pub async fn scan_local(&self) -> ScanResult {
        self.coordinator.scan_local().await
    }

    pub async fn scan_mounts(&self, directories: Vec<String>) -> Result<MountScanResult> {
        Ok(self.coordinator.scan_mounts(directories).await?)
    }

    pub async fn scan_cloud(&self, on_progress: Option<ProgressCallback>) -> ScanResult {
        self.coordinator.scan_cloud(on_progress).await
    }

    pub async fn signed_url(&self, identifier: &str, kind: SignedUrlKind) -> Option<String> {
        self.coordinator.signed_url(identifier, kind).await
    }

    pub async fn upload(&self, local: &Path, dest: &str) -> Result<UploadOutcome> {
        Ok(self.coordinator.upload(local, dest).await?)
    }
}

/// Convenience bootstrapper for desktop hosts.
///
/// Opens (and migrates) the SQLite catalog at `config.database_path`,
/// creates the image and scratch directories, and wires the desktop bridges.
///
/// ```no_run
/// # async fn example() -> core_service::Result<()> {
/// use core_service::{bootstrap_desktop, SyncEngineConfig};
///
/// let core = bootstrap_desktop(SyncEngineConfig::from_env()?).await?;
/// let result = core.scan_local().await;
/// println!("{} added", result.added_count);
/// # Ok(())
/// # }
/// ```
#[cfg(feature = "desktop-shims")]
pub async fn bootstrap_desktop(config: SyncEngineConfig) -> Result<CoreService> {
    use bridge_desktop::{ReqwestHttpClient, TokioProcessRunner};
    use core_library::db::{create_pool, DatabaseConfig};
    use core_library::SqliteCatalog;

    for dir in [&config.images_dir, &config.temp_dir] {
        core_async::fs::create_dir_all(dir).await.map_err(|e| {
            CoreError::InitializationFailed(format!("Cannot create {}: {}", dir.display(), e))
        })?;
    }

    let pool = create_pool(DatabaseConfig::new(&config.database_path)).await?;
    let mut deps = CoreDependencies::new(
        Arc::new(TokioProcessRunner::new()),
        Arc::new(SqliteCatalog::new(pool)),
    );

    if let Some(remote) = &config.remote {
        let http = ReqwestHttpClient::with_timeout(remote.request_timeout)
            .map_err(|e| CoreError::InitializationFailed(e.to_string()))?;
        deps = deps.with_http_client(Arc::new(http));
    }

    info!(
        database = %config.database_path.display(),
        remote = config.remote.is_some(),
        "Desktop core bootstrapped"
    );
    CoreService::new(config, deps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::process::ProcessOutput;
    use core_library::db::create_test_pool;
    use core_library::SqliteCatalog;
    use core_runtime::config::RemoteConfig;
    use mockall::mock;
    use std::time::Duration;

    mock! {
        pub Runner {}

        #[async_trait]
        impl ProcessRunner for Runner {
            async fn run(
                &self,
                program: &str,
                args: &[String],
                timeout: Duration,
            ) -> bridge_traits::error::Result<ProcessOutput>;
        }
    }

    async fn catalog() -> Arc<dyn Catalog> {
        Arc::new(SqliteCatalog::new(create_test_pool().await.unwrap()))
    }

    #[core_async::test]
    async fn test_remote_without_http_client_is_rejected() {
        let config = SyncEngineConfig::builder()
            .remote(RemoteConfig::new("http://alist.local", "token"))
            .build()
            .unwrap();
        let deps = CoreDependencies::new(Arc::new(MockRunner::new()), catalog().await);

        let err = CoreService::new(config, deps).err().unwrap();
        assert!(matches!(err, CoreError::CapabilityMissing { .. }));
    }

    #[core_async::test]
    async fn test_scan_of_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        let config = SyncEngineConfig::builder()
            .videos_dir(dir.path())
            .images_dir(dir.path().join("images"))
            .build()
            .unwrap();
        let mut runner = MockRunner::new();
        runner.expect_run().never();

        let core = CoreService::new(config, CoreDependencies::new(Arc::new(runner), catalog().await))
            .unwrap();
        let mut events = core.subscribe_events();

        let result = core.scan_local().await;

        assert_eq!(result.total_changes(), 0);
        assert!(result.errors.is_empty());
        assert!(events.try_recv().is_ok());
    }

    #[core_async::test]
    async fn test_invalid_mounts_surface_as_sync_error() {
        let config = SyncEngineConfig::builder().build().unwrap();
        let mut runner = MockRunner::new();
        runner.expect_run().never();
        let core = CoreService::new(config, CoreDependencies::new(Arc::new(runner), catalog().await))
            .unwrap();

        let err = core.scan_mounts(vec!["relative/dir".to_string()]).await.unwrap_err();
        assert!(matches!(
            err,
            CoreError::Sync(core_sync::SyncError::InvalidMountDirectories { .. })
        ));
    }
}
