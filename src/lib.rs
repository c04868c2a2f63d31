pub mod audit;
pub mod cli;
pub mod config;
pub mod error;
pub mod ipc;
pub mod notify;
pub mod presence;
pub mod storage;
pub mod sync;
pub mod tasks;

// Re-export auth so main.rs can use tasksyncd::auth directly.
pub use ipc::auth;

use std::sync::Arc;

use anyhow::Result;
use audit::AuditLog;
use config::DaemonConfig;
use ipc::auth::{FileTokenVerifier, IdentityVerifier};
use notify::NotificationStore;
use presence::PresenceRegistry;
use storage::Storage;
use sync::SyncCoordinator;
use tasks::TaskStorage;

/// Shared application state passed to every RPC handler and connection task.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<DaemonConfig>,
    pub storage: Arc<Storage>,
    /// Live connection registry — the fan-out half of every broadcast.
    pub presence: Arc<PresenceRegistry>,
    pub notifications: Arc<NotificationStore>,
    pub audit: Arc<AuditLog>,
    /// The only writer path for tasks. Handlers never touch TaskStorage
    /// mutations directly.
    pub coordinator: Arc<SyncCoordinator>,
    /// Credential → user id resolution for the `auth.login` handshake.
    pub verifier: Arc<dyn IdentityVerifier>,
    pub started_at: std::time::Instant,
}

impl AppContext {
    /// Wire up storage and all subsystems from a finished config.
    pub async fn new(config: DaemonConfig) -> Result<Self> {
        let storage = Arc::new(
            Storage::new_with_slow_query(
                &config.data_dir,
                config.observability.slow_query_threshold_ms,
            )
            .await?,
        );
        let pool = storage.pool();

        let presence = Arc::new(PresenceRegistry::new());
        let tasks = TaskStorage::new(pool.clone());
        let audit = AuditLog::new(pool.clone());
        let notifications = NotificationStore::new(pool, presence.clone());
        let coordinator = Arc::new(SyncCoordinator::new(
            storage.as_ref().clone(),
            tasks,
            audit.clone(),
            notifications.clone(),
            presence.clone(),
        ));
        let verifier: Arc<dyn IdentityVerifier> =
            Arc::new(FileTokenVerifier::new(&config.data_dir));

        Ok(Self {
            config: Arc::new(config),
            storage,
            presence,
            notifications: Arc::new(notifications),
            audit: Arc::new(audit),
            coordinator,
            verifier,
            started_at: std::time::Instant::now(),
        })
    }
}
