use daybook_storage::{BlobStorage, LocalStorage};
use std::sync::Arc;
use tracing::info;

use crate::admin::AdminService;
use crate::auth::AuthService;
use crate::backup::BackupService;
use crate::config::Config;
use crate::content::ContentService;
use crate::files::FileService;
use crate::imports::ImportLocks;
use crate::migration::MigrationService;
use crate::store::Store;
use crate::workspace::WorkspaceService;
use crate::Result;

/// Every service wired to one store and one blob storage.
pub struct Daybook {
    pub config: Config,
    pub auth: AuthService,
    pub workspace: WorkspaceService,
    pub content: ContentService,
    pub files: FileService,
    pub admin: AdminService,
    pub backup: BackupService,
    pub migration: MigrationService,
}

impl Daybook {
    /// Open the database and uploads directory under `config.storage.data_dir`.
    pub fn open(config: Config) -> Result<Self> {
        std::fs::create_dir_all(config.uploads_dir())?;
        let store = Arc::new(Store::open(config.database_path())?);
        let storage: Arc<dyn BlobStorage> = Arc::new(LocalStorage::new(config.uploads_dir()));
        info!(
            database = %config.database_path().display(),
            storage = storage.backend_name(),
            "Opened daybook"
        );
        Self::with_parts(config, store, storage)
    }

    /// Wire services over an existing store and storage (tests use in-memory ones).
    pub fn with_parts(config: Config, store: Arc<Store>, storage: Arc<dyn BlobStorage>) -> Result<Self> {
        let locks = ImportLocks::new();
        let auth = AuthService::new(store.clone(), config.auth.clone())?;
        let admin = AdminService::new(store.clone(), storage.clone(), auth.passwords().clone());
        Ok(Self {
            workspace: WorkspaceService::new(store.clone(), storage.clone()),
            content: ContentService::new(store.clone()),
            files: FileService::new(store.clone(), storage.clone()),
            backup: BackupService::new(store.clone(), storage.clone(), locks.clone(), config.migration.clone()),
            migration: MigrationService::new(store, storage, locks, config.migration.clone()),
            auth,
            admin,
            config,
        })
    }

    /// Seed or repair the configured admin account when enabled.
    pub async fn bootstrap(&self) -> Result<()> {
        if self.config.admin.seed_enabled {
            self.admin.bootstrap(&self.config.admin).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Role;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_open_and_bootstrap() {
        let temp = TempDir::new().unwrap();
        let mut config = Config::with_data_dir(temp.path());
        config.auth.argon2_memory_kib = 1024;
        config.auth.argon2_iterations = 1;

        let daybook = Daybook::open(config).unwrap();
        assert!(temp.path().join("daybook.db").exists());
        assert!(temp.path().join("uploads").is_dir());

        daybook.bootstrap().await.unwrap();
        let users = daybook.admin.users().await.unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].role, Role::Admin);
    }
}
