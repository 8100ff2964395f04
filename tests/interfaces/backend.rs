//! Backend factory for interface tests.
//!
//! Provides a unified way to create storage backends based on environment configuration.

use std::env;
use std::sync::Arc;
#[cfg(feature = "postgres")]
use std::time::Duration;

use ecopoints::storage::{MemoryStore, Storage};

#[cfg(feature = "sqlite")]
use ecopoints::storage::SqliteStore;

#[cfg(feature = "postgres")]
use ecopoints::storage::PostgresStore;

#[cfg(feature = "postgres")]
use testcontainers::{
    core::{IntoContainerPort, WaitFor},
    runners::AsyncRunner,
    GenericImage, ImageExt,
};

/// Storage backend type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Memory,
    Sqlite,
    Postgres,
}

impl StorageBackend {
    pub fn from_env() -> Self {
        match env::var("STORAGE_BACKEND")
            .unwrap_or_else(|_| "sqlite".to_string())
            .to_lowercase()
            .as_str()
        {
            "memory" => StorageBackend::Memory,
            "postgres" => StorageBackend::Postgres,
            _ => StorageBackend::Sqlite,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            StorageBackend::Memory => "memory",
            StorageBackend::Sqlite => "sqlite",
            StorageBackend::Postgres => "postgres",
        }
    }
}

/// Container handles to keep containers alive during tests.
#[allow(dead_code)]
#[derive(Debug)]
pub enum ContainerHandle {
    None,
    #[cfg(feature = "postgres")]
    Postgres(testcontainers::ContainerAsync<GenericImage>),
}

/// Holds the store handles for a backend.
pub struct StorageContext {
    pub storage: Storage,
    /// Container handle to keep container alive.
    #[allow(dead_code)]
    container: ContainerHandle,
}

impl std::fmt::Debug for StorageContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageContext")
            .field("ledger", &"<dyn LedgerStore>")
            .field("sessions", &"<dyn SessionStore>")
            .field("container", &self.container)
            .finish()
    }
}

impl StorageContext {
    /// Create a storage context for the configured backend.
    pub async fn new(backend: StorageBackend) -> Self {
        match backend {
            StorageBackend::Memory => Self::create_memory(),
            StorageBackend::Sqlite => Self::create_sqlite().await,
            StorageBackend::Postgres => Self::create_postgres().await,
        }
    }

    fn create_memory() -> Self {
        StorageContext {
            storage: Storage::from_store(Arc::new(MemoryStore::new())),
            container: ContainerHandle::None,
        }
    }

    #[cfg(feature = "sqlite")]
    async fn create_sqlite() -> Self {
        let store = SqliteStore::connect(":memory:")
            .await
            .expect("Failed to open SQLite");
        store.init().await.expect("Failed to initialize schema");

        StorageContext {
            storage: Storage::from_store(Arc::new(store)),
            container: ContainerHandle::None,
        }
    }

    #[cfg(not(feature = "sqlite"))]
    async fn create_sqlite() -> Self {
        panic!("SQLite feature not enabled. Build with --features sqlite");
    }

    #[cfg(feature = "postgres")]
    async fn create_postgres() -> Self {
        let image = GenericImage::new("postgres", "16")
            .with_exposed_port(5432.tcp())
            .with_wait_for(WaitFor::message_on_stdout(
                "database system is ready to accept connections",
            ));

        let container = image
            .with_env_var("POSTGRES_USER", "testuser")
            .with_env_var("POSTGRES_PASSWORD", "testpass")
            .with_env_var("POSTGRES_DB", "testdb")
            .with_startup_timeout(Duration::from_secs(60))
            .start()
            .await
            .expect("Failed to start Postgres container");

        // Brief delay for full readiness
        tokio::time::sleep(Duration::from_secs(2)).await;

        let host_port = container
            .get_host_port_ipv4(5432)
            .await
            .expect("Failed to get port");
        let host = container.get_host().await.expect("Failed to get host");

        let connection_string =
            format!("postgres://testuser:testpass@{}:{}/testdb", host, host_port);

        let store = PostgresStore::connect(&connection_string, 5)
            .await
            .expect("Failed to connect to PostgreSQL");
        store.init().await.expect("Failed to initialize schema");

        StorageContext {
            storage: Storage::from_store(Arc::new(store)),
            container: ContainerHandle::Postgres(container),
        }
    }

    #[cfg(not(feature = "postgres"))]
    async fn create_postgres() -> Self {
        panic!("PostgreSQL feature not enabled. Build with --features postgres");
    }
}
