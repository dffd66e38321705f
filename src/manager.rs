//! Connection manager: one-time initialization and lazily built client handles.
//!
//! Lifecycle: `new` -> `initialize` -> `database` / `storage` -> `cleanup`.
//!
//! # Error behavior
//!
//! - `initialize` never fails loudly: every problem is logged at error level
//!   and returned as an `InitError`, leaving the manager uninitialized.
//! - `database` / `storage` before a successful `initialize` return
//!   `ClientError::NotInitialized` without touching the backend.
//! - Handle construction failures are logged and returned to the caller.
//!
//! # Thread safety
//!
//! Initialization and cleanup take the write side of an async `RwLock`; each
//! handle sits in a `OnceCell`, so concurrent first calls build it once.

use crate::backend::{AppOptions, Backend, InitializedApp};
use crate::config::Config;
use crate::credentials;
use crate::error::{ClientError, InitError};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{OnceCell, RwLock};
use tracing::{debug, error, info, warn};

/// Successful outcome of `ConnectionManager::initialize`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitStatus {
    /// This call set the backend up.
    Initialized,
    /// An earlier call already did; nothing was redone.
    AlreadyInitialized,
}

/// State that exists only while initialized.
struct Session<B: Backend> {
    app: B::App,
    project_id: String,
    storage_bucket: String,
    database: OnceCell<Arc<B::Database>>,
    bucket: OnceCell<Arc<B::Bucket>>,
}

/// Owns the backend app context and the cached database and storage handles.
///
/// Construct one per process (or per test) and share it behind an `Arc`.
pub struct ConnectionManager<B: Backend> {
    backend: B,
    config: Config,
    session: RwLock<Option<Session<B>>>,
}

impl<B: Backend> ConnectionManager<B> {
    pub fn new(backend: B, config: Config) -> Self {
        Self {
            backend,
            config,
            session: RwLock::new(None),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub async fn is_initialized(&self) -> bool {
        self.session.read().await.is_some()
    }

    pub async fn project_id(&self) -> Option<String> {
        self.session
            .read()
            .await
            .as_ref()
            .map(|s| s.project_id.clone())
    }

    pub async fn storage_bucket_name(&self) -> Option<String> {
        self.session
            .read()
            .await
            .as_ref()
            .map(|s| s.storage_bucket.clone())
    }

    /// Resolve credentials and initialize the backend once.
    ///
    /// Credential precedence: `credential_path` (skipped with a warning if it
    /// does not exist), then `FIREBASE_CREDENTIALS_JSON`, then
    /// application-default credentials. Without `FIREBASE_PROJECT_ID` or a
    /// project in the key, the backend settles the project id.
    pub async fn initialize(&self, credential_path: Option<&Path>) -> Result<InitStatus, InitError> {
        let mut session = self.session.write().await;
        if session.is_some() {
            warn!("Firebase already initialized");
            return Ok(InitStatus::AlreadyInitialized);
        }

        match self.start_session(credential_path).await {
            Ok(started) => {
                info!(
                    project_id = %started.project_id,
                    storage_bucket = %started.storage_bucket,
                    "Firebase initialized successfully"
                );
                *session = Some(started);
                Ok(InitStatus::Initialized)
            }
            Err(e) => {
                error!(kind = ?e.kind(), "{e}");
                Err(e)
            }
        }
    }

    async fn start_session(&self, credential_path: Option<&Path>) -> Result<Session<B>, InitError> {
        let resolved =
            credentials::resolve(credential_path, self.config.credentials_json.as_deref())?;

        let options = AppOptions {
            project_id: non_empty(self.config.project_id.as_deref())
                .or_else(|| non_empty(resolved.credential.project_id()))
                .map(str::to_owned),
            storage_bucket: non_empty(self.config.storage_bucket.as_deref()).map(str::to_owned),
        };
        debug!(
            source = %resolved.source,
            project_id = ?options.project_id,
            storage_bucket = ?options.storage_bucket,
            "initializing Firebase app"
        );

        let InitializedApp { app, options } =
            AssertUnwindSafe(self.backend.initialize_app(resolved.credential, options))
                .catch_unwind()
                .await
                .map_err(|panic| InitError::Unexpected(panic_message(&*panic)))??;

        Ok(Session {
            app,
            project_id: options.project_id,
            storage_bucket: options.storage_bucket,
            database: OnceCell::new(),
            bucket: OnceCell::new(),
        })
    }

    /// Firestore handle, built on first use and shared afterwards.
    pub async fn database(&self) -> Result<Arc<B::Database>, ClientError> {
        let guard = self.session.read().await;
        let session = guard.as_ref().ok_or(ClientError::NotInitialized)?;
        session
            .database
            .get_or_try_init(|| async {
                match self.backend.database(&session.app).await {
                    Ok(db) => {
                        debug!(project_id = %session.project_id, "Firestore client created");
                        Ok(Arc::new(db))
                    }
                    Err(e) => {
                        error!("Failed to create Firestore client: {e}");
                        Err(ClientError::Backend {
                            handle: "Firestore",
                            source: e,
                        })
                    }
                }
            })
            .await
            .cloned()
    }

    /// Storage bucket handle, built on first use and shared afterwards.
    pub async fn storage(&self) -> Result<Arc<B::Bucket>, ClientError> {
        let guard = self.session.read().await;
        let session = guard.as_ref().ok_or(ClientError::NotInitialized)?;
        session
            .bucket
            .get_or_try_init(|| async {
                match self.backend.bucket(&session.app).await {
                    Ok(bucket) => {
                        debug!(bucket = %session.storage_bucket, "Storage bucket instance created");
                        Ok(Arc::new(bucket))
                    }
                    Err(e) => {
                        error!("Failed to create storage bucket: {e}");
                        Err(ClientError::Backend {
                            handle: "Storage",
                            source: e,
                        })
                    }
                }
            })
            .await
            .cloned()
    }

    /// Drop cached handles and the app context; a later `initialize` starts fresh.
    ///
    /// Callers still holding a handle keep it; nothing in flight is aborted.
    pub async fn cleanup(&self) {
        let mut guard = self.session.write().await;
        let Some(session) = guard.take() else {
            debug!("cleanup: Firebase not initialized, nothing to release");
            return;
        };
        let Session {
            app,
            project_id,
            database,
            bucket,
            ..
        } = session;
        drop(database);
        drop(bucket);
        self.backend.delete_app(app).await;
        info!(project_id = %project_id, "Firebase resources released");
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "backend panicked".to_string())
}
