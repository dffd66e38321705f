//! The seam between the connection manager and the Firebase services.
//!
//! Layout:
//! - `firebase.rs`: production backend talking to Google REST endpoints
//! - `token.rs`: OAuth2 access-token sources (service account, ADC, metadata server)
//! - `clients.rs`: the Firestore and Cloud Storage handles

pub mod clients;
pub mod firebase;
pub mod token;

pub use clients::{Firestore, StorageBucket};
pub use firebase::{FirebaseApp, FirebaseBackend};

use crate::credentials::Credential;
use crate::error::BackendError;
use async_trait::async_trait;
use backon::ExponentialBuilder;
use serde::de::DeserializeOwned;
use std::time::Duration;

pub const DEFAULT_BUCKET_SUFFIX: &str = "appspot.com";

/// Default storage bucket for a project: `{project_id}.appspot.com`.
pub fn storage_bucket_for(project_id: &str) -> String {
    format!("{project_id}.{DEFAULT_BUCKET_SUFFIX}")
}

/// Options passed to `Backend::initialize_app`. Unset fields are filled in by
/// the backend from the ambient environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppOptions {
    pub project_id: Option<String>,
    pub storage_bucket: Option<String>,
}

/// Options an app context was actually created with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAppOptions {
    pub project_id: String,
    pub storage_bucket: String,
}

impl AppOptions {
    pub fn for_project(project_id: impl Into<String>) -> Self {
        Self {
            project_id: Some(project_id.into()),
            storage_bucket: None,
        }
    }

    /// Fill the project id from `ambient_project` when unset and derive the
    /// bucket from it when no bucket was given.
    pub fn resolve(
        self,
        ambient_project: Option<String>,
    ) -> Result<ResolvedAppOptions, BackendError> {
        let project_id = non_blank(self.project_id)
            .or_else(|| non_blank(ambient_project))
            .ok_or(BackendError::MissingProjectId)?;
        let storage_bucket =
            non_blank(self.storage_bucket).unwrap_or_else(|| storage_bucket_for(&project_id));
        Ok(ResolvedAppOptions {
            project_id,
            storage_bucket,
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// An app context plus the options the backend settled on.
pub struct InitializedApp<A> {
    pub app: A,
    pub options: ResolvedAppOptions,
}

/// A Firebase SDK: creates an app context and builds client handles from it.
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    type App: Send + Sync + 'static;
    type Database: Send + Sync + 'static;
    type Bucket: Send + Sync + 'static;

    async fn initialize_app(
        &self,
        credential: Credential,
        options: AppOptions,
    ) -> Result<InitializedApp<Self::App>, BackendError>;

    async fn database(&self, app: &Self::App) -> Result<Self::Database, BackendError>;

    async fn bucket(&self, app: &Self::App) -> Result<Self::Bucket, BackendError>;

    /// Release an app context. Handles already given out stay usable.
    async fn delete_app(&self, _app: Self::App) {}
}

pub(crate) fn default_retry_policy() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_secs(1))
        .with_max_delay(Duration::from_secs(3))
        .with_max_times(3)
        .with_jitter()
}

/// Decode a JSON body, turning non-2xx responses into `UpstreamStatus`.
pub(crate) async fn read_json<T: DeserializeOwned>(
    resp: reqwest::Response,
) -> Result<T, BackendError> {
    let status = resp.status();
    if !status.is_success() {
        let message = resp.text().await.unwrap_or_default();
        return Err(BackendError::UpstreamStatus { status, message });
    }
    Ok(resp.json::<T>().await?)
}
