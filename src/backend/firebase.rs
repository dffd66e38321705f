use super::clients::{Firestore, StorageBucket};
use super::token::{TokenProvider, TokenSource, well_known_adc_file};
use super::{AppOptions, Backend, InitializedApp, ResolvedAppOptions};
use crate::config::Config;
use crate::credentials::Credential;
use crate::error::BackendError;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Live app context produced by `FirebaseBackend::initialize_app`.
pub struct FirebaseApp {
    options: ResolvedAppOptions,
    tokens: Arc<TokenSource>,
}

impl FirebaseApp {
    pub fn options(&self) -> &ResolvedAppOptions {
        &self.options
    }
}

/// Backend speaking the Google REST APIs directly.
pub struct FirebaseBackend {
    http: reqwest::Client,
    config: Config,
}

impl FirebaseBackend {
    /// Build the backend with a preconfigured HTTP client.
    pub fn new(config: &Config) -> Result<Self, BackendError> {
        let mut builder = reqwest::Client::builder()
            .user_agent(concat!("firebase-bootstrap/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs));
        if let Some(proxy_url) = config.proxy.as_ref() {
            builder = builder.proxy(reqwest::Proxy::all(proxy_url.as_str())?);
        }
        let http = builder.build()?;
        Ok(Self {
            http,
            config: config.clone(),
        })
    }

    fn token_provider(&self, credential: Credential) -> Result<TokenProvider, BackendError> {
        match credential {
            Credential::ServiceAccount(key) => Ok(TokenProvider::ServiceAccount(key)),
            Credential::ApplicationDefault => {
                let adc_file = self
                    .config
                    .application_credentials
                    .clone()
                    .or_else(well_known_adc_file);
                TokenProvider::discover(adc_file.as_deref(), &self.config.metadata_url)
            }
        }
    }

    /// Project for callers that named none: `GOOGLE_CLOUD_PROJECT` /
    /// `GCLOUD_PROJECT`, then the credential, then the metadata server.
    async fn ambient_project(
        &self,
        provider: &TokenProvider,
    ) -> Result<Option<String>, BackendError> {
        if let Some(project) = self
            .config
            .cloud_project
            .as_ref()
            .filter(|p| !p.trim().is_empty())
        {
            debug!(project_id = %project, "project id from environment");
            return Ok(Some(project.clone()));
        }
        let project = provider.project_id(&self.http).await?;
        if let Some(project) = project.as_ref() {
            debug!(project_id = %project, credential = provider.kind(), "project id from credentials");
        }
        Ok(project)
    }
}

#[async_trait]
impl Backend for FirebaseBackend {
    type App = FirebaseApp;
    type Database = Firestore;
    type Bucket = StorageBucket;

    async fn initialize_app(
        &self,
        credential: Credential,
        options: AppOptions,
    ) -> Result<InitializedApp<FirebaseApp>, BackendError> {
        let provider = self.token_provider(credential)?;
        let ambient = match options.project_id.as_ref().filter(|p| !p.trim().is_empty()) {
            Some(_) => None,
            None => self.ambient_project(&provider).await?,
        };
        let options = options.resolve(ambient)?;
        let tokens = Arc::new(TokenSource::new(provider, self.http.clone()));

        // First token doubles as the credential check.
        tokens.token().await?;
        info!(
            project_id = %options.project_id,
            storage_bucket = %options.storage_bucket,
            credential = tokens.provider_kind(),
            "Firebase app context created"
        );
        Ok(InitializedApp {
            app: FirebaseApp {
                options: options.clone(),
                tokens,
            },
            options,
        })
    }

    async fn database(&self, app: &FirebaseApp) -> Result<Firestore, BackendError> {
        Firestore::new(
            &app.options.project_id,
            &self.config.firestore_url,
            self.http.clone(),
            app.tokens.clone(),
        )
    }

    async fn bucket(&self, app: &FirebaseApp) -> Result<StorageBucket, BackendError> {
        StorageBucket::new(
            &app.options.storage_bucket,
            &self.config.storage_url,
            self.http.clone(),
            app.tokens.clone(),
        )
    }

    async fn delete_app(&self, app: FirebaseApp) {
        debug!(project_id = %app.options.project_id, "Firebase app context deleted");
    }
}
