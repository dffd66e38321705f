use super::token::TokenSource;
use super::{default_retry_policy, read_json};
use crate::error::{BackendError, IsRetryable};
use backon::Retryable;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use url::Url;

pub const DEFAULT_DATABASE_ID: &str = "(default)";

/// Append path segments to a base URL, percent-encoding each one.
fn with_segments<'a>(
    base: &Url,
    segments: impl IntoIterator<Item = &'a str>,
) -> Result<Url, BackendError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| BackendError::Other(format!("{base} cannot be a base URL")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

async fn authorized_get(
    http: &reqwest::Client,
    tokens: &TokenSource,
    url: &Url,
) -> Result<Value, BackendError> {
    (|| async {
        let token = tokens.token().await?;
        let resp = http
            .get(url.clone())
            .bearer_auth(token)
            .header("Accept", "application/json")
            .send()
            .await?;
        read_json::<Value>(resp).await
    })
    .retry(default_retry_policy())
    .when(|e: &BackendError| e.is_retryable())
    .notify(|err, dur: Duration| {
        warn!(url = %url, "GET retrying after error {}, sleeping {:?}", err, dur);
    })
    .await
}

/// Handle to a project's Cloud Firestore database.
pub struct Firestore {
    project_id: String,
    documents_url: Url,
    http: reqwest::Client,
    tokens: Arc<TokenSource>,
}

impl Firestore {
    pub(crate) fn new(
        project_id: &str,
        base: &Url,
        http: reqwest::Client,
        tokens: Arc<TokenSource>,
    ) -> Result<Self, BackendError> {
        let documents_url = with_segments(
            base,
            ["projects", project_id, "databases", DEFAULT_DATABASE_ID, "documents"],
        )?;
        Ok(Self {
            project_id: project_id.to_string(),
            documents_url,
            http,
            tokens,
        })
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn database_id(&self) -> &str {
        DEFAULT_DATABASE_ID
    }

    /// `.../projects/{p}/databases/(default)/documents`
    pub fn documents_url(&self) -> &Url {
        &self.documents_url
    }

    /// URL of a document given its slash-separated path, e.g. `users/alice`.
    pub fn document_url(&self, path: &str) -> Result<Url, BackendError> {
        with_segments(
            &self.documents_url,
            path.split('/').filter(|s| !s.is_empty()),
        )
    }

    pub async fn bearer_token(&self) -> Result<String, BackendError> {
        self.tokens.token().await
    }

    /// Fetch a document as raw Firestore REST JSON.
    pub async fn get_document(&self, path: &str) -> Result<Value, BackendError> {
        let url = self.document_url(path)?;
        authorized_get(&self.http, &self.tokens, &url).await
    }
}

/// Handle to a Cloud Storage bucket.
pub struct StorageBucket {
    name: String,
    bucket_url: Url,
    http: reqwest::Client,
    tokens: Arc<TokenSource>,
}

impl StorageBucket {
    pub(crate) fn new(
        name: &str,
        base: &Url,
        http: reqwest::Client,
        tokens: Arc<TokenSource>,
    ) -> Result<Self, BackendError> {
        let bucket_url = with_segments(base, ["b", name])?;
        Ok(Self {
            name: name.to_string(),
            bucket_url,
            http,
            tokens,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bucket_url(&self) -> &Url {
        &self.bucket_url
    }

    /// JSON API URL of an object; the whole name is one encoded segment.
    pub fn object_url(&self, object: &str) -> Result<Url, BackendError> {
        with_segments(&self.bucket_url, ["o", object])
    }

    pub async fn bearer_token(&self) -> Result<String, BackendError> {
        self.tokens.token().await
    }

    pub async fn object_metadata(&self, object: &str) -> Result<Value, BackendError> {
        let url = self.object_url(object)?;
        authorized_get(&self.http, &self.tokens, &url).await
    }
}
