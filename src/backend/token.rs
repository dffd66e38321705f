use super::{default_retry_policy, read_json};
use crate::config::GOOGLE_TOKEN_URI;
use crate::credentials::ServiceAccountKey;
use crate::error::{BackendError, IsRetryable};
use backon::Retryable;
use chrono::{DateTime, TimeDelta, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use oauth2::{
    ClientId, ClientSecret, RefreshToken, TokenResponse, TokenUrl, basic::BasicClient,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{fmt, fs};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

/// OAuth2 scopes requested for Firebase admin access.
pub const FIREBASE_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/cloud-platform",
    "https://www.googleapis.com/auth/datastore",
    "https://www.googleapis.com/auth/devstorage.read_write",
    "https://www.googleapis.com/auth/firebase",
    "https://www.googleapis.com/auth/userinfo.email",
];

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const JWT_LIFETIME_SECS: i64 = 3600;
/// Upper bound on a server-reported `expires_in`.
const MAX_TOKEN_LIFETIME_SECS: i64 = 86_400;
/// Tokens this close to expiry are refreshed before use.
const EXPIRY_SKEW_SECS: i64 = 60;

/// A bearer token and the instant it stops being valid.
#[derive(Clone)]
pub struct AccessToken {
    pub secret: String,
    pub expires_at: DateTime<Utc>,
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("secret", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl AccessToken {
    fn new(secret: String, expires_in_secs: Option<i64>, now: DateTime<Utc>) -> Self {
        let lifetime = expires_in_secs
            .unwrap_or(JWT_LIFETIME_SECS)
            .clamp(0, MAX_TOKEN_LIFETIME_SECS);
        let expires_at = TimeDelta::try_seconds(lifetime)
            .and_then(|d| now.checked_add_signed(d))
            .unwrap_or(now);
        Self { secret, expires_at }
    }

    pub fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        TimeDelta::try_seconds(EXPIRY_SKEW_SECS)
            .and_then(|skew| self.expires_at.checked_sub_signed(skew))
            .is_some_and(|refresh_at| refresh_at > now)
    }
}

/// `authorized_user` document written by `gcloud auth application-default login`.
#[derive(Clone, Deserialize)]
pub struct AuthorizedUser {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    #[serde(default)]
    pub quota_project_id: Option<String>,
}

/// How an access token is minted.
#[derive(Clone)]
pub enum TokenProvider {
    ServiceAccount(ServiceAccountKey),
    AuthorizedUser(AuthorizedUser),
    MetadataServer { base: Url },
}

impl fmt::Debug for TokenProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind())
    }
}

#[derive(Debug, Serialize)]
struct JwtClaims<'a> {
    iss: &'a str,
    scope: String,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenPayload {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// The gcloud well-known ADC file, when present.
pub fn well_known_adc_file() -> Option<PathBuf> {
    let home = std::env::var_os("HOME")?;
    let path = PathBuf::from(home).join(".config/gcloud/application_default_credentials.json");
    path.is_file().then_some(path)
}

impl TokenProvider {
    /// Application-default discovery: an explicit ADC file, else the metadata server.
    pub fn discover(
        application_credentials: Option<&Path>,
        metadata_url: &Url,
    ) -> Result<Self, BackendError> {
        match application_credentials {
            Some(path) => {
                let contents = fs::read_to_string(path)?;
                let value: Value = serde_json::from_str(&contents)?;
                let provider = Self::from_adc_payload(value)?;
                info!(path = %path.display(), kind = provider.kind(), "application default credentials file");
                Ok(provider)
            }
            None => {
                info!("no credentials file; using compute metadata server");
                Ok(TokenProvider::MetadataServer {
                    base: metadata_url.clone(),
                })
            }
        }
    }

    fn from_adc_payload(value: Value) -> Result<Self, BackendError> {
        match value.get("type").and_then(Value::as_str) {
            Some("service_account") => Ok(TokenProvider::ServiceAccount(serde_json::from_value(
                value,
            )?)),
            Some("authorized_user") => Ok(TokenProvider::AuthorizedUser(serde_json::from_value(
                value,
            )?)),
            other => Err(BackendError::UnsupportedCredential(
                other.unwrap_or("<missing>").to_string(),
            )),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            TokenProvider::ServiceAccount(_) => "service_account",
            TokenProvider::AuthorizedUser(_) => "authorized_user",
            TokenProvider::MetadataServer { .. } => "metadata_server",
        }
    }

    /// Project the credential itself points at. The metadata server is asked
    /// over the network; file-based credentials answer from their contents.
    pub async fn project_id(&self, http: &reqwest::Client) -> Result<Option<String>, BackendError> {
        match self {
            TokenProvider::ServiceAccount(key) => Ok(key.project_id.clone()),
            TokenProvider::AuthorizedUser(user) => Ok(user.quota_project_id.clone()),
            TokenProvider::MetadataServer { base } => {
                let url = base.join("project/project-id")?;
                let resp = http
                    .get(url)
                    .header("Metadata-Flavor", "Google")
                    .send()
                    .await?;
                let status = resp.status();
                if !status.is_success() {
                    let message = resp.text().await.unwrap_or_default();
                    return Err(BackendError::UpstreamStatus { status, message });
                }
                let project = resp.text().await?.trim().to_string();
                Ok(Some(project).filter(|p| !p.is_empty()))
            }
        }
    }

    /// Signed RS256 assertion for the JWT bearer grant.
    fn signed_assertion(key: &ServiceAccountKey, now: DateTime<Utc>) -> Result<String, BackendError> {
        let claims = JwtClaims {
            iss: &key.client_email,
            scope: FIREBASE_SCOPES.join(" "),
            aud: &key.token_uri,
            iat: now.timestamp(),
            exp: now.timestamp() + JWT_LIFETIME_SECS,
        };
        let mut header = Header::new(Algorithm::RS256);
        header.kid = key.private_key_id.clone();
        let signing_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())?;
        Ok(jsonwebtoken::encode(&header, &claims, &signing_key)?)
    }

    async fn fetch(&self, http: &reqwest::Client) -> Result<AccessToken, BackendError> {
        let now = Utc::now();
        match self {
            TokenProvider::ServiceAccount(key) => {
                let assertion = Self::signed_assertion(key, now)?;
                let resp = http
                    .post(key.token_uri.as_str())
                    .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
                    .send()
                    .await?;
                let payload: TokenPayload = read_json(resp).await?;
                Ok(AccessToken::new(payload.access_token, payload.expires_in, now))
            }
            TokenProvider::AuthorizedUser(user) => {
                let client = BasicClient::new(ClientId::new(user.client_id.clone()))
                    .set_client_secret(ClientSecret::new(user.client_secret.clone()))
                    .set_token_uri(TokenUrl::new(GOOGLE_TOKEN_URI.as_str().to_string())?);
                let token = client
                    .exchange_refresh_token(&RefreshToken::new(user.refresh_token.clone()))
                    .request_async(http)
                    .await?;
                let expires_in = token
                    .expires_in()
                    .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX));
                Ok(AccessToken::new(
                    token.access_token().secret().to_string(),
                    expires_in,
                    now,
                ))
            }
            TokenProvider::MetadataServer { base } => {
                let url = base.join("instance/service-accounts/default/token")?;
                let resp = http
                    .get(url)
                    .header("Metadata-Flavor", "Google")
                    .send()
                    .await?;
                let payload: TokenPayload = read_json(resp).await?;
                Ok(AccessToken::new(payload.access_token, payload.expires_in, now))
            }
        }
    }
}

/// Caches the current access token and refreshes it near expiry.
pub struct TokenSource {
    provider: TokenProvider,
    http: reqwest::Client,
    cached: Mutex<Option<AccessToken>>,
}

impl TokenSource {
    pub fn new(provider: TokenProvider, http: reqwest::Client) -> Self {
        Self {
            provider,
            http,
            cached: Mutex::new(None),
        }
    }

    pub fn provider_kind(&self) -> &'static str {
        self.provider.kind()
    }

    /// Current bearer token, minting a new one when the cached token is stale.
    pub async fn token(&self) -> Result<String, BackendError> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh_at(Utc::now())) {
            return Ok(token.secret.clone());
        }

        let fresh = (|| async { self.provider.fetch(&self.http).await })
            .retry(default_retry_policy())
            .when(|e: &BackendError| e.is_retryable())
            .notify(|err, dur: Duration| {
                warn!(
                    kind = self.provider.kind(),
                    "access token request retrying after error {}, sleeping {:?}", err, dur
                );
            })
            .await?;
        debug!(
            kind = self.provider.kind(),
            expires_at = %fresh.expires_at,
            "access token refreshed"
        );
        let secret = fresh.secret.clone();
        *cached = Some(fresh);
        Ok(secret)
    }
}
