use oauth2::basic::BasicErrorResponseType;
use oauth2::reqwest::Error as ReqwestClientError;
use oauth2::{HttpClientError, RequestTokenError, StandardErrorResponse};
use reqwest::StatusCode;
use std::path::PathBuf;
use thiserror::Error as ThisError;

/// The four ways initialization can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitErrorKind {
    /// A referenced credential file does not exist.
    ConfigurationMissing,
    /// Credential material is present but malformed.
    ConfigurationInvalid,
    /// The backend refused to initialize (auth, network, quota).
    BackendRejected,
    /// Anything else.
    Unexpected,
}

/// Failure of `ConnectionManager::initialize`. Always returned, never raised.
#[derive(Debug, ThisError)]
pub enum InitError {
    #[error("Credential file not found: {}", path.display())]
    CredentialFileNotFound { path: PathBuf },

    #[error("Invalid Firebase credentials: {0}")]
    InvalidCredentials(String),

    #[error("Invalid Firebase credentials JSON: {0}")]
    CredentialsJson(#[from] serde_json::Error),

    #[error(
        "Missing project id: set FIREBASE_PROJECT_ID or GOOGLE_CLOUD_PROJECT, or use credentials that carry one"
    )]
    MissingProjectId,

    #[error("Firebase initialization error: {0}")]
    Backend(BackendError),

    #[error("Unexpected initialization error: {0}")]
    Unexpected(String),
}

impl InitError {
    pub fn kind(&self) -> InitErrorKind {
        match self {
            InitError::CredentialFileNotFound { .. } => InitErrorKind::ConfigurationMissing,
            InitError::InvalidCredentials(_)
            | InitError::CredentialsJson(_)
            | InitError::MissingProjectId => InitErrorKind::ConfigurationInvalid,
            InitError::Backend(_) => InitErrorKind::BackendRejected,
            InitError::Unexpected(_) => InitErrorKind::Unexpected,
        }
    }
}

impl From<BackendError> for InitError {
    fn from(e: BackendError) -> Self {
        match e {
            BackendError::MissingProjectId => InitError::MissingProjectId,
            other => InitError::Backend(other),
        }
    }
}

/// Failure of a handle accessor. Propagated to the caller.
#[derive(Debug, ThisError)]
pub enum ClientError {
    #[error("Firebase not initialized. Call initialize() first.")]
    NotInitialized,

    #[error("Failed to create {handle} client: {source}")]
    Backend {
        handle: &'static str,
        #[source]
        source: BackendError,
    },
}

/// Errors raised by a `Backend` implementation.
#[derive(Debug, ThisError)]
pub enum BackendError {
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("HTTP request error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JWT signing error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("OAuth2 token request error: {0}")]
    Oauth2Token(String),

    #[error("OAuth2 server error: {error}")]
    Oauth2Server { error: String },

    #[error("Upstream error with status {status}: {message}")]
    UpstreamStatus { status: StatusCode, message: String },

    #[error("No project id in options, environment or credentials")]
    MissingProjectId,

    #[error("Unsupported credential type: {0}")]
    UnsupportedCredential(String),

    #[error("Backend error: {0}")]
    Other(String),
}

pub trait IsRetryable {
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for BackendError {
    fn is_retryable(&self) -> bool {
        match self {
            BackendError::Reqwest(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.status().is_some_and(|s| s.is_server_error())
            }
            BackendError::Oauth2Token(_) => true,
            BackendError::UpstreamStatus { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            _ => false,
        }
    }
}

impl
    From<
        RequestTokenError<
            HttpClientError<ReqwestClientError>,
            StandardErrorResponse<BasicErrorResponseType>,
        >,
    > for BackendError
{
    fn from(
        e: RequestTokenError<
            HttpClientError<ReqwestClientError>,
            StandardErrorResponse<BasicErrorResponseType>,
        >,
    ) -> Self {
        match e {
            RequestTokenError::ServerResponse(err) => BackendError::Oauth2Server {
                error: err.error().to_string(),
            },
            RequestTokenError::Request(req_e) => {
                BackendError::Oauth2Token(format!("request failed: {}", req_e))
            }
            RequestTokenError::Parse(parse_err, _body) => BackendError::Json(parse_err.into_inner()),
            RequestTokenError::Other(s) => BackendError::Oauth2Token(s),
        }
    }
}
