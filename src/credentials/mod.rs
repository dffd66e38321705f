//! Credential material and the precedence rules that select it.
//!
//! - `service_account.rs`: the service-account key JSON document
//! - `resolver.rs`: file path > inline env JSON > application defaults

pub mod resolver;
pub mod service_account;

pub use resolver::{ResolvedCredential, resolve};
pub use service_account::ServiceAccountKey;

use std::fmt;
use std::path::PathBuf;

/// Where the credential material came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialSource {
    File(PathBuf),
    EnvJson,
    ApplicationDefault,
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialSource::File(path) => write!(f, "file:{}", path.display()),
            CredentialSource::EnvJson => f.write_str("env:FIREBASE_CREDENTIALS_JSON"),
            CredentialSource::ApplicationDefault => f.write_str("application-default"),
        }
    }
}

/// Authentication material handed to the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    /// An explicit service-account key.
    ServiceAccount(ServiceAccountKey),
    /// Platform-provided identity, discovered by the backend.
    ApplicationDefault,
}

impl Credential {
    /// Project id embedded in the credential material, if any.
    pub fn project_id(&self) -> Option<&str> {
        match self {
            Credential::ServiceAccount(key) => key.project_id.as_deref(),
            Credential::ApplicationDefault => None,
        }
    }
}
