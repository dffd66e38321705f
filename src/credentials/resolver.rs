use super::{Credential, CredentialSource, ServiceAccountKey};
use crate::error::InitError;
use std::io::ErrorKind;
use std::{fs, path::Path};
use tracing::{debug, info, warn};

/// Credential material together with the source it was taken from.
#[derive(Debug, Clone)]
pub struct ResolvedCredential {
    pub source: CredentialSource,
    pub credential: Credential,
}

/// Select credentials by precedence: explicit file, then inline JSON, then
/// application defaults.
///
/// An explicit path that does not exist is skipped with a warning; a file that
/// vanishes between the existence check and the read is `CredentialFileNotFound`.
pub fn resolve(
    credential_path: Option<&Path>,
    credentials_json: Option<&str>,
) -> Result<ResolvedCredential, InitError> {
    let credential_path = credential_path.filter(|p| !p.as_os_str().is_empty());
    let credentials_json = credentials_json.filter(|raw| !raw.trim().is_empty());

    if let Some(path) = credential_path.filter(|p| {
        let exists = p.exists();
        if !exists {
            warn!(path = %p.display(), "credential file not found; trying other sources");
        }
        exists
    }) {
        let key = load_key_file(path)?;
        debug!(path = %path.display(), "loaded service account from file");
        return Ok(ResolvedCredential {
            source: CredentialSource::File(path.to_path_buf()),
            credential: Credential::ServiceAccount(key),
        });
    }

    if let Some(raw) = credentials_json {
        let key = ServiceAccountKey::from_json_str(raw)?;
        debug!("loaded service account from FIREBASE_CREDENTIALS_JSON");
        return Ok(ResolvedCredential {
            source: CredentialSource::EnvJson,
            credential: Credential::ServiceAccount(key),
        });
    }

    info!("Using default application credentials");
    Ok(ResolvedCredential {
        source: CredentialSource::ApplicationDefault,
        credential: Credential::ApplicationDefault,
    })
}

fn load_key_file(path: &Path) -> Result<ServiceAccountKey, InitError> {
    let contents = fs::read_to_string(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => InitError::CredentialFileNotFound {
            path: path.to_path_buf(),
        },
        ErrorKind::InvalidData => {
            InitError::InvalidCredentials(format!("{} is not UTF-8 text", path.display()))
        }
        _ => InitError::Unexpected(format!("reading {}: {e}", path.display())),
    })?;
    ServiceAccountKey::from_json_str(&contents)
}
