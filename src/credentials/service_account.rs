use crate::config::GOOGLE_TOKEN_URI;
use crate::error::InitError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

pub const SERVICE_ACCOUNT_TYPE: &str = "service_account";

/// A Google service-account key, as downloaded from the cloud console.
#[derive(Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ServiceAccountKey {
    #[serde(rename = "type")]
    pub key_type: String,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub private_key_id: Option<String>,
    pub private_key: String,
    pub client_email: String,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    GOOGLE_TOKEN_URI.as_str().to_string()
}

impl fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("project_id", &self.project_id)
            .field("private_key_id", &self.private_key_id)
            .field("private_key", &"<redacted>")
            .field("client_email", &self.client_email)
            .field("token_uri", &self.token_uri)
            .finish()
    }
}

impl ServiceAccountKey {
    /// Parse raw JSON text into a validated key.
    pub fn from_json_str(raw: &str) -> Result<Self, InitError> {
        let value: Value = serde_json::from_str(raw)?;
        Self::from_payload(&value)
    }

    /// Validate and build a key from an already-parsed JSON document.
    pub fn from_payload(payload: &Value) -> Result<Self, InitError> {
        let obj = payload.as_object().ok_or_else(|| {
            InitError::InvalidCredentials("credential JSON must be an object".to_string())
        })?;

        match obj.get("type").and_then(Value::as_str) {
            Some(SERVICE_ACCOUNT_TYPE) => {}
            Some(other) => {
                return Err(InitError::InvalidCredentials(format!(
                    "expected credential type \"{SERVICE_ACCOUNT_TYPE}\", got \"{other}\""
                )));
            }
            None => {
                return Err(InitError::InvalidCredentials(
                    "missing \"type\" field".to_string(),
                ));
            }
        }

        let key: ServiceAccountKey = serde_json::from_value(payload.clone())
            .map_err(|e| InitError::InvalidCredentials(e.to_string()))?;

        if key.private_key.trim().is_empty() {
            return Err(InitError::InvalidCredentials(
                "\"private_key\" is empty".to_string(),
            ));
        }
        if key.client_email.trim().is_empty() {
            return Err(InitError::InvalidCredentials(
                "\"client_email\" is empty".to_string(),
            ));
        }
        Ok(key)
    }
}
