use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::LazyLock;
use url::Url;

/// Inline service-account JSON. Read verbatim: figment would try to parse
/// the braces as an inline dict.
pub const CREDENTIALS_JSON_ENV: &str = "FIREBASE_CREDENTIALS_JSON";
pub const PROJECT_ID_ENV: &str = "FIREBASE_PROJECT_ID";
pub const APPLICATION_CREDENTIALS_ENV: &str = "GOOGLE_APPLICATION_CREDENTIALS";
/// Ambient project variables, highest precedence first.
pub const CLOUD_PROJECT_ENVS: [&str; 2] = ["GOOGLE_CLOUD_PROJECT", "GCLOUD_PROJECT"];

pub const CONFIG_FILE: &str = "config.toml";

pub static GOOGLE_TOKEN_URI: LazyLock<Url> = LazyLock::new(|| {
    Url::parse("https://oauth2.googleapis.com/token").expect("valid Google token url")
});
pub static FIRESTORE_BASE_URL: LazyLock<Url> = LazyLock::new(|| {
    Url::parse("https://firestore.googleapis.com/v1/").expect("valid Firestore url")
});
pub static STORAGE_BASE_URL: LazyLock<Url> = LazyLock::new(|| {
    Url::parse("https://storage.googleapis.com/storage/v1/").expect("valid Storage url")
});
pub static METADATA_BASE_URL: LazyLock<Url> = LazyLock::new(|| {
    Url::parse("http://metadata.google.internal/computeMetadata/v1/")
        .expect("valid metadata server url")
});

/// Runtime configuration for the connection manager and its backend.
///
/// Layers, lowest precedence first: built-in defaults, `config.toml`,
/// `FIREBASE_*` environment variables, then the Google ambient variables
/// (`GOOGLE_APPLICATION_CREDENTIALS`, `GCLOUD_PROJECT`, `GOOGLE_CLOUD_PROJECT`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Project identifier used for app options and the default bucket name.
    #[serde(default)]
    pub project_id: Option<String>,

    /// Inline service-account JSON (`FIREBASE_CREDENTIALS_JSON`).
    #[serde(default, skip_serializing)]
    pub credentials_json: Option<String>,

    /// Credential file used by the binary when no path is passed on the command line.
    #[serde(default)]
    pub credential_path: Option<PathBuf>,

    /// Ambient credential file consulted by application-default discovery.
    #[serde(default)]
    pub application_credentials: Option<PathBuf>,

    /// Ambient project consulted when neither `project_id` nor the credential names one.
    #[serde(default)]
    pub cloud_project: Option<String>,

    /// Overrides the derived `{project_id}.appspot.com` bucket.
    #[serde(default)]
    pub storage_bucket: Option<String>,

    pub loglevel: String,
    #[serde(default)]
    pub proxy: Option<Url>,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,

    pub firestore_url: Url,
    pub storage_url: Url,
    pub metadata_url: Url,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            project_id: None,
            credentials_json: None,
            credential_path: None,
            application_credentials: None,
            cloud_project: None,
            storage_bucket: None,
            loglevel: "info".to_string(),
            proxy: None,
            connect_timeout_secs: 5,
            request_timeout_secs: 15,
            firestore_url: FIRESTORE_BASE_URL.clone(),
            storage_url: STORAGE_BASE_URL.clone(),
            metadata_url: METADATA_BASE_URL.clone(),
        }
    }
}

impl Config {
    /// The layered figment, without the verbatim credentials JSON.
    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(CONFIG_FILE))
            .merge(Env::prefixed("FIREBASE_").ignore(&["CREDENTIALS_JSON"]))
            .merge(
                Env::raw()
                    .only(&[APPLICATION_CREDENTIALS_ENV])
                    .map(|_| "application_credentials".into()),
            )
            .merge(
                Env::raw()
                    .only(&[CLOUD_PROJECT_ENVS[1]])
                    .map(|_| "cloud_project".into()),
            )
            .merge(
                Env::raw()
                    .only(&[CLOUD_PROJECT_ENVS[0]])
                    .map(|_| "cloud_project".into()),
            )
    }

    /// Load configuration from all layers.
    pub fn load() -> Result<Self, figment::Error> {
        let mut cfg: Config = Self::figment().extract()?;
        if let Some(raw) = std::env::var(CREDENTIALS_JSON_ENV)
            .ok()
            .filter(|raw| !raw.trim().is_empty())
        {
            cfg.credentials_json = Some(raw);
        }
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn defaults_apply_without_env() {
        Jail::expect_with(|_jail| {
            let cfg = Config::load()?;
            assert_eq!(cfg.project_id, None);
            assert_eq!(cfg.credentials_json, None);
            assert_eq!(cfg.loglevel, "info");
            assert_eq!(cfg.request_timeout_secs, 15);
            assert_eq!(cfg.firestore_url, *FIRESTORE_BASE_URL);
            Ok(())
        });
    }

    #[test]
    fn firebase_env_vars_map_to_fields() {
        Jail::expect_with(|jail| {
            jail.set_env(PROJECT_ID_ENV, "acme-project");
            jail.set_env(
                CREDENTIALS_JSON_ENV,
                r#"{"type": "service_account", "client_email": "a@b.c"}"#,
            );
            jail.set_env(APPLICATION_CREDENTIALS_ENV, "/etc/gcp/adc.json");
            jail.set_env("FIREBASE_LOGLEVEL", "debug");

            let cfg = Config::load()?;
            assert_eq!(cfg.project_id.as_deref(), Some("acme-project"));
            assert_eq!(
                cfg.credentials_json.as_deref(),
                Some(r#"{"type": "service_account", "client_email": "a@b.c"}"#)
            );
            assert_eq!(
                cfg.application_credentials,
                Some(PathBuf::from("/etc/gcp/adc.json"))
            );
            assert_eq!(cfg.loglevel, "debug");
            Ok(())
        });
    }

    #[test]
    fn toml_file_is_overridden_by_env() {
        Jail::expect_with(|jail| {
            jail.create_file(
                CONFIG_FILE,
                r#"
                project_id = "from-file"
                storage_bucket = "custom-bucket"
                "#,
            )?;
            jail.set_env(PROJECT_ID_ENV, "from-env");

            let cfg = Config::load()?;
            assert_eq!(cfg.project_id.as_deref(), Some("from-env"));
            assert_eq!(cfg.storage_bucket.as_deref(), Some("custom-bucket"));
            Ok(())
        });
    }

    #[test]
    fn toml_credentials_json_survives_without_env() {
        Jail::expect_with(|jail| {
            jail.create_file(
                CONFIG_FILE,
                r#"credentials_json = '{"type": "service_account", "client_email": "a@b.c"}'"#,
            )?;

            let cfg = Config::load()?;
            assert_eq!(
                cfg.credentials_json.as_deref(),
                Some(r#"{"type": "service_account", "client_email": "a@b.c"}"#)
            );

            jail.set_env(CREDENTIALS_JSON_ENV, r#"{"type": "service_account"}"#);
            let cfg = Config::load()?;
            assert_eq!(
                cfg.credentials_json.as_deref(),
                Some(r#"{"type": "service_account"}"#)
            );
            Ok(())
        });
    }

    #[test]
    fn google_cloud_project_wins_over_gcloud_project() {
        Jail::expect_with(|jail| {
            jail.set_env("GCLOUD_PROJECT", "legacy-project");
            assert_eq!(Config::load()?.cloud_project.as_deref(), Some("legacy-project"));

            jail.set_env("GOOGLE_CLOUD_PROJECT", "ambient-project");
            assert_eq!(Config::load()?.cloud_project.as_deref(), Some("ambient-project"));
            Ok(())
        });
    }
}
