use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::api::auth::AuthClient;
use crate::api::client::FirestoreClient;
use crate::api::ApiError;

pub const DEFAULT_FIRESTORE_URL: &str = "https://firestore.googleapis.com/v1";
pub const DEFAULT_AUTH_URL: &str = "https://identitytoolkit.googleapis.com/v1";

/// `[backend]` table of the config file. The URLs only need changing
/// when pointing the client at a local emulator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BackendConfig {
    pub api_key: String,
    pub project_id: String,
    pub firestore_url: String,
    pub auth_url: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            project_id: String::new(),
            firestore_url: DEFAULT_FIRESTORE_URL.to_string(),
            auth_url: DEFAULT_AUTH_URL.to_string(),
        }
    }
}

impl BackendConfig {
    pub fn is_configured(&self) -> bool {
        !self.api_key.trim().is_empty() && !self.project_id.trim().is_empty()
    }
}

pub struct Backend {
    pub project_id: String,
    pub auth: AuthClient,
    pub db: FirestoreClient,
}

impl Backend {
    pub fn connect(config: &BackendConfig) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            project_id: config.project_id.clone(),
            auth: AuthClient::new(http.clone(), config)?,
            db: FirestoreClient::new(http, config)?,
        })
    }
}

static BACKEND: OnceCell<Backend> = OnceCell::new();

/// Initialize the backend once per process. Later calls hand back the
/// instance created first, whatever config they pass.
pub fn init(config: &BackendConfig) -> Result<&'static Backend, ApiError> {
    if let Some(existing) = BACKEND.get() {
        log::debug!("Backend already initialized for project {}", existing.project_id);
        return Ok(existing);
    }
    let backend = Backend::connect(config)?;
    let backend = BACKEND.get_or_init(|| backend);
    log::info!("Backend initialized for project {}", backend.project_id);
    Ok(backend)
}

pub fn get() -> Option<&'static Backend> {
    BACKEND.get()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(project: &str) -> BackendConfig {
        BackendConfig {
            api_key: "k".into(),
            project_id: project.into(),
            ..BackendConfig::default()
        }
    }

    #[test]
    fn unconfigured_backend_is_rejected() {
        assert!(!BackendConfig::default().is_configured());
        assert!(matches!(Backend::connect(&BackendConfig::default()), Err(ApiError::NotConfigured)));
    }

    #[test]
    fn init_reuses_first_instance() {
        let first = init(&config("first")).unwrap();
        let second = init(&config("second")).unwrap();
        assert!(std::ptr::eq(first, second));
        assert_eq!(second.project_id, "first");
        assert!(get().is_some());
    }
}
