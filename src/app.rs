use adw::Application;
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::backend::BackendConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no config directory available")]
    NoConfigDir,
    #[error("config I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("config could not be serialized: {0}")]
    Encode(#[from] toml::ser::Error),
}

/// The signed-in user as seen by the header bar. Owned by the identity
/// service; the client only reads it and forgets it on sign-out.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Session {
    /// Stable user identifier (the account email).
    pub email: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct AppState {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<Session>,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn toml_path() -> Option<PathBuf> {
        let base = BaseDirs::new()?;
        Some(base.config_dir().join("firechat.toml"))
    }

    pub fn load() -> Self {
        match Self::toml_path() {
            Some(path) => Self::load_from(&path),
            None => {
                log::warn!("No config directory; using defaults");
                Self::new()
            }
        }
    }

    /// A missing or malformed file yields the defaults.
    pub fn load_from(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(text) => match toml::from_str::<AppState>(&text) {
                Ok(state) => state,
                Err(e) => {
                    log::warn!("Failed to parse {}: {}", path.display(), e);
                    Self::new()
                }
            },
            Err(e) => {
                log::info!("Config {} not read ({}); using defaults", path.display(), e);
                Self::new()
            }
        }
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::toml_path().ok_or(ConfigError::NoConfigDir)?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let toml = toml::to_string_pretty(self)?;
        fs::write(path, toml)?;
        Ok(())
    }

    /// Forget the current session. The caller navigates back to the login window.
    pub fn sign_out(&mut self) -> Result<(), ConfigError> {
        if let Some(session) = self.session.take() {
            log::info!("Signing out {}", session.email);
        }
        self.save()
    }
}

pub fn build_ui(app: &Application) {
    let state = AppState::load();
    if let Err(e) = crate::backend::init(&state.backend) {
        log::warn!("Backend not initialized: {}", e);
    }
    match state.session {
        Some(session) if crate::backend::get().is_some() => {
            crate::ui::main_window::show_main_window(app, session);
        }
        _ => crate::ui::login::show_login_window(app),
    }
}
