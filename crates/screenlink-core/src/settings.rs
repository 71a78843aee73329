//! Settings document, loaded from JSON at startup and on reload.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use screenlink_types::VirtualScreenConfig;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::CoreError;

/// Default listen/connect port.
pub const DEFAULT_PORT: u16 = 25530;

/// Shared handle to the settings document.
pub type SharedSettings = Arc<Mutex<Settings>>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Name this machine's screen announces to the cluster.
    #[serde(default = "default_screen_name")]
    pub screen_name: String,

    #[serde(default = "default_max_log_records")]
    pub max_log_records: u32,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_file: Option<PathBuf>,

    /// Plugin paths. Accepted for compatibility; dynamic loading is not
    /// supported and entries are reported and skipped.
    #[serde(default)]
    pub module_list: Vec<String>,

    /// Persisted virtual screen layout.
    #[serde(default)]
    pub screen_settings: Vec<VirtualScreenConfig>,

    /// `ip:port` the server binds, and the default target for clients.
    #[serde(default = "default_server_address")]
    pub server_ipaddress: String,

    /// `ip:port` for the JSON-RPC surface; absent disables it.
    #[serde(default)]
    pub remote_controller: Option<String>,

    /// Where this document was loaded from; used by save and reload.
    #[serde(skip)]
    pub path: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            screen_name: default_screen_name(),
            max_log_records: default_max_log_records(),
            log_level: default_log_level(),
            log_file: None,
            module_list: Vec::new(),
            screen_settings: Vec::new(),
            server_ipaddress: default_server_address(),
            remote_controller: None,
            path: None,
        }
    }
}

impl Settings {
    /// Load from a JSON file. A missing file yields defaults that will be
    /// written back on save.
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let mut settings = if path.exists() {
            let text = std::fs::read_to_string(path)
                .map_err(|e| CoreError::Settings(format!("read {}: {e}", path.display())))?;
            serde_json::from_str(&text)
                .map_err(|e| CoreError::Settings(format!("parse {}: {e}", path.display())))?
        } else {
            info!(path = %path.display(), "settings file missing; using defaults");
            Self::default()
        };
        settings.path = Some(path.to_path_buf());
        if !settings.module_list.is_empty() {
            warn!(
                modules = settings.module_list.len(),
                "module_list is not supported; entries ignored"
            );
        }
        Ok(settings)
    }

    /// Write back to the file this document was loaded from, if any.
    pub fn save(&self) -> Result<(), CoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let text = serde_json::to_string_pretty(self)
            .map_err(|e| CoreError::Settings(format!("serialize settings: {e}")))?;
        std::fs::write(path, text)
            .map_err(|e| CoreError::Settings(format!("write {}: {e}", path.display())))?;
        info!(path = %path.display(), "settings saved");
        Ok(())
    }

    /// Re-read the file, keeping the current one on failure.
    pub fn reload(&mut self) -> Result<(), CoreError> {
        let Some(path) = self.path.clone() else {
            return Err(CoreError::Settings("no settings file to reload".to_string()));
        };
        *self = Self::load(&path)?;
        Ok(())
    }

    /// The configured server endpoint as `(address, port)`.
    #[must_use]
    pub fn server_endpoint(&self) -> (String, u16) {
        split_endpoint(&self.server_ipaddress)
            .unwrap_or_else(|| ("0.0.0.0".to_string(), DEFAULT_PORT))
    }
}

/// Split `"ip:port"`; `None` when the port is missing or malformed.
#[must_use]
pub fn split_endpoint(endpoint: &str) -> Option<(String, u16)> {
    let (address, port) = endpoint.rsplit_once(':')?;
    let port: u16 = port.parse().ok()?;
    if address.is_empty() {
        return None;
    }
    Some((address.to_string(), port))
}

fn default_screen_name() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "screenlink".to_string())
}

fn default_max_log_records() -> u32 {
    1000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_server_address() -> String {
    format!("0.0.0.0:{DEFAULT_PORT}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.log_level, "info");
        assert_eq!(settings.server_endpoint().1, DEFAULT_PORT);
        assert!(!settings.screen_name.is_empty());
    }

    #[test]
    fn save_and_reload_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let mut settings = Settings::load(&path).unwrap();
        settings.screen_name = "workbench".to_string();
        settings.screen_settings.push(VirtualScreenConfig {
            name: "workbench".to_string(),
            pos_x: 0,
            pos_y: 0,
            width: 2560,
            height: 1440,
        });
        settings.save().unwrap();

        let mut reread = Settings::load(&path).unwrap();
        assert_eq!(reread.screen_name, "workbench");
        assert_eq!(reread.screen_settings.len(), 1);

        // Editing the file and reloading picks up the change.
        let text = std::fs::read_to_string(&path)
            .unwrap()
            .replace("workbench", "bench");
        std::fs::write(&path, text).unwrap();
        reread.reload().unwrap();
        assert_eq!(reread.screen_name, "bench");
    }

    #[test]
    fn partial_document_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"screen_name":"side","log_level":"debug"}"#).unwrap();
        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.screen_name, "side");
        assert_eq!(settings.log_level, "debug");
        assert_eq!(settings.max_log_records, 1000);
        assert!(settings.remote_controller.is_none());
    }

    #[test]
    fn endpoint_parsing() {
        assert_eq!(
            split_endpoint("127.0.0.1:4000"),
            Some(("127.0.0.1".to_string(), 4000))
        );
        assert_eq!(split_endpoint("nonsense"), None);
        assert_eq!(split_endpoint(":4000"), None);
        assert_eq!(split_endpoint("127.0.0.1:x"), None);
    }
}
