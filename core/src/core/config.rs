// App configuration: a JSON file in the data dir, all fields optional.

use std::path::Path;

use serde::{Deserialize, Serialize};
use url::Url;

const CONFIG_FILE: &str = "roost_config.json";

const DEFAULT_AUTH_BASE_URL: &str = "http://127.0.0.1:8080/";
const DEFAULT_CHAT_SERVER_URL: &str = "ws://127.0.0.1:5280/ws";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub auth_base_url: Option<String>,
    pub chat_server_url: Option<String>,
}

impl AppConfig {
    /// Base URL of the HTTP auth backend. Falls back to the default when the
    /// configured value is missing or unparseable.
    pub fn auth_base_url(&self) -> Url {
        if let Some(raw) = self.auth_base_url.as_deref() {
            match Url::parse(raw) {
                Ok(url) => return url,
                Err(e) => {
                    tracing::warn!(%e, raw, "invalid auth_base_url, using default");
                }
            }
        }
        Url::parse(DEFAULT_AUTH_BASE_URL).expect("default auth url parses")
    }

    pub fn chat_server_url(&self) -> String {
        self.chat_server_url
            .clone()
            .unwrap_or_else(|| DEFAULT_CHAT_SERVER_URL.to_string())
    }
}

pub fn load_app_config(data_dir: &str) -> AppConfig {
    let path = Path::new(data_dir).join(CONFIG_FILE);
    let raw = match std::fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(_) => return AppConfig::default(),
    };
    match serde_json::from_str::<AppConfig>(&raw) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(%e, path = %path.display(), "malformed config, using defaults");
            AppConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_app_config(dir.path().to_str().unwrap());
        assert_eq!(config.auth_base_url().as_str(), DEFAULT_AUTH_BASE_URL);
        assert_eq!(config.chat_server_url(), DEFAULT_CHAT_SERVER_URL);
    }

    #[test]
    fn malformed_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "{oops").unwrap();
        let config = load_app_config(dir.path().to_str().unwrap());
        assert!(config.auth_base_url.is_none());
    }

    #[test]
    fn configured_urls_are_used() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            serde_json::json!({
                "auth_base_url": "https://auth.example.net/api/",
                "chat_server_url": "wss://chat.example.net/ws",
            })
            .to_string(),
        )
        .unwrap();
        let config = load_app_config(dir.path().to_str().unwrap());
        assert_eq!(
            config.auth_base_url().as_str(),
            "https://auth.example.net/api/"
        );
        assert_eq!(config.chat_server_url(), "wss://chat.example.net/ws");
    }

    #[test]
    fn invalid_configured_url_falls_back() {
        let config = AppConfig {
            auth_base_url: Some("not a url".into()),
            chat_server_url: None,
        };
        assert_eq!(config.auth_base_url().as_str(), DEFAULT_AUTH_BASE_URL);
    }
}
