use anyhow::Result;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::upload::UploadOptions;

/// Server used when neither the command line nor the config names one
pub const DEFAULT_SERVER: &str = "http://localhost:8080";

const MB: u64 = 1024 * 1024;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub upload: UploadConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub server: Option<String>,
    pub token: Option<String>,
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadConfig {
    #[serde(default = "default_max_size_mb")]
    pub max_size_mb: u64,
    #[serde(default = "default_max_files")]
    pub max_files: usize,
    #[serde(default = "default_accept")]
    pub accept: String,
}

fn default_max_size_mb() -> u64 {
    50
}

fn default_max_files() -> usize {
    10
}

fn default_accept() -> String {
    crate::upload::validation::ACCEPT_ANY.to_string()
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_size_mb: default_max_size_mb(),
            max_files: default_max_files(),
            accept: default_accept(),
        }
    }
}

impl UploadConfig {
    pub fn options(&self, multiple: bool) -> UploadOptions {
        UploadOptions {
            max_size: self.max_size_mb.saturating_mul(MB),
            // 0 disables the limit
            max_files: (self.max_files > 0).then_some(self.max_files),
            accept: self.accept.clone(),
            multiple,
        }
    }
}

impl Config {
    pub fn config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("com", "dropsync", "dropsync")
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

        let config_dir = proj_dirs.config_dir();
        std::fs::create_dir_all(config_dir)?;

        Ok(config_dir.join("config.toml"))
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// `override_url` first, then the configured server, then the default
    pub fn server_url(&self, override_url: Option<&str>) -> String {
        override_url
            .map(str::to_string)
            .or_else(|| self.remote.server.clone())
            .unwrap_or_else(|| DEFAULT_SERVER.to_string())
    }

    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "server" => self.remote.server = Some(value.to_string()),
            "token" => self.remote.token = Some(value.to_string()),
            "max_size_mb" => self.upload.max_size_mb = value.parse()?,
            "max_files" => self.upload.max_files = value.parse()?,
            "accept" => self.upload.accept = value.to_string(),
            _ => anyhow::bail!(
                "Unknown config key: {}. Valid keys: server, token, max_size_mb, max_files, accept",
                key
            ),
        }
        Ok(())
    }

    /// Value for `key` as shown to the user; the token is masked
    pub fn get(&self, key: &str) -> Result<String> {
        let value = match key {
            "server" => self.remote.server.clone().unwrap_or_default(),
            "token" => self.remote.token.as_ref().map(|_| "****").unwrap_or_default().to_string(),
            "user_id" => self.remote.user_id.clone().unwrap_or_default(),
            "max_size_mb" => self.upload.max_size_mb.to_string(),
            "max_files" => self.upload.max_files.to_string(),
            "accept" => self.upload.accept.clone(),
            _ => anyhow::bail!("Unknown config key: {}", key),
        };
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_when_file_missing() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_from(&dir.path().join("config.toml")).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.upload.max_size_mb, 50);
        assert_eq!(config.upload.max_files, 10);
        assert_eq!(config.server_url(None), DEFAULT_SERVER);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[remote]\nserver = \"http://drop.example\"\n\n[upload]\naccept = \"image/*\"\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.server_url(None), "http://drop.example");
        assert_eq!(config.server_url(Some("http://cli")), "http://cli");
        assert_eq!(config.upload.accept, "image/*");
        assert_eq!(config.upload.max_files, 10);
    }

    #[test]
    fn test_set_get_and_save() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config.set("token", "secret").unwrap();
        config.set("max_files", "0").unwrap();
        assert!(config.set("max_files", "many").is_err());
        assert!(config.set("nope", "x").is_err());
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.get("token").unwrap(), "****");
        assert_eq!(loaded.remote.token.as_deref(), Some("secret"));
        assert_eq!(loaded.upload.options(true).max_files, None);
    }

    #[test]
    fn test_upload_options_from_config() {
        let options = UploadConfig::default().options(true);
        assert_eq!(options.max_size, 50 * MB);
        assert_eq!(options.max_files, Some(10));
        assert_eq!(options.accept, "*");
        assert!(options.multiple);
    }
}
