use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8001/api/v1";
pub const DEFAULT_MODEL: &str = "mistral:latest";

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    pub theme: Option<String>,
    pub default_model: Option<String>,
    pub api_base_url: Option<String>,
    /// When false the non-streaming fallback path is used for sends.
    pub stream: Option<bool>,
}

impl Config {
    pub fn new() -> Self {
        Self {
            theme: Some("dark".to_string()),
            default_model: None,
            api_base_url: None,
            stream: None,
        }
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::get_config_path()?)
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            return Ok(Self::new());
        }

        let config_content = fs::read_to_string(config_path)?;
        let config: Config = serde_json::from_str(&config_content)?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::get_config_path()?)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        // Create config directory if it doesn't exist
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let config_content = serde_json::to_string_pretty(self)?;
        fs::write(config_path, config_content)?;
        Ok(())
    }

    pub fn save_default_model(model: &str) -> Result<()> {
        let mut config = Self::load().unwrap_or_else(|_| Self::new());
        config.default_model = Some(model.to_string());
        config.save()
    }

    pub fn save_theme(theme: &str) -> Result<()> {
        let mut config = Self::load().unwrap_or_else(|_| Self::new());
        config.theme = Some(theme.to_string());
        config.save()
    }

    fn get_config_path() -> Result<PathBuf> {
        let config_dir =
            dirs::config_dir().ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("ollama-chat").join("config.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("config.json")).unwrap();
        assert_eq!(config.theme.as_deref(), Some("dark"));
        assert!(config.default_model.is_none());
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = Config::new();
        config.default_model = Some("mistral:latest".to_string());
        config.api_base_url = Some("http://localhost:9000/api/v1".to_string());
        config.stream = Some(false);
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.default_model.as_deref(), Some("mistral:latest"));
        assert_eq!(
            loaded.api_base_url.as_deref(),
            Some("http://localhost:9000/api/v1")
        );
        assert_eq!(loaded.stream, Some(false));
    }

    #[test]
    fn test_theme_toggle_twice_restores_original() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = Config::new();
        config.theme = Some("light".to_string());
        config.save_to(&path).unwrap();

        for _ in 0..2 {
            let mut config = Config::load_from(&path).unwrap();
            let flipped = match config.theme.as_deref() {
                Some("dark") => "light",
                _ => "dark",
            };
            config.theme = Some(flipped.to_string());
            config.save_to(&path).unwrap();
        }

        let final_config = Config::load_from(&path).unwrap();
        assert_eq!(final_config.theme.as_deref(), Some("light"));
    }
}
