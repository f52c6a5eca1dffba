use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use tracing::{debug, info};
use url::Url;

use crate::client::regional_base_url;
use crate::{BatchError, Result};

/// Default settings file, looked up in the working directory
pub const DEFAULT_SETTINGS_FILE: &str = "appsettings.json";

/// The `SpeechService` section of the settings file.
///
/// Every key is optional here; [`Settings::from_section`] decides what is required.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct SpeechServiceSection {
    pub region: Option<String>,
    pub api_key: Option<String>,
    pub audio_blob_container: Option<String>,
    pub custom_model: Option<String>,
    /// Full base URL, replacing the regional host
    pub endpoint: Option<String>,
}

impl SpeechServiceSection {
    /// Read the section from a settings file; a missing file yields an empty section
    pub fn read(path: &Path) -> Result<Self> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No settings file at {}, using command line and environment only", path.display());
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };

        let file: SettingsFile = serde_json::from_str(&contents)
            .map_err(|e| BatchError::Config(format!("Failed to parse {}: {}", path.display(), e)))?;
        info!("Loaded settings from {}", path.display());
        Ok(file.speech_service)
    }

    /// Values set in `overrides` win over values in `self`
    pub fn merge(self, overrides: SpeechServiceSection) -> Self {
        Self {
            region: overrides.region.or(self.region),
            api_key: overrides.api_key.or(self.api_key),
            audio_blob_container: overrides.audio_blob_container.or(self.audio_blob_container),
            custom_model: overrides.custom_model.or(self.custom_model),
            endpoint: overrides.endpoint.or(self.endpoint),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    #[serde(rename = "SpeechService", default)]
    speech_service: SpeechServiceSection,
}

/// Validated connection settings for the speech service
#[derive(Clone, PartialEq)]
pub struct Settings {
    pub region: String,
    pub api_key: String,
    pub audio_container_url: Url,
    /// Custom model reference; accepted but not used by the current flow
    pub custom_model: Option<Url>,
    pub endpoint: Option<Url>,
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("region", &self.region)
            .field("api_key", &"<redacted>")
            .field("audio_container_url", &self.audio_container_url)
            .field("custom_model", &self.custom_model)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

impl Settings {
    /// Load the settings file at `path` and apply `overrides` on top
    pub fn load(path: &Path, overrides: SpeechServiceSection) -> Result<Self> {
        let section = SpeechServiceSection::read(path)?.merge(overrides);
        Self::from_section(section)
    }

    pub fn from_section(section: SpeechServiceSection) -> Result<Self> {
        let region = required(section.region, "Region")?;
        let api_key = required(section.api_key, "ApiKey")?;
        let container = required(section.audio_blob_container, "AudioBlobContainer")?;

        Ok(Self {
            region,
            api_key,
            audio_container_url: parse_url(&container, "AudioBlobContainer")?,
            custom_model: section
                .custom_model
                .map(|model| parse_url(&model, "CustomModel"))
                .transpose()?,
            endpoint: section
                .endpoint
                .map(|endpoint| parse_url(&endpoint, "Endpoint"))
                .transpose()?,
        })
    }

    /// Base URL of the speech API host
    pub fn base_url(&self) -> Result<Url> {
        match &self.endpoint {
            Some(endpoint) => Ok(endpoint.clone()),
            None => regional_base_url(&self.region),
        }
    }
}

fn required(value: Option<String>, key: &str) -> Result<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| BatchError::Config(format!("SpeechService:{} is not configured", key)))
}

fn parse_url(value: &str, key: &str) -> Result<Url> {
    Url::parse(value).map_err(|e| BatchError::Config(format!("SpeechService:{} is not a valid URL: {}", key, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_settings(dir: &TempDir, contents: &str) -> std::path::PathBuf {
        let path = dir.path().join(DEFAULT_SETTINGS_FILE);
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = write_settings(
            &dir,
            r#"{
                "Logging": { "LogLevel": { "Default": "Information" } },
                "SpeechService": {
                    "Region": "westus",
                    "ApiKey": "abc123",
                    "AudioBlobContainer": "https://account.blob.core.windows.net/audio?sv=2020"
                }
            }"#,
        );

        let settings = Settings::load(&path, SpeechServiceSection::default()).unwrap();
        assert_eq!(settings.region, "westus");
        assert_eq!(settings.api_key, "abc123");
        assert_eq!(settings.audio_container_url.query(), Some("sv=2020"));
        assert_eq!(
            settings.base_url().unwrap().as_str(),
            "https://westus.api.cognitive.microsoft.com/"
        );
    }

    #[test]
    fn test_overrides_win_over_file() {
        let dir = TempDir::new().unwrap();
        let path = write_settings(
            &dir,
            r#"{ "SpeechService": { "Region": "westus", "ApiKey": "from-file", "AudioBlobContainer": "https://a/b" } }"#,
        );

        let overrides = SpeechServiceSection {
            api_key: Some("from-env".to_string()),
            endpoint: Some("http://localhost:8080/".to_string()),
            ..Default::default()
        };
        let settings = Settings::load(&path, overrides).unwrap();

        assert_eq!(settings.api_key, "from-env");
        assert_eq!(settings.region, "westus");
        assert_eq!(settings.base_url().unwrap().as_str(), "http://localhost:8080/");
    }

    #[test]
    fn test_missing_file_uses_overrides_only() {
        let dir = TempDir::new().unwrap();
        let overrides = SpeechServiceSection {
            region: Some("eastus".to_string()),
            api_key: Some("key".to_string()),
            audio_blob_container: Some("https://account.blob.core.windows.net/audio".to_string()),
            ..Default::default()
        };

        let settings = Settings::load(&dir.path().join("missing.json"), overrides).unwrap();
        assert_eq!(settings.region, "eastus");
    }

    #[test]
    fn test_missing_required_key_is_reported() {
        let section = SpeechServiceSection {
            region: Some("westus".to_string()),
            api_key: Some("   ".to_string()),
            audio_blob_container: Some("https://a/b".to_string()),
            ..Default::default()
        };

        let err = Settings::from_section(section).unwrap_err();
        assert!(matches!(err, BatchError::Config(ref msg) if msg.contains("ApiKey")));
    }

    #[test]
    fn test_invalid_container_url_is_reported() {
        let section = SpeechServiceSection {
            region: Some("westus".to_string()),
            api_key: Some("key".to_string()),
            audio_blob_container: Some("not a url".to_string()),
            ..Default::default()
        };

        let err = Settings::from_section(section).unwrap_err();
        assert!(matches!(err, BatchError::Config(ref msg) if msg.contains("AudioBlobContainer")));
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = write_settings(&dir, "{ not json");

        let err = Settings::load(&path, SpeechServiceSection::default()).unwrap_err();
        assert!(matches!(err, BatchError::Config(_)));
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let section = SpeechServiceSection {
            region: Some("westus".to_string()),
            api_key: Some("super-secret".to_string()),
            audio_blob_container: Some("https://a/b".to_string()),
            ..Default::default()
        };
        let settings = Settings::from_section(section).unwrap();
        assert!(!format!("{:?}", settings).contains("super-secret"));
    }
}
