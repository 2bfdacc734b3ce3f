use crate::error::{ModuleError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

/// Parse a configuration document
pub fn parse<T: DeserializeOwned>(document: &str) -> Result<T> {
    toml::from_str(document).map_err(ModuleError::ParseConfig)
}

/// Read and parse a configuration file
pub fn load<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let document = std::fs::read_to_string(path)
        .map_err(|e| ModuleError::OpenConfig(e, path.to_path_buf()))?;
    parse(&document)
}

/// Configuration of the append-string condition detection
#[derive(PartialEq, Eq, Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AppendStringConfig {
    /// Appended verbatim to every item's sample info
    pub string_to_append: String,
}

/// Configuration of the folder-size probe
#[derive(PartialEq, Eq, Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FolderSizeConfig {
    pub folder_name: PathBuf,
}

impl FolderSizeConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.folder_name.is_dir() {
            return Err(ModuleError::ConfigError(format!(
                "directory {} does not exist",
                self.folder_name.display()
            )));
        }
        Ok(())
    }
}

/// Configuration of the write-string-to-file action
#[derive(PartialEq, Eq, Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WriteStringConfig {
    pub file_name: PathBuf,
    /// Line appended to `file_name` on every trigger
    pub string_input: String,
}

impl WriteStringConfig {
    pub fn validate(&self) -> Result<()> {
        validate_file_name(&self.file_name)
    }
}

/// Configuration of the write-items-to-file action
#[derive(PartialEq, Eq, Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WriteItemsConfig {
    pub file_name: PathBuf,
}

impl WriteItemsConfig {
    pub fn validate(&self) -> Result<()> {
        validate_file_name(&self.file_name)
    }
}

/// Configuration of the event data source
#[derive(PartialEq, Eq, Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EventSourceConfig {
    /// Seconds between produced events
    pub timer_frequency: u64,
    /// Entity the produced events are raised against
    pub managed_entity_id: Uuid,
}

impl EventSourceConfig {
    pub fn validate(&self) -> Result<()> {
        if self.timer_frequency == 0 {
            return Err(ModuleError::ConfigError(
                "timer_frequency must be at least one second".to_string(),
            ));
        }
        Ok(())
    }

    pub fn period(&self) -> Duration {
        Duration::from_secs(self.timer_frequency)
    }
}

fn validate_file_name(path: &Path) -> Result<()> {
    if path.as_os_str().is_empty() {
        return Err(ModuleError::ConfigError("file_name is empty".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_append_string() {
        let config: AppendStringConfig = parse(r#"string_to_append = "!!""#).unwrap();
        assert_eq!(config.string_to_append, "!!");
    }

    #[test]
    fn test_missing_key_is_rejected() {
        let result = parse::<WriteStringConfig>(r#"file_name = "out.txt""#);
        assert!(matches!(result, Err(ModuleError::ParseConfig(_))));
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let result = parse::<AppendStringConfig>(
            "string_to_append = \"x\"\nextra = 1",
        );
        assert!(matches!(result, Err(ModuleError::ParseConfig(_))));
    }

    #[test]
    fn test_event_source_config() {
        let config: EventSourceConfig = parse(
            "timer_frequency = 30\nmanaged_entity_id = \"6f1c1d4e-3c9b-4d55-a0f2-3f0d8e0e1a11\"",
        )
        .unwrap();
        config.validate().unwrap();
        assert_eq!(config.period(), Duration::from_secs(30));
    }

    #[test]
    fn test_zero_timer_frequency_is_rejected() {
        let config = EventSourceConfig {
            timer_frequency: 0,
            managed_entity_id: Uuid::nil(),
        };
        assert!(matches!(
            config.validate(),
            Err(ModuleError::ConfigError(_))
        ));
    }

    #[test]
    fn test_bad_uuid_is_rejected() {
        let result = parse::<EventSourceConfig>(
            "timer_frequency = 30\nmanaged_entity_id = \"not-a-guid\"",
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_folder_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config = FolderSizeConfig {
            folder_name: dir.path().join("absent"),
        };
        assert!(config.validate().is_err());
        let config = FolderSizeConfig {
            folder_name: dir.path().to_path_buf(),
        };
        config.validate().unwrap();
    }

    #[test]
    fn test_load_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.toml");
        match load::<AppendStringConfig>(&path) {
            Err(ModuleError::OpenConfig(_, reported)) => assert_eq!(reported, path),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
