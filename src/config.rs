use std::env;
use std::fs;
use std::io::ErrorKind;

use serde::Deserialize;
use tracing::info;

use crate::error::ConfigError;

const DEFAULT_CONFIG_PATH: &str = "config.json";
const DEFAULT_VOLUME: u8 = 5;
const MAX_VOLUME: u8 = 10;

/// Shape of the optional JSON config file.
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    prefix: Option<String>,
    token: Option<String>,
    volume: Option<u8>,
}

#[derive(Clone)]
pub struct Config {
    pub token: String,
    pub prefix: String,
    pub volume: u8,
}

impl Config {
    /// Loads `.env`, then the JSON config file, then lets the environment
    /// override whatever the file set.
    pub fn load() -> Result<Self, ConfigError> {
        if dotenvy::dotenv().is_err() {
            info!(".env file not found, using the process environment");
        }

        let path = env::var("CONFIG_PATH").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let file = read_file(&path)?;

        Self::resolve(
            file,
            env::var("DISCORD_TOKEN").ok(),
            env::var("COMMAND_PREFIX").ok(),
            env::var("DEFAULT_VOLUME").ok(),
        )
    }

    fn resolve(
        file: FileConfig,
        token: Option<String>,
        prefix: Option<String>,
        volume: Option<String>,
    ) -> Result<Self, ConfigError> {
        let token = non_blank(token.or(file.token)).ok_or(ConfigError::MissingToken)?;
        let prefix = non_blank(prefix.or(file.prefix)).ok_or(ConfigError::MissingPrefix)?;

        let volume = match volume {
            Some(raw) => raw
                .trim()
                .parse::<u8>()
                .map_err(|_| ConfigError::InvalidVolume(raw.clone()))?,
            None => file.volume.unwrap_or(DEFAULT_VOLUME),
        };

        if volume > MAX_VOLUME {
            return Err(ConfigError::InvalidVolume(volume.to_string()));
        }

        Ok(Self {
            token,
            prefix,
            volume,
        })
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("token", &"<redacted>")
            .field("prefix", &self.prefix)
            .field("volume", &self.volume)
            .finish()
    }
}

fn read_file(path: &str) -> Result<FileConfig, ConfigError> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(FileConfig::default()),
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.to_string(),
                source,
            })
        }
    };

    serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_string(),
        source,
    })
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn file(prefix: &str, token: &str) -> FileConfig {
        FileConfig {
            prefix: Some(prefix.to_string()),
            token: Some(token.to_string()),
            volume: None,
        }
    }

    #[test]
    fn file_values_are_used_with_default_volume() {
        let config = Config::resolve(file("!", "abc"), None, None, None).unwrap();

        assert_eq!(config.prefix, "!");
        assert_eq!(config.token, "abc");
        assert_eq!(config.volume, 5);
    }

    #[test]
    fn environment_overrides_file() {
        let config = Config::resolve(
            file("!", "abc"),
            Some("xyz".to_string()),
            Some("?".to_string()),
            Some("7".to_string()),
        )
        .unwrap();

        assert_eq!(config.prefix, "?");
        assert_eq!(config.token, "xyz");
        assert_eq!(config.volume, 7);
    }

    #[test]
    fn token_and_prefix_are_required() {
        let no_token = Config::resolve(FileConfig::default(), None, Some("!".to_string()), None);
        let blank_prefix = Config::resolve(FileConfig::default(), Some("abc".to_string()), Some("  ".to_string()), None);

        assert!(matches!(no_token, Err(ConfigError::MissingToken)));
        assert!(matches!(blank_prefix, Err(ConfigError::MissingPrefix)));
    }

    #[test]
    fn volume_must_stay_in_range() {
        let too_loud = Config::resolve(file("!", "abc"), None, None, Some("11".to_string()));
        let garbage = Config::resolve(file("!", "abc"), None, None, Some("loud".to_string()));

        assert!(matches!(too_loud, Err(ConfigError::InvalidVolume(_))));
        assert!(matches!(garbage, Err(ConfigError::InvalidVolume(_))));
    }

    #[test]
    fn parses_the_json_file_shape() {
        let parsed: FileConfig = serde_json::from_str(r#"{"prefix":"!","token":"abc","volume":3}"#).unwrap();

        assert_eq!(parsed.prefix.as_deref(), Some("!"));
        assert_eq!(parsed.volume, Some(3));
    }

    #[test]
    fn debug_output_hides_the_token() {
        let config = Config::resolve(file("!", "secret-token"), None, None, None).unwrap();

        assert!(!format!("{config:?}").contains("secret-token"));
    }
}
