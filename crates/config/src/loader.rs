use std::path::{Path, PathBuf};

use tracing::debug;

use crate::{
    env::apply_env_overrides,
    error::{Context, Error, Result},
    schema::BridgeConfig,
};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "mqttgram.toml",
    "mqttgram.yaml",
    "mqttgram.yml",
    "mqttgram.json",
];

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> Result<BridgeConfig> {
    let raw = std::fs::read_to_string(path).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&raw, path)
}

/// Build the effective configuration.
///
/// Precedence, lowest first: defaults, the config file (`explicit` or the
/// first discovered one), then environment variables. The subscriber file
/// path is resolved against the data directory when unset.
pub fn load(explicit: Option<&Path>) -> Result<BridgeConfig> {
    let path = match explicit {
        Some(p) => Some(p.to_path_buf()),
        None => discover_config_file(),
    };

    let mut config = match path {
        Some(ref p) => {
            debug!(path = %p.display(), "loading config");
            load_config(p)?
        },
        None => {
            debug!("no config file found, using defaults");
            BridgeConfig::default()
        },
    };

    apply_env_overrides(&mut config)?;

    if config.subscribers.path.is_none() {
        config.subscribers.path = Some(data_dir()?.join("subscribers.json"));
    }
    Ok(config)
}

/// Find the first config file in standard locations.
///
/// Search order:
/// 1. `./mqttgram.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/mqttgram/mqttgram.{toml,yaml,yml,json}` (user-global)
pub fn discover_config_file() -> Option<PathBuf> {
    for name in CONFIG_FILENAMES {
        let p = PathBuf::from(name);
        if p.exists() {
            return Some(p);
        }
    }

    let config_dir = config_dir()?;
    CONFIG_FILENAMES
        .iter()
        .map(|name| config_dir.join(name))
        .find(|p| p.exists())
}

/// Returns the user-global config directory (`~/.config/mqttgram/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "mqttgram").map(|d| d.config_dir().to_path_buf())
}

/// Returns the data directory holding the subscriber list.
pub fn data_dir() -> Result<PathBuf> {
    directories::ProjectDirs::from("", "", "mqttgram")
        .map(|d| d.data_dir().to_path_buf())
        .context("could not determine a data directory; set SUBSCRIBERS_FILE")
}

fn parse_config(raw: &str, path: &Path) -> Result<BridgeConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");
    let parse_err = |message: String| Error::Parse {
        path: path.to_path_buf(),
        message,
    };

    match ext {
        "toml" => toml::from_str(raw).map_err(|e| parse_err(e.to_string())),
        "yaml" | "yml" => serde_yaml::from_str(raw).map_err(|e| parse_err(e.to_string())),
        "json" => serde_json::from_str(raw).map_err(|e| parse_err(e.to_string())),
        other => Err(Error::UnsupportedFormat {
            extension: other.to_string(),
        }),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_yaml_and_json() {
        let dir = tempfile::tempdir().unwrap();

        let yaml = dir.path().join("mqttgram.yaml");
        std::fs::write(&yaml, "mqtt:\n  broker: yaml-host\n").unwrap();
        assert_eq!(load_config(&yaml).unwrap().mqtt.broker, "yaml-host");

        let json = dir.path().join("mqttgram.json");
        std::fs::write(&json, r#"{"dispatch": {"timeout_secs": 7}}"#).unwrap();
        assert_eq!(load_config(&json).unwrap().dispatch.timeout_secs, 7);
    }

    #[test]
    fn parse_error_names_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mqttgram.toml");
        std::fs::write(&path, "[mqtt\nbroker = ").unwrap();
        let err = load_config(&path).unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
        assert!(err.to_string().contains("mqttgram.toml"));
    }

    #[test]
    fn unsupported_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mqttgram.ini");
        std::fs::write(&path, "x=1").unwrap();
        assert!(matches!(
            load_config(&path),
            Err(Error::UnsupportedFormat { .. })
        ));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = load_config(Path::new("/nonexistent/mqttgram.toml")).unwrap_err();
        assert!(matches!(err, Error::Read { .. }));
    }
}
