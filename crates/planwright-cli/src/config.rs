//! Engine configuration loader.
//!
//! Reads `config.toml` from `~/.planwright/` (or an explicit `--config` path)
//! and deserializes it into [`EngineConfig`]. Falls back to defaults when the
//! file is missing or malformed.

use std::path::{Path, PathBuf};

use planwright_types::config::EngineConfig;

/// `~/.planwright/config.toml`, if a home directory can be determined.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".planwright").join("config.toml"))
}

/// Load engine configuration from `path`, or the default location when None.
///
/// - If the file does not exist, returns [`EngineConfig::default()`].
/// - If the file cannot be read or parsed, logs a warning and returns the default.
pub async fn load_engine_config(path: Option<&Path>) -> EngineConfig {
    let config_path = match path {
        Some(path) => path.to_path_buf(),
        None => match default_config_path() {
            Some(path) => path,
            None => {
                tracing::debug!("No home directory, using default engine config");
                return EngineConfig::default();
            }
        },
    };

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config at {}, using defaults", config_path.display());
            return EngineConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return EngineConfig::default();
        }
    };

    match toml::from_str::<EngineConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(
                "Failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            EngineConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn load_engine_config_missing_file_returns_default() {
        let tmp = TempDir::new().unwrap();
        let config = load_engine_config(Some(&tmp.path().join("config.toml"))).await;
        assert_eq!(config, EngineConfig::default());
    }

    #[tokio::test]
    async fn load_engine_config_valid_toml_returns_parsed() {
        let tmp = TempDir::new().unwrap();
        let config_path = tmp.path().join("config.toml");
        tokio::fs::write(
            &config_path,
            r#"
max_concurrency = 4
step_timeout_secs = 30
max_attempts = 2
"#,
        )
        .await
        .unwrap();

        let config = load_engine_config(Some(&config_path)).await;
        assert_eq!(config.max_concurrency, Some(4));
        assert_eq!(config.step_timeout_secs, Some(30));
        assert_eq!(config.plan_timeout_secs, None);
        assert_eq!(config.max_attempts, 2);
        assert_eq!(config.event_capacity, 1024);
    }

    #[tokio::test]
    async fn load_engine_config_malformed_returns_default() {
        let tmp = TempDir::new().unwrap();
        let config_path = tmp.path().join("config.toml");
        tokio::fs::write(&config_path, "max_concurrency = \"lots\"")
            .await
            .unwrap();

        let config = load_engine_config(Some(&config_path)).await;
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn default_config_path_is_under_dot_planwright() {
        if let Some(path) = default_config_path() {
            assert!(path.ends_with(".planwright/config.toml"));
        }
    }
}
