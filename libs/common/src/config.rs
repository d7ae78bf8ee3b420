//! Configuration loading helpers
//!
//! Services describe their configuration as a serde type and load it through
//! figment: an optional file (format chosen by extension) overlaid with
//! prefixed environment variables. Nested keys use `__` as separator, so
//! `METERSRV_HISTORY__CAPACITY=10` sets `history.capacity`.

use std::path::Path;

use errors::{config_error, MeterError, MeterResult};
use figment::{
    providers::{Env, Format, Json, Serialized, Toml, Yaml},
    Figment,
};
use serde::{de::DeserializeOwned, Serialize};

/// Build the figment for a file path, picking the provider from the extension
fn file_figment(path: &Path) -> MeterResult<Figment> {
    let extension = path
        .extension()
        .and_then(|s| s.to_str())
        .ok_or_else(|| config_error!("Config file must have an extension"))?;

    let figment = match extension {
        "toml" => Figment::new().merge(Toml::file(path)),
        "yaml" | "yml" => Figment::new().merge(Yaml::file(path)),
        "json" => Figment::new().merge(Json::file(path)),
        _ => {
            return Err(config_error!(
                "Unsupported config file format: {}",
                extension
            ))
        },
    };
    Ok(figment)
}

/// Load configuration from defaults, an optional file and the environment
///
/// Priority (highest to lowest):
/// 1. Environment variables starting with `env_prefix`
/// 2. The file at `path`
/// 3. `T::default()`
pub fn load_config<T>(path: Option<&Path>, env_prefix: &str) -> MeterResult<T>
where
    T: DeserializeOwned + Serialize + Default,
{
    let mut figment = Figment::from(Serialized::defaults(T::default()));

    if let Some(path) = path {
        if !path.exists() {
            return Err(MeterError::FileNotFound(path.display().to_string()));
        }
        figment = figment.merge(file_figment(path)?);
    }

    figment
        .merge(Env::prefixed(env_prefix).split("__"))
        .extract()
        .map_err(|e| config_error!("Failed to load configuration: {}", e))
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::io::Write;
    use tempfile::Builder;

    #[derive(Debug, Default, Deserialize, Serialize, PartialEq)]
    struct TestConfig {
        name: String,
        #[serde(default)]
        nested: NestedConfig,
    }

    #[derive(Debug, Deserialize, Serialize, PartialEq)]
    struct NestedConfig {
        capacity: usize,
    }

    impl Default for NestedConfig {
        fn default() -> Self {
            Self { capacity: 16 }
        }
    }

    fn write_temp(suffix: &str, content: &str) -> tempfile::NamedTempFile {
        let mut file = Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_yaml_file() {
        let file = write_temp(".yaml", "name: basement\nnested:\n  capacity: 4\n");
        let config: TestConfig = load_config(Some(file.path()), "COMMON_TEST_UNUSED_").unwrap();
        assert_eq!(config.name, "basement");
        assert_eq!(config.nested.capacity, 4);
    }

    #[test]
    fn test_load_toml_with_defaults() {
        let file = write_temp(".toml", "name = \"garage\"\n");
        let config: TestConfig = load_config(Some(file.path()), "COMMON_TEST_UNUSED_").unwrap();
        assert_eq!(config.name, "garage");
        assert_eq!(config.nested, NestedConfig::default());
    }

    #[test]
    fn test_defaults_without_file() {
        let config: TestConfig = load_config(None, "COMMON_TEST_UNUSED_").unwrap();
        assert_eq!(config, TestConfig::default());
    }

    #[test]
    fn test_unsupported_extension() {
        let file = write_temp(".ini", "name=x");
        let err = load_config::<TestConfig>(Some(file.path()), "COMMON_TEST_UNUSED_").unwrap_err();
        assert!(err.to_string().contains("Unsupported config file format"));
    }

    #[test]
    fn test_missing_file() {
        let err =
            load_config::<TestConfig>(Some(Path::new("/nonexistent/meters.yaml")), "X_").unwrap_err();
        assert!(matches!(err, MeterError::FileNotFound(_)));
    }
}
