mod settings;

pub use settings::Config;

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::scoring::Value;

/// Get the config directory path (~/.config/gym-score/)
pub fn get_config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".config").join("gym-score"))
}

/// Get the default config file path (~/.config/gym-score/config.yaml)
pub fn get_config_path() -> Option<PathBuf> {
    get_config_dir().map(|dir| dir.join("config.yaml"))
}

/// Load CLI settings from a YAML file
///
/// With no explicit path, a missing default file yields the defaults.
///
/// # Errors
///
/// Returns an error if:
/// - An explicitly given config file does not exist
/// - The config file cannot be read
/// - The YAML cannot be parsed
pub fn load_config(path: Option<PathBuf>) -> Result<Config> {
    let config_path = match path {
        Some(path) => {
            if !path.exists() {
                anyhow::bail!("Config file not found at {}", path.display());
            }
            path
        }
        None => match get_config_path() {
            Some(path) if path.exists() => path,
            _ => return Ok(Config::default()),
        },
    };

    let config_content = fs::read_to_string(&config_path)
        .with_context(|| format!("Failed to read config file at {}", config_path.display()))?;

    let config: Config = serde_saphyr::from_str(&config_content).with_context(|| {
        format!("Failed to parse config: invalid YAML in {}", config_path.display())
    })?;

    Ok(config)
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase).as_deref(),
        Some("yaml" | "yml")
    )
}

/// Load a JSON or YAML document (chosen by extension) as untyped JSON.
pub fn load_document(path: &Path) -> Result<serde_json::Value> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    if is_yaml(path) {
        serde_saphyr::from_str(&content)
            .with_context(|| format!("Failed to parse YAML in {}", path.display()))
    } else {
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse JSON in {}", path.display()))
    }
}

/// Load raw judge inputs: a map of field code (or crash key) to value.
pub fn load_inputs(path: &Path) -> Result<BTreeMap<String, Value>> {
    let doc = load_document(path)?;
    if !doc.is_object() {
        anyhow::bail!("Inputs in {} must be a map of field codes", path.display());
    }
    serde_json::from_value(doc)
        .with_context(|| format!("Failed to read inputs from {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    fn write_temp(name: &str, content: &str) -> PathBuf {
        let path = env::temp_dir().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_load_explicit_missing_config_fails() {
        let path = env::temp_dir().join("gym_score_test_missing_config.yaml");
        let _ = fs::remove_file(&path);
        let err = load_config(Some(path)).unwrap_err();
        assert!(err.to_string().contains("Config file not found"));
    }

    #[test]
    fn test_load_config_file() {
        let path = write_temp("gym_score_test_config.yaml", "log_level: info\nprecision: 1\n");
        let config = load_config(Some(path)).unwrap();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.precision, 1);
    }

    #[test]
    fn test_load_yaml_and_json_documents() {
        let yaml = write_temp("gym_score_test_doc.yml", "fields:\n  - code: DD\n    type: number\n");
        let json = write_temp("gym_score_test_doc.json", r#"{"fields": [{"code": "DD", "type": "number"}]}"#);
        assert_eq!(load_document(&yaml).unwrap(), load_document(&json).unwrap());
    }

    #[test]
    fn test_load_inputs() {
        let path = write_temp("gym_score_test_inputs.json", r#"{"DD": 4.5, "E": [[1, 2]]}"#);
        let inputs = load_inputs(&path).unwrap();
        assert_eq!(inputs["DD"], Value::Number(4.5));
        assert_eq!(inputs["E"], Value::from(vec![vec![1.0, 2.0]]));
    }

    #[test]
    fn test_load_inputs_rejects_list() {
        let path = write_temp("gym_score_test_inputs_list.json", "[1, 2]");
        assert!(load_inputs(&path).is_err());
    }

    #[test]
    fn test_invalid_json_reports_path() {
        let path = write_temp("gym_score_test_bad.json", "{not json");
        let err = load_document(&path).unwrap_err();
        assert!(err.to_string().contains("gym_score_test_bad.json"));
    }
}
