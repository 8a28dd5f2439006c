// Variable store: a flat YAML mapping read at startup and on reload_vars
use crate::error::{RunnerError, RunnerResult};
use serde_yaml::Value as YamlValue;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub type Variables = BTreeMap<String, String>;

#[derive(Debug, Clone)]
pub struct VariableStore {
    path: PathBuf,
}

impl VariableStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the whole mapping. `Ok(None)` when the file does not exist.
    pub async fn load(&self) -> RunnerResult<Option<Variables>> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.error(e.to_string())),
        };
        parse_variables(&text)
            .map(Some)
            .map_err(|description| self.error(description))
    }

    /// Load for startup: a missing or unreadable store yields an empty mapping.
    pub async fn load_or_empty(&self) -> Variables {
        match self.load().await {
            Ok(Some(vars)) => {
                log::info!("📒 Loaded {} variable(s) from {}", vars.len(), self.path.display());
                vars
            }
            Ok(None) => {
                log::debug!("No variable store at {}", self.path.display());
                Variables::new()
            }
            Err(e) => {
                log::warn!("⚠️ {}", e);
                Variables::new()
            }
        }
    }

    fn error(&self, description: String) -> RunnerError {
        RunnerError::Variables {
            path: self.path.clone(),
            description,
        }
    }
}

/// Parse a YAML document into a string mapping. Scalars are stringified,
/// an empty document is an empty mapping.
pub fn parse_variables(text: &str) -> Result<Variables, String> {
    let doc: YamlValue = serde_yaml::from_str(text).map_err(|e| e.to_string())?;
    let mapping = match doc {
        YamlValue::Null => return Ok(Variables::new()),
        YamlValue::Mapping(mapping) => mapping,
        other => return Err(format!("expected a mapping, found {}", yaml_kind(&other))),
    };
    let mut vars = Variables::new();
    for (key, value) in mapping {
        let key = scalar_to_string(&key).ok_or_else(|| "keys must be scalars".to_string())?;
        let value = scalar_to_string(&value)
            .ok_or_else(|| format!("value of '{key}' must be a scalar"))?;
        vars.insert(key, value);
    }
    Ok(vars)
}

fn scalar_to_string(value: &YamlValue) -> Option<String> {
    match value {
        YamlValue::String(s) => Some(s.clone()),
        YamlValue::Number(n) => Some(n.to_string()),
        YamlValue::Bool(b) => Some(b.to_string()),
        YamlValue::Null => Some(String::new()),
        _ => None,
    }
}

fn yaml_kind(value: &YamlValue) -> &'static str {
    match value {
        YamlValue::Sequence(_) => "a sequence",
        YamlValue::Tagged(_) => "a tagged value",
        _ => "a scalar",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_scalars() {
        let vars = parse_variables("user: alice\nretries: 3\nenabled: true\nempty:\n").unwrap();
        assert_eq!(vars["user"], "alice");
        assert_eq!(vars["retries"], "3");
        assert_eq!(vars["enabled"], "true");
        assert_eq!(vars["empty"], "");
    }

    #[test]
    fn test_parse_rejects_nested() {
        assert!(parse_variables("- a\n- b\n").is_err());
        assert!(parse_variables("a:\n  b: 1\n").is_err());
        assert!(parse_variables("").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_store_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = VariableStore::new(dir.path().join("variables.yaml"));
        assert_eq!(store.load().await.unwrap(), None);
        assert!(store.load_or_empty().await.is_empty());
    }

    #[tokio::test]
    async fn test_reload_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("variables.yaml");
        std::fs::write(&path, "user: alice\ncode: '0042'\n").unwrap();
        let store = VariableStore::new(&path);
        let first = store.load().await.unwrap();
        let second = store.load().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.unwrap()["code"], "0042");
    }

    #[tokio::test]
    async fn test_invalid_store_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("variables.yaml");
        std::fs::write(&path, "just a string").unwrap();
        let err = VariableStore::new(&path).load().await.unwrap_err();
        assert!(matches!(err, RunnerError::Variables { .. }));
    }
}
