//! PF-009: Translation configuration (YAML).
//!
//! Everything a caller can tune about one translation: container handling,
//! resource overrides, extra inputs-file values and resource ceilings.

use super::error::{Result, TranslateError};
use super::translator::{InputsRequest, TranslateOptions};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Container image override.
///
/// A bare string applies to every tool; a map is keyed by tool id
/// (case-insensitive) with `*` as the fallback key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContainerOverride {
    All(String),
    PerTool(IndexMap<String, String>),
}

impl ContainerOverride {
    /// Image for a tool, if the override covers it.
    pub fn lookup(&self, tool_id: &str) -> Option<&str> {
        match self {
            Self::All(image) => Some(image),
            Self::PerTool(map) => map
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(tool_id))
                .or_else(|| map.iter().find(|(k, _)| k.as_str() == "*"))
                .map(|(_, v)| v.as_str()),
        }
    }
}

/// Top-level translation config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslationConfig {
    #[serde(default = "default_true")]
    pub with_container: bool,

    #[serde(default)]
    pub with_resource_overrides: bool,

    #[serde(default)]
    pub allow_empty_container: bool,

    #[serde(default)]
    pub container_override: Option<ContainerOverride>,

    /// Values merged into the generated inputs file
    #[serde(default)]
    pub additional_inputs: IndexMap<String, serde_json::Value>,

    /// Hint key/value pairs selecting `hinted` resource entries
    #[serde(default)]
    pub hints: IndexMap<String, String>,

    #[serde(default)]
    pub merge_resources: bool,

    #[serde(default)]
    pub max_cores: Option<i64>,

    /// GB
    #[serde(default)]
    pub max_mem: Option<f64>,

    /// Seconds
    #[serde(default)]
    pub max_duration: Option<i64>,
}

fn default_true() -> bool {
    true
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            with_container: true,
            with_resource_overrides: false,
            allow_empty_container: false,
            container_override: None,
            additional_inputs: IndexMap::new(),
            hints: IndexMap::new(),
            merge_resources: false,
            max_cores: None,
            max_mem: None,
            max_duration: None,
        }
    }
}

impl TranslationConfig {
    /// Load a config file from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            TranslateError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml_ng::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if matches!(self.max_cores, Some(c) if c < 1) {
            return Err(TranslateError::Config("max_cores must be at least 1".to_string()));
        }
        if matches!(self.max_mem, Some(m) if m <= 0.0) {
            return Err(TranslateError::Config("max_mem must be positive".to_string()));
        }
        if matches!(self.max_duration, Some(d) if d < 1) {
            return Err(TranslateError::Config(
                "max_duration must be at least 1 second".to_string(),
            ));
        }
        Ok(())
    }

    pub fn options(&self) -> TranslateOptions {
        TranslateOptions {
            with_container: self.with_container,
            with_resource_overrides: self.with_resource_overrides,
            allow_empty_container: self.allow_empty_container,
            container_override: self.container_override.clone(),
        }
    }

    pub fn inputs_request(&self) -> InputsRequest {
        InputsRequest {
            additional_inputs: self.additional_inputs.clone(),
            hints: self.hints.clone(),
            merge_resources: self.merge_resources,
            max_cores: self.max_cores,
            max_mem: self.max_mem,
            max_duration: self.max_duration,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pf009_defaults() {
        let c = TranslationConfig::from_yaml("{}").unwrap();
        assert!(c.with_container);
        assert!(!c.allow_empty_container);
        assert_eq!(c, TranslationConfig::default());
    }

    #[test]
    fn test_pf009_full_config() {
        let yaml = r#"
with_container: false
with_resource_overrides: true
container_override:
  BWA: "biocontainers/bwa:0.7.17"
  "*": "ubuntu:22.04"
additional_inputs:
  reads: /data/r1.fq
  threads: 8
hints:
  captureType: targeted
merge_resources: true
max_cores: 4
max_mem: 16.5
"#;
        let c = TranslationConfig::from_yaml(yaml).unwrap();
        assert!(!c.with_container);
        assert!(c.with_resource_overrides);
        assert_eq!(c.additional_inputs["threads"], serde_json::json!(8));
        assert_eq!(c.hints["captureType"], "targeted");
        assert_eq!(c.max_mem, Some(16.5));
        let opts = c.options();
        assert!(opts.with_resource_overrides);
        let req = c.inputs_request();
        assert!(req.merge_resources);
        assert_eq!(req.max_cores, Some(4));
    }

    #[test]
    fn test_pf009_override_lookup() {
        let all = ContainerOverride::All("alpine".to_string());
        assert_eq!(all.lookup("anything"), Some("alpine"));

        let per: ContainerOverride =
            serde_yaml_ng::from_str("{BWA: bwa:1, \"*\": base:1}").unwrap();
        assert_eq!(per.lookup("bwa"), Some("bwa:1"));
        assert_eq!(per.lookup("samtools"), Some("base:1"));

        let strict: ContainerOverride = serde_yaml_ng::from_str("{bwa: bwa:1}").unwrap();
        assert_eq!(strict.lookup("samtools"), None);
    }

    #[test]
    fn test_pf009_rejects_bad_ceilings() {
        assert!(TranslationConfig::from_yaml("max_cores: 0").is_err());
        assert!(TranslationConfig::from_yaml("max_mem: -1").is_err());
        assert!(TranslationConfig::from_yaml("max_duration: 0").is_err());
    }

    #[test]
    fn test_pf009_load_missing_file() {
        let err = TranslationConfig::load(Path::new("/nonexistent/polyflow.yaml")).unwrap_err();
        assert_eq!(err.code(), "CONFIG_ERROR");
    }
}
