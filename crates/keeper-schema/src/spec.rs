use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SpecError {
    #[error("failed to read spec file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse spec: {0}")]
    ParseJson(#[from] serde_json::Error),
    #[error("failed to parse spec: {0}")]
    ParseYaml(#[from] serde_yaml::Error),
    #[error("name must not be empty")]
    EmptyName,
    #[error("invalid container name '{0}': expected [A-Za-z0-9][A-Za-z0-9_.-]*")]
    InvalidName(String),
    #[error("image must not be empty")]
    EmptyImage,
    #[error("environment variable name must not be empty")]
    EmptyEnvName,
    #[error("invalid environment variable name '{0}': must not contain '='")]
    InvalidEnvName(String),
    #[error("duplicate environment variable '{0}'")]
    DuplicateEnv(String),
    #[error("volume mount #{index} must have a non-empty source and target")]
    InvalidVolume { index: usize },
}

/// Desired state of the single container managed by one invocation.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: Vec<EnvVar>,
    #[serde(default)]
    pub volume_mounts: Vec<VolumeMount>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct EnvVar {
    pub name: String,
    #[serde(default)]
    pub value: String,
}

/// A bind mount passed through to the backend untouched.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct VolumeMount {
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub read_only: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecFormat {
    Json,
    Yaml,
}

impl SpecFormat {
    /// `.yaml` and `.yml` select YAML, everything else is read as JSON.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml" | "yml") => SpecFormat::Yaml,
            _ => SpecFormat::Json,
        }
    }
}

impl ContainerSpec {
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            command: Vec::new(),
            args: Vec::new(),
            env: Vec::new(),
            volume_mounts: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push(EnvVar {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    pub fn validate(&self) -> Result<(), SpecError> {
        if self.name.trim().is_empty() {
            return Err(SpecError::EmptyName);
        }
        if !is_valid_name(&self.name) {
            return Err(SpecError::InvalidName(self.name.clone()));
        }
        if self.image.trim().is_empty() {
            return Err(SpecError::EmptyImage);
        }

        let mut seen = std::collections::BTreeSet::new();
        for var in &self.env {
            if var.name.is_empty() {
                return Err(SpecError::EmptyEnvName);
            }
            if var.name.contains('=') {
                return Err(SpecError::InvalidEnvName(var.name.clone()));
            }
            if !seen.insert(var.name.as_str()) {
                return Err(SpecError::DuplicateEnv(var.name.clone()));
            }
        }

        for (index, mount) in self.volume_mounts.iter().enumerate() {
            if mount.source.trim().is_empty() || mount.target.trim().is_empty() {
                return Err(SpecError::InvalidVolume { index });
            }
        }

        Ok(())
    }

    /// Environment as a name-ordered map.
    pub fn environment(&self) -> BTreeMap<String, String> {
        self.env
            .iter()
            .map(|v| (v.name.clone(), v.value.clone()))
            .collect()
    }
}

fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    first.is_ascii_alphanumeric()
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

pub fn parse_spec_str(input: &str, format: SpecFormat) -> Result<ContainerSpec, SpecError> {
    let spec: ContainerSpec = match format {
        SpecFormat::Json => serde_json::from_str(input)?,
        SpecFormat::Yaml => serde_yaml::from_str(input)?,
    };
    spec.validate()?;
    Ok(spec)
}

pub fn parse_spec_file(path: impl AsRef<Path>) -> Result<ContainerSpec, SpecError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)?;
    parse_spec_str(&content, SpecFormat::from_path(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_json_spec() {
        let input = r#"{
  "name": "web",
  "image": "nginx:1.25",
  "command": ["nginx"],
  "args": ["-g", "daemon off;"],
  "env": [{"name": "MODE", "value": "prod"}],
  "volumeMounts": [
    {"source": "/srv/www", "target": "/usr/share/nginx/html", "readOnly": true},
    {"source": "/var/log/web", "target": "/var/log/nginx"}
  ]
}"#;
        let spec = parse_spec_str(input, SpecFormat::Json).expect("should parse");
        assert_eq!(spec.name, "web");
        assert_eq!(spec.image, "nginx:1.25");
        assert_eq!(spec.command, vec!["nginx"]);
        assert_eq!(spec.args.len(), 2);
        assert_eq!(spec.environment().get("MODE").map(String::as_str), Some("prod"));
        assert!(spec.volume_mounts[0].read_only);
        assert!(!spec.volume_mounts[1].read_only);
    }

    #[test]
    fn parses_minimal_yaml_spec() {
        let input = r"
name: web
image: nginx:1.25
";
        let spec = parse_spec_str(input, SpecFormat::Yaml).expect("should parse");
        assert!(spec.command.is_empty());
        assert!(spec.args.is_empty());
        assert!(spec.env.is_empty());
        assert!(spec.volume_mounts.is_empty());
    }

    #[test]
    fn yaml_and_json_decode_to_the_same_spec() {
        let json = r#"{"name":"db","image":"postgres:16","env":[{"name":"PGDATA","value":"/data"}]}"#;
        let yaml = r"
name: db
image: postgres:16
env:
  - name: PGDATA
    value: /data
";
        assert_eq!(
            parse_spec_str(json, SpecFormat::Json).unwrap(),
            parse_spec_str(yaml, SpecFormat::Yaml).unwrap()
        );
    }

    #[test]
    fn rejects_unknown_fields() {
        let input = r#"{"name": "web", "image": "nginx", "restart": "always"}"#;
        assert!(parse_spec_str(input, SpecFormat::Json).is_err());
    }

    #[test]
    fn rejects_missing_image() {
        let input = r#"{"name": "web"}"#;
        assert!(parse_spec_str(input, SpecFormat::Json).is_err());
    }

    #[test]
    fn rejects_empty_image() {
        let input = r#"{"name": "web", "image": "  "}"#;
        assert!(matches!(
            parse_spec_str(input, SpecFormat::Json),
            Err(SpecError::EmptyImage)
        ));
    }

    #[test]
    fn rejects_invalid_names() {
        for name in ["", "-web", "web/1", "web app"] {
            let spec = ContainerSpec::new(name, "nginx");
            assert!(spec.validate().is_err(), "name '{name}' must be rejected");
        }
        assert!(ContainerSpec::new("web_1.prod-a", "nginx").validate().is_ok());
    }

    #[test]
    fn rejects_duplicate_env_names() {
        let spec = ContainerSpec::new("web", "nginx")
            .with_env("A", "1")
            .with_env("A", "2");
        assert!(matches!(spec.validate(), Err(SpecError::DuplicateEnv(n)) if n == "A"));
    }

    #[test]
    fn rejects_equals_sign_in_env_name() {
        let input = r#"{"name":"web","image":"nginx","env":[{"name":"A=1","value":""}]}"#;
        assert!(matches!(
            parse_spec_str(input, SpecFormat::Json),
            Err(SpecError::InvalidEnvName(n)) if n == "A=1"
        ));
        let spec = ContainerSpec::new("web", "nginx").with_env("A", "x=y");
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn rejects_volume_without_target() {
        let input = r#"{"name":"web","image":"nginx","volumeMounts":[{"source":"/a","target":""}]}"#;
        assert!(matches!(
            parse_spec_str(input, SpecFormat::Json),
            Err(SpecError::InvalidVolume { index: 0 })
        ));
    }

    #[test]
    fn format_follows_file_suffix() {
        assert_eq!(SpecFormat::from_path(Path::new("a.yaml")), SpecFormat::Yaml);
        assert_eq!(SpecFormat::from_path(Path::new("a.yml")), SpecFormat::Yaml);
        assert_eq!(SpecFormat::from_path(Path::new("a.json")), SpecFormat::Json);
        assert_eq!(SpecFormat::from_path(Path::new("spec")), SpecFormat::Json);
    }

    #[test]
    fn parse_file_reads_yaml_by_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("web.yml");
        fs::write(&path, "name: web\nimage: nginx:1.25\n").unwrap();
        let spec = parse_spec_file(&path).unwrap();
        assert_eq!(spec.image, "nginx:1.25");
    }

    #[test]
    fn parse_file_missing_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = parse_spec_file(dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, SpecError::Io(_)));
    }
}
