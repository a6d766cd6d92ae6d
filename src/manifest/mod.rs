// ABOUTME: In-memory model of the scion-compose.yml service manifest.
// ABOUTME: Typed access to image, build, environment and labels; other keys pass through verbatim.

mod environment;
mod mode;

pub use environment::{EnvFiles, Environment, Labels};
pub use mode::{DeploymentMode, MODE_LABEL, ServiceMode};

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::error::ValidationError;
use crate::types::ServiceName;

/// Manifest file the user edits.
pub const MANIFEST_FILENAME: &str = "scion-compose.yml";
/// Resolved manifest as it is stored on the remote host.
pub const REMOTE_MANIFEST_FILENAME: &str = "docker-compose.yml";
/// Build file used when a build descriptor names none.
pub const DEFAULT_BUILD_FILE: &str = "Dockerfile";

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid manifest: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid service name {name:?}: {reason}")]
    InvalidServiceName { name: String, reason: String },
}

pub type Result<T> = std::result::Result<T, ManifestError>;

/// A compose document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComposeFile {
    #[serde(default)]
    pub services: Services,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl ComposeFile {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let compose: ComposeFile = serde_yaml::from_str(yaml)?;
        for name in compose.services.names() {
            ServiceName::new(name).map_err(|e| ManifestError::InvalidServiceName {
                name: name.to_string(),
                reason: e.to_string(),
            })?;
        }
        Ok(compose)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ManifestError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn service(&self, name: &str) -> Option<&ComposeService> {
        self.services.get(name)
    }
}

/// Services keyed by name, in manifest order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Services(Vec<(String, ComposeService)>);

impl Services {
    pub fn get(&self, name: &str) -> Option<&ComposeService> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, s)| s)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut ComposeService> {
        self.0.iter_mut().find(|(n, _)| n == name).map(|(_, s)| s)
    }

    /// Insert or replace a service, keeping the position of an existing entry.
    pub fn insert(&mut self, name: impl Into<String>, service: ComposeService) {
        let name = name.into();
        match self.get_mut(&name) {
            Some(existing) => *existing = service,
            None => self.0.push((name, service)),
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ComposeService)> {
        self.0.iter().map(|(n, s)| (n.as_str(), s))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut ComposeService)> {
        self.0.iter_mut().map(|(n, s)| (n.as_str(), s))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for Services {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, service) in &self.0 {
            map.serialize_entry(name, service)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Services {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct ServicesVisitor;

        impl<'de> Visitor<'de> for ServicesVisitor {
            type Value = Services;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a mapping of service names to services")
            }

            fn visit_unit<E: serde::de::Error>(self) -> std::result::Result<Services, E> {
                Ok(Services::default())
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut access: A,
            ) -> std::result::Result<Services, A::Error> {
                let mut services = Vec::new();
                while let Some((name, service)) =
                    access.next_entry::<String, Option<ComposeService>>()?
                {
                    services.push((name, service.unwrap_or_default()));
                }
                Ok(Services(services))
            }
        }

        deserializer.deserialize_any(ServicesVisitor)
    }
}

/// One service entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComposeService {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<BuildSpec>,

    #[serde(default, skip_serializing_if = "Environment::is_empty")]
    pub environment: Environment,

    #[serde(default, skip_serializing_if = "EnvFiles::is_empty")]
    pub env_file: EnvFiles,

    #[serde(default, skip_serializing_if = "Labels::is_empty")]
    pub labels: Labels,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl ComposeService {
    /// Mode named by the service's label, if it has one.
    pub fn mode_label(&self) -> Option<String> {
        self.labels.get(MODE_LABEL)
    }

    /// The label's mode, or the mode implied by the project when unlabeled.
    pub fn effective_mode(
        &self,
        name: &str,
        project_mode: DeploymentMode,
    ) -> std::result::Result<ServiceMode, ValidationError> {
        match self.mode_label() {
            Some(value) => value.parse().map_err(|value| ValidationError::UnknownMode {
                service: name.to_string(),
                value,
            }),
            None => Ok(project_mode.service_mode()),
        }
    }

    /// Whether the service carries any literal or file-based environment.
    pub fn has_environment_source(&self) -> bool {
        !self.environment.is_empty() || !self.env_file.is_empty()
    }
}

/// A build descriptor: `build: ./dir` or `build: {context, dockerfile, ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "BuildSpecRepr")]
pub struct BuildSpec {
    pub context: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dockerfile: Option<String>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl BuildSpec {
    pub fn new(context: impl Into<String>) -> Self {
        Self {
            context: context.into(),
            dockerfile: None,
            extra: BTreeMap::new(),
        }
    }

    pub fn build_file(&self) -> &str {
        self.dockerfile.as_deref().unwrap_or(DEFAULT_BUILD_FILE)
    }

    /// Directory name the context gets on the remote host.
    ///
    /// The service name stands in when the context is the manifest directory itself.
    pub fn context_name(&self, service: &str) -> String {
        let trimmed = self.context.trim_end_matches('/');
        match Path::new(trimmed).file_name().and_then(|n| n.to_str()) {
            Some(name) if trimmed != "." && !trimmed.is_empty() => name.to_string(),
            _ => service.to_string(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum BuildSpecRepr {
    Short(String),
    Full {
        #[serde(default)]
        context: Option<String>,
        #[serde(default)]
        dockerfile: Option<String>,
        #[serde(flatten)]
        extra: BTreeMap<String, Value>,
    },
}

impl From<BuildSpecRepr> for BuildSpec {
    fn from(repr: BuildSpecRepr) -> Self {
        match repr {
            BuildSpecRepr::Short(context) => BuildSpec::new(context),
            BuildSpecRepr::Full {
                context,
                dockerfile,
                extra,
            } => BuildSpec {
                context: context.unwrap_or_else(|| ".".to_string()),
                dockerfile,
                extra,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"
services:
  frontend:
    image: nginx:1.27
    ports:
      - "80:80"
  backend:
    build:
      context: ./api
      dockerfile: Dockerfile.prod
      args:
        NODE_ENV: production
    environment:
      PORT: 3000
    labels:
      - scion.mode=serverbuild
  worker:
    build: ./worker
volumes:
  data: {}
"#;

    #[test]
    fn preserves_service_order_and_extras() {
        let compose = ComposeFile::from_yaml(MANIFEST).unwrap();
        let names: Vec<_> = compose.services.names().collect();
        assert_eq!(names, vec!["frontend", "backend", "worker"]);
        assert!(compose.extra.contains_key("volumes"));

        let frontend = compose.service("frontend").unwrap();
        assert!(frontend.extra.contains_key("ports"));
    }

    #[test]
    fn parses_build_forms() {
        let compose = ComposeFile::from_yaml(MANIFEST).unwrap();

        let backend = compose.service("backend").unwrap().build.as_ref().unwrap();
        assert_eq!(backend.context, "./api");
        assert_eq!(backend.build_file(), "Dockerfile.prod");
        assert!(backend.extra.contains_key("args"));

        let worker = compose.service("worker").unwrap().build.as_ref().unwrap();
        assert_eq!(worker.context, "./worker");
        assert_eq!(worker.build_file(), "Dockerfile");
    }

    #[test]
    fn reserializes_without_losing_keys() {
        let compose = ComposeFile::from_yaml(MANIFEST).unwrap();
        let yaml = compose.to_yaml().unwrap();
        let reparsed = ComposeFile::from_yaml(&yaml).unwrap();
        assert_eq!(compose, reparsed);
    }

    #[test]
    fn context_name_falls_back_to_service() {
        assert_eq!(BuildSpec::new("./api").context_name("backend"), "api");
        assert_eq!(BuildSpec::new("services/api/").context_name("backend"), "api");
        assert_eq!(BuildSpec::new(".").context_name("backend"), "backend");
        assert_eq!(BuildSpec::new("/").context_name("backend"), "backend");
    }

    #[test]
    fn rejects_invalid_service_names() {
        let err = ComposeFile::from_yaml("services:\n  \"bad/name\":\n    image: x\n").unwrap_err();
        assert!(matches!(err, ManifestError::InvalidServiceName { .. }));
    }

    #[test]
    fn effective_mode_prefers_label() {
        let compose = ComposeFile::from_yaml(MANIFEST).unwrap();
        let backend = compose.service("backend").unwrap();
        let worker = compose.service("worker").unwrap();

        assert_eq!(
            backend.effective_mode("backend", DeploymentMode::Cloud).unwrap(),
            ServiceMode::Serverbuild
        );
        assert_eq!(
            worker.effective_mode("worker", DeploymentMode::GitManual).unwrap(),
            ServiceMode::GitManual
        );
    }

    #[test]
    fn unknown_mode_label_is_rejected() {
        let compose =
            ComposeFile::from_yaml("services:\n  web:\n    image: x\n    labels: [scion.mode=magic]\n")
                .unwrap();
        let err = compose
            .service("web")
            .unwrap()
            .effective_mode("web", DeploymentMode::default())
            .unwrap_err();
        assert!(matches!(err, ValidationError::UnknownMode { value, .. } if value == "magic"));
    }

    #[test]
    fn insert_keeps_position() {
        let mut compose = ComposeFile::from_yaml(MANIFEST).unwrap();
        compose.services.insert("frontend", ComposeService::default());
        compose.services.insert("cache", ComposeService::default());
        let names: Vec<_> = compose.services.names().collect();
        assert_eq!(names, vec!["frontend", "backend", "worker", "cache"]);
    }
}
