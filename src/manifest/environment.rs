// ABOUTME: Environment, env_file, and label fields of a compose service.
// ABOUTME: Normalizes list and map spellings into a single representation on load.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_yaml::Value;

/// Literal environment entries, normalized to ordered `KEY=VALUE` lines.
///
/// Compose accepts either a list of `KEY=VALUE` strings or a mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment(Vec<String>);

impl Environment {
    pub fn new(entries: Vec<String>) -> Self {
        Self(entries)
    }

    pub fn entries(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum EnvironmentRepr {
    List(Vec<Value>),
    Map(serde_yaml::Mapping),
}

impl<'de> Deserialize<'de> for Environment {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let entries = match Option::<EnvironmentRepr>::deserialize(deserializer)? {
            None => Vec::new(),
            Some(EnvironmentRepr::List(items)) => items
                .iter()
                .map(scalar_text)
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| serde::de::Error::custom("environment entries must be scalars"))?,
            Some(EnvironmentRepr::Map(map)) => map
                .iter()
                .map(|(key, value)| {
                    let key = scalar_text(key)?;
                    match value {
                        Value::Null => Some(format!("{key}=")),
                        other => scalar_text(other).map(|v| format!("{key}={v}")),
                    }
                })
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| serde::de::Error::custom("environment values must be scalars"))?,
        };
        Ok(Self(entries))
    }
}

impl Serialize for Environment {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

/// `env_file` references, accepting a single path or a list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvFiles(Vec<String>);

impl EnvFiles {
    pub fn new(paths: Vec<String>) -> Self {
        Self(paths)
    }

    pub fn paths(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum EnvFilesRepr {
    One(String),
    Many(Vec<String>),
}

impl<'de> Deserialize<'de> for EnvFiles {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match Option::<EnvFilesRepr>::deserialize(deserializer)? {
            None => Self::default(),
            Some(EnvFilesRepr::One(path)) => Self(vec![path]),
            Some(EnvFilesRepr::Many(paths)) => Self(paths),
        })
    }
}

impl Serialize for EnvFiles {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

/// Service labels, kept in whichever spelling the manifest used.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Labels {
    List(Vec<String>),
    Map(serde_yaml::Mapping),
}

impl Default for Labels {
    fn default() -> Self {
        Labels::List(Vec::new())
    }
}

impl Labels {
    pub fn is_empty(&self) -> bool {
        match self {
            Labels::List(items) => items.is_empty(),
            Labels::Map(map) => map.is_empty(),
        }
    }

    /// Value of the label `key`, if set.
    pub fn get(&self, key: &str) -> Option<String> {
        match self {
            Labels::List(items) => items.iter().find_map(|item| {
                let (k, v) = item.split_once('=')?;
                (k.trim() == key).then(|| v.trim().to_string())
            }),
            Labels::Map(map) => map
                .iter()
                .find(|(k, _)| k.as_str() == Some(key))
                .and_then(|(_, v)| scalar_text(v)),
        }
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
