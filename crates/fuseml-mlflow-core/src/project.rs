//! MLproject descriptor
//!
//! Only the parts of the descriptor the runner needs are modelled: the
//! entrypoints and the parameters each one declares. Environment sections
//! (`conda_env`, `python_env`, `docker_env`) are the engine's business and
//! are ignored here.
//!
//! ```yaml
//! name: wine-quality
//! entry_points:
//!   main:
//!     parameters:
//!       alpha: {type: float, default: 0.5}
//!       data_path: path
//!     command: "python train.py {alpha} {data_path}"
//! ```

use crate::error::RunnerError;
use crate::Result;
use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// File name of the descriptor inside the working directory.
pub const DESCRIPTOR_FILE: &str = "MLproject";

/// A loaded MLproject file.
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectDescriptor {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    entry_points: BTreeMap<String, EntryPoint>,
}

/// A named, parameterized command declared by the project.
#[derive(Debug, Clone, Deserialize)]
#[serde(from = "RawEntryPoint")]
pub struct EntryPoint {
    parameters: BTreeMap<String, Parameter>,
    pub command: Option<String>,
}

/// A declared entrypoint parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    /// Declared type (`string`, `float`, `path`, `uri`, ...). Not enforced here.
    pub param_type: String,
    /// Default value in textual form, applied by the engine when no value is given.
    pub default: Option<String>,
}

#[derive(Deserialize)]
struct RawEntryPoint {
    #[serde(default, deserialize_with = "null_as_default")]
    parameters: BTreeMap<String, Option<RawParameter>>,
    #[serde(default)]
    command: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawParameter {
    Short(String),
    Long {
        #[serde(rename = "type", default)]
        param_type: Option<String>,
        #[serde(default)]
        default: Option<serde_yaml::Value>,
    },
}

impl From<RawEntryPoint> for EntryPoint {
    fn from(raw: RawEntryPoint) -> Self {
        let parameters = raw
            .parameters
            .into_iter()
            .map(|(name, raw)| {
                let param = match raw {
                    None => Parameter::untyped(),
                    Some(RawParameter::Short(param_type)) => Parameter {
                        param_type,
                        default: None,
                    },
                    Some(RawParameter::Long {
                        param_type,
                        default,
                    }) => Parameter {
                        param_type: param_type.unwrap_or_else(|| "string".to_string()),
                        default: default.and_then(scalar_text),
                    },
                };
                (name, param)
            })
            .collect();

        EntryPoint {
            parameters,
            command: raw.command,
        }
    }
}

impl Parameter {
    fn untyped() -> Self {
        Parameter {
            param_type: "string".to_string(),
            default: None,
        }
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn scalar_text(value: serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Absolute form of `path` for diagnostics; falls back to `path` itself.
pub(crate) fn absolute_path(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

impl ProjectDescriptor {
    /// Load `<workdir>/MLproject`.
    pub fn load(workdir: &Path) -> Result<Self> {
        let path = workdir.join(DESCRIPTOR_FILE);
        if !path.is_file() {
            return Err(RunnerError::DescriptorNotFound(absolute_path(workdir)));
        }

        let content = std::fs::read_to_string(&path).map_err(|e| RunnerError::InvalidDescriptor {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        let descriptor = Self::parse(&content).map_err(|e| RunnerError::InvalidDescriptor {
            path: path.clone(),
            reason: e.to_string(),
        })?;

        debug!(path = ?path, entry_points = descriptor.entry_points.len(), "loaded MLproject");
        Ok(descriptor)
    }

    /// Parse descriptor text.
    pub fn parse(content: &str) -> std::result::Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(content)
    }

    /// Look up a declared entrypoint.
    pub fn entry_point(&self, name: &str) -> Result<&EntryPoint> {
        self.entry_points
            .get(name)
            .ok_or_else(|| RunnerError::EntrypointNotFound(name.to_string()))
    }

    /// Names of all declared entrypoints, sorted.
    pub fn entry_point_names(&self) -> impl Iterator<Item = &str> {
        self.entry_points.keys().map(String::as_str)
    }
}

impl EntryPoint {
    /// Whether `name` is a declared parameter.
    pub fn declares(&self, name: &str) -> bool {
        self.parameters.contains_key(name)
    }

    /// Declared parameter names, sorted.
    pub fn parameter_names(&self) -> impl Iterator<Item = &str> {
        self.parameters.keys().map(String::as_str)
    }

    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters.get(name)
    }
}
