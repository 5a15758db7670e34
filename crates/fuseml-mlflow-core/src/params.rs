//! Entrypoint parameter reconciliation
//!
//! Parameter values come from two places:
//!
//! 1. explicit `name=value` arguments given on the command line, and
//! 2. FuseML workflow inputs, which reach the step as `FUSEML_<NAME>`
//!    environment variables.
//!
//! Explicit arguments always win. Workflow inputs only fill parameters that
//! were not set explicitly, so a caller can override one value without
//! switching the automatic mapping off for the rest. Parameters set by
//! neither source are left out and the engine applies their declared defaults.

use crate::error::RunnerError;
use crate::project::EntryPoint;
use crate::Result;
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;
use tracing::{debug, info, warn};

/// Prefix FuseML puts on workflow input environment variables.
pub const WORKFLOW_INPUT_PREFIX: &str = "FUSEML_";

/// Reconciled parameters, keyed by declared name.
pub type ParameterSet = BTreeMap<String, String>;

/// One explicit `name=value` entrypoint argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntrypointArg {
    pub name: String,
    pub value: String,
}

impl EntrypointArg {
    /// Parse a `name=value` token. The name is word characters only; the
    /// value is everything after the first `=` and may be empty. A single
    /// trailing newline is not part of the value.
    pub fn parse(token: &str) -> Result<Self> {
        static ARG: OnceLock<Regex> = OnceLock::new();
        let re = ARG.get_or_init(|| Regex::new(r"^(\w+)=(.*)\n?$").expect("valid regex"));

        let caps = re
            .captures(token)
            .ok_or_else(|| RunnerError::InvalidArgumentFormat(token.to_string()))?;
        Ok(EntrypointArg {
            name: caps[1].to_string(),
            value: caps[2].to_string(),
        })
    }
}

impl std::str::FromStr for EntrypointArg {
    type Err = RunnerError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Workflow input values visible to this step.
#[derive(Debug, Clone, Default)]
pub struct WorkflowInputs {
    vars: HashMap<String, String>,
}

impl WorkflowInputs {
    /// Snapshot the `FUSEML_*` variables of the current process environment.
    pub fn from_env() -> Self {
        std::env::vars_os()
            .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
            .filter(|(k, _)| k.starts_with(WORKFLOW_INPUT_PREFIX))
            .collect()
    }

    /// Environment variable consulted for `param`.
    pub fn variable_name(param: &str) -> String {
        format!("{WORKFLOW_INPUT_PREFIX}{}", param.to_uppercase())
    }

    /// Value for `param`, if its variable is set and non-empty.
    pub fn lookup(&self, param: &str) -> Option<&str> {
        self.vars
            .get(&Self::variable_name(param))
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for WorkflowInputs {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        WorkflowInputs {
            vars: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Build the parameter set for `entrypoint` from explicit arguments and
/// workflow inputs.
///
/// Fails on the first explicit argument the entrypoint does not declare.
pub fn reconcile(
    entrypoint_name: &str,
    entrypoint: &EntryPoint,
    explicit: &[EntrypointArg],
    inputs: &WorkflowInputs,
) -> Result<ParameterSet> {
    let mut parameters = ParameterSet::new();

    for arg in explicit {
        if !entrypoint.declares(&arg.name) {
            return Err(RunnerError::UnknownArgument {
                entrypoint: entrypoint_name.to_string(),
                name: arg.name.clone(),
            });
        }
        info!("Using value for '{}' entrypoint argument: '{}'", arg.name, arg.value);
        if let Some(previous) = parameters.insert(arg.name.clone(), arg.value.clone()) {
            warn!(
                "Entrypoint argument '{}' given more than once; '{}' replaces '{}'",
                arg.name, arg.value, previous
            );
        }
    }

    for name in entrypoint.parameter_names() {
        if parameters.contains_key(name) {
            continue;
        }
        match inputs.lookup(name) {
            Some(value) => {
                info!("Using workflow input value for '{name}' entrypoint argument: '{value}'");
                parameters.insert(name.to_string(), value.to_string());
            }
            None => {
                let default = entrypoint.parameter(name).and_then(|p| p.default.as_deref());
                debug!(parameter = name, default, "no value supplied, engine default applies");
            }
        }
    }

    Ok(parameters)
}
