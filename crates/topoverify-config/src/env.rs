use std::collections::HashMap;

use topoverify_domain::TopologyMode;
use tracing::debug;

use crate::error::ConfigError;

/// Foundation variable holding the organization id.
pub const ORG_ID_VAR: &str = "TF_VAR_org_id";
/// Foundation variable selecting the network layout.
pub const MODE_VAR: &str = "TF_VAR_example_foundations_mode";

/// Source of named configuration values.
pub trait EnvSource: Send + Sync {
    /// Raw lookup. `None` when the name is unset.
    fn get(&self, name: &str) -> Option<String>;

    /// Value of `name`, failing when unset or empty.
    fn value_from_env(&self, name: &str) -> Result<String, ConfigError> {
        match self.get(name) {
            Some(v) if !v.is_empty() => Ok(v),
            _ => Err(ConfigError::MissingEnv(name.to_string())),
        }
    }
}

/// Reads the process environment.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn get(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

/// Fixed set of values, used in tests and for embedding.
#[derive(Debug, Default, Clone)]
pub struct MapEnv(pub HashMap<String, String>);

impl MapEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: &str) -> Self {
        self.0.insert(name.to_string(), value.to_string());
        self
    }
}

impl EnvSource for MapEnv {
    fn get(&self, name: &str) -> Option<String> {
        self.0.get(name).cloned()
    }
}

/// Foundation-level settings read from the environment once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoundationEnv {
    pub org_id: String,
    pub mode: TopologyMode,
}

impl FoundationEnv {
    pub fn load(env: &dyn EnvSource) -> Result<Self, ConfigError> {
        let org_id = env.value_from_env(ORG_ID_VAR)?;
        let raw_mode = env.value_from_env(MODE_VAR)?;
        let mode = TopologyMode::from_foundation_value(&raw_mode);
        debug!(%org_id, %mode, "loaded foundation environment");
        Ok(FoundationEnv { org_id, mode })
    }
}
