use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::DriverError;
use crate::retry::RetryPolicy;

/// Policy library used to vet a plan before it is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyLibrary {
    pub path: PathBuf,
    /// Project the validation runs against.
    pub project_id: String,
}

/// Everything needed to initialise, apply and read one infrastructure stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackSpec {
    /// Human-readable name used in logs and errors, e.g. `bu1_development/network`.
    pub name: String,
    pub dir: PathBuf,
    /// Input variables. Ordered so generated var files are stable.
    pub vars: BTreeMap<String, String>,
    /// `-backend-config` key/values for `init`.
    pub backend: BTreeMap<String, String>,
    /// Service account the provider impersonates.
    pub impersonate: Option<String>,
    pub policy_library: Option<PolicyLibrary>,
    pub retry: Option<RetryPolicy>,
}

impl StackSpec {
    pub fn new(name: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        StackSpec {
            name: name.into(),
            dir: dir.into(),
            vars: BTreeMap::new(),
            backend: BTreeMap::new(),
            impersonate: None,
            policy_library: None,
            retry: None,
        }
    }

    pub fn var(mut self, key: &str, value: impl Into<String>) -> Self {
        self.vars.insert(key.to_string(), value.into());
        self
    }

    pub fn backend(mut self, key: &str, value: impl Into<String>) -> Self {
        self.backend.insert(key.to_string(), value.into());
        self
    }
}

/// A provisioned stack and its outputs.
#[derive(Debug, Clone, PartialEq)]
pub struct StackHandle {
    pub name: String,
    pub dir: PathBuf,
    pub outputs: HashMap<String, Value>,
}

impl StackHandle {
    pub fn new(name: impl Into<String>, dir: impl Into<PathBuf>, outputs: HashMap<String, Value>) -> Self {
        StackHandle {
            name: name.into(),
            dir: dir.into(),
            outputs,
        }
    }

    /// String form of output `key`.
    ///
    /// Strings are returned verbatim; other scalars and structured values as JSON text.
    pub fn get_output(&self, key: &str) -> Result<String, DriverError> {
        match self.outputs.get(key) {
            None | Some(Value::Null) => Err(DriverError::MissingOutput {
                stack: self.name.clone(),
                key: key.to_string(),
            }),
            Some(Value::String(s)) => Ok(s.clone()),
            Some(other) => Ok(other.to_string()),
        }
    }
}

#[async_trait]
pub trait Provisioner: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// Initialise and apply the stack, then return its outputs.
    async fn apply(&self, spec: &StackSpec) -> Result<StackHandle, DriverError>;

    /// Read the outputs of an already-applied stack without changing it.
    async fn outputs(&self, spec: &StackSpec) -> Result<StackHandle, DriverError>;

    /// Destroy everything the stack manages.
    async fn destroy(&self, spec: &StackSpec) -> Result<(), DriverError>;
}
