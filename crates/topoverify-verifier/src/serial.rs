use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use topoverify_driver::{DriverError, Provisioner, StackHandle, StackSpec};
use tracing::debug;

/// Wraps a provisioner so that at most one call runs in any stack directory.
///
/// Cases in the same environment share the network stack, and terraform
/// rewrites `.terraform/` and the lock file there on every `init`.
pub(crate) struct PerDirProvisioner {
    inner: Arc<dyn Provisioner>,
    locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl PerDirProvisioner {
    pub(crate) fn new(inner: Arc<dyn Provisioner>) -> Self {
        PerDirProvisioner {
            inner,
            locks: Mutex::new(HashMap::new()),
        }
    }

    async fn lock_for(&self, dir: &Path) -> Arc<Mutex<()>> {
        self.locks.lock().await.entry(dir.to_path_buf()).or_default().clone()
    }
}

#[async_trait]
impl Provisioner for PerDirProvisioner {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    async fn apply(&self, spec: &StackSpec) -> Result<StackHandle, DriverError> {
        let lock = self.lock_for(&spec.dir).await;
        let _guard = lock.lock().await;
        self.inner.apply(spec).await
    }

    async fn outputs(&self, spec: &StackSpec) -> Result<StackHandle, DriverError> {
        let lock = self.lock_for(&spec.dir).await;
        let _guard = lock.lock().await;
        debug!(stack = %spec.name, dir = %spec.dir.display(), "reading outputs");
        self.inner.outputs(spec).await
    }

    async fn destroy(&self, spec: &StackSpec) -> Result<(), DriverError> {
        let lock = self.lock_for(&spec.dir).await;
        let _guard = lock.lock().await;
        self.inner.destroy(spec).await
    }
}
