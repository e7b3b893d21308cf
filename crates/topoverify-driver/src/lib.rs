pub mod control_plane;
pub mod document;
pub mod error;
pub mod gcloud;
pub mod gcp;
mod process;
pub mod query;
pub mod retry;
pub mod stack;
pub mod terraform;

pub use control_plane::ControlPlane;
pub use error::{DriverError, QueryError, QueryErrorKind};
pub use gcloud::GcloudCli;
pub use gcp::GcpRestControlPlane;
pub use query::Query;
pub use retry::RetryPolicy;
pub use stack::{PolicyLibrary, Provisioner, StackHandle, StackSpec};
pub use terraform::TerraformProvisioner;

/// A control-plane response in gcloud's JSON shape.
pub type Document = serde_json::Value;
