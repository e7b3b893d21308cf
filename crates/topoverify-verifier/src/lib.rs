pub mod bundles;
pub mod chain;
pub mod engine;
pub mod error;
pub mod report;
pub mod resolver;
pub mod run;
mod serial;
#[cfg(test)]
mod testing;

pub use chain::{materialize, resolve_chain, ChainPlan, Globals, Stage};
pub use engine::{verify, RoleBundle, VerifyContext};
pub use error::{ChainError, ConfigurationError, ResolveError, RunError};
pub use report::{CaseOutcome, CaseReport, CheckOutcome, CheckResult, RoleReport, RunReport, Teardown};
pub use resolver::get_organization_policy_id;
pub use run::{run, RunRequest};
