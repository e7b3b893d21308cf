use std::path::Path;

use regex::Regex;
use topoverify_domain::{BusinessUnit, Case, Environment, TopologyMode};

use crate::error::ConfigError;

/// Projects step directory, relative to the foundation root.
pub const PROJECTS_STEP_DIR: &str = "4-projects";

/// Business units and environments to cross.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Matrix {
    pub business_units: Vec<BusinessUnit>,
    pub environments: Vec<Environment>,
}

impl Default for Matrix {
    /// bu1 and bu2 across all three environments.
    fn default() -> Self {
        Matrix {
            business_units: vec![
                BusinessUnit {
                    id: topoverify_domain::BusinessUnitId::new("bu1"),
                    dir: "business_unit_1".into(),
                },
                BusinessUnit {
                    id: topoverify_domain::BusinessUnitId::new("bu2"),
                    dir: "business_unit_2".into(),
                },
            ],
            environments: Environment::ALL.to_vec(),
        }
    }
}

/// Cross every business unit with every environment, business-unit major.
///
/// Network names are `vpc-{code}-shared-{base|restricted}` plus the mode's
/// suffix. Pure: the same inputs always yield the same cases.
pub fn build_cases(
    root: &Path,
    business_units: &[BusinessUnit],
    environments: &[Environment],
    mode: TopologyMode,
) -> Vec<Case> {
    let suffix = mode.network_suffix();
    let mut cases = Vec::with_capacity(business_units.len() * environments.len());
    for bu in business_units {
        let base_dir = root.join(PROJECTS_STEP_DIR).join(&bu.dir);
        for env in environments {
            let code = env.code();
            cases.push(Case {
                name: format!("{}_{}", bu.id, env),
                business_unit: bu.clone(),
                environment: *env,
                base_dir: base_dir.clone(),
                base_network: format!("vpc-{code}-shared-base{suffix}"),
                restricted_network: format!("vpc-{code}-shared-restricted{suffix}"),
            });
        }
    }
    cases
}

/// Keep the cases whose name matches `pattern` (unanchored regex).
pub fn filter_cases(cases: Vec<Case>, pattern: Option<&str>) -> Result<Vec<Case>, ConfigError> {
    let Some(pattern) = pattern else {
        return Ok(cases);
    };
    let re = Regex::new(pattern).map_err(|e| ConfigError::InvalidFilter {
        pattern: pattern.to_string(),
        source: e,
    })?;
    Ok(cases.into_iter().filter(|c| re.is_match(&c.name)).collect())
}
