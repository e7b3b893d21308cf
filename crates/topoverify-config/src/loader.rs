use std::collections::HashSet;
use std::path::Path;

use topoverify_domain::{BusinessUnit, Environment};
use tracing::debug;

use crate::error::ConfigError;
use crate::matrix::Matrix;
use crate::raw::{RawBusinessUnit, RawMatrix};

/// Load a matrix file.
///
/// ```text
/// business_units:
///   - id: bu1
///     dir: business_unit_1
/// environments: [development, production]
/// ```
///
/// An omitted section falls back to the default matrix's value for it. A
/// section present but empty is an error.
pub fn load_matrix(path: &Path) -> Result<Matrix, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    let raw: RawMatrix = serde_yaml::from_str(&content).map_err(|e| ConfigError::YamlParse {
        path: path.display().to_string(),
        source: e,
    })?;
    debug!("Loading matrix from {}", path.display());
    convert_matrix(raw, path)
}

fn convert_matrix(raw: RawMatrix, path: &Path) -> Result<Matrix, ConfigError> {
    let defaults = Matrix::default();

    let business_units = match raw.business_units {
        None => defaults.business_units,
        Some(list) if list.is_empty() => return Err(empty_section("business_units", path)),
        Some(list) => {
            let mut seen = HashSet::new();
            let mut units = Vec::with_capacity(list.len());
            for rb in list {
                if !seen.insert(rb.id.clone()) {
                    return Err(ConfigError::Conversion {
                        path: path.display().to_string(),
                        message: format!("duplicate business unit '{}'", rb.id),
                    });
                }
                units.push(convert_business_unit(rb, path)?);
            }
            units
        }
    };

    let environments = match raw.environments {
        None => defaults.environments,
        Some(list) if list.is_empty() => return Err(empty_section("environments", path)),
        Some(list) => {
            let mut envs = Vec::with_capacity(list.len());
            for name in &list {
                let env: Environment = name.parse()?;
                if envs.contains(&env) {
                    return Err(ConfigError::Conversion {
                        path: path.display().to_string(),
                        message: format!("duplicate environment '{}'", name),
                    });
                }
                envs.push(env);
            }
            envs
        }
    };

    Ok(Matrix { business_units, environments })
}

fn empty_section(key: &str, path: &Path) -> ConfigError {
    ConfigError::Conversion {
        path: path.display().to_string(),
        message: format!("'{}' lists nothing; omit the key to use the defaults", key),
    }
}

fn convert_business_unit(raw: RawBusinessUnit, path: &Path) -> Result<BusinessUnit, ConfigError> {
    let dir = match raw.dir {
        Some(d) => d,
        None => default_dir(&raw.id).ok_or_else(|| ConfigError::Conversion {
            path: path.display().to_string(),
            message: format!("business unit '{}' needs an explicit dir", raw.id),
        })?,
    };
    Ok(BusinessUnit::new(raw.id, dir)?)
}

/// `bu3` → `business_unit_3`.
fn default_dir(id: &str) -> Option<String> {
    let n = id.strip_prefix("bu")?;
    if n.is_empty() || !n.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(format!("business_unit_{n}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_dir_from_numbered_id() {
        assert_eq!(default_dir("bu3").as_deref(), Some("business_unit_3"));
        assert_eq!(default_dir("finance"), None);
        assert_eq!(default_dir("bu"), None);
    }

    #[test]
    fn omitted_sections_fall_back_to_defaults() {
        let raw = RawMatrix { business_units: None, environments: None };
        let m = convert_matrix(raw, Path::new("matrix.yml")).unwrap();
        assert_eq!(m, Matrix::default());
    }

    #[test]
    fn empty_sections_are_rejected() {
        let raw = RawMatrix { business_units: Some(vec![]), environments: None };
        let err = convert_matrix(raw, Path::new("matrix.yml")).unwrap_err();
        assert!(matches!(err, ConfigError::Conversion { ref message, .. } if message.contains("business_units")));

        let raw = RawMatrix { business_units: None, environments: Some(vec![]) };
        let err = convert_matrix(raw, Path::new("matrix.yml")).unwrap_err();
        assert!(matches!(err, ConfigError::Conversion { ref message, .. } if message.contains("environments")));
    }

    #[test]
    fn duplicate_business_unit_is_rejected() {
        let raw = RawMatrix {
            business_units: Some(vec![
                RawBusinessUnit { id: "bu1".into(), dir: None },
                RawBusinessUnit { id: "bu1".into(), dir: Some("other".into()) },
            ]),
            environments: None,
        };
        let err = convert_matrix(raw, Path::new("matrix.yml")).unwrap_err();
        assert!(err.to_string().contains("duplicate business unit"));
    }

    #[test]
    fn unknown_environment_is_rejected() {
        let raw = RawMatrix {
            business_units: None,
            environments: Some(vec!["staging".into()]),
        };
        assert!(matches!(
            convert_matrix(raw, Path::new("matrix.yml")),
            Err(ConfigError::Domain(_))
        ));
    }
}
