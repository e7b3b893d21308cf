use topoverify_driver::{document, ControlPlane, Query};
use tracing::debug;

use crate::error::ResolveError;

/// Id of the organization's single access policy: the last segment of its
/// `name` (`accessPolicies/123` → `123`).
///
/// Zero policies and more than one are both errors; the lookup never picks
/// one of several candidates.
pub async fn get_organization_policy_id(
    control_plane: &dyn ControlPlane,
    org_id: &str,
) -> Result<String, ResolveError> {
    let rows = control_plane
        .run(&Query::AccessPolicies {
            organization: org_id.to_string(),
        })
        .await?;
    let names = document::field_values(&rows, "name");
    let count = rows.as_array().map_or(0, Vec::len);

    match count {
        0 => Err(ResolveError::PolicyNotFound {
            organization: org_id.to_string(),
        }),
        1 => {
            let name = names.first().ok_or_else(|| ResolveError::MalformedPolicy {
                organization: org_id.to_string(),
            })?;
            let id = name.rsplit('/').next().unwrap_or(name).to_string();
            debug!(organization = org_id, policy = %id, "resolved access policy");
            Ok(id)
        }
        _ => Err(ResolveError::AmbiguousPolicy {
            organization: org_id.to_string(),
            candidates: names,
        }),
    }
}
