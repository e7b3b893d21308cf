use serde::{Deserialize, Serialize};

/// Raw YAML representation of a matrix file.
#[derive(Debug, Deserialize, Serialize)]
pub struct RawMatrix {
    /// `None` when the key is omitted; an explicit `[]` is rejected on conversion.
    pub business_units: Option<Vec<RawBusinessUnit>>,
    pub environments: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct RawBusinessUnit {
    pub id: String,
    /// Directory under `4-projects/`. Defaults to `business_unit_<n>` for ids of the form `bu<n>`.
    pub dir: Option<String>,
}
