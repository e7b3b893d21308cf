mod raw;
mod loader;
pub mod env;
pub mod error;
pub mod matrix;

pub use env::{EnvSource, FoundationEnv, MapEnv, ProcessEnv};
pub use error::ConfigError;
pub use loader::load_matrix;
pub use matrix::{build_cases, filter_cases, Matrix};
