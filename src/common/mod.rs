/// Shared error and result types
pub mod error;
pub mod result;

pub use error::DeployError;
pub use result::{DeployResult, WarnOnError};
