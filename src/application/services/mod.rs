pub mod filter_service;
pub mod resolver_service;
pub mod value_resolver;

pub use filter_service::{FileFilter, FilterEnvironment, FilterError, GlobFilter};
pub use resolver_service::{ConfigIssue, ConfigResolver, ConfigResolverConfig, ResolvedConfig};
pub use value_resolver::{ValueError, ValueResolver};
