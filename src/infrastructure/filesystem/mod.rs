pub mod config_store;
pub mod workspace_scanner;

pub use config_store::{ConfigStore, ConfigStoreError, DocumentFormat, DEFAULT_CONFIG_FILES};
pub use workspace_scanner::WorkspaceScanner;
