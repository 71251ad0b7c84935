/// Infrastructure layer modules
///
/// This layer provides concrete implementations for external system interactions:
/// - File system operations (configuration documents, workspace scanning)
/// - Transport plugins (local, archive, SFTP, FTP, S3, HTTP, external apps)
/// - Operation runners (HTTP, SQL, compilers, processes)
/// - Process execution
pub mod filesystem;
pub mod operations;
pub mod plugins;
pub mod process;

// Re-export commonly used types
pub use filesystem::{ConfigStore, WorkspaceScanner};
pub use operations::{run_operation, OperationContext, OperationError};
pub use plugins::{DeployPlugin, PluginRegistry};
pub use process::CommandExecutor;
