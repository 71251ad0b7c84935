pub mod deploy_config;
pub mod operation;
pub mod package;
pub mod target;
pub mod value;

pub use deploy_config::{DeployConfig, StartupTask, StartupTrigger};
pub use operation::{
    CompileOperation, DeployOperation, HttpOperation, OpenOperation, SqlOperation, WaitOperation,
    WebDeployOperation,
};
pub use package::{Package, PackageButton, SyncWhenOpen, TargetBinding};
pub use target::{normalize_name, Target};
pub use value::Value;
