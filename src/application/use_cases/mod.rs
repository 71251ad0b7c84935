pub mod deploy_files;
pub mod deploy_on_save;
pub mod startup_tasks;
pub mod sync_on_open;

pub use deploy_files::{
    DeployEnvironment, DeployFilesUseCase, DeployObserver, DeploySummary, FileResult,
    TargetSummary,
};
pub use deploy_on_save::DeployOnSaveUseCase;
pub use startup_tasks::{ScheduledTask, StartupTasksUseCase, DEFAULT_GIT_PULL_COMMAND};
pub use sync_on_open::{decide, SyncDecision, SyncOnOpenUseCase, SyncOutcome, SyncReport};
