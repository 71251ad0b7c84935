pub mod context;
pub mod deploy;
pub mod list;
pub mod on_save;
pub mod startup;
pub mod sync_open;

pub use context::CommandContext;
pub use deploy::TransferCommand;
pub use list::{ListCommand, ListKind};
pub use on_save::OnSaveCommand;
pub use startup::StartupCommand;
pub use sync_open::SyncOpenCommand;
