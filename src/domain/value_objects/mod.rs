pub mod deploy_state;
pub mod path_mapping;
pub mod platform;
pub mod plugin_type;

pub use deploy_state::{DeployDirection, DeployOutcome, DeployState, FileStatus, StatusColor};
pub use path_mapping::{map_path, relative_to_workspace, MappingError, MappingRule};
pub use plugin_type::PluginType;
