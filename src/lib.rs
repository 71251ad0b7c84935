//! # multideploy - Multi-target Deploy Engine
//!
//! `multideploy` deploys files of a workspace to any number of configured
//! targets (local folders, SFTP, FTP, S3, HTTP endpoints, zip and tar.gz archives,
//! external applications) and pulls them back.
//!
//! ## Features
//!
//! - **Targets and Packages**: Declare destinations and reusable file selections in JSON or YAML
//! - **Inheritance and Imports**: Compose targets with `inheritFrom` and split configuration with `imports`
//! - **Placeholders**: `${name}` values, environment variables and template code in every setting
//! - **Operations**: HTTP calls, SQL scripts, compilers and programs before and after a deployment
//! - **Sync on Open**: Pull a newer remote copy of a file unless it was edited in this session
//! - **Cancellation**: Every transfer, process and request stops cooperatively on Ctrl-C
//!
//! ## Quick Start
//!
//! 1. Create a configuration file (`multideploy.yaml`):
//!
//! ```yaml
//! targets:
//!   - name: web
//!     type: sftp
//!     host: example.com
//!     dir: /var/www
//!     mappings:
//!       - source: public/
//!         target: ""
//! packages:
//!   - name: site
//!     files: ["public/**"]
//!     exclude: ["**/*.log"]
//!     targets: [web]
//!     deployOnSave: true
//! ```
//!
//! 2. Deploy the package:
//!
//! ```bash
//! multideploy deploy --package site
//! ```
//!
//! ## Architecture
//!
//! The crate is organized using clean architecture principles:
//!
//! - [`domain`]: Targets, packages, operations and value objects
//! - [`application`]: Configuration resolution, the deploy session and use cases
//! - [`infrastructure`]: Plugins, operation runners, file system and processes
//! - [`presentation`]: CLI interface and terminal output
//! - [`common`]: Shared error handling
//!
//! ## Use Cases
//!
//! - [`application::use_cases::deploy_files`]: Deploy or pull files with many targets
//! - [`application::use_cases::sync_on_open`]: Pull newer remote copies of opened files
//! - [`application::use_cases::deploy_on_save`]: Deploy saved files of packages
//! - [`application::use_cases::startup_tasks`]: Build task and `git pull` on startup
//!
//! ## Using the Library
//!
//! ```rust,no_run
//! use multideploy::application::services::{ConfigResolver, ConfigResolverConfig};
//! use multideploy::application::session::DeploySession;
//! use multideploy::application::use_cases::{DeployEnvironment, DeployFilesUseCase};
//! use multideploy::infrastructure::plugins::PluginRegistry;
//! use std::path::PathBuf;
//! use std::sync::Arc;
//!
//! # async fn example() -> multideploy::Result<()> {
//! let root = PathBuf::from("/path/to/workspace");
//! let config = ConfigResolver::new(&root, ConfigResolverConfig::default()).load_workspace()?;
//!
//! let env = DeployEnvironment::from_config(
//!     &config,
//!     &root,
//!     Arc::new(DeploySession::default()),
//!     Arc::new(PluginRegistry::with_builtin_plugins()),
//! );
//! let targets = config.targets_by_names(&["web"])?;
//! let summary = DeployFilesUseCase::new(env)
//!     .deploy(&[root.join("public/index.html")], &targets)
//!     .await?;
//!
//! println!("{}", summary.message());
//! # Ok(())
//! # }
//! ```

#![deny(rustdoc::broken_intra_doc_links)]

pub mod application;
pub mod common;
pub mod domain;
pub mod infrastructure;
pub mod presentation;

// Re-export commonly used types for convenience
pub use crate::common::error::DeployError;
pub use crate::common::result::DeployResult as Result;
