pub mod commands;

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::env;
use std::path::PathBuf;
use std::process::exit;

use crate::domain::value_objects::DeployDirection;
use crate::presentation::ui::DisplayHelper;
use commands::{
    CommandContext, ListCommand, ListKind, OnSaveCommand, StartupCommand, SyncOpenCommand,
    TransferCommand,
};

/// multideploy - deploy workspace files to many targets
#[derive(Parser)]
#[command(name = "multideploy")]
#[command(about = "Deploy workspace files to local folders, SFTP, FTP, S3, HTTP, archives and apps")]
#[command(version)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Workspace directory (defaults to current directory)
    #[arg(short = 'C', long, global = true)]
    pub workspace: Option<PathBuf>,

    /// Configuration file (defaults to multideploy.json / multideploy.yaml in the workspace)
    #[arg(short, long, global = true, env = "MULTIDEPLOY_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Deploy files to targets
    Deploy {
        /// Files to deploy (relative to the workspace)
        files: Vec<PathBuf>,

        /// Deploy the files of a package (to its targets unless --target is given)
        #[arg(short, long)]
        package: Vec<String>,

        /// Target to deploy to
        #[arg(short, long)]
        target: Vec<String>,
    },

    /// Pull files from targets
    Pull {
        /// Files to pull (relative to the workspace)
        files: Vec<PathBuf>,

        /// Pull the files of a package (from its targets unless --target is given)
        #[arg(short, long)]
        package: Vec<String>,

        /// Target to pull from
        #[arg(short, long)]
        target: Vec<String>,
    },

    /// Pull newer remote copies of opened files
    SyncOpen {
        /// Opened files
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Deploy a saved file to the packages that deploy on save
    OnSave {
        /// Saved file
        file: PathBuf,
    },

    /// List configured targets or packages
    List {
        #[arg(value_enum, default_value = "targets")]
        kind: ListKind,
    },

    /// Run the configured startup tasks (build task, git pull)
    Startup {
        /// Only show what would run
        #[arg(long)]
        dry_run: bool,
    },
}

/// CLI application runner
pub struct CliApp {
    cli: Cli,
}

impl CliApp {
    pub fn new() -> Self {
        Self { cli: Cli::parse() }
    }

    pub fn from_cli(cli: Cli) -> Self {
        Self { cli }
    }

    pub fn cli(&self) -> &Cli {
        &self.cli
    }

    pub async fn run(self) -> anyhow::Result<()> {
        colored::control::set_override(!self.cli.no_color);

        match self.handle_command().await {
            Ok(_) => Ok(()),
            Err(e) => {
                eprintln!("{} {:#}", "Error:".red().bold(), e);
                exit(1);
            }
        }
    }

    async fn handle_command(&self) -> anyhow::Result<()> {
        let ctx = self.load_context()?;
        match &self.cli.command {
            Commands::Deploy {
                files,
                package,
                target,
            } => {
                TransferCommand::new(DeployDirection::Deploy, files.clone(), package.clone(), target.clone())
                    .execute(&ctx)
                    .await
            }
            Commands::Pull {
                files,
                package,
                target,
            } => {
                TransferCommand::new(DeployDirection::Pull, files.clone(), package.clone(), target.clone())
                    .execute(&ctx)
                    .await
            }
            Commands::SyncOpen { files } => SyncOpenCommand::new(files.clone()).execute(&ctx).await,
            Commands::OnSave { file } => OnSaveCommand::new(file.clone()).execute(&ctx).await,
            Commands::List { kind } => ListCommand::new(*kind).execute(&ctx),
            Commands::Startup { dry_run } => StartupCommand::new(*dry_run).execute(&ctx).await,
        }
    }

    fn load_context(&self) -> anyhow::Result<CommandContext> {
        let current_dir = env::current_dir()?;
        let workspace_root = match &self.cli.workspace {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => current_dir.join(dir),
            None => current_dir,
        };

        CommandContext::load(
            &workspace_root,
            self.cli.config.as_deref(),
            DisplayHelper::new(!self.cli.no_color),
            self.cli.verbose,
        )
    }
}

impl Default for CliApp {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_deploy() {
        let cli = Cli::try_parse_from([
            "multideploy",
            "-C",
            "/ws",
            "deploy",
            "a.txt",
            "b.txt",
            "--target",
            "web",
            "-p",
            "site",
        ])
        .unwrap();

        assert_eq!(cli.workspace, Some(PathBuf::from("/ws")));
        match cli.command {
            Commands::Deploy {
                files,
                package,
                target,
            } => {
                assert_eq!(files, vec![PathBuf::from("a.txt"), PathBuf::from("b.txt")]);
                assert_eq!(package, vec!["site".to_string()]);
                assert_eq!(target, vec!["web".to_string()]);
            }
            _ => panic!("expected deploy"),
        }
    }

    #[test]
    fn test_parse_list_and_sync_open() {
        let cli = Cli::try_parse_from(["multideploy", "list", "packages", "--no-color"]).unwrap();
        assert!(cli.no_color);
        assert!(matches!(cli.command, Commands::List { kind: ListKind::Packages }));

        assert!(Cli::try_parse_from(["multideploy", "sync-open"]).is_err());
    }
}
