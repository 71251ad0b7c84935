use anyhow::{bail, Result};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use super::context::CommandContext;
use crate::application::use_cases::DeployFilesUseCase;
use crate::common::error::DeployError;
use crate::domain::entities::{normalize_name, Target};
use crate::domain::value_objects::DeployDirection;
use crate::infrastructure::filesystem::WorkspaceScanner;
use crate::presentation::ui::ProgressObserver;

/// Handler for the deploy and pull commands
pub struct TransferCommand {
    pub direction: DeployDirection,
    pub files: Vec<PathBuf>,
    pub packages: Vec<String>,
    pub targets: Vec<String>,
}

impl TransferCommand {
    pub fn new(
        direction: DeployDirection,
        files: Vec<PathBuf>,
        packages: Vec<String>,
        targets: Vec<String>,
    ) -> Self {
        Self {
            direction,
            files,
            packages,
            targets,
        }
    }

    pub async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        ctx.report_issues();

        let (files, targets) = self.selection(ctx)?;
        if files.is_empty() {
            ctx.display.info(&format!("Nothing to {}", self.direction));
            return Ok(());
        }

        ctx.display.info(&format!(
            "{} {} file(s) with {} target(s)",
            match self.direction {
                DeployDirection::Deploy => "Deploying",
                DeployDirection::Pull => "Pulling",
            },
            files.len(),
            targets.len()
        ));

        let observer = Arc::new(ProgressObserver::new(
            &ctx.display,
            (files.len() * targets.len()) as u64,
            &self.direction.to_string(),
        ));
        let use_case = DeployFilesUseCase::new(ctx.environment()).with_observer(observer);

        let ctrl_c = ctx.cancel_on_ctrl_c();
        let result = match self.direction {
            DeployDirection::Deploy => use_case.deploy(&files, &targets).await,
            DeployDirection::Pull => use_case.pull(&files, &targets).await,
        };
        ctrl_c.abort();

        let summary = match result {
            Ok(summary) => summary,
            Err(DeployError::Cancelled) => {
                ctx.display.warning("Canceled before any file was processed");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        ctx.display.print_summary(&summary, ctx.verbose);
        if summary.failed() > 0 {
            bail!("{}", summary.message());
        }
        Ok(())
    }

    /// Files and targets from the arguments and the named packages
    fn selection(&self, ctx: &CommandContext) -> Result<(Vec<PathBuf>, Vec<Target>)> {
        let mut files: Vec<PathBuf> = self.files.iter().map(|file| ctx.absolute(file)).collect();
        let mut package_targets = Vec::new();

        let scanner = WorkspaceScanner::new(&ctx.workspace_root);
        for name in &self.packages {
            let package = ctx
                .config
                .find_package(name)
                .ok_or_else(|| DeployError::unknown_package(name))?;
            files.extend(scanner.package_files(package)?);
            package_targets.extend(package.targets.iter().cloned());
        }

        let targets = if !self.targets.is_empty() {
            ctx.targets(&self.targets)?
        } else {
            let mut seen = HashSet::new();
            package_targets.retain(|name| seen.insert(normalize_name(name)));
            ctx.config.known_targets(&package_targets)
        };

        if targets.is_empty() {
            bail!("No targets selected, use --target or a package with targets");
        }
        Ok((files, targets))
    }
}
