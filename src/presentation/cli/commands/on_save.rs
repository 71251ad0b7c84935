use anyhow::{bail, Result};
use std::path::PathBuf;
use std::sync::Arc;

use super::context::CommandContext;
use crate::application::use_cases::{DeployFilesUseCase, DeployOnSaveUseCase};
use crate::presentation::ui::ProgressObserver;

/// Handler for the on-save command
pub struct OnSaveCommand {
    pub file: PathBuf,
}

impl OnSaveCommand {
    pub fn new(file: PathBuf) -> Self {
        Self { file }
    }

    pub async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        ctx.report_issues();
        let file = ctx.absolute(&self.file);

        let lookup = DeployOnSaveUseCase::new(
            DeployFilesUseCase::new(ctx.environment()),
            ctx.config.packages.clone(),
        );
        let targets = lookup.targets_for(&file);
        if targets.is_empty() {
            ctx.display.info("No package deploys this file on save");
            return Ok(());
        }

        let observer = Arc::new(ProgressObserver::new(&ctx.display, targets.len() as u64, "deploy"));
        let use_case = DeployOnSaveUseCase::new(
            DeployFilesUseCase::new(ctx.environment()).with_observer(observer),
            ctx.config.packages.clone(),
        );

        let ctrl_c = ctx.cancel_on_ctrl_c();
        let result = use_case.on_save(&file).await;
        ctrl_c.abort();

        if let Some(summary) = result? {
            ctx.display.print_summary(&summary, ctx.verbose);
            if summary.failed() > 0 {
                bail!("{}", summary.message());
            }
        }
        Ok(())
    }
}
