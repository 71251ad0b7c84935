use anyhow::Result;
use std::path::PathBuf;

use super::context::CommandContext;
use crate::application::use_cases::{SyncOnOpenUseCase, SyncOutcome};

/// Handler for the sync-open command
pub struct SyncOpenCommand {
    pub files: Vec<PathBuf>,
}

impl SyncOpenCommand {
    pub fn new(files: Vec<PathBuf>) -> Self {
        Self { files }
    }

    pub async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        ctx.report_issues();
        let use_case = SyncOnOpenUseCase::from_config(ctx.environment(), &ctx.config);

        let ctrl_c = ctx.cancel_on_ctrl_c();
        let mut failed = 0;
        for file in &self.files {
            let file = ctx.absolute(file);
            ctx.display
                .info(&format!("Syncing {}", ctx.display.format_path(&file.display().to_string())));
            let reports = use_case.sync_on_open(&file).await;
            failed += reports
                .iter()
                .filter(|report| matches!(report.outcome, SyncOutcome::Failed(_)))
                .count();
            ctx.display.print_sync_reports(&reports);
        }
        ctrl_c.abort();

        if failed > 0 {
            anyhow::bail!("{} sync(s) failed", failed);
        }
        Ok(())
    }
}
