use anyhow::Result;
use std::sync::Arc;

use super::context::CommandContext;
use crate::application::use_cases::StartupTasksUseCase;

/// Handler for the startup command
pub struct StartupCommand {
    /// Only print what would run
    pub dry_run: bool,
}

impl StartupCommand {
    pub fn new(dry_run: bool) -> Self {
        Self { dry_run }
    }

    pub async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        ctx.report_issues();
        let use_case = StartupTasksUseCase::new(
            Arc::clone(&ctx.session),
            ctx.workspace_root.clone(),
            ctx.config.settings.clone(),
        );

        if self.dry_run {
            let tasks = use_case.planned_tasks();
            if tasks.is_empty() {
                ctx.display.info("No startup tasks configured");
            }
            for task in tasks {
                ctx.display.info(&format!(
                    "{:?} after {} ms: {}",
                    task.kind,
                    task.delay.as_millis(),
                    task.command
                ));
            }
            return Ok(());
        }

        let tasks = use_case.schedule();
        if tasks.is_empty() {
            ctx.display.info("No startup tasks configured");
            return Ok(());
        }
        for task in &tasks {
            ctx.session.wait_for_timer(task.kind).await;
            ctx.display.success(&format!("{:?} done: {}", task.kind, task.command));
        }
        Ok(())
    }
}
