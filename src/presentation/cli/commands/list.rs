use anyhow::Result;
use clap::ValueEnum;

use super::context::CommandContext;

/// What the list command shows
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ListKind {
    Targets,
    Packages,
}

/// Handler for the list command
pub struct ListCommand {
    pub kind: ListKind,
}

impl ListCommand {
    pub fn new(kind: ListKind) -> Self {
        Self { kind }
    }

    pub fn execute(&self, ctx: &CommandContext) -> Result<()> {
        ctx.report_issues();
        match self.kind {
            ListKind::Targets => self.list_targets(ctx),
            ListKind::Packages => self.list_packages(ctx),
        }
        Ok(())
    }

    fn list_targets(&self, ctx: &CommandContext) {
        if ctx.config.targets.is_empty() {
            ctx.display.info("No targets configured");
            return;
        }
        let rows: Vec<Vec<String>> = ctx
            .config
            .targets
            .iter()
            .map(|target| {
                let capabilities = match ctx.registry.capabilities(target) {
                    Some(capabilities) => capabilities.labels().join(","),
                    None => "(no plugin)".to_string(),
                };
                vec![
                    target.name.clone(),
                    target.target_type.to_string(),
                    capabilities,
                    target.description.clone().unwrap_or_default(),
                ]
            })
            .collect();
        ctx.display
            .print_table(&["NAME", "TYPE", "CAPABILITIES", "DESCRIPTION"], &rows);
    }

    fn list_packages(&self, ctx: &CommandContext) {
        if ctx.config.packages.is_empty() {
            ctx.display.info("No packages configured");
            return;
        }
        let rows: Vec<Vec<String>> = ctx
            .config
            .packages
            .iter()
            .map(|package| {
                let on_save = if package.deploy_on_save.is_enabled() { "save" } else { "" };
                let on_open = if package.sync_when_open.as_ref().is_some_and(|p| p.is_enabled()) {
                    "open"
                } else {
                    ""
                };
                vec![
                    package.name.clone(),
                    package.targets.join(", "),
                    [on_save, on_open]
                        .iter()
                        .filter(|s| !s.is_empty())
                        .copied()
                        .collect::<Vec<_>>()
                        .join(","),
                    package
                        .button
                        .as_ref()
                        .and_then(|button| button.text.clone())
                        .unwrap_or_default(),
                    package.description.clone().unwrap_or_default(),
                ]
            })
            .collect();
        ctx.display.print_table(
            &["NAME", "TARGETS", "TRIGGERS", "BUTTON", "DESCRIPTION"],
            &rows,
        );
    }
}
