use crate::application::use_cases::{DeploySummary, SyncOutcome, SyncReport, TargetSummary};
use crate::domain::value_objects::{FileStatus, StatusColor};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

/// Display utilities for the CLI interface
#[derive(Debug, Clone, Copy)]
pub struct DisplayHelper {
    pub use_color: bool,
}

impl DisplayHelper {
    pub fn new(use_color: bool) -> Self {
        Self { use_color }
    }

    pub fn success(&self, message: &str) {
        if self.use_color {
            println!("{} {}", "✓".green().bold(), message);
        } else {
            println!("[SUCCESS] {}", message);
        }
    }

    pub fn error(&self, message: &str) {
        if self.use_color {
            eprintln!("{} {}", "✗".red().bold(), message);
        } else {
            eprintln!("[ERROR] {}", message);
        }
    }

    pub fn warning(&self, message: &str) {
        if self.use_color {
            println!("{} {}", "⚠".yellow().bold(), message);
        } else {
            println!("[WARNING] {}", message);
        }
    }

    pub fn info(&self, message: &str) {
        if self.use_color {
            println!("{} {}", "::".blue().bold(), message);
        } else {
            println!("[INFO] {}", message);
        }
    }

    pub fn format_path(&self, path: &str) -> String {
        if self.use_color {
            path.cyan().to_string()
        } else {
            format!("'{}'", path)
        }
    }

    pub fn format_target(&self, target: &str) -> String {
        if self.use_color {
            target.cyan().bold().to_string()
        } else {
            target.to_string()
        }
    }

    /// Progress bar over the files of one deployment, hidden without color
    pub fn create_progress_bar(&self, len: u64, message: &str) -> ProgressBar {
        if !self.use_color {
            return ProgressBar::with_draw_target(Some(len), ProgressDrawTarget::hidden());
        }

        let pb = ProgressBar::new(len);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos:>5}/{len:5} {msg}")
        {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb.set_message(message.to_string());
        pb
    }

    /// Aligned columns with a bold header
    pub fn print_table(&self, headers: &[&str], rows: &[Vec<String>]) {
        if rows.is_empty() {
            return;
        }

        let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
        for row in rows {
            for (i, cell) in row.iter().enumerate().take(widths.len()) {
                widths[i] = widths[i].max(cell.chars().count());
            }
        }

        let header = headers
            .iter()
            .zip(&widths)
            .map(|(h, w)| format!("{:<width$}", h, width = *w))
            .collect::<Vec<_>>()
            .join("  ");
        if self.use_color {
            println!("{}", header.bold());
        } else {
            println!("{}", header);
        }

        for row in rows {
            let line = row
                .iter()
                .zip(&widths)
                .map(|(cell, w)| format!("{:<width$}", cell, width = *w))
                .collect::<Vec<_>>()
                .join("  ");
            println!("{}", line.trim_end());
        }
    }

    fn status_text(&self, status: &FileStatus) -> String {
        let (text, detail) = match status {
            FileStatus::Succeeded => ("ok", None),
            FileStatus::Canceled => ("canceled", None),
            FileStatus::Failed(message) => ("failed", Some(message.as_str())),
        };
        let text = if self.use_color {
            match status {
                FileStatus::Succeeded => text.green().to_string(),
                FileStatus::Canceled => text.yellow().to_string(),
                FileStatus::Failed(_) => text.red().to_string(),
            }
        } else {
            text.to_string()
        };
        match detail {
            Some(detail) => format!("{} ({})", text, detail),
            None => text,
        }
    }

    /// Per-file lines of the targets with problems (all files when `verbose`)
    pub fn print_target(&self, summary: &TargetSummary, verbose: bool) {
        let problems = summary.failed() + summary.canceled();
        println!(
            "  {}: {}/{} ok",
            self.format_target(&summary.target),
            summary.succeeded(),
            summary.total()
        );
        if problems == 0 && !verbose {
            return;
        }
        for file in &summary.files {
            if file.status.is_success() && !verbose {
                continue;
            }
            let shown = file
                .target_path
                .clone()
                .unwrap_or_else(|| file.path.display().to_string());
            println!("    {} {}", shown, self.status_text(&file.status));
        }
    }

    /// The colored status line of a finished deployment
    pub fn print_summary(&self, summary: &DeploySummary, verbose: bool) {
        for target in &summary.targets {
            self.print_target(target, verbose);
        }

        let line = format!("{} {}: {}", summary.direction, summary.state, summary.message());
        match summary.status_color() {
            None if summary.state.is_canceled() => self.warning(&line),
            None => self.success(&line),
            Some(StatusColor::Warning) => self.warning(&line),
            Some(StatusColor::Error) => self.error(&line),
        }
    }

    pub fn print_sync_reports(&self, reports: &[SyncReport]) {
        if reports.is_empty() {
            self.info("No package syncs this file");
            return;
        }
        for report in reports {
            let line = format!(
                "{} / {}: {}",
                report.package,
                self.format_target(&report.target),
                report.outcome
            );
            match &report.outcome {
                SyncOutcome::Pulled => self.success(&line),
                SyncOutcome::Failed(_) => self.error(&line),
                _ => self.info(&line),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_status_text() {
        let display = DisplayHelper::new(false);
        assert_eq!(display.status_text(&FileStatus::Succeeded), "ok");
        assert_eq!(
            display.status_text(&FileStatus::Failed("denied".to_string())),
            "failed (denied)"
        );
        assert_eq!(display.format_path("a.txt"), "'a.txt'");
    }
}
