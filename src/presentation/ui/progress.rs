use super::display::DisplayHelper;
use crate::application::use_cases::{DeployObserver, TargetSummary};
use crate::domain::value_objects::{DeployState, FileStatus};
use indicatif::ProgressBar;
use std::path::Path;
use tracing::debug;

/// Drives an indicatif progress bar from deployment events
pub struct ProgressObserver {
    bar: ProgressBar,
}

impl ProgressObserver {
    /// `len` is the number of file completions to expect (files × targets)
    pub fn new(display: &DisplayHelper, len: u64, message: &str) -> Self {
        Self {
            bar: display.create_progress_bar(len, message),
        }
    }
}

impl DeployObserver for ProgressObserver {
    fn on_state_changed(&self, state: DeployState) {
        if state.is_terminal() {
            self.bar.finish_and_clear();
        } else {
            self.bar.set_message(state.to_string());
        }
    }

    fn on_file_completed(&self, target: &str, file: &Path, status: &FileStatus) {
        if let FileStatus::Failed(message) = status {
            self.bar
                .println(format!("{} -> {}: {}", file.display(), target, message));
        }
        self.bar.inc(1);
    }

    fn on_target_completed(&self, summary: &TargetSummary) {
        debug!(
            "Target '{}' done ({} of {} ok)",
            summary.target,
            summary.succeeded(),
            summary.total()
        );
    }
}
