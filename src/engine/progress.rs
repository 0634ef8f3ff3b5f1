//! Progress bar for a running build, driven from the monitor loop.

use kdam::{Animation, Bar, BarExt};
use std::sync::{Arc, Mutex};

use crate::stats::PipelineCounts;

pub type ProgressBar = Arc<Mutex<Bar>>;

/// Create a bar for a build of `total` records.
pub fn create_progress_bar(total: usize, desc: String) -> ProgressBar {
    Arc::new(Mutex::new(kdam::tqdm!(
        total = total,
        desc = desc,
        animation = Animation::Classic,
        unit = " records"
    )))
}

/// Move the bar to the build's completed count. Uses try_lock so the monitor never waits on it.
pub fn show_counts(pb: &ProgressBar, counts: &PipelineCounts) {
    if let Ok(mut bar) = pb.try_lock() {
        let total = counts.incoming as usize;
        if bar.total != total {
            bar.total = total;
        }
        let _ = bar.update_to(counts.completed as usize);
    }
}

/// Finish the bar's line so later log output starts on a fresh line.
pub fn finish_bar(pb: &ProgressBar) {
    if let Ok(mut bar) = pb.lock() {
        let _ = bar.refresh();
        eprintln!();
    }
}
