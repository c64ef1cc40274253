use std::fmt::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};

use gauntlet_instruments::Reporter;
use indicatif::{ProgressBar, ProgressState, ProgressStyle};

use crate::shutdown::DelegatedShutdownListener;

const TEMPLATE: &str =
    "{spinner:.green} [{wide_bar:.cyan/blue}] [{elapsed_precise} / {planned_runtime}] {msg}";

/// Shows how long is left of the run, along with a running count of requests.
pub(crate) fn start_progress(
    planned_runtime: Duration,
    reporter: Arc<Reporter>,
    shutdown_listener: DelegatedShutdownListener,
) {
    let style = match ProgressStyle::with_template(TEMPLATE) {
        Ok(style) => style,
        Err(e) => {
            log::warn!("Invalid progress bar template, not showing progress: {e}");
            return;
        }
    };
    let total_secs = planned_runtime.as_secs();
    let style = style
        .with_key(
            "planned_runtime",
            move |_state: &ProgressState, w: &mut dyn Write| {
                let _ = write!(
                    w,
                    "{:02}:{:02}:{:02}",
                    total_secs / 3600,
                    (total_secs % 3600) / 60,
                    total_secs % 60
                );
            },
        )
        .progress_chars("#>-");

    let spawned = std::thread::Builder::new()
        .name("progress".to_string())
        .spawn(move || {
            let started = Instant::now();
            let pb = ProgressBar::new(total_secs);
            pb.set_style(style);

            while !shutdown_listener.should_shutdown() {
                pb.set_position(started.elapsed().as_secs().min(total_secs));

                let totals = reporter.total_operations();
                pb.set_message(format!(
                    "{} requests, {} failed",
                    totals.count, totals.errors
                ));

                std::thread::sleep(Duration::from_millis(250));
            }

            log::trace!("Progress thread shutting down");
            pb.finish_and_clear();
        });

    if let Err(e) = spawned {
        log::warn!("Failed to start progress thread: {e}");
    }
}
