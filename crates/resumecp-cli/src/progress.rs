//! Console progress reporting

use console::style;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use resumecp_types::{ChunkProgress, CopyStats, Error, ProgressReporter};
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use crate::display::{format_bytes, format_duration};

/// Prints one line per job event and per completed chunk, with a byte
/// progress bar for the file being copied
pub struct ConsoleReporter {
    quiet: bool,
    colored: bool,
    bar: Mutex<Option<ProgressBar>>,
}

impl ConsoleReporter {
    /// Create a reporter; `quiet` suppresses everything but failures
    pub fn new(quiet: bool, colored: bool) -> Self {
        console::set_colors_enabled(colored);
        Self {
            quiet,
            colored,
            bar: Mutex::new(None),
        }
    }

    fn new_bar(&self, total_size: u64) -> ProgressBar {
        let bar = ProgressBar::with_draw_target(Some(total_size), ProgressDrawTarget::stderr());
        let template = if self.colored {
            "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})"
        } else {
            "{spinner} [{elapsed_precise}] [{wide_bar}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})"
        };
        if let Ok(bar_style) = ProgressStyle::default_bar().template(template) {
            bar.set_style(bar_style.progress_chars("#>-"));
        }
        bar.enable_steady_tick(Duration::from_millis(100));
        bar
    }

    /// Print above the bar, if there is one
    fn line(&self, text: String) {
        let guard = self.bar.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(bar) => bar.suspend(|| println!("{}", text)),
            None => println!("{}", text),
        }
    }

    /// Clear a bar left behind by an interrupted job
    pub fn finish(&self) {
        if let Some(bar) = self.take_bar() {
            bar.finish_and_clear();
        }
    }

    fn take_bar(&self) -> Option<ProgressBar> {
        self.bar
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

impl ProgressReporter for ConsoleReporter {
    fn job_started(&self, source: &Path, destination: &Path, total_size: u64, resumed: bool) {
        if self.quiet {
            return;
        }

        let verb = if resumed { "Resuming" } else { "Copying" };
        self.line(format!(
            "{} {} {} -> {} ({})",
            style("→").green().bold(),
            verb,
            style(source.display()).cyan(),
            style(destination.display()).cyan(),
            format_bytes(total_size)
        ));

        let bar = self.new_bar(total_size);
        *self.bar.lock().unwrap_or_else(PoisonError::into_inner) = Some(bar);
    }

    fn chunk_completed(&self, progress: &ChunkProgress) {
        if self.quiet {
            return;
        }

        let guard = self.bar.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(bar) = guard.as_ref() {
            bar.set_position(progress.bytes_copied);
            bar.suspend(|| println!("{}", progress));
        } else {
            println!("{}", progress);
        }
    }

    fn job_skipped(&self, _source: &Path, destination: &Path) {
        if self.quiet {
            return;
        }
        self.line(format!(
            "{} {} already exists. Don't overwrite.",
            style("!").yellow().bold(),
            style(destination.display()).yellow()
        ));
    }

    fn job_completed(&self, source: &Path, stats: &CopyStats) {
        if let Some(bar) = self.take_bar() {
            bar.finish_and_clear();
        }
        if self.quiet {
            return;
        }

        let name = source
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| source.display().to_string());
        println!(
            "{} {} ({} in {})",
            style("✓").green().bold(),
            name,
            format_bytes(stats.bytes_copied),
            format_duration(stats.duration)
        );
    }

    fn job_failed(&self, source: &Path, error: &Error) {
        if let Some(bar) = self.take_bar() {
            bar.abandon();
        }
        eprintln!(
            "{} {}: {}",
            style("✗").red().bold(),
            style(source.display()).red(),
            error
        );
    }
}
