//! File and directory tree copies
//!
//! A file source becomes `<destination dir>/<file name>`. A directory source
//! becomes `<destination dir>/<directory name>/...`, walked in name order,
//! each file its own [`CopyJob`].

use crate::cancel::CancellationGate;
use crate::job::{CopyJob, CopyOptions, CopyOutcome, OpenOutcome};
use resumecp_types::{CopyStats, Error, ProgressReporter, Result};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Outcome of a whole copy request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CopySummary {
    /// Counters accumulated over every file
    pub stats: CopyStats,
    /// An interrupt stopped the copy
    pub interrupted: bool,
    /// Checkpoint of the file that was being copied when interrupted
    pub checkpoint: Option<PathBuf>,
}

impl CopySummary {
    fn record(&mut self, outcome: CopyOutcome) {
        match outcome {
            CopyOutcome::Completed(stats) => self.stats.merge(&stats),
            CopyOutcome::Skipped => self.stats.files_skipped += 1,
            CopyOutcome::Interrupted { checkpoint, stats } => {
                self.stats.merge(&stats);
                self.interrupted = true;
                self.checkpoint = Some(checkpoint);
            }
        }
    }
}

/// Copy one file to `destination`, reporting a skip instead of overwriting
pub async fn copy_file(
    source: &Path,
    destination: &Path,
    options: &CopyOptions,
    cancel: CancellationToken,
    reporter: &dyn ProgressReporter,
) -> Result<CopyOutcome> {
    match CopyJob::open(source, destination, options.clone(), cancel).await {
        Ok(OpenOutcome::Ready(job)) => job.run(reporter).await,
        Ok(OpenOutcome::Skipped { destination }) => {
            reporter.job_skipped(source, &destination);
            Ok(CopyOutcome::Skipped)
        }
        Err(e) => {
            reporter.job_failed(source, &e);
            Err(e)
        }
    }
}

/// Copy a file or directory tree into `destination_dir`
pub async fn copy_path(
    source: &Path,
    destination_dir: &Path,
    options: &CopyOptions,
    gate: &CancellationGate,
    reporter: &dyn ProgressReporter,
) -> Result<CopySummary> {
    let started = Instant::now();
    let mut summary = CopySummary::default();

    if ensure_directory(destination_dir).await? {
        summary.stats.directories_created += 1;
    }

    let metadata = tokio::fs::metadata(source)
        .await
        .map_err(|e| Error::source_open(source, &e))?;

    if metadata.is_dir() {
        copy_directory(source, destination_dir, options, gate, reporter, &mut summary).await?;
    } else {
        let destination = destination_dir.join(entry_name(source)?);
        let outcome = copy_file(source, &destination, options, gate.register(), reporter).await?;
        summary.record(outcome);
    }

    summary.stats.duration = started.elapsed();
    Ok(summary)
}

async fn copy_directory(
    source: &Path,
    destination_dir: &Path,
    options: &CopyOptions,
    gate: &CancellationGate,
    reporter: &dyn ProgressReporter,
    summary: &mut CopySummary,
) -> Result<()> {
    let target_root = destination_dir.join(entry_name(source)?);
    let entries = list_entries(source.to_path_buf()).await?;

    for entry in entries {
        if gate.is_triggered() {
            summary.interrupted = true;
            break;
        }

        let entry = match entry {
            Ok(entry) => entry,
            Err(message) => {
                warn!(%message, "Skipping unreadable entry");
                summary.stats.errors += 1;
                continue;
            }
        };
        let target = target_root.join(&entry.relative);

        if entry.is_dir {
            debug!(directory = %entry.path.display(), "Entering directory");
            if ensure_directory(&target).await? {
                summary.stats.directories_created += 1;
            }
            continue;
        }

        match copy_file(&entry.path, &target, options, gate.register(), reporter).await {
            Ok(outcome) => {
                let interrupted = matches!(outcome, CopyOutcome::Interrupted { .. });
                summary.record(outcome);
                if interrupted {
                    break;
                }
            }
            Err(e) if e.is_recoverable() => {
                warn!(source = %entry.path.display(), error = %e, "Copy failed, moving on");
                summary.stats.errors += 1;
            }
            Err(e) => return Err(e),
        }
    }

    Ok(())
}

#[derive(Debug)]
struct Entry {
    path: PathBuf,
    relative: PathBuf,
    is_dir: bool,
}

/// Walk `root` in name order, directories before their contents
async fn list_entries(root: PathBuf) -> Result<Vec<std::result::Result<Entry, String>>> {
    tokio::task::spawn_blocking(move || {
        WalkDir::new(&root)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .map(|entry| -> std::result::Result<Entry, String> {
                let entry = entry.map_err(|e| e.to_string())?;
                let relative = entry
                    .path()
                    .strip_prefix(&root)
                    .map_err(|e| e.to_string())?
                    .to_path_buf();
                Ok(Entry {
                    is_dir: entry.file_type().is_dir(),
                    path: entry.into_path(),
                    relative,
                })
            })
            .collect()
    })
    .await
    .map_err(|e| Error::other(format!("Directory walk failed: {}", e)))
}

/// Create `dir` if missing. Returns whether it was created.
async fn ensure_directory(dir: &Path) -> Result<bool> {
    match tokio::fs::metadata(dir).await {
        Ok(metadata) if metadata.is_dir() => Ok(false),
        Ok(_) => Err(Error::NotADirectory {
            path: dir.to_path_buf(),
        }),
        Err(_) => {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| Error::destination_write(dir, &e))?;
            info!(directory = %dir.display(), "Created directory");
            Ok(true)
        }
    }
}

/// Last component of a source path, resolving `.` and `..`
fn entry_name(path: &Path) -> Result<PathBuf> {
    if let Some(name) = path.file_name() {
        return Ok(PathBuf::from(name));
    }

    std::fs::canonicalize(path)
        .ok()
        .and_then(|path| path.file_name().map(PathBuf::from))
        .ok_or_else(|| Error::other(format!("Cannot name a destination for '{}'", path.display())))
}
