//! Periodic sweep of the staging directory.
//!
//! Requests delete their own staged files; the janitor reclaims files left
//! behind by crashes. It only removes regular files older than `min_age`, so a
//! document that is still being streamed is never pulled out from under a
//! request.

use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::staging::TempFileStore;

pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Comfortably above the longest plausible request.
pub const DEFAULT_MIN_AGE: Duration = Duration::from_secs(10 * 60);

/// Smallest interval accepted by [`Janitor::spawn`].
const MIN_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    pub scanned: usize,
    pub removed: usize,
    pub skipped_recent: usize,
    pub skipped_other: usize,
    pub failed: usize,
}

#[derive(Debug, Clone)]
pub struct Janitor {
    dir: PathBuf,
    interval: Duration,
    min_age: Duration,
}

impl Janitor {
    pub fn new(dir: impl Into<PathBuf>, interval: Duration, min_age: Duration) -> Self {
        Self {
            dir: dir.into(),
            interval,
            min_age,
        }
    }

    pub fn for_store(store: &TempFileStore, interval: Duration, min_age: Duration) -> Self {
        Self::new(store.dir(), interval, min_age)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// One pass over the directory. Per-entry failures are logged and counted;
    /// they never stop the sweep.
    pub async fn sweep(&self) -> SweepReport {
        let mut report = SweepReport::default();

        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(dir = %self.dir.display(), "staging directory missing; nothing to sweep");
                return report;
            }
            Err(err) => {
                warn!(dir = %self.dir.display(), error = %err, "cannot list staging directory");
                report.failed += 1;
                return report;
            }
        };

        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(err) => {
                    warn!(dir = %self.dir.display(), error = %err, "staging directory listing aborted");
                    report.failed += 1;
                    break;
                }
            };
            report.scanned += 1;
            let path = entry.path();

            let metadata = match entry.metadata().await {
                Ok(metadata) => metadata,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "stat failed");
                    report.failed += 1;
                    continue;
                }
            };
            if !metadata.is_file() {
                report.skipped_other += 1;
                continue;
            }
            if !self.min_age.is_zero() {
                let age = metadata
                    .modified()
                    .ok()
                    .and_then(|modified| SystemTime::now().duration_since(modified).ok())
                    .unwrap_or_default();
                if age < self.min_age {
                    report.skipped_recent += 1;
                    continue;
                }
            }

            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    debug!(path = %path.display(), "orphaned export removed");
                    report.removed += 1;
                }
                // The owning request got there first.
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "delete failed");
                    report.failed += 1;
                }
            }
        }

        info!(
            dir = %self.dir.display(),
            scanned = report.scanned,
            removed = report.removed,
            skipped_recent = report.skipped_recent,
            failed = report.failed,
            "staging sweep finished"
        );
        report
    }

    /// Sweep now, then every `interval`, until the task is aborted.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval.max(MIN_INTERVAL));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.sweep().await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn indiscriminate(dir: &Path) -> Janitor {
        Janitor::new(dir, DEFAULT_SWEEP_INTERVAL, Duration::ZERO)
    }

    #[tokio::test]
    async fn empty_directory_is_a_noop() {
        let dir = TempDir::new().unwrap();
        let report = indiscriminate(dir.path()).sweep().await;
        assert_eq!(report, SweepReport::default());
    }

    #[tokio::test]
    async fn missing_directory_is_a_noop() {
        let dir = TempDir::new().unwrap();
        let report = indiscriminate(&dir.path().join("never-created")).sweep().await;
        assert_eq!(report, SweepReport::default());
    }

    #[tokio::test]
    async fn removes_every_regular_file_and_second_pass_is_noop() {
        let dir = TempDir::new().unwrap();
        for i in 0..3 {
            std::fs::write(dir.path().join(format!("generated-report-{i}.pdf")), b"%PDF-").unwrap();
        }
        let janitor = indiscriminate(dir.path());

        let first = janitor.sweep().await;
        assert_eq!(first.removed, 3);
        assert_eq!(first.failed, 0);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);

        let second = janitor.sweep().await;
        assert_eq!(second, SweepReport::default());
    }

    #[tokio::test]
    async fn leaves_directories_alone() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("subdir")).unwrap();
        std::fs::write(dir.path().join("orphan.pdf"), b"%PDF-").unwrap();

        let report = indiscriminate(dir.path()).sweep().await;
        assert_eq!(report.removed, 1);
        assert_eq!(report.skipped_other, 1);
        assert!(dir.path().join("subdir").is_dir());
    }

    #[tokio::test]
    async fn young_files_survive_when_min_age_is_set() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("in-flight.pdf"), b"%PDF-").unwrap();

        let janitor = Janitor::new(dir.path(), DEFAULT_SWEEP_INTERVAL, DEFAULT_MIN_AGE);
        let report = janitor.sweep().await;
        assert_eq!(report.removed, 0);
        assert_eq!(report.skipped_recent, 1);
        assert!(dir.path().join("in-flight.pdf").exists());
    }

    #[tokio::test]
    async fn spawned_task_sweeps_immediately() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("orphan.pdf"), b"%PDF-").unwrap();

        let handle = indiscriminate(dir.path()).spawn();
        for _ in 0..50 {
            if !dir.path().join("orphan.pdf").exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        handle.abort();
        assert!(!dir.path().join("orphan.pdf").exists());
    }
}
