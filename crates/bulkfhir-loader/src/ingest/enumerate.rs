//! Bundle file enumeration
//!
//! Walks the bundle root on a blocking thread and feeds every `.json`
//! file into the worker queue. The walk blocks while the queue is full.
//! The queue closes when the walk ends, successfully or not.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use walkdir::WalkDir;

use super::pool::BundleQueue;

/// True for regular files with a `.json` extension
pub fn is_bundle_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}

/// Enqueues every bundle under `root`, returning how many were queued.
///
/// Consumes the queue so it is closed on return.
pub fn enqueue_bundles(root: &Path, queue: BundleQueue) -> Result<u64> {
    if !root.is_dir() {
        bail!("Bundle root {} is not a directory", root.display());
    }

    let mut queued = 0;
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "Skipping unreadable path under bundle root");
                continue;
            }
        };

        if !entry.file_type().is_file() || !is_bundle_file(entry.path()) {
            debug!(path = %entry.path().display(), "Skipping non-bundle path");
            continue;
        }

        queue
            .blocking_enqueue(entry.into_path())
            .context("Workers exited before enumeration finished")?;
        queued += 1;
    }

    queue.close();
    Ok(queued)
}

/// Runs [`enqueue_bundles`] on the blocking thread pool
pub fn spawn_enumerator(root: PathBuf, queue: BundleQueue) -> JoinHandle<Result<u64>> {
    tokio::task::spawn_blocking(move || enqueue_bundles(&root, queue))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::error::BundleError;
    use crate::ingest::pipeline::{BundleHandler, BundleOutcome};
    use crate::ingest::pool::WorkerPool;
    use async_trait::async_trait;
    use std::fs;
    use tempfile::TempDir;

    struct Counting;

    #[async_trait]
    impl BundleHandler for Counting {
        async fn handle(&mut self, _path: &Path) -> Result<BundleOutcome, BundleError> {
            Ok(BundleOutcome::default())
        }
    }

    #[test]
    fn test_is_bundle_file() {
        assert!(is_bundle_file(Path::new("a/b/patient.json")));
        assert!(is_bundle_file(Path::new("UPPER.JSON")));
        assert!(!is_bundle_file(Path::new("notes.txt")));
        assert!(!is_bundle_file(Path::new("json")));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_enumerates_nested_json_files_only() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("nested/deeper")).unwrap();
        fs::write(dir.path().join("a.json"), "{}").unwrap();
        fs::write(dir.path().join("nested/b.json"), "{}").unwrap();
        fs::write(dir.path().join("nested/deeper/c.json"), "{}").unwrap();
        fs::write(dir.path().join("nested/readme.md"), "").unwrap();
        fs::create_dir_all(dir.path().join("folder.json")).unwrap();

        let (queue, pool) = WorkerPool::spawn(vec![Counting, Counting], 1);
        let queued = spawn_enumerator(dir.path().to_path_buf(), queue)
            .await
            .unwrap()
            .unwrap();
        let report = pool.join().await;

        assert_eq!(queued, 3);
        assert_eq!(report.processed(), 3);
    }

    #[tokio::test]
    async fn test_missing_root_is_an_error() {
        let (queue, pool) = WorkerPool::spawn(vec![Counting], 1);
        let result = spawn_enumerator(PathBuf::from("/definitely/not/here"), queue)
            .await
            .unwrap();
        assert!(result.is_err());
        assert_eq!(pool.join().await.processed(), 0);
    }
}
