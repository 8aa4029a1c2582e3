use std::io;
use std::path::{Path, PathBuf};

use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::generator::ArtifactLocation;

/// The served directory that generated maps are moved into.
///
/// Placement and purge hold the same lock, so a purge never observes a
/// half-placed artifact. File names are kept as reported by the generator;
/// two jobs reporting the same name overwrite each other.
pub struct ArtifactStore {
    dir: PathBuf,
    lock: Mutex<()>,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn ensure_dir(&self) -> io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await
    }

    /// Copies the artifact into the store and removes the original.
    ///
    /// Returns the stored file name. On failure nothing is left behind in the
    /// store for this artifact.
    pub async fn place(&self, artifact: &ArtifactLocation) -> Result<String, StoreError> {
        let file_name = artifact
            .file_name()
            .ok_or_else(|| StoreError::NoFileName(artifact.path.clone()))?
            .to_string();
        let target = self.dir.join(&file_name);

        let _g = self.lock.lock().await;

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| StoreError::io("create directory", &self.dir, e))?;

        if same_file(&artifact.path, &target).await {
            debug!("artifact already in store: {}", target.display());
            return Ok(file_name);
        }

        tokio::fs::copy(&artifact.path, &target)
            .await
            .map_err(|e| StoreError::io("copy", &artifact.path, e))?;

        if let Err(e) = tokio::fs::remove_file(&artifact.path).await {
            if let Err(undo) = tokio::fs::remove_file(&target).await {
                warn!("failed to roll back {}: {undo}", target.display());
            }
            return Err(StoreError::io("remove", &artifact.path, e));
        }

        Ok(file_name)
    }

    /// Deletes every file in the store. The directory itself stays.
    ///
    /// A missing or empty store is a successful no-op. Every file is
    /// attempted even if an earlier one fails.
    pub async fn purge(&self) -> Result<usize, StoreError> {
        let _g = self.lock.lock().await;

        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(StoreError::io("read", &self.dir, e)),
        };

        let mut removed = 0usize;
        let mut attempted = 0usize;
        let mut failed = 0usize;
        let mut first_failure: Option<String> = None;

        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    failed += 1;
                    first_failure
                        .get_or_insert_with(|| format!("read {}: {e}", self.dir.display()));
                    break;
                }
            };
            let is_dir = match entry.file_type().await {
                Ok(ft) => ft.is_dir(),
                Err(_) => false,
            };
            if is_dir {
                continue;
            }

            attempted += 1;
            let path = entry.path();
            match tokio::fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                // Someone else got there first.
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!("failed to delete {}: {e}", path.display());
                    failed += 1;
                    first_failure.get_or_insert_with(|| format!("{}: {e}", path.display()));
                }
            }
        }

        match first_failure {
            None => Ok(removed),
            Some(first) => Err(StoreError::CleanupFailed {
                failed,
                attempted,
                first,
            }),
        }
    }
}

async fn same_file(a: &Path, b: &Path) -> bool {
    match (
        tokio::fs::canonicalize(a).await,
        tokio::fs::canonicalize(b).await,
    ) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
