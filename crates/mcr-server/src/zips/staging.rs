//! Per-invocation staging directories
//!
//! Each packaging attempt gets its own directory under the configured staging
//! root. The directory is removed when the [`StagingArea`] is closed or
//! dropped, so every exit path (including `?` and panics) cleans up.

use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};

const DOWNLOADS_DIR: &str = "downloads";

pub struct StagingArea {
    dir: TempDir,
    downloads: PathBuf,
}

impl StagingArea {
    /// Create a fresh directory under `root`, labelled for log readability
    pub fn create(root: &Path, label: &str) -> io::Result<Self> {
        std::fs::create_dir_all(root)?;

        let dir = tempfile::Builder::new()
            .prefix(&format!("zip-{}-", sanitize_label(label)))
            .tempdir_in(root)?;
        let downloads = dir.path().join(DOWNLOADS_DIR);
        std::fs::create_dir(&downloads)?;

        debug!(path = %dir.path().display(), "Created staging area");
        Ok(Self { dir, downloads })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Directory downloaded documents are written to
    pub fn downloads_dir(&self) -> &Path {
        &self.downloads
    }

    /// Path for a file at the top of the staging area
    pub fn file_path(&self, file_name: &str) -> PathBuf {
        self.dir.path().join(file_name)
    }

    /// Remove the directory now, logging rather than failing on error
    pub fn close(self) {
        let path = self.dir.path().to_path_buf();
        match self.dir.close() {
            Ok(()) => debug!(path = %path.display(), "Removed staging area"),
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove staging area"),
        }
    }
}

fn sanitize_label(label: &str) -> String {
    label
        .chars()
        .take(64)
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}
