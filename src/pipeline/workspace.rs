use crate::types::WorkspaceConfig;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;

/// Private scratch directory owned by exactly one run.
///
/// Dropping it deletes the directory; failed runs call [`Workspace::retain`]
/// so intermediate artifacts stay on disk for inspection.
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    pub fn create(config: &WorkspaceConfig, run_id: &str) -> std::io::Result<Self> {
        let short_id: String = run_id.chars().take(8).collect();
        let prefix = format!("apk-repack-{short_id}-");
        let mut builder = tempfile::Builder::new();
        builder.prefix(&prefix);

        let dir = match &config.base_dir {
            Some(base) => {
                std::fs::create_dir_all(base)?;
                builder.tempdir_in(base)?
            }
            None => builder.tempdir()?,
        };
        debug!("Created workspace {}", dir.path().display());
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn rebuilt_apk(&self) -> PathBuf {
        self.path().join("rebuilt.apk")
    }

    pub fn aligned_apk(&self) -> PathBuf {
        self.path().join("aligned.apk")
    }

    pub fn signed_apk(&self) -> PathBuf {
        self.path().join("signed.apk")
    }

    /// Keep the directory on disk and return its path.
    pub fn retain(self) -> PathBuf {
        self.dir.keep()
    }

    pub fn discard(self) -> std::io::Result<()> {
        self.dir.close()
    }
}
