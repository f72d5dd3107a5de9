//! Resource table storage fix.
//!
//! Android 11+ refuses to install packages whose `resources.arsc` is
//! compressed or not 4-byte aligned. The rebuild step usually deflates it,
//! so the member is re-added here as `Stored` before alignment runs.

use crate::pipeline::error::{RepackError, Result};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tokio::task;
use tracing::{debug, info};
use zip::{result::ZipError, write::SimpleFileOptions, CompressionMethod, ZipArchive, ZipWriter};

pub const SCRATCH_DIR: &str = "scratch";

#[derive(Debug, thiserror::Error)]
enum ArchiveError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("ZIP error: {0}")]
    Zip(#[from] ZipError),
    #[error("Failed to replace archive: {0}")]
    Persist(#[from] tempfile::PersistError),
}

#[derive(Debug, Clone)]
pub struct ResourceCompressionFixer {
    member: String,
    alignment: u16,
}

impl Default for ResourceCompressionFixer {
    fn default() -> Self {
        Self::new("resources.arsc", 4)
    }
}

impl ResourceCompressionFixer {
    pub fn new(member: impl Into<String>, alignment: u16) -> Self {
        Self {
            member: member.into(),
            alignment,
        }
    }

    /// Make sure the resource table inside `archive` is stored uncompressed.
    /// Returns `true` if the archive was rewritten; a missing or already stored
    /// member leaves it untouched.
    pub async fn ensure_uncompressed(&self, archive: &Path, work_dir: &Path) -> Result<bool> {
        let fixer = self.clone();
        let archive_path = archive.to_path_buf();
        let work_dir = work_dir.to_path_buf();

        task::spawn_blocking(move || fixer.ensure_uncompressed_sync(&archive_path, &work_dir))
            .await
            .map_err(|e| RepackError::ResourceFix {
                archive: archive.to_path_buf(),
                reason: format!("Task join error: {e}"),
            })?
    }

    pub fn ensure_uncompressed_sync(&self, archive: &Path, work_dir: &Path) -> Result<bool> {
        self.fix(archive, work_dir)
            .map_err(|e| RepackError::ResourceFix {
                archive: archive.to_path_buf(),
                reason: e.to_string(),
            })
    }

    fn fix(&self, archive_path: &Path, work_dir: &Path) -> std::result::Result<bool, ArchiveError> {
        let mut archive = ZipArchive::new(BufReader::new(File::open(archive_path)?))?;

        let compression = match archive.by_name(&self.member) {
            Ok(entry) => entry.compression(),
            Err(ZipError::FileNotFound) => {
                debug!("{} has no {}; nothing to fix", archive_path.display(), self.member);
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        };
        if compression == CompressionMethod::Stored {
            debug!("{} already stored uncompressed", self.member);
            return Ok(false);
        }

        info!(
            "{} is {:?}; re-adding it uncompressed",
            self.member, compression
        );

        let mut contents = Vec::new();
        archive.by_name(&self.member)?.read_to_end(&mut contents)?;
        let scratch = self.write_scratch_copy(work_dir, &contents)?;
        debug!("Extracted {} to {}", self.member, scratch.display());

        let parent = archive_path.parent().unwrap_or_else(|| Path::new("."));
        let mut rewritten = tempfile::NamedTempFile::new_in(parent)?;
        {
            let mut writer = ZipWriter::new(BufWriter::new(rewritten.as_file_mut()));
            let stored = SimpleFileOptions::default()
                .compression_method(CompressionMethod::Stored)
                .with_alignment(self.alignment);

            for i in 0..archive.len() {
                let entry = archive.by_index_raw(i)?;
                if entry.name() == self.member {
                    let name = entry.name().to_string();
                    drop(entry);
                    writer.start_file(name, stored)?;
                    writer.write_all(&contents)?;
                } else {
                    writer.raw_copy_file(entry)?;
                }
            }

            let mut inner = writer.finish()?;
            inner.flush()?;
        }
        rewritten.persist(archive_path)?;

        Ok(true)
    }

    fn write_scratch_copy(&self, work_dir: &Path, contents: &[u8]) -> std::io::Result<PathBuf> {
        let scratch_dir = work_dir.join(SCRATCH_DIR);
        std::fs::create_dir_all(&scratch_dir)?;
        let file_name = Path::new(&self.member)
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| self.member.clone().into());
        let path = scratch_dir.join(file_name);
        std::fs::write(&path, contents)?;
        Ok(path)
    }
}

/// Default fixer: `resources.arsc`, 4-byte alignment.
pub async fn ensure_uncompressed_resource_table(archive: &Path, work_dir: &Path) -> Result<bool> {
    ResourceCompressionFixer::default()
        .ensure_uncompressed(archive, work_dir)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::aligner::check_alignment;

    fn table_bytes() -> Vec<u8> {
        (0..4096u32).flat_map(|i| (i % 17).to_le_bytes()).collect()
    }

    fn write_archive(path: &Path, table_method: CompressionMethod) {
        let mut writer = ZipWriter::new(File::create(path).unwrap());
        let deflated = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        writer.start_file("AndroidManifest.xml", deflated).unwrap();
        writer.write_all(b"<manifest/>").unwrap();
        writer
            .start_file(
                "resources.arsc",
                SimpleFileOptions::default().compression_method(table_method),
            )
            .unwrap();
        writer.write_all(&table_bytes()).unwrap();
        writer.start_file("classes.dex", deflated).unwrap();
        writer.write_all(b"dex\n035").unwrap();
        writer.finish().unwrap();
    }

    fn read_member(path: &Path, name: &str) -> (CompressionMethod, Vec<u8>) {
        let mut archive = ZipArchive::new(File::open(path).unwrap()).unwrap();
        let mut entry = archive.by_name(name).unwrap();
        let mut data = Vec::new();
        entry.read_to_end(&mut data).unwrap();
        (entry.compression(), data)
    }

    #[tokio::test]
    async fn test_compressed_table_is_restored_uncompressed() {
        let dir = tempfile::tempdir().unwrap();
        let apk = dir.path().join("rebuilt.apk");
        write_archive(&apk, CompressionMethod::Deflated);

        let changed = ensure_uncompressed_resource_table(&apk, dir.path()).await.unwrap();
        assert!(changed);

        let (method, data) = read_member(&apk, "resources.arsc");
        assert_eq!(method, CompressionMethod::Stored);
        assert_eq!(data, table_bytes());
        assert!(dir.path().join(SCRATCH_DIR).join("resources.arsc").is_file());
        assert!(check_alignment(&apk, 4).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_other_members_survive_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let apk = dir.path().join("rebuilt.apk");
        write_archive(&apk, CompressionMethod::Deflated);

        ensure_uncompressed_resource_table(&apk, dir.path()).await.unwrap();

        let archive = ZipArchive::new(File::open(&apk).unwrap()).unwrap();
        let names: Vec<_> = archive.file_names().collect();
        assert_eq!(names.len(), 3);
        let (method, data) = read_member(&apk, "classes.dex");
        assert_eq!(method, CompressionMethod::Deflated);
        assert_eq!(data, b"dex\n035");
        let (_, manifest) = read_member(&apk, "AndroidManifest.xml");
        assert_eq!(manifest, b"<manifest/>");

        let mut archive = ZipArchive::new(File::open(&apk).unwrap()).unwrap();
        let order: Vec<String> = (0..archive.len())
            .map(|i| archive.by_index_raw(i).unwrap().name().to_string())
            .collect();
        assert_eq!(order, vec!["AndroidManifest.xml", "resources.arsc", "classes.dex"]);
    }

    #[tokio::test]
    async fn test_stored_table_is_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        let apk = dir.path().join("rebuilt.apk");
        write_archive(&apk, CompressionMethod::Stored);
        let before = std::fs::read(&apk).unwrap();

        let changed = ensure_uncompressed_resource_table(&apk, dir.path()).await.unwrap();
        assert!(!changed);
        assert_eq!(std::fs::read(&apk).unwrap(), before);
    }

    #[tokio::test]
    async fn test_missing_table_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let apk = dir.path().join("rebuilt.apk");
        let mut writer = ZipWriter::new(File::create(&apk).unwrap());
        writer.start_file("classes.dex", SimpleFileOptions::default()).unwrap();
        writer.write_all(b"dex").unwrap();
        writer.finish().unwrap();

        assert!(!ensure_uncompressed_resource_table(&apk, dir.path()).await.unwrap());
    }

    #[tokio::test]
    async fn test_corrupt_archive_is_resource_fix_error() {
        let dir = tempfile::tempdir().unwrap();
        let apk = dir.path().join("rebuilt.apk");
        std::fs::write(&apk, b"definitely not a zip").unwrap();

        let err = ensure_uncompressed_resource_table(&apk, dir.path()).await.unwrap_err();
        assert_eq!(err.kind(), "resource_fix");
    }
}
