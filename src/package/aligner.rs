use crate::pipeline::error::{RepackError, Result};
use crate::tools::ToolCommand;
use crate::types::ToolSpec;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use zip::{CompressionMethod, ZipArchive};

/// Fixed part of a zip local file header; name and extra lengths sit at 26 and 28.
const LOCAL_HEADER_LEN: u64 = 30;

/// Aligns stored archive members with `zipalign`.
#[derive(Debug, Clone)]
pub struct Aligner {
    tool: ToolSpec,
}

impl Aligner {
    pub fn new(tool: ToolSpec) -> Self {
        Self { tool }
    }

    /// Write an aligned copy of `input` to `output`, replacing any existing file.
    pub async fn align(&self, input: &Path, boundary: u16, output: &Path) -> Result<PathBuf> {
        info!("Aligning {} to {}-byte boundaries", input.display(), boundary);

        let result = ToolCommand::new(&self.tool)
            .args(["-p", "-f"])
            .arg(boundary.to_string())
            .arg(input)
            .arg(output)
            .run()
            .await
            .map_err(|e| RepackError::Align {
                archive: input.to_path_buf(),
                diagnostics: format!("failed to launch {}: {e}", self.tool.name()),
            })?;

        if !result.success() {
            return Err(RepackError::Align {
                archive: input.to_path_buf(),
                diagnostics: result.diagnostics(),
            });
        }
        if !output.is_file() {
            return Err(RepackError::Align {
                archive: input.to_path_buf(),
                diagnostics: format!("no aligned archive written at {}", output.display()),
            });
        }

        Ok(output.to_path_buf())
    }
}

/// Names of stored (uncompressed) members whose data does not start on a
/// multiple of `boundary`. Compressed members and directories are ignored.
pub fn check_alignment(archive: &Path, boundary: u16) -> Result<Vec<String>> {
    let to_align_error = |reason: String| RepackError::Align {
        archive: archive.to_path_buf(),
        diagnostics: reason,
    };

    if boundary == 0 {
        return Err(to_align_error("alignment boundary must be positive".to_string()));
    }

    let stored = stored_members(archive).map_err(|e| to_align_error(e.to_string()))?;

    let mut file = File::open(archive).map_err(|e| to_align_error(e.to_string()))?;
    let mut misaligned = Vec::new();
    for (name, header_start) in stored {
        let data_start =
            data_offset(&mut file, header_start).map_err(|e| to_align_error(e.to_string()))?;
        if data_start % u64::from(boundary) != 0 {
            debug!("{} data starts at {} (not {}-aligned)", name, data_start, boundary);
            misaligned.push(name);
        }
    }
    Ok(misaligned)
}

fn stored_members(archive: &Path) -> zip::result::ZipResult<Vec<(String, u64)>> {
    let mut zip = ZipArchive::new(BufReader::new(File::open(archive)?))?;
    let mut stored = Vec::new();
    for i in 0..zip.len() {
        let entry = zip.by_index_raw(i)?;
        if entry.compression() == CompressionMethod::Stored && !entry.is_dir() {
            stored.push((entry.name().to_string(), entry.header_start()));
        }
    }
    Ok(stored)
}

fn data_offset(file: &mut File, header_start: u64) -> std::io::Result<u64> {
    let mut lengths = [0u8; 4];
    file.seek(SeekFrom::Start(header_start + 26))?;
    file.read_exact(&mut lengths)?;
    let name_len = u16::from_le_bytes([lengths[0], lengths[1]]) as u64;
    let extra_len = u16::from_le_bytes([lengths[2], lengths[3]]) as u64;
    Ok(header_start + LOCAL_HEADER_LEN + name_len + extra_len)
}
