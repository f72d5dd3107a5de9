use crate::pipeline::error::{RepackError, Result};
use crate::tools::ToolCommand;
use crate::types::ToolSpec;
use std::path::{Path, PathBuf};
use tracing::info;

pub const MANIFEST_FILE: &str = "AndroidManifest.xml";
pub const DECODED_DIR: &str = "decoded";

/// Unpacks a container into an editable tree with the decoder (`apktool d`).
#[derive(Debug, Clone)]
pub struct PackageExtractor {
    tool: ToolSpec,
}

impl PackageExtractor {
    pub fn new(tool: ToolSpec) -> Self {
        Self { tool }
    }

    /// Decode `input` into `<work_dir>/decoded` and return that directory.
    ///
    /// The decoder can exit zero without producing a manifest, so the
    /// manifest's presence is checked separately.
    pub async fn decode(&self, input: &Path, work_dir: &Path, force: bool) -> Result<PathBuf> {
        let decoded = work_dir.join(DECODED_DIR);
        info!("Decoding {} into {}", input.display(), decoded.display());

        let mut cmd = ToolCommand::new(&self.tool)
            .arg("d")
            .arg(input)
            .arg("-o")
            .arg(&decoded);
        if force {
            cmd = cmd.arg("-f");
        }

        let output = cmd.run().await.map_err(|e| RepackError::Decode {
            input: input.to_path_buf(),
            diagnostics: format!("failed to launch {}: {e}", self.tool.name()),
        })?;
        if !output.success() {
            return Err(RepackError::Decode {
                input: input.to_path_buf(),
                diagnostics: output.diagnostics(),
            });
        }

        let manifest = decoded.join(MANIFEST_FILE);
        if !manifest.is_file() {
            return Err(RepackError::ManifestMissing { path: manifest });
        }

        Ok(decoded)
    }
}
