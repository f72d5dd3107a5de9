use crate::pipeline::error::{RepackError, Result};
use crate::tools::ToolCommand;
use crate::types::ToolSpec;
use std::path::{Path, PathBuf};
use tracing::info;

/// Rebuilds a decoded tree into a container (`apktool b`).
#[derive(Debug, Clone)]
pub struct PackageAssembler {
    tool: ToolSpec,
}

impl PackageAssembler {
    pub fn new(tool: ToolSpec) -> Self {
        Self { tool }
    }

    pub async fn rebuild(&self, decoded_tree: &Path, output: &Path) -> Result<PathBuf> {
        info!("Rebuilding {} into {}", decoded_tree.display(), output.display());

        let result = ToolCommand::new(&self.tool)
            .arg("b")
            .arg(decoded_tree)
            .arg("-o")
            .arg(output)
            .run()
            .await
            .map_err(|e| RepackError::Rebuild {
                tree: decoded_tree.to_path_buf(),
                diagnostics: format!("failed to launch {}: {e}", self.tool.name()),
            })?;

        if !result.success() {
            return Err(RepackError::Rebuild {
                tree: decoded_tree.to_path_buf(),
                diagnostics: result.diagnostics(),
            });
        }
        if !output.is_file() {
            return Err(RepackError::Rebuild {
                tree: decoded_tree.to_path_buf(),
                diagnostics: format!(
                    "{} reported success but wrote no archive at {}",
                    self.tool.name(),
                    output.display()
                ),
            });
        }

        Ok(output.to_path_buf())
    }
}
