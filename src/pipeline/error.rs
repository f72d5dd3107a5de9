use std::collections::BTreeSet;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RepackError {
    #[error("Required external tools not found: {}", join_names(.missing))]
    ToolMissing { missing: BTreeSet<String> },

    #[error("Decoding {input} failed: {diagnostics}")]
    Decode { input: PathBuf, diagnostics: String },

    #[error("AndroidManifest.xml not found at {path}")]
    ManifestMissing { path: PathBuf },

    #[error("Manifest patch failed: {reason}")]
    ManifestPatch { reason: String },

    #[error("Rebuilding {tree} failed: {diagnostics}")]
    Rebuild { tree: PathBuf, diagnostics: String },

    #[error("Resource table fix failed for {archive}: {reason}")]
    ResourceFix { archive: PathBuf, reason: String },

    #[error("Aligning {archive} failed: {diagnostics}")]
    Align { archive: PathBuf, diagnostics: String },

    #[error("Signing failed: {reason}")]
    Sign { reason: String },

    #[error("Publishing to {output} failed: {reason}")]
    Publish { output: PathBuf, reason: String },

    #[error("Workspace error: {0}")]
    Workspace(#[source] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl RepackError {
    /// Diagnostic text captured from the external tool, when the failure came from one.
    pub fn diagnostics(&self) -> Option<&str> {
        match self {
            RepackError::Decode { diagnostics, .. }
            | RepackError::Rebuild { diagnostics, .. }
            | RepackError::Align { diagnostics, .. } => Some(diagnostics),
            _ => None,
        }
    }

    /// Stable identifier for structured output.
    pub fn kind(&self) -> &'static str {
        match self {
            RepackError::ToolMissing { .. } => "tool_missing",
            RepackError::Decode { .. } => "decode",
            RepackError::ManifestMissing { .. } => "manifest_missing",
            RepackError::ManifestPatch { .. } => "manifest_patch",
            RepackError::Rebuild { .. } => "rebuild",
            RepackError::ResourceFix { .. } => "resource_fix",
            RepackError::Align { .. } => "align",
            RepackError::Sign { .. } => "sign",
            RepackError::Publish { .. } => "publish",
            RepackError::Workspace(_) => "workspace",
            RepackError::Config(_) => "config",
        }
    }
}

fn join_names(names: &BTreeSet<String>) -> String {
    names.iter().cloned().collect::<Vec<_>>().join(", ")
}

pub type Result<T> = std::result::Result<T, RepackError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_missing_lists_every_tool() {
        let missing: BTreeSet<String> = ["zipalign", "apktool"].iter().map(|s| s.to_string()).collect();
        let err = RepackError::ToolMissing { missing };
        assert_eq!(
            err.to_string(),
            "Required external tools not found: apktool, zipalign"
        );
        assert_eq!(err.kind(), "tool_missing");
    }

    #[test]
    fn test_diagnostics_only_for_tool_failures() {
        let err = RepackError::Rebuild {
            tree: PathBuf::from("decoded"),
            diagnostics: "brut.androlib.AndrolibException".to_string(),
        };
        assert_eq!(err.diagnostics(), Some("brut.androlib.AndrolibException"));

        let err = RepackError::Sign {
            reason: "no identity".to_string(),
        };
        assert!(err.diagnostics().is_none());
    }
}
