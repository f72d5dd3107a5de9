use crate::pipeline::error::{RepackError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// How to launch one external tool.
///
/// `args` are prepended to every invocation, so `java -jar apktool.jar`
/// is expressed as `program: java, args: ["-jar", "apktool.jar"]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub program: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
}

impl ToolSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Name used for availability checks and log lines.
    pub fn name(&self) -> String {
        self.program.to_string_lossy().into_owned()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub apktool: ToolSpec,
    pub zipalign: ToolSpec,
    pub apksigner: ToolSpec,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            apktool: ToolSpec::new("apktool"),
            zipalign: ToolSpec::new("zipalign"),
            apksigner: ToolSpec::new("apksigner"),
        }
    }
}

impl ToolsConfig {
    /// Programs every run needs, in invocation order.
    pub fn required(&self) -> Vec<&ToolSpec> {
        vec![&self.apktool, &self.zipalign, &self.apksigner]
    }
}

/// Identity used when a run supplies none: the SDK debug keystore.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SigningDefaults {
    pub keystore: PathBuf,
    pub key_alias: String,
    pub store_password: String,
    pub key_password: String,
}

impl Default for SigningDefaults {
    fn default() -> Self {
        Self {
            keystore: dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".android")
                .join("debug.keystore"),
            key_alias: "androiddebugkey".to_string(),
            store_password: "android".to_string(),
            key_password: "android".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// Parent for run workspaces; the system temp dir when unset.
    pub base_dir: Option<PathBuf>,
    /// Keep the workspace after a successful run. Failed runs always keep it.
    pub keep_workspace: bool,
}

/// Environment the pipeline runs in. Read-only for the duration of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub tools: ToolsConfig,
    pub signing: SigningDefaults,
    pub workspace: WorkspaceConfig,
    /// Archive member that must end up stored uncompressed.
    pub resource_table: String,
    pub alignment: u16,
    /// Pass `-f` to the decoder so an existing output tree is overwritten.
    pub force_decode: bool,
    pub verify_alignment: bool,
    pub verify_signature: bool,
    pub launcher_theme: String,
    pub fallback_label: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            tools: ToolsConfig::default(),
            signing: SigningDefaults::default(),
            workspace: WorkspaceConfig::default(),
            resource_table: "resources.arsc".to_string(),
            alignment: 4,
            force_decode: true,
            verify_alignment: true,
            verify_signature: true,
            launcher_theme: "@android:style/Theme.DeviceDefault.NoActionBar".to_string(),
            fallback_label: "App".to_string(),
        }
    }
}

impl PipelineConfig {
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)
            .map_err(|e| RepackError::Config(format!("invalid pipeline config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values no run could use.
    pub fn validate(&self) -> Result<()> {
        if self.alignment == 0 {
            return Err(RepackError::Config(
                "alignment must be a positive byte boundary".to_string(),
            ));
        }
        if self.resource_table.is_empty() {
            return Err(RepackError::Config("resource_table must name an archive member".to_string()));
        }
        Ok(())
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            RepackError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_yaml_str(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.resource_table, "resources.arsc");
        assert_eq!(config.alignment, 4);
        assert_eq!(config.tools.apktool, ToolSpec::new("apktool"));
        assert_eq!(config.signing.key_alias, "androiddebugkey");
        assert!(config.signing.keystore.ends_with(".android/debug.keystore"));
        assert!(!config.workspace.keep_workspace);
    }

    #[test]
    fn test_yaml_overrides_merge_with_defaults() {
        let yaml = r#"
tools:
  apktool:
    program: java
    args: ["-jar", "/opt/apktool.jar"]
signing:
  keystore: /keys/release.jks
  key_alias: release
workspace:
  keep_workspace: true
verify_signature: false
"#;
        let config = PipelineConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.tools.apktool.program, PathBuf::from("java"));
        assert_eq!(config.tools.apktool.args, vec!["-jar", "/opt/apktool.jar"]);
        assert_eq!(config.tools.zipalign, ToolSpec::new("zipalign"));
        assert_eq!(config.signing.keystore, PathBuf::from("/keys/release.jks"));
        assert_eq!(config.signing.store_password, "android");
        assert!(config.workspace.keep_workspace);
        assert!(!config.verify_signature);
        assert!(config.verify_alignment);
    }

    #[test]
    fn test_zero_alignment_is_config_error() {
        let err = PipelineConfig::from_yaml_str("alignment: 0").unwrap_err();
        assert_eq!(err.kind(), "config");
        assert!(err.to_string().contains("alignment"));

        let config = PipelineConfig {
            alignment: 0,
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());
        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_yaml_is_config_error() {
        let err = PipelineConfig::from_yaml_str("alignment: [not, a, number]").unwrap_err();
        assert_eq!(err.kind(), "config");
    }
}
