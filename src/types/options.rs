use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Credential material used to sign the final package.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningIdentity {
    pub keystore: PathBuf,
    pub key_alias: String,
    pub store_password: String,
    pub key_password: String,
}

impl SigningIdentity {
    pub fn new(
        keystore: impl Into<PathBuf>,
        key_alias: impl Into<String>,
        store_password: impl Into<String>,
        key_password: impl Into<String>,
    ) -> Self {
        Self {
            keystore: keystore.into(),
            key_alias: key_alias.into(),
            store_password: store_password.into(),
            key_password: key_password.into(),
        }
    }
}

impl fmt::Debug for SigningIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningIdentity")
            .field("keystore", &self.keystore)
            .field("key_alias", &self.key_alias)
            .field("store_password", &"<redacted>")
            .field("key_password", &"<redacted>")
            .finish()
    }
}

/// What to do when no signing identity can be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SigningPolicy {
    /// Fail the sign stage.
    #[default]
    RequireIdentity,
    /// Publish the aligned package unsigned and record a warning.
    FallbackUnsignedWithWarning,
}

/// Per-run options for the repackaging pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineOptions {
    pub min_sdk: u32,
    pub target_sdk: u32,
    pub inject_launcher: bool,
    pub launcher_activity_name: String,
    pub signing_identity: Option<SigningIdentity>,
    pub signing_policy: SigningPolicy,
    /// Replace raw numeric label/icon references the rebuild tool cannot resolve.
    pub rewrite_numeric_resource_refs: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            min_sdk: 24,
            target_sdk: 33,
            inject_launcher: false,
            launcher_activity_name: ".MainActivity".to_string(),
            signing_identity: None,
            signing_policy: SigningPolicy::RequireIdentity,
            rewrite_numeric_resource_refs: false,
        }
    }
}
