use crate::pipeline::error::{RepackError, Result};
use crate::tools::ToolCommand;
use crate::types::{SigningDefaults, SigningIdentity, SigningPolicy, ToolSpec};
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Child environment variables carrying the keystore passwords, so they never appear in argv.
pub const STORE_PASS_ENV: &str = "APK_REPACK_KS_PASS";
pub const KEY_PASS_ENV: &str = "APK_REPACK_KEY_PASS";

/// Supplies a signing identity when a run does not bring its own.
pub trait SigningIdentityProvider: Send + Sync {
    fn default_identity(&self) -> Option<SigningIdentity>;

    /// Where the provider looked, for error messages.
    fn describe(&self) -> String;
}

/// The SDK debug keystore, if it has already been created.
#[derive(Debug, Clone)]
pub struct DebugKeystoreProvider {
    defaults: SigningDefaults,
}

impl DebugKeystoreProvider {
    pub fn new(defaults: SigningDefaults) -> Self {
        Self { defaults }
    }
}

impl SigningIdentityProvider for DebugKeystoreProvider {
    fn default_identity(&self) -> Option<SigningIdentity> {
        if !self.defaults.keystore.is_file() {
            return None;
        }
        Some(SigningIdentity::new(
            &self.defaults.keystore,
            &self.defaults.key_alias,
            &self.defaults.store_password,
            &self.defaults.key_password,
        ))
    }

    fn describe(&self) -> String {
        format!("default keystore {}", self.defaults.keystore.display())
    }
}

/// An explicit identity wins; otherwise ask the provider. An explicit identity
/// pointing at a missing keystore is an error rather than a silent fallback.
pub fn resolve_identity<'a>(
    explicit: Option<&'a SigningIdentity>,
    provider: &dyn SigningIdentityProvider,
) -> Result<Option<Cow<'a, SigningIdentity>>> {
    match explicit {
        Some(identity) if !identity.keystore.is_file() => Err(RepackError::Sign {
            reason: format!("keystore {} not found", identity.keystore.display()),
        }),
        Some(identity) => Ok(Some(Cow::Borrowed(identity))),
        None => Ok(provider.default_identity().map(Cow::Owned)),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignOutcome {
    Signed(PathBuf),
    /// No identity was available and the policy allowed skipping the signature.
    Unsigned { artifact: PathBuf, reason: String },
}

/// Signs and verifies with `apksigner`.
#[derive(Debug, Clone)]
pub struct Signer {
    tool: ToolSpec,
    verify_after_sign: bool,
}

impl Signer {
    pub fn new(tool: ToolSpec) -> Self {
        Self {
            tool,
            verify_after_sign: true,
        }
    }

    pub fn with_verification(mut self, verify: bool) -> Self {
        self.verify_after_sign = verify;
        self
    }

    /// Resolve an identity and sign `aligned` into `output`, applying `policy`
    /// when nothing can be resolved.
    pub async fn sign_with_policy(
        &self,
        aligned: &Path,
        explicit: Option<&SigningIdentity>,
        provider: &dyn SigningIdentityProvider,
        policy: SigningPolicy,
        output: &Path,
    ) -> Result<SignOutcome> {
        match resolve_identity(explicit, provider)? {
            Some(identity) => {
                let signed = self.sign(aligned, &identity, output).await?;
                if self.verify_after_sign {
                    self.verify(&signed).await?;
                }
                Ok(SignOutcome::Signed(signed))
            }
            None => {
                let reason = format!(
                    "no signing identity supplied and no {}",
                    provider.describe()
                );
                match policy {
                    SigningPolicy::RequireIdentity => Err(RepackError::Sign { reason }),
                    SigningPolicy::FallbackUnsignedWithWarning => {
                        warn!("Leaving package unsigned: {}", reason);
                        Ok(SignOutcome::Unsigned {
                            artifact: aligned.to_path_buf(),
                            reason,
                        })
                    }
                }
            }
        }
    }

    pub async fn sign(
        &self,
        aligned: &Path,
        identity: &SigningIdentity,
        output: &Path,
    ) -> Result<PathBuf> {
        info!(
            "Signing {} with key {} from {}",
            aligned.display(),
            identity.key_alias,
            identity.keystore.display()
        );

        let result = ToolCommand::new(&self.tool)
            .arg("sign")
            .arg("--ks")
            .arg(&identity.keystore)
            .arg("--ks-key-alias")
            .arg(&identity.key_alias)
            .arg("--ks-pass")
            .arg(format!("env:{STORE_PASS_ENV}"))
            .arg("--key-pass")
            .arg(format!("env:{KEY_PASS_ENV}"))
            .arg("--out")
            .arg(output)
            .arg(aligned)
            .env(STORE_PASS_ENV, identity.store_password.as_str())
            .env(KEY_PASS_ENV, identity.key_password.as_str())
            .run()
            .await
            .map_err(|e| RepackError::Sign {
                reason: format!("failed to launch {}: {e}", self.tool.name()),
            })?;

        if !result.success() {
            return Err(RepackError::Sign {
                reason: result.diagnostics(),
            });
        }
        if !output.is_file() {
            return Err(RepackError::Sign {
                reason: format!("no signed archive written at {}", output.display()),
            });
        }
        Ok(output.to_path_buf())
    }

    pub async fn verify(&self, signed: &Path) -> Result<()> {
        let result = ToolCommand::new(&self.tool)
            .arg("verify")
            .arg(signed)
            .run()
            .await
            .map_err(|e| RepackError::Sign {
                reason: format!("failed to launch {}: {e}", self.tool.name()),
            })?;

        if !result.success() {
            return Err(RepackError::Sign {
                reason: format!("signature verification failed: {}", result.diagnostics()),
            });
        }
        Ok(())
    }
}
