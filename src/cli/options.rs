use crate::pipeline::error::{RepackError, Result};
use crate::types::{PipelineOptions, SigningIdentity, SigningPolicy};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Repackage an Android application: patch its manifest, rebuild, align and sign.
#[derive(Parser)]
#[command(name = "apk-repack")]
#[command(about = "Patch, rebuild, align and sign Android application packages")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct ApkRepackCli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbosity: u8,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the full repackaging pipeline on one package
    Patch(PatchArgs),

    /// Report which external tools are missing
    CheckTools {
        /// Pipeline configuration file (YAML)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SigningPolicyArg {
    /// Fail when no signing identity is available
    Require,
    /// Publish unsigned with a warning when no signing identity is available
    FallbackUnsigned,
}

impl From<SigningPolicyArg> for SigningPolicy {
    fn from(arg: SigningPolicyArg) -> Self {
        match arg {
            SigningPolicyArg::Require => SigningPolicy::RequireIdentity,
            SigningPolicyArg::FallbackUnsigned => SigningPolicy::FallbackUnsignedWithWarning,
        }
    }
}

#[derive(Debug, Args)]
pub struct PatchArgs {
    /// Package to repackage
    pub input: PathBuf,

    /// Where the repackaged package is written
    pub output: PathBuf,

    /// Minimum API level written to the manifest
    #[arg(long, default_value_t = 24)]
    pub min_sdk: u32,

    /// Target API level written to the manifest
    #[arg(long, default_value_t = 33)]
    pub target_sdk: u32,

    /// Add a launcher activity when the manifest lacks one
    #[arg(long)]
    pub inject_launcher: bool,

    /// Name of the injected launcher activity
    #[arg(long, default_value = ".MainActivity")]
    pub launcher_activity: String,

    /// Keystore holding the signing key (defaults to the debug keystore)
    #[arg(long)]
    pub keystore: Option<PathBuf>,

    /// Alias of the signing key inside the keystore
    #[arg(long, requires = "keystore")]
    pub key_alias: Option<String>,

    /// Keystore password
    #[arg(long, requires = "keystore")]
    pub store_pass: Option<String>,

    /// Key password (defaults to the keystore password)
    #[arg(long, requires = "keystore")]
    pub key_pass: Option<String>,

    /// What to do when no signing identity can be resolved
    #[arg(long, value_enum, default_value = "require")]
    pub signing_policy: SigningPolicyArg,

    /// Replace numeric label/icon references the rebuild tool cannot resolve
    #[arg(long)]
    pub rewrite_resource_refs: bool,

    /// Pipeline configuration file (YAML)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Keep the workspace after a successful run
    #[arg(long)]
    pub keep_workspace: bool,

    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

impl PatchArgs {
    pub fn signing_identity(&self) -> Result<Option<SigningIdentity>> {
        let Some(keystore) = &self.keystore else {
            return Ok(None);
        };
        let key_alias = self.key_alias.clone().ok_or_else(|| {
            RepackError::Config("--key-alias is required with --keystore".to_string())
        })?;
        let store_pass = self.store_pass.clone().ok_or_else(|| {
            RepackError::Config("--store-pass is required with --keystore".to_string())
        })?;
        let key_pass = self.key_pass.clone().unwrap_or_else(|| store_pass.clone());
        Ok(Some(SigningIdentity::new(keystore, key_alias, store_pass, key_pass)))
    }

    pub fn to_options(&self) -> Result<PipelineOptions> {
        if self.min_sdk > self.target_sdk {
            return Err(RepackError::Config(format!(
                "--min-sdk {} is above --target-sdk {}",
                self.min_sdk, self.target_sdk
            )));
        }
        Ok(PipelineOptions {
            min_sdk: self.min_sdk,
            target_sdk: self.target_sdk,
            inject_launcher: self.inject_launcher,
            launcher_activity_name: self.launcher_activity.clone(),
            signing_identity: self.signing_identity()?,
            signing_policy: self.signing_policy.into(),
            rewrite_numeric_resource_refs: self.rewrite_resource_refs,
        })
    }
}
