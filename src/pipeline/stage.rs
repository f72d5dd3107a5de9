use crate::package::SigningIdentityProvider;
use crate::pipeline::error::{RepackError, Result};
use crate::pipeline::result::PipelineWarning;
use crate::pipeline::state::StageName;
use crate::pipeline::workspace::Workspace;
use crate::types::{PipelineConfig, PipelineOptions};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// One step of a run. Stages read their inputs from and record their outputs
/// into the shared [`RunContext`].
#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> StageName;

    async fn execute(&self, ctx: &mut RunContext<'_>) -> Result<()>;
}

/// Paths produced so far in a run.
#[derive(Debug, Clone, Default)]
pub struct Artifacts {
    pub decoded_tree: Option<PathBuf>,
    pub rebuilt: Option<PathBuf>,
    pub aligned: Option<PathBuf>,
    /// Package handed to publishing: signed, or aligned when the policy allowed skipping.
    pub final_package: Option<PathBuf>,
    pub signed: bool,
    pub published: Option<PathBuf>,
    pub sha256: Option<String>,
}

fn produced<'a>(slot: &'a Option<PathBuf>, what: &str, stage: StageName) -> Result<&'a Path> {
    slot.as_deref().ok_or_else(|| {
        RepackError::Config(format!("stage {stage} needs the {what}, which no earlier stage produced"))
    })
}

impl Artifacts {
    pub fn decoded_tree(&self, stage: StageName) -> Result<&Path> {
        produced(&self.decoded_tree, "decoded tree", stage)
    }

    pub fn rebuilt(&self, stage: StageName) -> Result<&Path> {
        produced(&self.rebuilt, "rebuilt archive", stage)
    }

    pub fn aligned(&self, stage: StageName) -> Result<&Path> {
        produced(&self.aligned, "aligned archive", stage)
    }

    pub fn final_package(&self, stage: StageName) -> Result<&Path> {
        produced(&self.final_package, "final package", stage)
    }
}

/// Everything a stage may look at. Options, config and identity provider are
/// borrowed read-only for the whole run.
pub struct RunContext<'a> {
    pub input: &'a Path,
    pub output: &'a Path,
    pub options: &'a PipelineOptions,
    pub config: &'a PipelineConfig,
    pub identity_provider: &'a dyn SigningIdentityProvider,
    pub workspace: &'a Workspace,
    pub artifacts: Artifacts,
    pub warnings: Vec<PipelineWarning>,
}

impl<'a> RunContext<'a> {
    pub fn new(
        input: &'a Path,
        output: &'a Path,
        options: &'a PipelineOptions,
        config: &'a PipelineConfig,
        identity_provider: &'a dyn SigningIdentityProvider,
        workspace: &'a Workspace,
    ) -> Self {
        Self {
            input,
            output,
            options,
            config,
            identity_provider,
            workspace,
            artifacts: Artifacts::default(),
            warnings: Vec::new(),
        }
    }
}
