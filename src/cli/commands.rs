use crate::cli::options::PatchArgs;
use crate::pipeline::error::Result;
use crate::pipeline::{Pipeline, PipelineResult};
use crate::tools::ToolAvailabilityChecker;
use crate::types::PipelineConfig;
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info};

/// Config from `path`, or the defaults when no file was given.
pub fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(path) => {
            debug!("Loading pipeline config from {}", path.display());
            PipelineConfig::from_file(path)
        }
        None => Ok(PipelineConfig::default()),
    }
}

/// Run the pipeline for `patch`. Pipeline failures are reported in the
/// returned result; only argument and config problems are errors here.
pub async fn run_patch(args: &PatchArgs) -> Result<PipelineResult> {
    let mut config = load_config(args.config.as_deref())?;
    if args.keep_workspace {
        config.workspace.keep_workspace = true;
    }
    let options = args.to_options()?;

    info!(
        "Patching {} (minSdk {}, targetSdk {})",
        args.input.display(),
        options.min_sdk,
        options.target_sdk
    );
    let result = Pipeline::new(config)
        .run(&args.input, &args.output, &options)
        .await;
    Ok(result)
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolStatus {
    pub role: &'static str,
    pub program: String,
    pub available: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolReport {
    pub tools: Vec<ToolStatus>,
}

impl ToolReport {
    pub fn all_available(&self) -> bool {
        self.tools.iter().all(|t| t.available)
    }

    pub fn missing(&self) -> Vec<&str> {
        self.tools
            .iter()
            .filter(|t| !t.available)
            .map(|t| t.program.as_str())
            .collect()
    }
}

pub fn check_tools(config: &PipelineConfig, checker: &ToolAvailabilityChecker) -> ToolReport {
    let roles = [
        ("decoder", &config.tools.apktool),
        ("aligner", &config.tools.zipalign),
        ("signer", &config.tools.apksigner),
    ];
    let tools = roles
        .into_iter()
        .map(|(role, spec)| {
            let program = spec.name();
            ToolStatus {
                role,
                available: checker.is_available(&program),
                program,
            }
        })
        .collect();
    ToolReport { tools }
}
