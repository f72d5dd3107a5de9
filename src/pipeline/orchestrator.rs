use crate::package::{DebugKeystoreProvider, SigningIdentityProvider};
use crate::pipeline::error::{RepackError, Result};
use crate::pipeline::result::{PipelineOutcome, PipelineResult, PipelineWarning};
use crate::pipeline::stage::{RunContext, Stage};
use crate::pipeline::stages::default_stages;
use crate::pipeline::state::{PipelineState, StageName, StateTracker};
use crate::pipeline::workspace::Workspace;
use crate::tools::ToolAvailabilityChecker;
use crate::types::{PipelineConfig, PipelineOptions};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

/// Runs the repackaging stages in order against one input.
///
/// A `Pipeline` holds no per-run state, so one instance can drive any number
/// of concurrent runs; each run gets its own workspace.
pub struct Pipeline {
    config: PipelineConfig,
    checker: ToolAvailabilityChecker,
    identity_provider: Box<dyn SigningIdentityProvider>,
    stages: Vec<Box<dyn Stage>>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        let identity_provider = Box::new(DebugKeystoreProvider::new(config.signing.clone()));
        Self {
            config,
            checker: ToolAvailabilityChecker::new(),
            identity_provider,
            stages: default_stages(),
        }
    }

    pub fn with_tool_checker(mut self, checker: ToolAvailabilityChecker) -> Self {
        self.checker = checker;
        self
    }

    pub fn with_identity_provider(mut self, provider: impl SigningIdentityProvider + 'static) -> Self {
        self.identity_provider = Box::new(provider);
        self
    }

    /// Replace the stage list. Stages must still follow the pipeline order;
    /// a stage out of sequence fails the run.
    pub fn with_stages(mut self, stages: Vec<Box<dyn Stage>>) -> Self {
        self.stages = stages;
        self
    }

    /// Program names the configured tools resolve to.
    pub fn required_tools(&self) -> Vec<String> {
        self.config.tools.required().iter().map(|t| t.name()).collect()
    }

    pub fn missing_tools(&self) -> BTreeSet<String> {
        self.checker.check_tools(self.required_tools())
    }

    pub async fn run(&self, input: &Path, output: &Path, options: &PipelineOptions) -> PipelineResult {
        let run_id = Uuid::new_v4().to_string();
        let span = tracing::info_span!("repack", run = %&run_id[..8]);
        self.run_with_id(run_id, input, output, options)
            .instrument(span)
            .await
    }

    async fn run_with_id(
        &self,
        run_id: String,
        input: &Path,
        output: &Path,
        options: &PipelineOptions,
    ) -> PipelineResult {
        let started_at = Utc::now();
        let clock = Instant::now();
        let mut tracker = StateTracker::new();
        info!("Repackaging {} -> {}", input.display(), output.display());

        let report = |tracker: StateTracker,
                      outcome: PipelineOutcome,
                      warnings: Vec<PipelineWarning>,
                      completed_stages: Vec<StageName>,
                      workspace: Option<PathBuf>| {
            finish(
                run_id.clone(),
                started_at,
                clock,
                tracker,
                outcome,
                warnings,
                completed_stages,
                workspace,
            )
        };

        if let Err(error) = self.preflight(input, output) {
            error!("Preflight failed: {}", error);
            fail(&mut tracker);
            let outcome = PipelineOutcome::Failure {
                stage: StageName::Preflight,
                error,
            };
            return report(tracker, outcome, Vec::new(), Vec::new(), None);
        }

        let workspace = match Workspace::create(&self.config.workspace, &run_id) {
            Ok(workspace) => workspace,
            Err(e) => {
                error!("Could not create workspace: {}", e);
                fail(&mut tracker);
                let outcome = PipelineOutcome::Failure {
                    stage: StageName::Preflight,
                    error: RepackError::Workspace(e),
                };
                return report(tracker, outcome, Vec::new(), Vec::new(), None);
            }
        };

        let mut ctx = RunContext::new(
            input,
            output,
            options,
            &self.config,
            self.identity_provider.as_ref(),
            &workspace,
        );
        let mut completed = Vec::new();
        let mut failure = None;

        for stage in &self.stages {
            let name = stage.name();
            if let Err(invalid) = tracker.advance(name.state()) {
                failure = Some((name, RepackError::Config(invalid.to_string())));
                break;
            }

            info!("Stage {} started", name);
            let stage_clock = Instant::now();
            match stage.execute(&mut ctx).await {
                Ok(()) => {
                    debug!("Stage {} finished in {:?}", name, stage_clock.elapsed());
                    completed.push(name);
                }
                Err(e) => {
                    failure = Some((name, e));
                    break;
                }
            }
        }

        if failure.is_none() {
            if let Err(invalid) = tracker.advance(PipelineState::Done) {
                failure = Some((StageName::Publish, RepackError::Config(invalid.to_string())));
            }
        }

        let RunContext {
            artifacts, warnings, ..
        } = ctx;

        if let Some((stage, error)) = failure {
            error!("Stage {} failed: {}", stage, error);
            fail(&mut tracker);
            let kept = workspace.retain();
            warn!("Workspace kept for inspection at {}", kept.display());
            let outcome = PipelineOutcome::Failure { stage, error };
            return report(tracker, outcome, warnings, completed, Some(kept));
        }

        let retained = if self.config.workspace.keep_workspace {
            let kept = workspace.retain();
            info!("Workspace kept at {}", kept.display());
            Some(kept)
        } else {
            if let Err(e) = workspace.discard() {
                warn!("Could not remove workspace: {}", e);
            }
            None
        };

        let outcome = PipelineOutcome::Success {
            artifact: artifacts
                .published
                .unwrap_or_else(|| output.to_path_buf()),
            signed: artifacts.signed,
            sha256: artifacts.sha256.unwrap_or_default(),
        };
        for warning in &warnings {
            warn!("{}", warning);
        }
        report(tracker, outcome, warnings, completed, retained)
    }

    fn preflight(&self, input: &Path, output: &Path) -> Result<()> {
        self.config.validate()?;
        let missing = self.missing_tools();
        if !missing.is_empty() {
            return Err(RepackError::ToolMissing { missing });
        }
        if !input.is_file() {
            return Err(RepackError::Decode {
                input: input.to_path_buf(),
                diagnostics: "input package does not exist or is not a file".to_string(),
            });
        }
        if output.is_dir() {
            return Err(RepackError::Publish {
                output: output.to_path_buf(),
                reason: "output path is a directory".to_string(),
            });
        }
        Ok(())
    }
}

fn fail(tracker: &mut StateTracker) {
    if let Err(invalid) = tracker.advance(PipelineState::Failed) {
        debug!("{}", invalid);
    }
}

#[allow(clippy::too_many_arguments)]
fn finish(
    run_id: String,
    started_at: DateTime<Utc>,
    clock: Instant,
    tracker: StateTracker,
    outcome: PipelineOutcome,
    warnings: Vec<PipelineWarning>,
    completed_stages: Vec<StageName>,
    workspace: Option<PathBuf>,
) -> PipelineResult {
    PipelineResult {
        run_id,
        outcome,
        warnings,
        completed_stages,
        states: tracker.into_history(),
        workspace,
        started_at,
        duration: clock.elapsed(),
    }
}

/// Run every stage with the default configuration.
pub async fn run_pipeline(input: &Path, output: &Path, options: &PipelineOptions) -> PipelineResult {
    Pipeline::new(PipelineConfig::default())
        .run(input, output, options)
        .await
}
