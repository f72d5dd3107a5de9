use crate::pipeline::error::RepackError;
use crate::pipeline::state::{PipelineState, StageName};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Non-fatal conditions surfaced alongside a successful run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PipelineWarning {
    /// The published package carries no signature.
    Unsigned { reason: String },
}

impl fmt::Display for PipelineWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineWarning::Unsigned { reason } => write!(f, "package published unsigned: {reason}"),
        }
    }
}

#[derive(Debug)]
pub enum PipelineOutcome {
    Success {
        artifact: PathBuf,
        signed: bool,
        sha256: String,
    },
    Failure {
        stage: StageName,
        error: RepackError,
    },
}

#[derive(Debug)]
pub struct PipelineResult {
    pub run_id: String,
    pub outcome: PipelineOutcome,
    pub warnings: Vec<PipelineWarning>,
    pub completed_stages: Vec<StageName>,
    pub states: Vec<PipelineState>,
    /// Workspace left on disk: always after a failure past preflight,
    /// after success only when configured.
    pub workspace: Option<PathBuf>,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
}

impl PipelineResult {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, PipelineOutcome::Success { .. })
    }

    pub fn artifact(&self) -> Option<&Path> {
        match &self.outcome {
            PipelineOutcome::Success { artifact, .. } => Some(artifact),
            PipelineOutcome::Failure { .. } => None,
        }
    }

    pub fn failure(&self) -> Option<(StageName, &RepackError)> {
        match &self.outcome {
            PipelineOutcome::Failure { stage, error } => Some((*stage, error)),
            PipelineOutcome::Success { .. } => None,
        }
    }

    pub fn final_state(&self) -> PipelineState {
        self.states.last().copied().unwrap_or(PipelineState::Idle)
    }

    pub fn summary(&self) -> PipelineSummary {
        let (artifact, signed, sha256, failure) = match &self.outcome {
            PipelineOutcome::Success {
                artifact,
                signed,
                sha256,
            } => (Some(artifact.clone()), Some(*signed), Some(sha256.clone()), None),
            PipelineOutcome::Failure { stage, error } => (
                None,
                None,
                None,
                Some(FailureSummary {
                    stage: *stage,
                    kind: error.kind(),
                    message: error.to_string(),
                    diagnostics: error.diagnostics().map(str::to_string),
                }),
            ),
        };

        PipelineSummary {
            run_id: self.run_id.clone(),
            success: self.is_success(),
            artifact,
            signed,
            sha256,
            failure,
            warnings: self.warnings.clone(),
            completed_stages: self.completed_stages.clone(),
            final_state: self.final_state(),
            workspace: self.workspace.clone(),
            started_at: self.started_at,
            finished_at: self.started_at
                + chrono::Duration::from_std(self.duration).unwrap_or_else(|_| chrono::Duration::zero()),
            duration_ms: self.duration.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FailureSummary {
    pub stage: StageName,
    pub kind: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<String>,
}

/// Serializable report of one run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineSummary {
    pub run_id: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureSummary>,
    pub warnings: Vec<PipelineWarning>,
    pub completed_stages: Vec<StageName>,
    pub final_state: PipelineState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace: Option<PathBuf>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
}
