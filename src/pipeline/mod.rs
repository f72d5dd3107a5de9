//! Stage orchestration: preflight, workspace lifecycle, ordered stages, result reporting.

pub mod error;
pub mod orchestrator;
pub mod result;
pub mod stage;
pub mod stages;
pub mod state;
pub mod workspace;

pub use error::{RepackError, Result};
pub use orchestrator::{run_pipeline, Pipeline};
pub use result::{PipelineOutcome, PipelineResult, PipelineSummary, PipelineWarning};
pub use stage::{Artifacts, RunContext, Stage};
pub use stages::{default_stages, patch_manifest_text};
pub use state::{PipelineState, StageName, StateTracker};
pub use workspace::Workspace;
