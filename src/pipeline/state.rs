use serde::Serialize;
use std::fmt;

/// Identifies which step of a run produced an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StageName {
    /// Checks before any workspace exists: tools, input, output path.
    Preflight,
    Extract,
    ManifestPatch,
    Rebuild,
    ResourceFix,
    Align,
    Sign,
    Publish,
}

impl StageName {
    pub fn as_str(self) -> &'static str {
        match self {
            StageName::Preflight => "preflight",
            StageName::Extract => "extract",
            StageName::ManifestPatch => "manifest-patch",
            StageName::Rebuild => "rebuild",
            StageName::ResourceFix => "resource-fix",
            StageName::Align => "align",
            StageName::Sign => "sign",
            StageName::Publish => "publish",
        }
    }

    /// State the pipeline is in while this stage runs.
    pub fn state(self) -> PipelineState {
        match self {
            StageName::Preflight => PipelineState::Idle,
            StageName::Extract => PipelineState::Extracting,
            StageName::ManifestPatch => PipelineState::ManifestPatching,
            StageName::Rebuild => PipelineState::Rebuilding,
            StageName::ResourceFix => PipelineState::ResourceFixing,
            StageName::Align => PipelineState::Aligning,
            StageName::Sign => PipelineState::Signing,
            StageName::Publish => PipelineState::Publishing,
        }
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PipelineState {
    Idle,
    Extracting,
    ManifestPatching,
    Rebuilding,
    ResourceFixing,
    Aligning,
    Signing,
    Publishing,
    Done,
    Failed,
}

impl PipelineState {
    const SEQUENCE: [PipelineState; 9] = [
        PipelineState::Idle,
        PipelineState::Extracting,
        PipelineState::ManifestPatching,
        PipelineState::Rebuilding,
        PipelineState::ResourceFixing,
        PipelineState::Aligning,
        PipelineState::Signing,
        PipelineState::Publishing,
        PipelineState::Done,
    ];

    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed)
    }

    fn position(self) -> Option<usize> {
        Self::SEQUENCE.iter().position(|s| *s == self)
    }

    /// Forward by exactly one step, or to `Failed` from any non-terminal state.
    pub fn can_transition_to(self, next: PipelineState) -> bool {
        if self.is_terminal() {
            return false;
        }
        if next == PipelineState::Failed {
            return true;
        }
        match (self.position(), next.position()) {
            (Some(from), Some(to)) => to == from + 1,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidTransition {
    pub from: PipelineState,
    pub to: PipelineState,
}

impl fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid pipeline transition {:?} -> {:?}", self.from, self.to)
    }
}

/// Current state plus every state visited, starting at `Idle`.
#[derive(Debug, Clone)]
pub struct StateTracker {
    history: Vec<PipelineState>,
}

impl Default for StateTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl StateTracker {
    pub fn new() -> Self {
        Self {
            history: vec![PipelineState::Idle],
        }
    }

    pub fn current(&self) -> PipelineState {
        *self.history.last().unwrap_or(&PipelineState::Idle)
    }

    pub fn advance(&mut self, next: PipelineState) -> Result<(), InvalidTransition> {
        let from = self.current();
        if !from.can_transition_to(next) {
            return Err(InvalidTransition { from, to: next });
        }
        self.history.push(next);
        Ok(())
    }

    pub fn history(&self) -> &[PipelineState] {
        &self.history
    }

    pub fn into_history(self) -> Vec<PipelineState> {
        self.history
    }
}
