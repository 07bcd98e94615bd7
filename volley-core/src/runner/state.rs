use serde::Serialize;

/// Lifecycle of one scenario run.
///
/// `Idle → Initializing → Running → Completed`, or `Failed` from
/// `Initializing`/`Running` when setup breaks. Individual request failures
/// never move a run to `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum ScenarioState {
    Idle,
    Initializing,
    Running,
    Completed,
    Failed,
}

impl ScenarioState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Initializing)
                | (Self::Initializing, Self::Running)
                | (Self::Initializing, Self::Failed)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Failed)
        )
    }
}
