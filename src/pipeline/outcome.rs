//! Result type of stages that can degrade instead of failing.

/// Output of the classifier and analyzer.
///
/// `Degraded` carries usable fallback data plus the cause. The orchestrator
/// treats both variants as success; only the audit metadata differs.
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome<T> {
    Success(T),
    Degraded { data: T, cause: String },
}

impl<T> StageOutcome<T> {
    pub fn degraded(data: T, cause: impl Into<String>) -> Self {
        StageOutcome::Degraded {
            data,
            cause: cause.into(),
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, StageOutcome::Degraded { .. })
    }

    pub fn data(&self) -> &T {
        match self {
            StageOutcome::Success(data) | StageOutcome::Degraded { data, .. } => data,
        }
    }

    pub fn cause(&self) -> Option<&str> {
        match self {
            StageOutcome::Success(_) => None,
            StageOutcome::Degraded { cause, .. } => Some(cause),
        }
    }

    pub fn into_data(self) -> T {
        match self {
            StageOutcome::Success(data) | StageOutcome::Degraded { data, .. } => data,
        }
    }
}
