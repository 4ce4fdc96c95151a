/// Result alias used throughout the engine.
pub type FxResult<T> = Result<T, FxError>;

/// Engine error taxonomy.
///
/// `Aborted` is not a failure: it is the normal termination path of a cancelled render and is
/// kept distinct so callers can decide whether to retry.
#[derive(thiserror::Error, Debug)]
pub enum FxError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("graph error: {0}")]
    Graph(String),

    #[error("render action failed: {0}")]
    Action(String),

    #[error("unable to allocate {bytes} bytes for image storage")]
    Allocation { bytes: u64 },

    #[error("render aborted")]
    Aborted,

    #[error("render recursion limit reached at depth {depth}")]
    RecursionLimit { depth: usize },

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl FxError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn graph(msg: impl Into<String>) -> Self {
        Self::Graph(msg.into())
    }

    pub fn action(msg: impl Into<String>) -> Self {
        Self::Action(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted)
    }

    /// Map this error onto the three-way render status.
    pub fn status(&self) -> RenderRoIStatus {
        if self.is_aborted() {
            RenderRoIStatus::Aborted
        } else {
            RenderRoIStatus::Failed
        }
    }
}

/// Outcome of one `render_roi` call as seen by a caller that only cares about the code.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderRoIStatus {
    Ok,
    Aborted,
    Failed,
}

/// Collapse a render result into its status code.
pub fn status_of<T>(res: &FxResult<T>) -> RenderRoIStatus {
    match res {
        Ok(_) => RenderRoIStatus::Ok,
        Err(e) => e.status(),
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
