//! Pipeline lifecycle states.

use std::fmt;

/// Lifecycle state of a pipeline or native object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum PipelineState {
    /// Idle: no resources allocated.
    #[default]
    Null,
    /// Resources allocated, not prerolled.
    Ready,
    /// Prerolled, clock stopped.
    Paused,
    /// Data flowing.
    Playing,
}

impl PipelineState {
    /// Diagnostic label for this state.
    pub fn label(&self) -> &'static str {
        match self {
            PipelineState::Null => "STATE_NULL",
            PipelineState::Ready => "STATE_READY",
            PipelineState::Paused => "STATE_PAUSED",
            PipelineState::Playing => "STATE_PLAYING",
        }
    }

    /// The adjacent state one step toward `target`, or `None` when already
    /// there. Transitions always pass through every intermediate state.
    pub fn step_toward(&self, target: PipelineState) -> Option<PipelineState> {
        use PipelineState::*;
        let next = match (*self).cmp(&target) {
            std::cmp::Ordering::Equal => return None,
            std::cmp::Ordering::Less => match self {
                Null => Ready,
                Ready => Paused,
                Paused | Playing => Playing,
            },
            std::cmp::Ordering::Greater => match self {
                Playing => Paused,
                Paused => Ready,
                Ready | Null => Null,
            },
        };
        Some(next)
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Immediate answer of the engine to a state change request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateChangeReturn {
    /// Transition completed.
    Success,
    /// Transition will complete asynchronously.
    Async,
    /// Transition completed; live source, no preroll.
    NoPreroll,
    /// Transition refused.
    Failure,
}

impl StateChangeReturn {
    /// True for every answer except [`StateChangeReturn::Failure`].
    pub fn is_accepted(&self) -> bool {
        !matches!(self, StateChangeReturn::Failure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_toward_upward() {
        let mut state = PipelineState::Null;
        let mut path = Vec::new();
        while let Some(next) = state.step_toward(PipelineState::Playing) {
            path.push(next);
            state = next;
        }
        assert_eq!(
            path,
            [PipelineState::Ready, PipelineState::Paused, PipelineState::Playing]
        );
    }

    #[test]
    fn test_step_toward_downward() {
        assert_eq!(
            PipelineState::Playing.step_toward(PipelineState::Null),
            Some(PipelineState::Paused)
        );
        assert_eq!(PipelineState::Paused.step_toward(PipelineState::Paused), None);
    }

    #[test]
    fn test_failure_not_accepted() {
        assert!(StateChangeReturn::Async.is_accepted());
        assert!(!StateChangeReturn::Failure.is_accepted());
        assert_eq!(PipelineState::default(), PipelineState::Null);
    }
}
