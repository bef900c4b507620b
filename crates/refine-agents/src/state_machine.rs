//! Run state machine — explicit loop states and legal transition guards.
//!
//! Every run starts at `Init` and terminates at `Succeeded`,
//! `PartialSuccess` or `Failed`. The controller calls `advance()` to move
//! between states; each call validates the edge and records it so a run's
//! path can be replayed from its [`RunResult`](crate::controller::RunResult).

use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    /// Run created, nothing generated yet.
    Init,
    /// Generating and evaluating candidates.
    Iterating,
    /// A candidate met the quality threshold. Terminal.
    Succeeded,
    /// Budget spent with a candidate below threshold. Terminal.
    PartialSuccess,
    /// Terminal failure: no candidate, cancellation, or unresolvable task.
    Failed,
}

impl LoopState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::PartialSuccess | Self::Failed)
    }
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init => write!(f, "Init"),
            Self::Iterating => write!(f, "Iterating"),
            Self::Succeeded => write!(f, "Succeeded"),
            Self::PartialSuccess => write!(f, "PartialSuccess"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// ```text
/// Init → Iterating | Failed
/// Iterating → Succeeded | PartialSuccess | Failed
/// ```
fn is_legal_transition(from: LoopState, to: LoopState) -> bool {
    use LoopState::*;

    if to == Failed && !from.is_terminal() {
        return true;
    }

    matches!(
        (from, to),
        (Init, Iterating) | (Iterating, Succeeded) | (Iterating, PartialSuccess)
    )
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: LoopState,
    pub to: LoopState,
    /// Iteration at the time of transition.
    pub iteration: u32,
    /// Milliseconds since the run started.
    pub elapsed_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Error)]
#[error("Illegal state transition: {from} → {to}")]
pub struct IllegalTransition {
    pub from: LoopState,
    pub to: LoopState,
}

pub struct StateMachine {
    current: LoopState,
    iteration: u32,
    created_at: Instant,
    transitions: Vec<TransitionRecord>,
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            current: LoopState::Init,
            iteration: 0,
            created_at: Instant::now(),
            transitions: Vec::new(),
        }
    }

    pub fn current(&self) -> LoopState {
        self.current
    }

    pub fn set_iteration(&mut self, iteration: u32) {
        self.iteration = iteration;
    }

    pub fn advance(&mut self, to: LoopState, reason: Option<&str>) -> Result<(), IllegalTransition> {
        if !is_legal_transition(self.current, to) {
            return Err(IllegalTransition {
                from: self.current,
                to,
            });
        }

        tracing::debug!(
            from = %self.current,
            to = %to,
            iteration = self.iteration,
            "State transition"
        );

        self.transitions.push(TransitionRecord {
            from: self.current,
            to,
            iteration: self.iteration,
            elapsed_ms: self.created_at.elapsed().as_millis() as u64,
            reason: reason.map(String::from),
        });
        self.current = to;
        Ok(())
    }

    /// Always legal from non-terminal states.
    pub fn fail(&mut self, reason: &str) -> Result<(), IllegalTransition> {
        self.advance(LoopState::Failed, Some(reason))
    }

    pub fn is_terminal(&self) -> bool {
        self.current.is_terminal()
    }

    pub fn transitions(&self) -> &[TransitionRecord] {
        &self.transitions
    }

    pub fn into_transitions(self) -> Vec<TransitionRecord> {
        self.transitions
    }

    /// e.g. `Init → PartialSuccess (12ms) [Iterating → PartialSuccess]`.
    pub fn summary(&self) -> String {
        let states: Vec<String> = self.transitions.iter().map(|t| t.to.to_string()).collect();
        let mut out = format!(
            "{} → {} ({}ms)",
            LoopState::Init,
            self.current,
            self.created_at.elapsed().as_millis()
        );
        if !states.is_empty() {
            out.push_str(&format!(" [{}]", states.join(" → ")));
        }
        out
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let mut sm = StateMachine::new();
        sm.advance(LoopState::Iterating, None).unwrap();
        sm.set_iteration(2);
        sm.advance(LoopState::Succeeded, Some("threshold met")).unwrap();
        assert!(sm.is_terminal());
        assert_eq!(sm.transitions().len(), 2);
        assert_eq!(sm.transitions()[1].iteration, 2);
    }

    #[test]
    fn test_fail_from_init() {
        let mut sm = StateMachine::new();
        sm.fail("task not found").unwrap();
        assert_eq!(sm.current(), LoopState::Failed);
    }

    #[test]
    fn test_illegal_transitions() {
        let mut sm = StateMachine::new();
        let err = sm.advance(LoopState::Succeeded, None).unwrap_err();
        assert_eq!(err.from, LoopState::Init);
        assert_eq!(err.to_string(), "Illegal state transition: Init → Succeeded");

        sm.advance(LoopState::Iterating, None).unwrap();
        sm.advance(LoopState::PartialSuccess, None).unwrap();
        assert!(sm.fail("late").is_err());
    }

    #[test]
    fn test_summary_lists_path() {
        let mut sm = StateMachine::new();
        sm.advance(LoopState::Iterating, None).unwrap();
        sm.advance(LoopState::PartialSuccess, None).unwrap();
        let summary = sm.summary();
        assert!(summary.starts_with("Init → PartialSuccess"));
        assert!(summary.ends_with("[Iterating → PartialSuccess]"));
    }
}
