use std::fmt;

use serde::{Deserialize, Serialize};

use super::job::{CodegenRun, FailureKind, Outcome};

/// States of the per-scene generate → render → repair loop.
///
/// A run flows Drafting → Rendering and either ends in `Succeeded` or loops
/// back to `Drafting` until its attempt budget is spent, then `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CodegenState {
    Drafting,
    Rendering,
    Succeeded,
    Failed,
}

impl CodegenState {
    pub fn is_terminal(self) -> bool {
        matches!(self, CodegenState::Succeeded | CodegenState::Failed)
    }
}

impl fmt::Display for CodegenState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodegenState::Drafting => write!(f, "DRAFTING"),
            CodegenState::Rendering => write!(f, "RENDERING"),
            CodegenState::Succeeded => write!(f, "SUCCEEDED"),
            CodegenState::Failed => write!(f, "FAILED"),
        }
    }
}

/// What happened while the run was in its current state.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// A candidate program was generated and persisted.
    Drafted,
    /// The completion call failed; there is no candidate this round.
    DraftFailed(FailureKind),
    /// The candidate could not be written to storage. Fatal, consumes no attempt.
    PersistFailed(String),
    /// The render engine produced a clip.
    Rendered,
    /// The render engine rejected the candidate.
    RenderFailed(FailureKind),
}

/// The result of evaluating a step.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// Advance to the next state.
    Next(CodegenState),
    /// Go back to drafting with a fresh attempt.
    Retry { attempt: u32, reason: FailureKind },
    /// The run reached a terminal state.
    Complete(Outcome),
}

/// Drives a [`CodegenRun`] through the generate/render loop.
pub struct CodegenMachine;

impl CodegenMachine {
    /// Begin the first attempt. Has no effect on a run that already started.
    pub fn start(run: &mut CodegenRun) {
        if run.attempts == 0 && run.state == CodegenState::Drafting {
            run.attempts = 1;
        }
    }

    /// Compute and apply the next transition for `run` given the outcome of
    /// the step it just performed.
    ///
    /// - `Drafting`: a persisted draft advances to `Rendering`; a failed
    ///   completion retries if the budget allows; a persistence error fails
    ///   the run immediately.
    /// - `Rendering`: a clip completes the run; a rejection retries if the
    ///   budget allows, otherwise fails the run.
    /// - Terminal states keep returning their outcome.
    pub fn next(run: &mut CodegenRun, outcome: StepOutcome) -> Transition {
        let transition = match (run.state, outcome) {
            (CodegenState::Drafting, StepOutcome::Drafted) => {
                Transition::Next(CodegenState::Rendering)
            }
            (CodegenState::Drafting, StepOutcome::DraftFailed(kind)) => {
                Self::handle_failure(run, kind)
            }
            (CodegenState::Drafting, StepOutcome::PersistFailed(msg)) => {
                Transition::Complete(Outcome::Failure(FailureKind::System(msg)))
            }
            (CodegenState::Rendering, StepOutcome::Rendered) => {
                Transition::Complete(Outcome::Success)
            }
            (CodegenState::Rendering, StepOutcome::RenderFailed(kind)) => {
                Self::handle_failure(run, kind)
            }
            (CodegenState::Succeeded, _) => Transition::Complete(Outcome::Success),
            (CodegenState::Failed, _) => Transition::Complete(Outcome::Failure(
                run.last_failure
                    .clone()
                    .unwrap_or_else(|| FailureKind::System("run already failed".into())),
            )),
            (state, outcome) => Transition::Complete(Outcome::Failure(FailureKind::System(
                format!("unexpected {outcome:?} while {state}"),
            ))),
        };

        match &transition {
            Transition::Next(next_state) => {
                run.state_history.push(run.state);
                run.state = *next_state;
            }
            Transition::Retry { reason, .. } => {
                // attempts was already bumped in handle_failure.
                run.state_history.push(run.state);
                run.state = CodegenState::Drafting;
                run.last_failure = Some(reason.clone());
            }
            Transition::Complete(outcome) => {
                if !run.state.is_terminal() {
                    run.state_history.push(run.state);
                }
                match outcome {
                    Outcome::Success => run.state = CodegenState::Succeeded,
                    Outcome::Failure(kind) => {
                        run.state = CodegenState::Failed;
                        run.last_failure = Some(kind.clone());
                    }
                }
            }
        }

        transition
    }

    fn handle_failure(run: &mut CodegenRun, kind: FailureKind) -> Transition {
        if run.attempts < run.max_attempts {
            run.attempts += 1;
            Transition::Retry {
                attempt: run.attempts,
                reason: kind,
            }
        } else {
            Transition::Complete(Outcome::Failure(kind))
        }
    }
}
