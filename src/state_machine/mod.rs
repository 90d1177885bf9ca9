mod job;
mod state;

pub use job::{
    CodegenRun, FailureKind, Job, JobReport, Outcome, Scene, SceneAssets, SceneStatus,
};
pub use state::{CodegenMachine, CodegenState, StepOutcome, Transition};
