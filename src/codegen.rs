//! Per-scene generate → render → repair loop.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::SceneError;
use crate::llm::{ChatRequest, CompletionClient, CompletionError};
use crate::pool::WorkerPool;
use crate::render::{RenderEngine, RenderFailure};
use crate::segmenter::strip_code_fence;
use crate::state_machine::{
    CodegenMachine, CodegenRun, CodegenState, FailureKind, Outcome, StepOutcome, Transition,
};
use crate::storage::{self, ScenePaths};

pub const SCENE_SYSTEM_PROMPT: &str = r#"You are an expert in Manim, the Python animation library used by 3Blue1Brown. Given the narration of one scene of an educational video, write a complete, self-contained Manim program that animates it.

Requirements:
- Import everything you need (start with `from manim import *`).
- Name the root scene class `VideoScene`.
- Keep the animation roughly as long as the narration takes to read aloud.
- Only use objects and methods that exist in the current Manim Community release.

ONLY respond with the Python code. Do not wrap it in markdown, do not add a language name, and do not explain it."#;

/// A clip the render engine accepted.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedAsset {
    pub path: PathBuf,
    /// Attempts it took, including the successful one.
    pub attempts: u32,
}

pub struct SceneCodeGenerator<'a, C, R> {
    client: &'a C,
    renderer: &'a R,
    pool: &'a WorkerPool,
    model: &'a str,
    completion_timeout: Duration,
    render_timeout: Duration,
}

impl<'a, C: CompletionClient, R: RenderEngine> SceneCodeGenerator<'a, C, R> {
    pub fn new(
        client: &'a C,
        renderer: &'a R,
        pool: &'a WorkerPool,
        model: &'a str,
        completion_timeout: Duration,
        render_timeout: Duration,
    ) -> Self {
        Self {
            client,
            renderer,
            pool,
            model,
            completion_timeout,
            render_timeout,
        }
    }

    /// Drive `run` until the render engine accepts a program or the attempt
    /// budget is spent.
    ///
    /// Every rejection is appended to the run's history as the rejected
    /// program followed by the engine's diagnostics, unmodified, so the next
    /// draft sees exactly what went wrong.
    pub async fn generate_and_render(
        &self,
        scene_id: &str,
        narration: &str,
        run: &mut CodegenRun,
        paths: &ScenePaths,
    ) -> Result<RenderedAsset, SceneError> {
        run.seed(SCENE_SYSTEM_PROMPT, narration);
        CodegenMachine::start(run);

        let mut candidate = String::new();
        let mut clip: Option<PathBuf> = None;

        loop {
            let outcome = match run.state {
                CodegenState::Drafting => match self.draft(run).await {
                    Ok(code) => match storage::write_atomic(&paths.program, &code).await {
                        Ok(()) => {
                            candidate = code;
                            StepOutcome::Drafted
                        }
                        Err(e) => StepOutcome::PersistFailed(format!(
                            "could not persist program to {}: {e}",
                            paths.program.display()
                        )),
                    },
                    Err(kind) => StepOutcome::DraftFailed(kind),
                },
                CodegenState::Rendering => match self.render(paths).await {
                    Ok(path) => {
                        clip = Some(path);
                        StepOutcome::Rendered
                    }
                    Err(failure) => {
                        let diagnostics = failure.to_string();
                        run.record_rejection(&candidate, &diagnostics);
                        match failure {
                            RenderFailure::Diagnostics { .. } | RenderFailure::MissingOutput(_) => {
                                StepOutcome::RenderFailed(FailureKind::Business(diagnostics))
                            }
                            RenderFailure::Spawn(_) | RenderFailure::Timeout(_) => {
                                StepOutcome::RenderFailed(FailureKind::System(diagnostics))
                            }
                        }
                    }
                },
                state @ (CodegenState::Succeeded | CodegenState::Failed) => {
                    return Err(SceneError::GenerationFailed {
                        attempts: run.attempts,
                        reason: format!("code generation already {state}"),
                    });
                }
            };

            match CodegenMachine::next(run, outcome) {
                Transition::Next(state) => {
                    tracing::debug!(scene_id, attempt = run.attempts, %state, "codegen transition");
                }
                Transition::Retry { attempt, reason } => {
                    tracing::warn!(
                        scene_id,
                        attempt,
                        max_attempts = run.max_attempts,
                        reason = %reason,
                        "scene program rejected, retrying"
                    );
                }
                Transition::Complete(Outcome::Success) => {
                    let path = clip.take().ok_or_else(|| SceneError::GenerationFailed {
                        attempts: run.attempts,
                        reason: "render reported success without a clip".into(),
                    })?;
                    tracing::info!(scene_id, attempts = run.attempts, clip = %path.display(), "scene rendered");
                    return Ok(RenderedAsset {
                        path,
                        attempts: run.attempts,
                    });
                }
                Transition::Complete(Outcome::Failure(kind)) => {
                    tracing::error!(scene_id, attempts = run.attempts, reason = %kind, "code generation gave up");
                    return Err(SceneError::GenerationFailed {
                        attempts: run.attempts,
                        reason: kind.message().to_string(),
                    });
                }
            }
        }
    }

    async fn draft(&self, run: &CodegenRun) -> Result<String, FailureKind> {
        let req = ChatRequest {
            model: self.model.to_string(),
            messages: run.history.clone(),
            temperature: None,
        };
        let raw = match tokio::time::timeout(self.completion_timeout, self.client.complete(&req)).await {
            Ok(result) => result,
            Err(_) => Err(CompletionError::Timeout(self.completion_timeout.as_secs())),
        }
        .map_err(|e| FailureKind::System(e.to_string()))?;

        let code = strip_code_fence(&raw);
        if code.is_empty() {
            return Err(FailureKind::System("completion contained no program".into()));
        }
        Ok(code.to_string())
    }

    async fn render(&self, paths: &ScenePaths) -> Result<PathBuf, RenderFailure> {
        self.pool
            .run(async {
                tokio::time::timeout(
                    self.render_timeout,
                    self.renderer.render(&paths.program, &paths.media_dir),
                )
                .await
                .unwrap_or(Err(RenderFailure::Timeout(self.render_timeout.as_secs())))
            })
            .await
    }
}
