//! Fan-out/fan-in of scene work.
//!
//! Every scene runs its code generator and narrator side by side, and every
//! scene runs alongside its siblings. All render, synthesis and mux calls go
//! through one shared [`WorkerPool`](crate::pool::WorkerPool), so the number
//! of futures in flight is unbounded but the number of external processes is
//! not.

use std::cell::Cell;
use std::future::Future;

use futures::future::join_all;

use crate::codegen::SceneCodeGenerator;
use crate::error::SceneError;
use crate::llm::CompletionClient;
use crate::media::MediaToolkit;
use crate::narrator::SceneNarrator;
use crate::reconcile::DurationReconciler;
use crate::render::RenderEngine;
use crate::speech::{AudioFormat, SpeechEngine};
use crate::state_machine::{Job, Scene, SceneAssets};
use crate::storage::{ScenePaths, Workspace};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Left,
    Right,
}

/// Wait for both producers. Both are always driven to completion; if either
/// failed, the failure observed first is returned and any success discarded.
pub async fn join_pair<A, B, E>(
    left: impl Future<Output = Result<A, E>>,
    right: impl Future<Output = Result<B, E>>,
) -> Result<(A, B), E> {
    let first_failure = Cell::new(None);
    let note = |side: Side, failed: bool| {
        if failed && first_failure.get().is_none() {
            first_failure.set(Some(side));
        }
    };

    let (l, r) = tokio::join!(
        async {
            let out = left.await;
            note(Side::Left, out.is_err());
            out
        },
        async {
            let out = right.await;
            note(Side::Right, out.is_err());
            out
        },
    );

    match (l, r) {
        (Ok(a), Ok(b)) => Ok((a, b)),
        (Err(e), Ok(_)) | (Ok(_), Err(e)) => Err(e),
        (Err(le), Err(re)) => match first_failure.get() {
            Some(Side::Right) => Err(re),
            _ => Err(le),
        },
    }
}

pub struct SceneScheduler<'a, C, R, S, M> {
    generator: SceneCodeGenerator<'a, C, R>,
    narrator: SceneNarrator<'a, S, M>,
    reconciler: DurationReconciler<'a, M>,
    workspace: &'a Workspace,
    audio_format: AudioFormat,
}

impl<'a, C, R, S, M> SceneScheduler<'a, C, R, S, M>
where
    C: CompletionClient,
    R: RenderEngine,
    S: SpeechEngine,
    M: MediaToolkit,
{
    pub fn new(
        generator: SceneCodeGenerator<'a, C, R>,
        narrator: SceneNarrator<'a, S, M>,
        reconciler: DurationReconciler<'a, M>,
        workspace: &'a Workspace,
        audio_format: AudioFormat,
    ) -> Self {
        Self {
            generator,
            narrator,
            reconciler,
            workspace,
            audio_format,
        }
    }

    /// Run every scene of `job` to a terminal state. Scenes come back in
    /// creation order whatever order they finished in.
    pub async fn run(&self, mut job: Job) -> Job {
        let scenes = std::mem::take(&mut job.scenes);
        tracing::info!(job_id = %job.id, scenes = scenes.len(), "scheduling scenes");

        let job_id = job.id.as_str();
        let finished = join_all(scenes.into_iter().map(|scene| self.run_scene(job_id, scene))).await;
        job.scenes = finished;
        job
    }

    async fn run_scene(&self, job_id: &str, mut scene: Scene) -> Scene {
        let paths = self
            .workspace
            .scene_paths(job_id, &scene.id, self.audio_format);

        match self.produce(&mut scene, &paths).await {
            Ok(assets) => scene.succeed(assets),
            Err(e) => {
                tracing::warn!(job_id, scene_id = %scene.id, index = scene.index, error = %e, "scene dropped");
                scene.fail(&e);
            }
        }
        scene
    }

    async fn produce(&self, scene: &mut Scene, paths: &ScenePaths) -> Result<SceneAssets, SceneError> {
        let scene_id = scene.id.as_str();
        let narration = scene.narration.as_str();
        let codegen = &mut scene.codegen;

        let (video, audio) = join_pair(
            async {
                self.generator
                    .generate_and_render(scene_id, narration, codegen, paths)
                    .await
                    .inspect_err(|e| tracing::warn!(scene_id, error = %e, "code generation failed"))
            },
            async {
                self.narrator
                    .synthesize(scene_id, narration, paths)
                    .await
                    .inspect_err(|e| tracing::warn!(scene_id, error = %e, "narration failed"))
            },
        )
        .await?;

        tracing::debug!(
            scene_id,
            attempts = video.attempts,
            audio_secs = audio.duration_secs,
            "both producers done, reconciling"
        );
        self.reconciler.reconcile(scene_id, &video, &audio, paths).await
    }
}
