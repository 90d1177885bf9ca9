//! Top-level job driver.
//!
//! A job runs in three phases: [`JobOrchestrator::plan`] segments the topic,
//! [`JobOrchestrator::produce`] runs every scene concurrently, and
//! [`JobOrchestrator::finish`] assembles the final video and writes
//! `report.json`. The CLI drives the phases one by one to show progress.

use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;

use crate::assembler::VideoAssembler;
use crate::codegen::SceneCodeGenerator;
use crate::error::JobError;
use crate::llm::CompletionClient;
use crate::media::MediaToolkit;
use crate::narrator::SceneNarrator;
use crate::pool::WorkerPool;
use crate::reconcile::DurationReconciler;
use crate::render::RenderEngine;
use crate::scheduler::SceneScheduler;
use crate::segmenter::TranscriptSegmenter;
use crate::speech::{SpeechEngine, VoiceSettings};
use crate::state_machine::{Job, JobReport};
use crate::storage::{self, Workspace};

/// Knobs shared by every phase of a job.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub model: String,
    /// Budget for both transcript segmentation and per-scene code generation.
    pub max_iterations: u32,
    pub voice: VoiceSettings,
    pub completion_timeout: Duration,
    pub render_timeout: Duration,
    pub speech_timeout: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4o".to_string(),
            max_iterations: 5,
            voice: VoiceSettings::default(),
            completion_timeout: Duration::from_secs(120),
            render_timeout: Duration::from_secs(300),
            speech_timeout: Duration::from_secs(60),
        }
    }
}

/// Drives a topic through segmentation, scene production and assembly.
pub struct JobOrchestrator<C, R, S, M> {
    /// Used for segmentation and for every scene's code generation.
    pub client: C,
    pub renderer: R,
    pub speech: S,
    pub media: M,
    pub workspace: Workspace,
    /// Bounds render, synthesis and mux work across all scenes of a job.
    pub pool: WorkerPool,
    pub settings: PipelineSettings,
}

impl<C, R, S, M> JobOrchestrator<C, R, S, M>
where
    C: CompletionClient,
    R: RenderEngine,
    S: SpeechEngine,
    M: MediaToolkit,
{
    /// Split the topic into scenes. Nothing is scheduled if this fails.
    pub async fn plan(&self, topic: &str) -> Result<Job, JobError> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(JobError::EmptyTopic);
        }
        let started_at = Utc::now();

        let narrations = TranscriptSegmenter::new(
            &self.client,
            &self.settings.model,
            self.settings.max_iterations,
            self.settings.completion_timeout,
        )
        .segment(topic)
        .await?;

        let job = Job::new(topic.to_string(), narrations, self.settings.max_iterations)
            .with_start(started_at);
        tracing::info!(job_id = %job.id, scenes = job.scenes.len(), "job planned");
        tracing::debug!(job_id = %job.id, scene_ids = ?job.scene_ids(), "scenes created");
        Ok(job)
    }

    /// Run every scene to a terminal state.
    pub async fn produce(&self, job: Job) -> Job {
        let generator = SceneCodeGenerator::new(
            &self.client,
            &self.renderer,
            &self.pool,
            &self.settings.model,
            self.settings.completion_timeout,
            self.settings.render_timeout,
        );
        let narrator = SceneNarrator::new(
            &self.speech,
            &self.media,
            &self.pool,
            &self.settings.voice,
            self.settings.speech_timeout,
        );
        let reconciler = DurationReconciler::new(&self.media, &self.pool);

        SceneScheduler::new(
            generator,
            narrator,
            reconciler,
            &self.workspace,
            self.settings.voice.format,
        )
        .run(job)
        .await
    }

    /// Assemble the final video and write the job report.
    ///
    /// The report is written whether or not assembly succeeded, and a failed
    /// report write never changes the job's result.
    pub async fn finish(&self, job: &mut Job) -> Result<JobReport, JobError> {
        let assembled = VideoAssembler::new(&self.media, &self.workspace)
            .assemble(job)
            .await;

        let report = JobReport::from_job(job);
        if let Err(e) = self.write_report(&report).await {
            tracing::warn!(job_id = %job.id, error = %e, "failed to write job report");
        }
        assembled?;
        Ok(report)
    }

    pub async fn write_report(&self, report: &JobReport) -> Result<PathBuf, JobError> {
        let path = self.workspace.report(&report.job_id);
        let json = serde_json::to_vec_pretty(report)?;
        storage::write_atomic(&path, json).await?;
        tracing::debug!(job_id = %report.job_id, path = %path.display(), "report written");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::SceneStatus;
    use crate::test_support::{FakeMedia, FakeRenderer, FakeSpeech, MediaCall, ScriptedCompletion};

    async fn run(
        orch: &JobOrchestrator<ScriptedCompletion, FakeRenderer, FakeSpeech, FakeMedia>,
        topic: &str,
    ) -> Result<JobReport, JobError> {
        let job = orch.plan(topic).await?;
        let mut job = orch.produce(job).await;
        orch.finish(&mut job).await
    }

    fn orchestrator(
        dir: &tempfile::TempDir,
        client: ScriptedCompletion,
        renderer: FakeRenderer,
        speech: FakeSpeech,
    ) -> JobOrchestrator<ScriptedCompletion, FakeRenderer, FakeSpeech, FakeMedia> {
        JobOrchestrator {
            client,
            renderer,
            speech,
            media: FakeMedia::new(),
            workspace: Workspace::new(dir.path()),
            pool: WorkerPool::new(2),
            settings: PipelineSettings {
                completion_timeout: Duration::from_secs(5),
                render_timeout: Duration::from_secs(5),
                speech_timeout: Duration::from_secs(5),
                ..PipelineSettings::default()
            },
        }
    }

    #[tokio::test]
    async fn end_to_end_produces_final_video_and_report() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(
            &dir,
            ScriptedCompletion::new([r#"["alpha intro", "beta handshake", "gamma teardown"]"#]),
            FakeRenderer::new(1).delay("alpha", Duration::from_millis(60)),
            FakeSpeech::new(4.0),
        );

        let report = run(&orch, "How does TCP work?").await.unwrap();

        assert_eq!(report.topic, "How does TCP work?");
        assert!(!report.has_dropped_scenes());
        assert_eq!(report.scenes.len(), 3);
        assert!(report.scenes.iter().all(|s| s.attempts == 2));

        let final_video = report.final_video.clone().unwrap();
        assert_eq!(std::fs::read_to_string(&final_video).unwrap(), "12");

        let concat = orch
            .media
            .calls()
            .into_iter()
            .find_map(|c| match c {
                MediaCall::Concat(clips) => Some(clips),
                _ => None,
            })
            .unwrap();
        for (clip, scene) in concat.iter().zip(&report.scenes) {
            assert!(clip.to_string_lossy().contains(&scene.scene_id));
        }

        let saved: JobReport =
            serde_json::from_slice(&std::fs::read(orch.workspace.report(&report.job_id)).unwrap())
                .unwrap();
        assert_eq!(saved.job_id, report.job_id);
    }

    #[tokio::test]
    async fn dropped_scenes_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(
            &dir,
            ScriptedCompletion::new([r#"["alpha", "beta"]"#]),
            FakeRenderer::new(0),
            FakeSpeech::new(4.0).fail_for("beta"),
        );

        let report = run(&orch, "topic").await.unwrap();

        assert!(report.has_dropped_scenes());
        assert_eq!(report.dropped_scenes, vec![report.scenes[1].scene_id.clone()]);
        assert_eq!(report.scenes[1].status, SceneStatus::Failed);
        assert!(report.final_video.is_some());
    }

    #[tokio::test]
    async fn empty_topic_is_rejected_before_any_call() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(
            &dir,
            ScriptedCompletion::echo(),
            FakeRenderer::new(0),
            FakeSpeech::new(4.0),
        );

        let err = run(&orch, "   ").await.unwrap_err();
        assert!(matches!(err, JobError::EmptyTopic));
        assert_eq!(orch.client.calls(), 0);
    }

    #[tokio::test]
    async fn segmentation_failure_schedules_no_scene_work() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(
            &dir,
            ScriptedCompletion::new(["not an array"; 5]),
            FakeRenderer::new(0),
            FakeSpeech::new(4.0),
        );

        let err = run(&orch, "topic").await.unwrap_err();

        assert!(matches!(err, JobError::SegmentationFailed { attempts: 5, .. }));
        assert_eq!(orch.renderer.renders(), 0);
        assert_eq!(orch.speech.calls(), 0);
        assert!(orch.media.calls().is_empty());
    }

    #[tokio::test]
    async fn all_scenes_failing_is_an_assembly_failure() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(
            &dir,
            ScriptedCompletion::new([r#"["alpha", "beta"]"#]),
            FakeRenderer::new(0),
            FakeSpeech::new(4.0).fail_for("alpha").fail_for("beta"),
        );

        let job = orch.plan("topic").await.unwrap();
        let mut job = orch.produce(job).await;
        let err = orch.finish(&mut job).await.unwrap_err();

        assert!(matches!(err, JobError::AssemblyFailed(_)));
        assert!(!orch.workspace.final_video(&job.id).exists());
        // The report still records what happened.
        assert!(orch.workspace.report(&job.id).exists());
    }

    #[tokio::test]
    async fn unwritable_report_keeps_the_assembled_video() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(
            &dir,
            ScriptedCompletion::new([r#"["alpha", "beta"]"#]),
            FakeRenderer::new(0),
            FakeSpeech::new(4.0),
        );

        let job = orch.plan("topic").await.unwrap();
        let mut job = orch.produce(job).await;
        // A directory where the report's staging file would go.
        std::fs::create_dir_all(storage::staging_path(&orch.workspace.report(&job.id))).unwrap();

        let report = orch.finish(&mut job).await.unwrap();

        let final_video = orch.workspace.final_video(&job.id);
        assert_eq!(report.final_video.as_ref(), Some(&final_video));
        assert_eq!(job.final_path.as_ref(), Some(&final_video));
        assert!(final_video.exists());
        assert!(!orch.workspace.report(&job.id).exists());
    }

    #[tokio::test]
    async fn unwritable_report_keeps_the_assembly_failure() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(
            &dir,
            ScriptedCompletion::new([r#"["alpha"]"#]),
            FakeRenderer::new(0),
            FakeSpeech::new(4.0).fail_for("alpha"),
        );

        let job = orch.plan("topic").await.unwrap();
        let mut job = orch.produce(job).await;
        std::fs::create_dir_all(storage::staging_path(&orch.workspace.report(&job.id))).unwrap();

        let err = orch.finish(&mut job).await.unwrap_err();
        assert!(matches!(err, JobError::AssemblyFailed(_)));
    }

    #[tokio::test]
    async fn job_start_is_taken_before_segmentation() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(
            &dir,
            ScriptedCompletion::new([r#"["alpha"]"#]),
            FakeRenderer::new(0),
            FakeSpeech::new(4.0),
        );

        let before = Utc::now();
        let job = orch.plan("topic").await.unwrap();

        assert!(job.started_at >= before);
        assert!(job.started_at <= job.created_at);
        let mut job = orch.produce(job).await;
        let report = orch.finish(&mut job).await.unwrap();
        assert_eq!(report.started_at, job.started_at);
    }
}
