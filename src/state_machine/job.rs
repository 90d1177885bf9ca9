//! Job, scene and code-generation records, plus the report built from them.
//!
//! These are plain data. Transitions live in [`super::state`].

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::state::CodegenState;
use crate::error::SceneError;
use crate::llm::Message;

/// Distinguishes between logic failures and infrastructure failures.
/// Both consume an attempt of the code-generation budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    /// The generated program was rejected (render diagnostics).
    Business(String),
    /// Infrastructure failed (completion timeout, transport error, storage).
    System(String),
}

impl FailureKind {
    pub fn message(&self) -> &str {
        match self {
            FailureKind::Business(msg) | FailureKind::System(msg) => msg,
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::Business(msg) => write!(f, "Business failure: {msg}"),
            FailureKind::System(msg) => write!(f, "System failure: {msg}"),
        }
    }
}

/// Terminal result of a code-generation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Success,
    Failure(FailureKind),
}

/// Bookkeeping for one scene's generate/render loop.
///
/// `history` is the append-only conversation fed to the completion client.
/// Control flow lives in [`CodegenMachine`](super::CodegenMachine), not here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodegenRun {
    pub state: CodegenState,
    /// Every state entered, oldest first.
    pub state_history: Vec<CodegenState>,
    /// Drafts requested so far, including the one in flight.
    pub attempts: u32,
    pub max_attempts: u32,
    pub history: Vec<Message>,
    pub last_failure: Option<FailureKind>,
}

impl CodegenRun {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            state: CodegenState::Drafting,
            state_history: Vec::new(),
            attempts: 0,
            max_attempts: max_attempts.max(1),
            history: Vec::new(),
            last_failure: None,
        }
    }

    /// Seed the conversation unless it already has turns.
    pub fn seed(&mut self, system_prompt: &str, narration: &str) {
        if self.history.is_empty() {
            self.history.push(Message::system(system_prompt));
            self.history.push(Message::user(narration));
        }
    }

    /// Record a rejected candidate and the engine's diagnostics, verbatim.
    pub fn record_rejection(&mut self, candidate: &str, diagnostics: &str) {
        self.history.push(Message::assistant(candidate));
        self.history.push(Message::user(diagnostics));
    }
}

/// Lifecycle status of a scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SceneStatus {
    Pending,
    Succeeded,
    Failed,
}

/// Assets of a scene that made it all the way through muxing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneAssets {
    /// Video track that went into the mux (raw or last-frame extended).
    pub video: PathBuf,
    /// Audio track that went into the mux (raw or silence padded).
    pub audio: PathBuf,
    /// The muxed clip used for final assembly.
    pub muxed: PathBuf,
    pub duration_secs: f64,
}

/// One narrated, independently rendered segment of the final video.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scene {
    pub id: String,
    /// Position in creation order.
    pub index: usize,
    pub narration: String,
    pub status: SceneStatus,
    pub codegen: CodegenRun,
    /// Only set once both producers succeeded and the mux finished.
    pub assets: Option<SceneAssets>,
    /// Why the scene was dropped.
    pub failure: Option<String>,
}

impl Scene {
    pub fn new(index: usize, narration: String, max_attempts: u32) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            index,
            narration,
            status: SceneStatus::Pending,
            codegen: CodegenRun::new(max_attempts),
            assets: None,
            failure: None,
        }
    }

    pub fn succeed(&mut self, assets: SceneAssets) {
        self.status = SceneStatus::Succeeded;
        self.assets = Some(assets);
        self.failure = None;
    }

    pub fn fail(&mut self, err: &SceneError) {
        self.status = SceneStatus::Failed;
        self.assets = None;
        self.failure = Some(err.to_string());
    }
}

/// One end-to-end request: a topic turned into an ordered set of scenes.
///
/// `scenes` is kept in creation order and is the only ordering used when the
/// final video is assembled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub topic: String,
    pub scenes: Vec<Scene>,
    /// Set by the assembler once the final video is in place.
    pub final_path: Option<PathBuf>,
    /// When the request was accepted, before segmentation ran.
    pub started_at: DateTime<Utc>,
    /// When the scenes were created from the segmented transcript.
    pub created_at: DateTime<Utc>,
}

impl Job {
    pub fn new(topic: String, narrations: Vec<String>, max_attempts: u32) -> Self {
        let scenes = narrations
            .into_iter()
            .enumerate()
            .map(|(index, narration)| Scene::new(index, narration, max_attempts))
            .collect();
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            topic,
            scenes,
            final_path: None,
            started_at: now,
            created_at: now,
        }
    }

    /// Backdate the job start to when the request was accepted.
    pub fn with_start(mut self, started_at: DateTime<Utc>) -> Self {
        self.started_at = started_at;
        self
    }

    pub fn scene_ids(&self) -> Vec<&str> {
        self.scenes.iter().map(|s| s.id.as_str()).collect()
    }

    /// Muxed clips of succeeded scenes, in creation order.
    pub fn muxed_clips(&self) -> Vec<PathBuf> {
        self.scenes
            .iter()
            .filter(|s| s.status == SceneStatus::Succeeded)
            .filter_map(|s| s.assets.as_ref().map(|a| a.muxed.clone()))
            .collect()
    }

    pub fn dropped(&self) -> impl Iterator<Item = &Scene> {
        self.scenes
            .iter()
            .filter(|s| s.status != SceneStatus::Succeeded)
    }
}

/// Per-scene line of a [`JobReport`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneReport {
    pub scene_id: String,
    pub index: usize,
    pub status: SceneStatus,
    pub attempts: u32,
    pub duration_secs: Option<f64>,
    pub failure: Option<String>,
}

/// Structured record produced when a job finishes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobReport {
    pub job_id: String,
    pub topic: String,
    pub final_video: Option<PathBuf>,
    pub scenes: Vec<SceneReport>,
    /// Ids of scenes left out of the final video.
    pub dropped_scenes: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    /// Wall-clock time from `started_at`, segmentation included.
    pub duration_ms: i64,
}

impl JobReport {
    pub fn from_job(job: &Job) -> Self {
        let now = Utc::now();
        let duration = now - job.started_at;
        let scenes = job
            .scenes
            .iter()
            .map(|s| SceneReport {
                scene_id: s.id.clone(),
                index: s.index,
                status: s.status,
                attempts: s.codegen.attempts,
                duration_secs: s.assets.as_ref().map(|a| a.duration_secs),
                failure: s.failure.clone(),
            })
            .collect();

        Self {
            job_id: job.id.clone(),
            topic: job.topic.clone(),
            final_video: job.final_path.clone(),
            scenes,
            dropped_scenes: job.dropped().map(|s| s.id.clone()).collect(),
            started_at: job.started_at,
            completed_at: now,
            duration_ms: duration.num_milliseconds(),
        }
    }

    pub fn has_dropped_scenes(&self) -> bool {
        !self.dropped_scenes.is_empty()
    }
}
