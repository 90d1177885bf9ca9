//! Speech synthesis for one scene's narration.
//!
//! The audio is written through a staging file and probed for its duration,
//! which the reconciler needs before muxing.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::SceneError;
use crate::media::MediaToolkit;
use crate::pool::WorkerPool;
use crate::speech::{SpeechEngine, SpeechError, VoiceSettings};
use crate::storage::{self, ScenePaths};

/// Narration audio persisted for one scene.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioAsset {
    pub path: PathBuf,
    /// As reported by the media probe, not by the speech service.
    pub duration_secs: f64,
}

/// Single-shot speech synthesis for a scene. No internal retries.
pub struct SceneNarrator<'a, S, M> {
    speech: &'a S,
    media: &'a M,
    pool: &'a WorkerPool,
    voice: &'a VoiceSettings,
    /// Applies to the synthesis request only.
    timeout: Duration,
}

impl<'a, S: SpeechEngine, M: MediaToolkit> SceneNarrator<'a, S, M> {
    pub fn new(
        speech: &'a S,
        media: &'a M,
        pool: &'a WorkerPool,
        voice: &'a VoiceSettings,
        timeout: Duration,
    ) -> Self {
        Self {
            speech,
            media,
            pool,
            voice,
            timeout,
        }
    }

    pub async fn synthesize(
        &self,
        scene_id: &str,
        narration: &str,
        paths: &ScenePaths,
    ) -> Result<AudioAsset, SceneError> {
        let audio = self
            .pool
            .run(async {
                tokio::time::timeout(self.timeout, self.speech.synthesize(narration, self.voice))
                    .await
                    .unwrap_or(Err(SpeechError::Timeout(self.timeout.as_secs())))
            })
            .await
            .map_err(|e| SceneError::SynthesisFailed(e.to_string()))?;

        storage::write_atomic(&paths.audio, &audio)
            .await
            .map_err(|e| {
                SceneError::SynthesisFailed(format!(
                    "could not persist audio to {}: {e}",
                    paths.audio.display()
                ))
            })?;

        let duration_secs = self
            .media
            .probe_duration(&paths.audio)
            .await
            .map_err(|e| SceneError::SynthesisFailed(e.to_string()))?;
        if duration_secs <= 0.0 {
            return Err(SceneError::SynthesisFailed("synthesized audio is empty".into()));
        }

        tracing::info!(scene_id, duration_secs, bytes = audio.len(), "narration synthesized");
        Ok(AudioAsset {
            path: paths.audio.clone(),
            duration_secs,
        })
    }
}
