//! Duration reconciliation and muxing of a scene's video and narration.

use std::future::Future;
use std::path::{Path, PathBuf};

use crate::codegen::RenderedAsset;
use crate::error::SceneError;
use crate::media::{MediaError, MediaToolkit};
use crate::narrator::AudioAsset;
use crate::pool::WorkerPool;
use crate::state_machine::SceneAssets;
use crate::storage::{self, ScenePaths};

/// Durations closer than this are treated as equal.
pub const DURATION_TOLERANCE_SECS: f64 = 0.01;

/// How the shorter track gets stretched to match the longer one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Adjustment {
    None,
    /// Append silence after the narration.
    PadAudio { silence_secs: f64 },
    /// Hold the last video frame.
    HoldLastFrame { extra_secs: f64 },
}

impl Adjustment {
    pub fn for_durations(video_secs: f64, audio_secs: f64) -> Self {
        let diff = video_secs - audio_secs;
        if diff.abs() < DURATION_TOLERANCE_SECS {
            Adjustment::None
        } else if diff > 0.0 {
            Adjustment::PadAudio { silence_secs: diff }
        } else {
            Adjustment::HoldLastFrame { extra_secs: -diff }
        }
    }
}

fn mux_failed(err: impl std::fmt::Display) -> SceneError {
    SceneError::MuxFailed(err.to_string())
}

/// Produce `target` through its staging path, renaming only on success.
async fn staged<F, Fut>(target: &Path, produce: F) -> Result<(), SceneError>
where
    F: FnOnce(PathBuf) -> Fut,
    Fut: Future<Output = Result<(), MediaError>>,
{
    let staging = storage::staging_path(target);
    if let Err(e) = produce(staging.clone()).await {
        storage::discard(&staging).await;
        return Err(mux_failed(e));
    }
    storage::commit(&staging, target).await.map_err(mux_failed)
}

pub struct DurationReconciler<'a, M> {
    media: &'a M,
    pool: &'a WorkerPool,
}

impl<'a, M: MediaToolkit> DurationReconciler<'a, M> {
    pub fn new(media: &'a M, pool: &'a WorkerPool) -> Self {
        Self { media, pool }
    }

    /// Stretch the shorter track, clamp both to the shorter final duration,
    /// and mux them into the scene's clip.
    ///
    /// The muxed clip is written to a new path; the rendered clip is left
    /// untouched, so a failed mux never destroys the scene's video.
    pub async fn reconcile(
        &self,
        scene_id: &str,
        video: &RenderedAsset,
        audio: &AudioAsset,
        paths: &ScenePaths,
    ) -> Result<SceneAssets, SceneError> {
        self.pool
            .run(self.mux_scene(scene_id, &video.path, &audio.path, paths))
            .await
    }

    async fn mux_scene(
        &self,
        scene_id: &str,
        video: &Path,
        audio: &Path,
        paths: &ScenePaths,
    ) -> Result<SceneAssets, SceneError> {
        for input in [video, audio] {
            if !tokio::fs::try_exists(input).await.unwrap_or(false) {
                return Err(mux_failed(format!("missing asset {}", input.display())));
            }
        }

        let video_secs = self.media.probe_duration(video).await.map_err(mux_failed)?;
        let audio_secs = self.media.probe_duration(audio).await.map_err(mux_failed)?;
        if video_secs <= 0.0 || audio_secs <= 0.0 {
            return Err(mux_failed(format!(
                "zero-duration asset (video {video_secs:.3}s, audio {audio_secs:.3}s)"
            )));
        }

        let adjustment = Adjustment::for_durations(video_secs, audio_secs);
        tracing::debug!(scene_id, video_secs, audio_secs, ?adjustment, "reconciling durations");

        let (video_track, audio_track) = match adjustment {
            Adjustment::None => (video.to_path_buf(), audio.to_path_buf()),
            Adjustment::PadAudio { silence_secs } => {
                staged(&paths.padded_audio, |out| async move {
                    self.media.pad_audio(audio, silence_secs, &out).await
                })
                .await?;
                (video.to_path_buf(), paths.padded_audio.clone())
            }
            Adjustment::HoldLastFrame { extra_secs } => {
                staged(&paths.extended_video, |out| async move {
                    self.media.hold_last_frame(video, extra_secs, &out).await
                })
                .await?;
                (paths.extended_video.clone(), audio.to_path_buf())
            }
        };

        let final_video = self.media.probe_duration(&video_track).await.map_err(mux_failed)?;
        let final_audio = self.media.probe_duration(&audio_track).await.map_err(mux_failed)?;
        let duration_secs = final_video.min(final_audio);

        staged(&paths.muxed, |out| {
            let (v, a) = (&video_track, &audio_track);
            async move { self.media.mux(v, a, duration_secs, &out).await }
        })
        .await?;

        tracing::info!(scene_id, duration_secs, "scene muxed");
        Ok(SceneAssets {
            video: video_track,
            audio: audio_track,
            muxed: paths.muxed.clone(),
            duration_secs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::speech::AudioFormat;
    use crate::storage::Workspace;
    use crate::test_support::{FakeMedia, MediaCall};

    struct Fixture {
        _dir: tempfile::TempDir,
        paths: ScenePaths,
        video: RenderedAsset,
        audio: AudioAsset,
    }

    fn fixture(video_secs: f64, audio_secs: f64) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let paths = Workspace::new(dir.path()).scene_paths("job", "scene", AudioFormat::Mp3);
        let clip = paths.media_dir.join("videos/video/480p15/video.mp4");
        std::fs::create_dir_all(clip.parent().unwrap()).unwrap();
        std::fs::write(&clip, video_secs.to_string()).unwrap();
        std::fs::write(&paths.audio, audio_secs.to_string()).unwrap();
        Fixture {
            _dir: dir,
            video: RenderedAsset {
                path: clip,
                attempts: 1,
            },
            audio: AudioAsset {
                path: paths.audio.clone(),
                duration_secs: audio_secs,
            },
            paths,
        }
    }

    async fn reconcile(media: &FakeMedia, fx: &Fixture) -> Result<SceneAssets, SceneError> {
        let pool = WorkerPool::new(1);
        DurationReconciler::new(media, &pool)
            .reconcile("scene", &fx.video, &fx.audio, &fx.paths)
            .await
    }

    fn probe(path: &Path) -> f64 {
        std::fs::read_to_string(path).unwrap().parse().unwrap()
    }

    #[test]
    fn adjustment_selection() {
        assert_eq!(
            Adjustment::for_durations(10.0, 7.0),
            Adjustment::PadAudio { silence_secs: 3.0 }
        );
        assert_eq!(
            Adjustment::for_durations(7.0, 10.0),
            Adjustment::HoldLastFrame { extra_secs: 3.0 }
        );
        assert_eq!(Adjustment::for_durations(5.0, 5.0), Adjustment::None);
        assert_eq!(Adjustment::for_durations(5.0, 5.004), Adjustment::None);
    }

    #[tokio::test]
    async fn short_audio_is_padded_with_silence() {
        let fx = fixture(10.0, 7.0);
        let media = FakeMedia::new();
        let assets = reconcile(&media, &fx).await.unwrap();

        assert_eq!(assets.duration_secs, 10.0);
        assert_eq!(assets.audio, fx.paths.padded_audio);
        assert_eq!(assets.video, fx.video.path);
        assert_eq!(probe(&fx.paths.muxed), 10.0);
        assert_eq!(media.calls()[0], MediaCall::PadAudio { silence_secs: 3.0 });
    }

    #[tokio::test]
    async fn short_video_holds_its_last_frame() {
        let fx = fixture(7.0, 10.0);
        let media = FakeMedia::new();
        let assets = reconcile(&media, &fx).await.unwrap();

        assert_eq!(assets.duration_secs, 10.0);
        assert_eq!(assets.video, fx.paths.extended_video);
        assert_eq!(probe(&fx.paths.muxed), 10.0);
        assert_eq!(media.calls()[0], MediaCall::HoldLastFrame { extra_secs: 3.0 });
    }

    #[tokio::test]
    async fn equal_durations_mux_directly() {
        let fx = fixture(5.0, 5.0);
        let media = FakeMedia::new();
        let assets = reconcile(&media, &fx).await.unwrap();

        assert_eq!(assets.duration_secs, 5.0);
        let calls = media.calls();
        assert_eq!(calls.len(), 1);
        assert!(matches!(calls[0], MediaCall::Mux { secs, .. } if secs == 5.0));
    }

    #[tokio::test]
    async fn failed_mux_leaves_no_clip_and_keeps_the_render() {
        let fx = fixture(5.0, 5.0);
        let media = FakeMedia::failing_mux();
        let err = reconcile(&media, &fx).await.unwrap_err();

        assert!(matches!(err, SceneError::MuxFailed(_)));
        assert!(!fx.paths.muxed.exists());
        assert!(!storage::staging_path(&fx.paths.muxed).exists());
        assert!(fx.video.path.exists());
    }

    #[tokio::test]
    async fn zero_duration_video_is_rejected() {
        let fx = fixture(0.0, 4.0);
        let media = FakeMedia::new();
        let err = reconcile(&media, &fx).await.unwrap_err();
        assert!(err.to_string().contains("zero-duration"));
        assert_eq!(media.mux_calls(), 0);
    }

    #[tokio::test]
    async fn missing_audio_is_rejected() {
        let fx = fixture(4.0, 4.0);
        std::fs::remove_file(&fx.paths.audio).unwrap();
        let media = FakeMedia::new();
        let err = reconcile(&media, &fx).await.unwrap_err();
        assert!(err.to_string().contains("missing asset"));
        assert_eq!(media.mux_calls(), 0);
    }
}
