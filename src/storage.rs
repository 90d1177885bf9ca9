//! On-disk layout for jobs and scenes.
//!
//! Every path component below the root is an opaque generated id, never user
//! text, so concurrent jobs and scenes can't collide. Artifacts are written to
//! a staging sibling and renamed into place.

use std::io;
use std::path::{Path, PathBuf};

use tokio::fs;

use crate::speech::AudioFormat;

const PROGRAM_FILE: &str = "video.py";
const MEDIA_DIR: &str = "media";
const PADDED_AUDIO_FILE: &str = "narration.padded.wav";
const EXTENDED_VIDEO_FILE: &str = "video.extended.mp4";
const MUXED_FILE: &str = "scene.mp4";
const FINAL_FILE: &str = "final_video.mp4";
const CONCAT_LIST_FILE: &str = "concat.txt";
const REPORT_FILE: &str = "report.json";

/// Root directory under which every job gets its own folder.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

/// Files owned by a single scene.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenePaths {
    pub dir: PathBuf,
    /// Candidate program handed to the render engine.
    pub program: PathBuf,
    /// Media directory the render engine writes its clip into.
    pub media_dir: PathBuf,
    /// Raw synthesized narration.
    pub audio: PathBuf,
    pub padded_audio: PathBuf,
    pub extended_video: PathBuf,
    pub muxed: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn job_dir(&self, job_id: &str) -> PathBuf {
        self.root.join(job_id)
    }

    pub fn scene_paths(&self, job_id: &str, scene_id: &str, format: AudioFormat) -> ScenePaths {
        let dir = self.job_dir(job_id).join(scene_id);
        ScenePaths {
            program: dir.join(PROGRAM_FILE),
            media_dir: dir.join(MEDIA_DIR),
            audio: dir.join(format!("narration.{}", format.extension())),
            padded_audio: dir.join(PADDED_AUDIO_FILE),
            extended_video: dir.join(EXTENDED_VIDEO_FILE),
            muxed: dir.join(MUXED_FILE),
            dir,
        }
    }

    pub fn final_video(&self, job_id: &str) -> PathBuf {
        self.job_dir(job_id).join(FINAL_FILE)
    }

    pub fn concat_list(&self, job_id: &str) -> PathBuf {
        self.job_dir(job_id).join(CONCAT_LIST_FILE)
    }

    pub fn report(&self, job_id: &str) -> PathBuf {
        self.job_dir(job_id).join(REPORT_FILE)
    }
}

/// Sibling path used while an artifact is being produced.
///
/// The extension is kept so tools that infer the container from it still work:
/// `scene.mp4` stages as `scene.partial.mp4`.
pub fn staging_path(target: &Path) -> PathBuf {
    let stem = target
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match target.extension() {
        Some(ext) => format!("{stem}.partial.{}", ext.to_string_lossy()),
        None => format!("{stem}.partial"),
    };
    target.with_file_name(name)
}

/// Move a finished staging file over its target.
pub async fn commit(staging: &Path, target: &Path) -> io::Result<()> {
    fs::rename(staging, target).await
}

/// Remove a staging file left behind by a failed step. Missing files are fine.
pub async fn discard(staging: &Path) {
    if let Err(e) = fs::remove_file(staging).await
        && e.kind() != io::ErrorKind::NotFound
    {
        tracing::warn!(path = %staging.display(), error = %e, "failed to remove staging file");
    }
}

/// Write `contents` to `target` through a staging file, so readers never
/// observe a half-written artifact.
pub async fn write_atomic(target: &Path, contents: impl AsRef<[u8]>) -> io::Result<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).await?;
    }
    let staging = staging_path(target);
    if let Err(e) = fs::write(&staging, contents).await {
        discard(&staging).await;
        return Err(e);
    }
    commit(&staging, target).await
}
