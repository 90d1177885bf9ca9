//! Render capability: compiles a generated animation program into a clip.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::process::Command;

/// Name passed to `-o`; the engine appends `.mp4`.
const OUTPUT_NAME: &str = "video";

/// Why a render attempt produced no clip.
///
/// The `Display` text is fed back to the completion client verbatim as the
/// next correction prompt.
#[derive(Debug, Error)]
pub enum RenderFailure {
    #[error("Command failed with exit code {code}. Error: {stderr}")]
    Diagnostics { code: i32, stderr: String },

    #[error("failed to launch renderer: {0}")]
    Spawn(std::io::Error),

    #[error("renderer exited successfully but no clip was found at {}", .0.display())]
    MissingOutput(PathBuf),

    #[error("render timed out after {0}s")]
    Timeout(u64),
}

/// Render capability used by the scene code generator.
#[allow(async_fn_in_trait)]
pub trait RenderEngine {
    /// Render `program` into `media_dir`, returning the path of the clip.
    async fn render(&self, program: &Path, media_dir: &Path) -> Result<PathBuf, RenderFailure>;
}

/// Manim quality presets (`-q<flag>`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderQuality {
    #[default]
    Low,
    Medium,
    High,
    Production,
}

impl RenderQuality {
    pub fn flag(self) -> &'static str {
        match self {
            RenderQuality::Low => "-ql",
            RenderQuality::Medium => "-qm",
            RenderQuality::High => "-qh",
            RenderQuality::Production => "-qk",
        }
    }

    /// Sub-directory manim writes clips of this quality into.
    pub fn resolution_dir(self) -> &'static str {
        match self {
            RenderQuality::Low => "480p15",
            RenderQuality::Medium => "720p30",
            RenderQuality::High => "1080p60",
            RenderQuality::Production => "2160p60",
        }
    }
}

/// Runs the `manim` CLI as an isolated subprocess.
#[derive(Debug, Clone)]
pub struct ManimRenderer {
    binary: String,
    quality: RenderQuality,
}

impl ManimRenderer {
    pub fn new(binary: impl Into<String>, quality: RenderQuality) -> Self {
        Self {
            binary: binary.into(),
            quality,
        }
    }

    /// Where manim places the clip for `program` inside `media_dir`.
    pub fn clip_path(&self, program: &Path, media_dir: &Path) -> PathBuf {
        let stem = program
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        media_dir
            .join("videos")
            .join(stem)
            .join(self.quality.resolution_dir())
            .join(format!("{OUTPUT_NAME}.mp4"))
    }
}

impl RenderEngine for ManimRenderer {
    async fn render(&self, program: &Path, media_dir: &Path) -> Result<PathBuf, RenderFailure> {
        tracing::debug!(program = %program.display(), "running manim");
        let output = Command::new(&self.binary)
            .arg("render")
            .arg(self.quality.flag())
            .arg(program)
            .args(["-o", OUTPUT_NAME, "--media_dir"])
            .arg(media_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(RenderFailure::Spawn)?;

        if !output.status.success() {
            return Err(RenderFailure::Diagnostics {
                code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        tracing::trace!(stdout = %String::from_utf8_lossy(&output.stdout), "manim output");

        let clip = self.clip_path(program, media_dir);
        if !tokio::fs::try_exists(&clip).await.unwrap_or(false) {
            return Err(RenderFailure::MissingOutput(clip));
        }
        Ok(clip)
    }
}
