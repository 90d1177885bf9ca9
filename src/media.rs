//! Media operations needed for reconciliation and assembly, backed by the
//! system `ffmpeg`/`ffprobe` binaries.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("failed to spawn {tool} (is it installed and on PATH?): {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} exited with code {code}: {stderr}")]
    Failed {
        tool: String,
        code: i32,
        stderr: String,
    },

    #[error("could not read duration of '{}': {reason}", .path.display())]
    Probe { path: PathBuf, reason: String },

    #[error("{tool} timed out after {secs}s")]
    Timeout { tool: String, secs: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Operations the duration reconciler and video assembler rely on.
#[allow(async_fn_in_trait)]
pub trait MediaToolkit {
    /// Duration of a media file in seconds.
    async fn probe_duration(&self, path: &Path) -> Result<f64, MediaError>;

    /// Append `silence_secs` of zero-amplitude audio after `input`.
    async fn pad_audio(&self, input: &Path, silence_secs: f64, output: &Path)
        -> Result<(), MediaError>;

    /// Hold the final frame of `input` for an extra `extra_secs`.
    async fn hold_last_frame(&self, input: &Path, extra_secs: f64, output: &Path)
        -> Result<(), MediaError>;

    /// Combine a video and an audio track, both cut to `duration_secs`.
    async fn mux(&self, video: &Path, audio: &Path, duration_secs: f64, output: &Path)
        -> Result<(), MediaError>;

    /// Concatenate `clips` in the given order. `list_file` is scratch space.
    async fn concat(&self, clips: &[PathBuf], list_file: &Path, output: &Path)
        -> Result<(), MediaError>;
}

pub fn is_on_path(binary: &str) -> bool {
    let version_flag = if binary.starts_with("ff") { "-version" } else { "--version" };
    std::process::Command::new(binary)
        .arg(version_flag)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Render one line of an ffmpeg concat-demuxer list.
pub fn concat_entry(path: &Path) -> String {
    let escaped = path.to_string_lossy().replace('\'', r"'\''");
    format!("file '{escaped}'\n")
}

fn secs_arg(secs: f64) -> String {
    format!("{secs:.3}")
}

fn probe_args(path: &Path) -> Vec<OsString> {
    vec![
        "-v".into(),
        "error".into(),
        "-show_entries".into(),
        "format=duration".into(),
        "-of".into(),
        "default=noprint_wrappers=1:nokey=1".into(),
        path.into(),
    ]
}

/// Audio shorter than its video gets trailing silence.
fn pad_audio_args(input: &Path, silence_secs: f64, output: &Path) -> Vec<OsString> {
    vec![
        "-i".into(),
        input.into(),
        "-af".into(),
        format!("apad=pad_dur={}", secs_arg(silence_secs)).into(),
        output.into(),
    ]
}

/// Video shorter than its narration freezes on the last frame. The audio
/// track is dropped; the mux supplies the narration.
fn hold_last_frame_args(input: &Path, extra_secs: f64, output: &Path) -> Vec<OsString> {
    vec![
        "-i".into(),
        input.into(),
        "-vf".into(),
        format!("tpad=stop_mode=clone:stop_duration={}", secs_arg(extra_secs)).into(),
        "-an".into(),
        "-c:v".into(),
        "libx264".into(),
        "-pix_fmt".into(),
        "yuv420p".into(),
        output.into(),
    ]
}

fn mux_args(video: &Path, audio: &Path, duration_secs: f64, output: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "-i".into(),
        video.into(),
        "-i".into(),
        audio.into(),
        "-map".into(),
        "0:v:0".into(),
        "-map".into(),
        "1:a:0".into(),
        "-t".into(),
        secs_arg(duration_secs).into(),
    ];
    args.extend(output_codecs());
    args.push(output.into());
    args
}

fn concat_args(list_file: &Path, output: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "-f".into(),
        "concat".into(),
        "-safe".into(),
        "0".into(),
        "-i".into(),
        list_file.into(),
    ];
    args.extend(output_codecs());
    args.push(output.into());
    args
}

/// H.264 and AAC, with the index up front.
fn output_codecs() -> [OsString; 8] {
    [
        "-c:v".into(),
        "libx264".into(),
        "-pix_fmt".into(),
        "yuv420p".into(),
        "-c:a".into(),
        "aac".into(),
        "-movflags".into(),
        "+faststart".into(),
    ]
}

#[derive(Debug, Clone)]
pub struct Ffmpeg {
    ffmpeg: String,
    ffprobe: String,
    timeout: Duration,
}

impl Ffmpeg {
    pub fn new(timeout: Duration) -> Self {
        Self {
            ffmpeg: "ffmpeg".to_string(),
            ffprobe: "ffprobe".to_string(),
            timeout,
        }
    }

    async fn run<I, S>(&self, tool: &str, args: I) -> Result<Vec<u8>, MediaError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = Command::new(tool);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(result) => result.map_err(|source| MediaError::Spawn {
                tool: tool.to_string(),
                source,
            })?,
            Err(_) => {
                return Err(MediaError::Timeout {
                    tool: tool.to_string(),
                    secs: self.timeout.as_secs(),
                });
            }
        };

        if !output.status.success() {
            return Err(MediaError::Failed {
                tool: tool.to_string(),
                code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output.stdout)
    }

    async fn ffmpeg<I, S>(&self, args: I) -> Result<(), MediaError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut full: Vec<OsString> = vec!["-y".into(), "-loglevel".into(), "error".into()];
        full.extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self.run(&self.ffmpeg, full).await.map(|_| ())
    }
}

impl MediaToolkit for Ffmpeg {
    async fn probe_duration(&self, path: &Path) -> Result<f64, MediaError> {
        let stdout = self.run(&self.ffprobe, probe_args(path)).await?;
        let text = String::from_utf8_lossy(&stdout);
        text.trim().parse::<f64>().map_err(|e| MediaError::Probe {
            path: path.to_path_buf(),
            reason: format!("unparseable duration '{}': {e}", text.trim()),
        })
    }

    async fn pad_audio(&self, input: &Path, silence_secs: f64, output: &Path) -> Result<(), MediaError> {
        self.ffmpeg(pad_audio_args(input, silence_secs, output)).await
    }

    async fn hold_last_frame(&self, input: &Path, extra_secs: f64, output: &Path) -> Result<(), MediaError> {
        self.ffmpeg(hold_last_frame_args(input, extra_secs, output)).await
    }

    async fn mux(&self, video: &Path, audio: &Path, duration_secs: f64, output: &Path) -> Result<(), MediaError> {
        self.ffmpeg(mux_args(video, audio, duration_secs, output)).await
    }

    async fn concat(&self, clips: &[PathBuf], list_file: &Path, output: &Path) -> Result<(), MediaError> {
        let list: String = clips.iter().map(|c| concat_entry(c)).collect();
        tokio::fs::write(list_file, list).await?;
        self.ffmpeg(concat_args(list_file, output)).await
    }
}
