//! Test doubles for the external capabilities.
//!
//! Fake media files contain their duration in seconds as plain text, so the
//! fake toolkit can "probe" and "mux" them without real codecs.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::llm::types::Role;
use crate::llm::{ChatRequest, CompletionClient, CompletionError};
use crate::media::{MediaError, MediaToolkit};
use crate::render::{RenderEngine, RenderFailure};
use crate::speech::{SpeechEngine, SpeechError, VoiceSettings};

/// Plays back scripted completions, then echoes a program tagged with the
/// scene narration once the script runs out.
#[derive(Default)]
pub struct ScriptedCompletion {
    script: Mutex<VecDeque<Result<String, CompletionError>>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedCompletion {
    pub fn new<'a>(responses: impl IntoIterator<Item = &'a str>) -> Self {
        Self::from_results(responses.into_iter().map(|r| Ok(r.to_string())).collect())
    }

    pub fn from_results(results: Vec<Result<String, CompletionError>>) -> Self {
        Self {
            script: Mutex::new(results.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn echo() -> Self {
        Self::default()
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl CompletionClient for ScriptedCompletion {
    async fn complete(&self, req: &ChatRequest) -> Result<String, CompletionError> {
        self.requests.lock().unwrap().push(req.clone());
        if let Some(next) = self.script.lock().unwrap().pop_front() {
            return next;
        }
        let narration = req
            .messages
            .iter()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.clone())
            .unwrap_or_default();
        Ok(format!(
            "```python\n# scene: {narration}\nfrom manim import *\n\nclass VideoScene(Scene):\n    pass\n```"
        ))
    }
}

fn lookup<T: Copy>(table: &[(String, T)], text: &str) -> Option<T> {
    table
        .iter()
        .find(|(key, _)| text.contains(key.as_str()))
        .map(|(_, v)| *v)
}

async fn write_duration(path: &Path, secs: f64) {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.unwrap();
    }
    tokio::fs::write(path, secs.to_string()).await.unwrap();
}

/// Rejects each program `failures` times before rendering it.
pub struct FakeRenderer {
    failures: u32,
    clip_secs: f64,
    always_fail: Vec<String>,
    delays: Vec<(String, Duration)>,
    clip_secs_for: Vec<(String, f64)>,
    seen: Mutex<HashMap<PathBuf, u32>>,
    renders: AtomicUsize,
}

impl FakeRenderer {
    pub fn new(failures: u32) -> Self {
        Self {
            failures,
            clip_secs: 4.0,
            always_fail: Vec::new(),
            delays: Vec::new(),
            clip_secs_for: Vec::new(),
            seen: Mutex::new(HashMap::new()),
            renders: AtomicUsize::new(0),
        }
    }

    pub fn clip_secs(mut self, secs: f64) -> Self {
        self.clip_secs = secs;
        self
    }

    pub fn clip_secs_for(mut self, narration: &str, secs: f64) -> Self {
        self.clip_secs_for.push((narration.to_string(), secs));
        self
    }

    pub fn always_fail(mut self, narration: &str) -> Self {
        self.always_fail.push(narration.to_string());
        self
    }

    pub fn delay(mut self, narration: &str, delay: Duration) -> Self {
        self.delays.push((narration.to_string(), delay));
        self
    }

    pub fn renders(&self) -> usize {
        self.renders.load(Ordering::SeqCst)
    }
}

impl RenderEngine for FakeRenderer {
    async fn render(&self, program: &Path, media_dir: &Path) -> Result<PathBuf, RenderFailure> {
        self.renders.fetch_add(1, Ordering::SeqCst);
        let code = tokio::fs::read_to_string(program)
            .await
            .map_err(RenderFailure::Spawn)?;

        if let Some(delay) = lookup(&self.delays, &code) {
            tokio::time::sleep(delay).await;
        }

        let attempt = {
            let mut seen = self.seen.lock().unwrap();
            let count = seen.entry(program.to_path_buf()).or_insert(0);
            *count += 1;
            *count
        };
        if attempt <= self.failures || self.always_fail.iter().any(|n| code.contains(n)) {
            return Err(RenderFailure::Diagnostics {
                code: 1,
                stderr: format!("NameError on attempt {attempt}"),
            });
        }

        let clip = media_dir.join("videos/video/480p15/video.mp4");
        let secs = lookup(&self.clip_secs_for, &code).unwrap_or(self.clip_secs);
        write_duration(&clip, secs).await;
        Ok(clip)
    }
}

/// Returns the audio duration as the "encoded" bytes.
pub struct FakeSpeech {
    secs: f64,
    secs_for: Vec<(String, f64)>,
    fail_for: Vec<String>,
    delays: Vec<(String, Duration)>,
    calls: AtomicUsize,
}

impl FakeSpeech {
    pub fn new(secs: f64) -> Self {
        Self {
            secs,
            secs_for: Vec::new(),
            fail_for: Vec::new(),
            delays: Vec::new(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn secs_for(mut self, narration: &str, secs: f64) -> Self {
        self.secs_for.push((narration.to_string(), secs));
        self
    }

    pub fn fail_for(mut self, narration: &str) -> Self {
        self.fail_for.push(narration.to_string());
        self
    }

    pub fn delay(mut self, narration: &str, delay: Duration) -> Self {
        self.delays.push((narration.to_string(), delay));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SpeechEngine for FakeSpeech {
    async fn synthesize(&self, text: &str, _voice: &VoiceSettings) -> Result<Vec<u8>, SpeechError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = lookup(&self.delays, text) {
            tokio::time::sleep(delay).await;
        }
        if self.fail_for.iter().any(|n| text.contains(n.as_str())) {
            return Err(SpeechError::ApiError {
                status: 500,
                message: "voice unavailable".into(),
            });
        }
        let secs = lookup(&self.secs_for, text).unwrap_or(self.secs);
        Ok(secs.to_string().into_bytes())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MediaCall {
    PadAudio { silence_secs: f64 },
    HoldLastFrame { extra_secs: f64 },
    Mux { video: PathBuf, audio: PathBuf, secs: f64 },
    Concat(Vec<PathBuf>),
}

#[derive(Default)]
pub struct FakeMedia {
    fail_mux: bool,
    fail_concat: bool,
    calls: Mutex<Vec<MediaCall>>,
}

impl FakeMedia {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every mux call fails after probing its inputs.
    pub fn failing_mux() -> Self {
        Self {
            fail_mux: true,
            ..Self::default()
        }
    }

    pub fn failing_concat() -> Self {
        Self {
            fail_concat: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<MediaCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn mux_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, MediaCall::Mux { .. }))
            .count()
    }

    fn record(&self, call: MediaCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn failure(tool: &str) -> MediaError {
        MediaError::Failed {
            tool: tool.to_string(),
            code: 1,
            stderr: "simulated failure".into(),
        }
    }
}

impl MediaToolkit for FakeMedia {
    async fn probe_duration(&self, path: &Path) -> Result<f64, MediaError> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| MediaError::Probe {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        text.trim().parse().map_err(|_| MediaError::Probe {
            path: path.to_path_buf(),
            reason: format!("not a duration: {text}"),
        })
    }

    async fn pad_audio(&self, input: &Path, silence_secs: f64, output: &Path) -> Result<(), MediaError> {
        self.record(MediaCall::PadAudio { silence_secs });
        let secs = self.probe_duration(input).await?;
        write_duration(output, secs + silence_secs).await;
        Ok(())
    }

    async fn hold_last_frame(&self, input: &Path, extra_secs: f64, output: &Path) -> Result<(), MediaError> {
        self.record(MediaCall::HoldLastFrame { extra_secs });
        let secs = self.probe_duration(input).await?;
        write_duration(output, secs + extra_secs).await;
        Ok(())
    }

    async fn mux(&self, video: &Path, audio: &Path, duration_secs: f64, output: &Path) -> Result<(), MediaError> {
        self.record(MediaCall::Mux {
            video: video.to_path_buf(),
            audio: audio.to_path_buf(),
            secs: duration_secs,
        });
        // Both inputs must already be on disk.
        let v = self.probe_duration(video).await?;
        let a = self.probe_duration(audio).await?;
        if self.fail_mux {
            return Err(Self::failure("ffmpeg"));
        }
        write_duration(output, duration_secs.min(v).min(a)).await;
        Ok(())
    }

    async fn concat(&self, clips: &[PathBuf], list_file: &Path, output: &Path) -> Result<(), MediaError> {
        self.record(MediaCall::Concat(clips.to_vec()));
        if self.fail_concat {
            return Err(Self::failure("ffmpeg"));
        }
        let mut total = 0.0;
        for clip in clips {
            total += self.probe_duration(clip).await?;
        }
        tokio::fs::write(list_file, format!("{} clips", clips.len())).await?;
        write_duration(output, total).await;
        Ok(())
    }
}
