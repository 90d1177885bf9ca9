//! Transcript segmentation: one topic in, 1..=5 scene narrations out.

use std::time::Duration;

use thiserror::Error;

use crate::error::JobError;
use crate::llm::{ChatRequest, CompletionClient, CompletionError, Message};

pub const MAX_SCENES: usize = 5;

pub const TRANSCRIPT_SYSTEM_PROMPT: &str = r#"You are an expert teacher of topics, similar to 3Blue1Brown. Given a user's question about a topic, you generate the transcript of a short video that explains it.

If needed, chunk the transcript into multiple scenes, in the logical order that best explains the topic. The transcript should be engaging and informative. Do not use more than 5 scenes.

ONLY respond with a JSON array of strings, where each string is the narration of one scene. Start and end the array with square brackets and surround every element with double quotes. Do not include a programming language name or any markdown.

Format example:

[
    "This is the first scene",
    "This is the second scene"
]
"#;

pub const FORMAT_CORRECTION: &str = "Error: Did not follow the required format. Respond with only a JSON array of strings, one string per scene, and at most 5 scenes.";

/// Why a completion could not be turned into a scene list.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScriptParseError {
    #[error("no JSON array of strings found")]
    NotAnArray,
    #[error("scene list was empty")]
    Empty,
    #[error("{0} scenes returned, at most {MAX_SCENES} allowed")]
    TooManyScenes(usize),
}

/// Strip a surrounding markdown code fence and its language tag.
pub fn strip_code_fence(raw: &str) -> &str {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("```") {
        text = match rest.find('\n') {
            Some(nl) if is_language_tag(&rest[..nl]) => &rest[nl + 1..],
            _ => rest,
        };
    }
    if let Some(rest) = text.trim_end().strip_suffix("```") {
        text = rest;
    }
    text.trim()
}

fn is_language_tag(line: &str) -> bool {
    line.trim()
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '+'))
}

/// Parse a scene list, strictly first, then from the outermost `[`..`]` span.
pub fn parse_scene_list(text: &str) -> Result<Vec<String>, ScriptParseError> {
    let parsed = serde_json::from_str::<Vec<String>>(text)
        .ok()
        .or_else(|| salvage_array(text))
        .ok_or(ScriptParseError::NotAnArray)?;

    let scenes: Vec<String> = parsed
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    match scenes.len() {
        0 => Err(ScriptParseError::Empty),
        n if n > MAX_SCENES => Err(ScriptParseError::TooManyScenes(n)),
        _ => Ok(scenes),
    }
}

fn salvage_array(text: &str) -> Option<Vec<String>> {
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}

/// Diversity heuristic: temperature grows linearly with the iteration index,
/// rounded to one decimal place.
pub fn temperature_for(iteration: u32, max_iterations: u32) -> f32 {
    let ratio = iteration as f32 / max_iterations.max(1) as f32;
    (ratio * 10.0).round() / 10.0
}

pub struct TranscriptSegmenter<'a, C> {
    client: &'a C,
    model: &'a str,
    max_iterations: u32,
    timeout: Duration,
}

impl<'a, C: CompletionClient> TranscriptSegmenter<'a, C> {
    pub fn new(client: &'a C, model: &'a str, max_iterations: u32, timeout: Duration) -> Self {
        Self {
            client,
            model,
            max_iterations: max_iterations.max(1),
            timeout,
        }
    }

    /// Split `topic` into ordered scene narrations.
    pub async fn segment(&self, topic: &str) -> Result<Vec<String>, JobError> {
        let mut messages = vec![
            Message::system(TRANSCRIPT_SYSTEM_PROMPT),
            Message::user(topic),
        ];
        let mut last_error = String::new();

        for iteration in 0..self.max_iterations {
            let req = ChatRequest {
                model: self.model.to_string(),
                messages: messages.clone(),
                temperature: Some(temperature_for(iteration, self.max_iterations)),
            };

            let raw = match tokio::time::timeout(self.timeout, self.client.complete(&req)).await {
                Ok(Ok(text)) => text,
                Ok(Err(e)) => {
                    tracing::warn!(iteration, error = %e, "transcript completion failed");
                    last_error = e.to_string();
                    continue;
                }
                Err(_) => {
                    let e = CompletionError::Timeout(self.timeout.as_secs());
                    tracing::warn!(iteration, error = %e, "transcript completion failed");
                    last_error = e.to_string();
                    continue;
                }
            };

            tracing::debug!(iteration, output = %raw, "transcript completion");
            messages.push(Message::assistant(raw.clone()));

            match parse_scene_list(strip_code_fence(&raw)) {
                Ok(scenes) => {
                    tracing::info!(iteration, scenes = scenes.len(), "transcript segmented");
                    return Ok(scenes);
                }
                Err(e) => {
                    tracing::warn!(iteration, error = %e, "transcript did not parse, asking again");
                    last_error = e.to_string();
                    messages.push(Message::user(FORMAT_CORRECTION));
                }
            }
        }

        Err(JobError::SegmentationFailed {
            attempts: self.max_iterations,
            last_error,
        })
    }
}
