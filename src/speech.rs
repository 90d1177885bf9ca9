//! Speech capability: narration text in, encoded audio bytes out.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const LMNT_SPEECH_URL: &str = "https://api.lmnt.com/v1/ai/speech/bytes";

#[derive(Debug, Error)]
pub enum SpeechError {
    #[error("speech API error (status {status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("speech engine returned no audio")]
    EmptyAudio,

    #[error("speech synthesis timed out after {0}s")]
    Timeout(u64),

    #[error("network error: {0}")]
    NetworkError(#[from] reqwest::Error),
}

/// Container the speech engine encodes into.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    #[default]
    Mp3,
    Wav,
}

impl AudioFormat {
    pub fn extension(self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Wav => "wav",
        }
    }
}

/// Fixed voice parameters applied to every scene of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceSettings {
    pub voice: String,
    pub format: AudioFormat,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            voice: "lily".to_string(),
            format: AudioFormat::Mp3,
        }
    }
}

/// Speech capability used by the scene narrator.
#[allow(async_fn_in_trait)]
pub trait SpeechEngine {
    async fn synthesize(&self, text: &str, voice: &VoiceSettings) -> Result<Vec<u8>, SpeechError>;
}

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    text: &'a str,
    voice: &'a str,
    format: AudioFormat,
}

/// Client for the LMNT text-to-speech API.
pub struct LmntClient {
    api_key: String,
    client: Client,
    url: String,
}

impl LmntClient {
    pub fn new(api_key: String, timeout: Duration) -> Result<Self, SpeechError> {
        Self::with_url(api_key, LMNT_SPEECH_URL.to_string(), timeout)
    }

    /// Create a client pointing at a custom endpoint (useful for testing).
    pub fn with_url(api_key: String, url: String, timeout: Duration) -> Result<Self, SpeechError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            api_key,
            client,
            url,
        })
    }
}

impl SpeechEngine for LmntClient {
    async fn synthesize(&self, text: &str, voice: &VoiceSettings) -> Result<Vec<u8>, SpeechError> {
        let response = self
            .client
            .post(&self.url)
            .header("X-API-Key", &self.api_key)
            .json(&SpeechRequest {
                text,
                voice: &voice.voice,
                format: voice.format,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(SpeechError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(SpeechError::EmptyAudio);
        }
        Ok(bytes.to_vec())
    }
}
