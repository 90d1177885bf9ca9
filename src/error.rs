use thiserror::Error;

/// Failures contained at the scene boundary. A scene that hits one of these
/// is dropped from assembly; sibling scenes keep running.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SceneError {
    #[error("code generation failed after {attempts} attempt(s): {reason}")]
    GenerationFailed { attempts: u32, reason: String },

    #[error("speech synthesis failed: {0}")]
    SynthesisFailed(String),

    #[error("mux failed: {0}")]
    MuxFailed(String),
}

/// Failures that end the whole job.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("Topic must not be empty")]
    EmptyTopic,

    #[error("transcript segmentation did not converge after {attempts} attempt(s): {last_error}")]
    SegmentationFailed { attempts: u32, last_error: String },

    #[error("assembly failed: {0}")]
    AssemblyFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
