//! Command line interface, built on clap.
//!
//! Subcommands: `generate`, `segment`, `check`. Global flags override values
//! from `scenewright.toml`.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::ScenewrightConfig;

/// Turns a topic into a narrated, animated explainer video.
#[derive(Debug, Parser)]
#[command(name = "scenewright", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Completion model identifier.
    #[arg(long, global = true)]
    pub model: Option<String>,

    /// Attempt budget for segmentation and per-scene code generation.
    #[arg(long, global = true)]
    pub max_iterations: Option<u32>,

    /// Worker pool size (0 = available execution units).
    #[arg(long, global = true)]
    pub workers: Option<usize>,

    /// Directory jobs are written into.
    #[arg(long, global = true)]
    pub output_dir: Option<PathBuf>,

    /// Debug-level logging.
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Produce a video for a topic.
    Generate {
        /// The question or topic to explain.
        topic: String,
    },

    /// Only split a topic into scene narrations and print them.
    Segment {
        topic: String,
    },

    /// Check that manim, ffmpeg and ffprobe are installed.
    Check,
}

impl Cli {
    /// Apply command line overrides on top of the loaded configuration.
    pub fn apply(&self, config: &mut ScenewrightConfig) {
        if let Some(model) = &self.model {
            config.model = model.clone();
        }
        if let Some(n) = self.max_iterations {
            config.max_iterations = n;
        }
        if let Some(n) = self.workers {
            config.workers = n;
        }
        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }
    }
}
