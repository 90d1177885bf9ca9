mod assembler;
mod cli;
mod codegen;
mod config;
mod error;
mod llm;
mod media;
mod narrator;
mod orchestrator;
mod pool;
mod reconcile;
mod render;
mod scheduler;
mod segmenter;
mod speech;
mod state_machine;
mod storage;
#[cfg(test)]
mod test_support;
mod ui;

use anyhow::{Result, bail};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command};
use config::ScenewrightConfig;
use error::JobError;
use llm::OpenAiClient;
use media::Ffmpeg;
use orchestrator::JobOrchestrator;
use pool::WorkerPool;
use render::ManimRenderer;
use segmenter::TranscriptSegmenter;
use speech::LmntClient;
use storage::Workspace;
use ui::JobProgress;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = ScenewrightConfig::load()?;
    cli.apply(&mut config);

    match &cli.command {
        Command::Generate { topic } => generate(&config, topic).await,
        Command::Segment { topic } => segment(&config, topic).await,
        Command::Check => check(&config),
    }
}

/// `RUST_LOG` wins; otherwise info, or debug with `--verbose`.
fn init_tracing(verbose: bool) {
    let default = if verbose { "scenewright=debug" } else { "scenewright=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn completion_client(config: &ScenewrightConfig) -> Result<OpenAiClient> {
    if config.api_key.is_empty() {
        bail!(
            "No completion API key configured. Set {} or api_key in {}",
            config.provider.key_var(),
            config::CONFIG_FILE
        );
    }
    let timeout = config.pipeline_settings().completion_timeout;
    let client =
        OpenAiClient::with_base_url(config.api_key.clone(), config.completion_base_url(), timeout)?;
    Ok(client)
}

async fn generate(config: &ScenewrightConfig, topic: &str) -> Result<()> {
    let client = completion_client(config)?;
    if config.speech_api_key.is_empty() {
        bail!(
            "No speech API key configured. Set LMNT_API_KEY or speech_api_key in {}",
            config::CONFIG_FILE
        );
    }
    let settings = config.pipeline_settings();
    let speech = LmntClient::new(config.speech_api_key.clone(), settings.speech_timeout)?;

    let orch = JobOrchestrator {
        client,
        renderer: ManimRenderer::new(config.manim_binary.clone(), config.render_quality),
        speech,
        media: Ffmpeg::new(config.media_timeout()),
        workspace: Workspace::new(config.output_dir.clone()),
        pool: WorkerPool::new(config.workers),
        settings,
    };
    tracing::debug!(
        output_dir = %orch.workspace.root().display(),
        workers = orch.pool.size(),
        model = %orch.settings.model,
        "pipeline configured"
    );

    let progress = JobProgress::start(topic);
    let job = match orch.plan(topic).await {
        Ok(job) => job,
        Err(e) => {
            progress.fail(&e.to_string());
            return Err(e.into());
        }
    };

    let narrations: Vec<&str> = job.scenes.iter().map(|s| s.narration.as_str()).collect();
    progress.scenes(&narrations);
    progress.phase(format!(
        "Producing {} scene(s) on {} worker(s)",
        job.scenes.len(),
        orch.pool.size()
    ));
    let mut job = orch.produce(job).await;

    progress.phase("Assembling final video");
    match orch.finish(&mut job).await {
        Ok(report) => {
            progress.complete(&report);
            progress.print_report(&report);
            Ok(())
        }
        Err(e) => {
            progress.fail(&e.to_string());
            Err(e.into())
        }
    }
}

async fn segment(config: &ScenewrightConfig, topic: &str) -> Result<()> {
    if topic.trim().is_empty() {
        return Err(JobError::EmptyTopic.into());
    }
    let client = completion_client(config)?;
    let settings = config.pipeline_settings();

    let narrations = TranscriptSegmenter::new(
        &client,
        &settings.model,
        settings.max_iterations,
        settings.completion_timeout,
    )
    .segment(topic.trim())
    .await?;

    for (i, narration) in narrations.iter().enumerate() {
        println!("{}. {narration}", i + 1);
    }
    Ok(())
}

fn check(config: &ScenewrightConfig) -> Result<()> {
    let mut missing = Vec::new();
    for tool in [config.manim_binary.as_str(), "ffmpeg", "ffprobe"] {
        let found = media::is_on_path(tool);
        ui::tool_status(tool, found);
        if !found {
            missing.push(tool);
        }
    }
    if !missing.is_empty() {
        bail!("Missing required tools: {}", missing.join(", "));
    }
    Ok(())
}
