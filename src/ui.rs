//! Terminal output: a spinner while a job runs and coloured result lines.
//!
//! Uses `indicatif` for the spinner and `console` for styling.

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::state_machine::{JobReport, SceneStatus};

/// Visual progress for one job in the terminal.
pub struct JobProgress {
    pb: ProgressBar,
    green: Style,
    red: Style,
    yellow: Style,
    dim: Style,
}

impl JobProgress {
    pub fn start(topic: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        let style = ProgressStyle::default_spinner()
            .template("{spinner:.cyan} [{elapsed}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        pb.set_style(style);
        pb.set_message(format!("Segmenting: {topic}"));
        pb.enable_steady_tick(std::time::Duration::from_millis(100));

        Self {
            pb,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
            dim: Style::new().dim(),
        }
    }

    pub fn phase(&self, message: impl Into<String>) {
        self.pb.set_message(message.into());
    }

    /// Print the scene list the segmenter produced.
    pub fn scenes(&self, narrations: &[&str]) {
        for (i, narration) in narrations.iter().enumerate() {
            self.pb.println(format!(
                "  {} {}",
                self.dim.apply_to(format!("{:>2}.", i + 1)),
                narration
            ));
        }
    }

    /// Stop the spinner and print the outcome of the job.
    pub fn complete(&self, report: &JobReport) {
        self.pb.finish_and_clear();
        for scene in &report.scenes {
            match scene.status {
                SceneStatus::Succeeded => println!(
                    "  {} Scene {} ({} attempt(s), {:.1}s)",
                    self.green.apply_to("✓"),
                    scene.index + 1,
                    scene.attempts,
                    scene.duration_secs.unwrap_or_default()
                ),
                _ => println!(
                    "  {} Scene {} dropped: {}",
                    self.yellow.apply_to("!"),
                    scene.index + 1,
                    scene.failure.as_deref().unwrap_or("unknown")
                ),
            }
        }

        if let Some(path) = &report.final_video {
            println!("  {} Final video: {}", self.green.apply_to("✓"), path.display());
        }
        if report.has_dropped_scenes() {
            println!(
                "  {} {} of {} scene(s) were dropped from the video",
                self.yellow.apply_to("!"),
                report.dropped_scenes.len(),
                report.scenes.len()
            );
        }
    }

    pub fn fail(&self, reason: &str) {
        self.pb.finish_and_clear();
        println!("  {} Job failed: {reason}", self.red.apply_to("✗"));
    }

    /// Print the report as pretty JSON.
    pub fn print_report(&self, report: &JobReport) {
        let header = if report.has_dropped_scenes() {
            &self.yellow
        } else {
            &self.green
        };
        println!();
        println!("{}", header.apply_to("─── Job Report ───"));
        println!("{}", serde_json::to_string_pretty(report).unwrap_or_default());
    }
}

/// One line of `scenewright check` output.
pub fn tool_status(name: &str, found: bool) {
    if found {
        println!("  {} {name}", Style::new().green().bold().apply_to("✓"));
    } else {
        println!("  {} {name} not found on PATH", Style::new().red().bold().apply_to("✗"));
    }
}
