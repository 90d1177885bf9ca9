//! Final assembly: the muxed clips of succeeded scenes are concatenated in
//! creation order into `final_video.mp4`.
//!
//! Dropped scenes are logged and skipped. A job with no succeeded scene has
//! nothing to assemble and fails.

use std::path::PathBuf;

use crate::error::JobError;
use crate::media::MediaToolkit;
use crate::state_machine::Job;
use crate::storage::{self, Workspace};

/// Concatenates succeeded scenes, in creation order, into the final video.
pub struct VideoAssembler<'a, M> {
    media: &'a M,
    /// Resolves the final video and concat list locations for a job.
    workspace: &'a Workspace,
}

impl<'a, M: MediaToolkit> VideoAssembler<'a, M> {
    pub fn new(media: &'a M, workspace: &'a Workspace) -> Self {
        Self { media, workspace }
    }

    pub async fn assemble(&self, job: &mut Job) -> Result<PathBuf, JobError> {
        for scene in job.dropped() {
            tracing::warn!(
                job_id = %job.id,
                scene_id = %scene.id,
                index = scene.index,
                reason = scene.failure.as_deref().unwrap_or("unknown"),
                "scene left out of the final video"
            );
        }

        let clips = job.muxed_clips();
        if clips.is_empty() {
            return Err(JobError::AssemblyFailed(
                "no scene succeeded, nothing to assemble".into(),
            ));
        }
        // The concat list is resolved relative to its own location.
        let clips = clips
            .iter()
            .map(std::path::absolute)
            .collect::<Result<Vec<_>, _>>()?;

        let target = self.workspace.final_video(&job.id);
        tokio::fs::create_dir_all(self.workspace.job_dir(&job.id)).await?;
        let staging = storage::staging_path(&target);
        let list = self.workspace.concat_list(&job.id);

        if let Err(e) = self.media.concat(&clips, &list, &staging).await {
            storage::discard(&staging).await;
            return Err(JobError::AssemblyFailed(e.to_string()));
        }
        if let Err(e) = storage::commit(&staging, &target).await {
            storage::discard(&staging).await;
            return Err(JobError::AssemblyFailed(format!(
                "could not move final video into place: {e}"
            )));
        }

        tracing::info!(job_id = %job.id, clips = clips.len(), path = %target.display(), "final video assembled");
        job.final_path = Some(target.clone());
        Ok(target)
    }
}
