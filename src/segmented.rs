//! Segmented (HLS) output: picks invocation parameters, delegates to the registry.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::camera::CameraCatalog;
use crate::config::SegmentedConfig;
use crate::error::StreamError;
use crate::registry::{ProcessRegistry, StartOutcome, StreamStatus};
use crate::transcoder::{OutputSpec, SegmentedOutput};

/// On-disk placement of each stream's playlist and segments.
#[derive(Debug, Clone)]
pub struct SegmentLayout {
    root: PathBuf,
    manifest_name: String,
    segment_pattern: String,
}

impl SegmentLayout {
    pub fn new(root: impl Into<PathBuf>, config: &SegmentedConfig) -> Self {
        Self {
            root: root.into(),
            manifest_name: config.manifest_name.clone(),
            segment_pattern: config.segment_pattern.clone(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn stream_dir(&self, stream_id: &str) -> PathBuf {
        self.root.join(stream_id)
    }

    pub fn manifest_path(&self, stream_id: &str) -> PathBuf {
        self.stream_dir(stream_id).join(&self.manifest_name)
    }

    /// URL path under which the file server exposes the manifest.
    pub fn playlist_url(&self, stream_id: &str) -> String {
        format!("/streams/{}/{}", stream_id, self.manifest_name)
    }
}

pub struct SegmentedPublisher {
    catalog: Arc<CameraCatalog>,
    registry: Arc<ProcessRegistry>,
    layout: SegmentLayout,
    config: SegmentedConfig,
}

impl SegmentedPublisher {
    pub fn new(
        catalog: Arc<CameraCatalog>,
        registry: Arc<ProcessRegistry>,
        layout: SegmentLayout,
        config: SegmentedConfig,
    ) -> Self {
        Self {
            catalog,
            registry,
            layout,
            config,
        }
    }

    pub fn layout(&self) -> &SegmentLayout {
        &self.layout
    }

    pub fn registry(&self) -> &Arc<ProcessRegistry> {
        &self.registry
    }

    pub fn output_for(&self, stream_id: &str) -> OutputSpec {
        let directory = self.layout.stream_dir(stream_id);
        OutputSpec::Segmented(SegmentedOutput {
            manifest: self.layout.manifest_path(stream_id),
            segment_pattern: directory.join(&self.layout.segment_pattern),
            directory,
            segment_duration: self.config.segment_duration,
            playlist_length: self.config.playlist_length,
            delete_segments: self.config.delete_segments,
        })
    }

    pub async fn start(&self, stream_id: &str) -> Result<StartOutcome, StreamError> {
        self.registry
            .request_start(
                stream_id,
                self.catalog.get(stream_id),
                &self.output_for(stream_id),
            )
            .await
    }

    pub async fn stop(&self, stream_id: &str) {
        self.registry.request_stop(stream_id).await
    }

    pub async fn status(&self, stream_id: &str) -> StreamStatus {
        self.registry
            .status(stream_id, &self.output_for(stream_id))
            .await
    }
}
