//! Read-only camera catalog and the raw TCP camera source.

pub mod source;

pub use source::{CameraSource, SourceError};

use crate::config::CameraConfig;
use crate::error::StreamError;
use std::collections::BTreeMap;

/// Lookup over the configured cameras. Never mutated after construction.
#[derive(Debug, Clone, Default)]
pub struct CameraCatalog {
    cameras: BTreeMap<String, CameraConfig>,
}

impl CameraCatalog {
    pub fn new(cameras: BTreeMap<String, CameraConfig>) -> Self {
        Self { cameras }
    }

    pub fn from_cameras(cameras: impl IntoIterator<Item = CameraConfig>) -> Self {
        Self::new(cameras.into_iter().map(|c| (c.id.clone(), c)).collect())
    }

    pub fn get(&self, id: &str) -> Option<&CameraConfig> {
        self.cameras.get(id)
    }

    /// Look up a camera that may be streamed right now.
    pub fn resolve(&self, id: &str) -> Result<&CameraConfig, StreamError> {
        let camera = self
            .get(id)
            .ok_or_else(|| StreamError::NotFound(id.to_string()))?;
        if !camera.enabled {
            return Err(StreamError::Disabled(id.to_string()));
        }
        Ok(camera)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CameraConfig> {
        self.cameras.values()
    }

    pub fn len(&self) -> usize {
        self.cameras.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cameras.is_empty()
    }
}
