//! Configuration records for the proxy.
//!
//! One TOML document describes the HTTP surface, the transcoder invocation
//! and the camera catalog. Every section has defaults so an empty file is a
//! valid configuration (with an empty camera catalog).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

pub mod loader;


pub use loader::{ConfigError, ConfigLoader};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    pub server: ServerConfig,
    pub transcoder: TranscoderConfig,
    pub segmented: SegmentedConfig,
    pub relay: RelayConfig,
    pub cameras: BTreeMap<String, CameraConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    pub streams_dir: PathBuf,
    pub static_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 8000)),
            streams_dir: PathBuf::from("streams"),
            static_dir: None,
        }
    }
}

/// How the external tool is launched and supervised.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscoderConfig {
    pub binary: String,
    pub log_level: String,
    /// Time between the graceful signal and the forceful kill
    #[serde(with = "humantime_serde")]
    pub grace_period: Duration,
    /// A freshly spawned process must survive this long to count as started
    #[serde(with = "humantime_serde")]
    pub liveness_window: Duration,
    pub low_latency_input: bool,
}

impl Default for TranscoderConfig {
    fn default() -> Self {
        Self {
            binary: "ffmpeg".to_string(),
            log_level: "info".to_string(),
            grace_period: Duration::from_secs(5),
            liveness_window: Duration::from_secs(1),
            low_latency_input: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentedConfig {
    /// Target segment length in seconds
    pub segment_duration: u32,
    /// Number of segments kept in the playlist window
    pub playlist_length: u32,
    /// Delete segments once they roll out of the window
    pub delete_segments: bool,
    pub manifest_name: String,
    pub segment_pattern: String,
    pub video_codec: String,
    pub preset: String,
    pub tune: String,
}

impl Default for SegmentedConfig {
    fn default() -> Self {
        Self {
            segment_duration: 1,
            playlist_length: 5,
            delete_segments: true,
            manifest_name: "index.m3u8".to_string(),
            segment_pattern: "segment_%03d.ts".to_string(),
            video_codec: "libx264".to_string(),
            preset: "ultrafast".to_string(),
            tune: "zerolatency".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Bytes read from the transcoder per forwarded chunk
    pub chunk_size: usize,
    pub video_codec: String,
    pub scale: String,
    pub bitrate: String,
    pub mux_delay: String,
    pub container: String,
    pub read_native_rate: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            chunk_size: 64 * 1024,
            video_codec: "mpeg1video".to_string(),
            scale: "800:450".to_string(),
            bitrate: "500k".to_string(),
            mux_delay: "0.01".to_string(),
            container: "mpegts".to_string(),
            read_native_rate: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Default for Resolution {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

/// A camera reachable as a raw byte stream over TCP.
///
/// The identifier is the key of the `[cameras.<id>]` table and is filled in
/// by the loader; it never changes for the lifetime of the process.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CameraConfig {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub ip_address: String,
    pub port: u16,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub resolution: Resolution,
    #[serde(default = "default_framerate")]
    pub framerate: u32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_framerate() -> u32 {
    30
}

fn default_enabled() -> bool {
    true
}

impl CameraConfig {
    pub fn new(id: impl Into<String>, ip_address: impl Into<String>, port: u16) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            ip_address: ip_address.into(),
            port,
            location: None,
            resolution: Resolution::default(),
            framerate: default_framerate(),
            enabled: true,
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// The network URI handed to the transcoder as its input.
    pub fn source_uri(&self) -> String {
        format!("tcp://{}:{}", self.ip_address, self.port)
    }
}

impl ProxyConfig {
    /// Built-in catalog used when no configuration file is given.
    pub fn with_test_camera() -> Self {
        let mut camera = CameraConfig::new("test-camera", "100.86.137.16", 8888);
        camera.name = "Test Camera".to_string();
        camera.location = Some("Test Location".to_string());

        let mut config = Self::default();
        config.cameras.insert(camera.id.clone(), camera);
        config
    }

    /// Copy table keys into each camera's `id`.
    pub(crate) fn assign_camera_ids(&mut self) {
        for (id, camera) in self.cameras.iter_mut() {
            camera.id = id.clone();
            if camera.name.is_empty() {
                camera.name = id.clone();
            }
        }
    }
}
