//! Building the external tool's command line.

use std::path::{Path, PathBuf};

use crate::config::{CameraConfig, ProxyConfig, RelayConfig, SegmentedConfig, TranscoderConfig};

/// A fully resolved command line for one transcoder process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscoderCommand {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
}

impl TranscoderCommand {
    pub fn display(&self) -> String {
        format!("{} {}", self.program, self.args.join(" "))
    }
}

pub struct TranscoderCommandBuilder {
    command: TranscoderCommand,
}

impl TranscoderCommandBuilder {
    pub fn new(program: &str) -> Self {
        Self {
            command: TranscoderCommand {
                program: program.to_string(),
                args: Vec::new(),
                working_dir: None,
            },
        }
    }

    pub fn arg(mut self, arg: impl AsRef<str>) -> Self {
        self.command.args.push(arg.as_ref().to_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.command
            .args
            .extend(args.into_iter().map(|s| s.as_ref().to_string()));
        self
    }

    /// Append a `flag value` pair.
    pub fn option(self, flag: &str, value: impl AsRef<str>) -> Self {
        self.arg(flag).arg(value)
    }

    /// Append `flag value` only when `enabled`.
    pub fn option_if(self, enabled: bool, flag: &str, value: &str) -> Self {
        if enabled {
            self.option(flag, value)
        } else {
            self
        }
    }

    pub fn flag_if(self, enabled: bool, flag: &str) -> Self {
        if enabled {
            self.arg(flag)
        } else {
            self
        }
    }

    pub fn current_dir(mut self, dir: &Path) -> Self {
        self.command.working_dir = Some(dir.to_path_buf());
        self
    }

    pub fn build(self) -> TranscoderCommand {
        self.command
    }
}

/// Where a transcoder writes its result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputSpec {
    /// A rolling playlist plus numbered segment files in a directory
    Segmented(SegmentedOutput),
    /// A continuous container stream on the process's own stdout
    Relay,
}

impl OutputSpec {
    pub fn captures_stdout(&self) -> bool {
        matches!(self, OutputSpec::Relay)
    }

    pub fn manifest_path(&self) -> Option<&Path> {
        match self {
            OutputSpec::Segmented(output) => Some(&output.manifest),
            OutputSpec::Relay => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentedOutput {
    pub directory: PathBuf,
    pub manifest: PathBuf,
    pub segment_pattern: PathBuf,
    pub segment_duration: u32,
    pub playlist_length: u32,
    pub delete_segments: bool,
}

/// Turns a camera and an output choice into a command line.
///
/// The production implementation drives ffmpeg; tests substitute scripts.
pub trait InvocationBuilder: Send + Sync {
    fn build(&self, camera: &CameraConfig, output: &OutputSpec) -> TranscoderCommand;
}

#[derive(Debug, Clone)]
pub struct FfmpegInvocation {
    transcoder: TranscoderConfig,
    segmented: SegmentedConfig,
    relay: RelayConfig,
}

impl FfmpegInvocation {
    pub fn new(config: &ProxyConfig) -> Self {
        Self {
            transcoder: config.transcoder.clone(),
            segmented: config.segmented.clone(),
            relay: config.relay.clone(),
        }
    }

    fn segmented_command(&self, camera: &CameraConfig, output: &SegmentedOutput) -> TranscoderCommand {
        let low_latency = self.transcoder.low_latency_input;
        let hls_flags = if output.delete_segments {
            "delete_segments+omit_endlist"
        } else {
            "omit_endlist"
        };

        TranscoderCommandBuilder::new(&self.transcoder.binary)
            .option("-loglevel", &self.transcoder.log_level)
            .option_if(low_latency, "-fflags", "nobuffer")
            .option_if(low_latency, "-flags", "low_delay")
            .option_if(low_latency, "-probesize", "32")
            .option_if(low_latency, "-analyzeduration", "0")
            .option("-i", camera.source_uri())
            .option("-c:v", &self.segmented.video_codec)
            .option("-preset", &self.segmented.preset)
            .option("-tune", &self.segmented.tune)
            .option("-f", "hls")
            .option("-hls_time", output.segment_duration.to_string())
            .option("-hls_list_size", output.playlist_length.to_string())
            .option("-hls_flags", hls_flags)
            .option("-hls_segment_type", "mpegts")
            .option("-hls_segment_filename", output.segment_pattern.to_string_lossy())
            .arg(output.manifest.to_string_lossy())
            .current_dir(&output.directory)
            .build()
    }

    fn relay_command(&self, camera: &CameraConfig) -> TranscoderCommand {
        TranscoderCommandBuilder::new(&self.transcoder.binary)
            .option("-loglevel", &self.transcoder.log_level)
            .option("-fflags", "+igndts")
            .flag_if(self.relay.read_native_rate, "-re")
            .option("-i", camera.source_uri())
            .option("-c:v", &self.relay.video_codec)
            .option("-bf", "0")
            .option("-vf", format!("scale={}", self.relay.scale))
            .option("-b:v", &self.relay.bitrate)
            .option("-f", &self.relay.container)
            .option("-muxdelay", &self.relay.mux_delay)
            .arg("-an")
            .arg("pipe:1")
            .build()
    }
}

impl InvocationBuilder for FfmpegInvocation {
    fn build(&self, camera: &CameraConfig, output: &OutputSpec) -> TranscoderCommand {
        match output {
            OutputSpec::Segmented(segmented) => self.segmented_command(camera, segmented),
            OutputSpec::Relay => self.relay_command(camera),
        }
    }
}
