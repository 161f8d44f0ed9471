//! CLI argument structures

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::num::NonZeroUsize;
use std::path::PathBuf;

/// Proxy camera TCP feeds to HLS playlists and websocket relays
#[derive(Parser, Debug)]
#[command(name = "camproxy")]
#[command(about = "camproxy - Relay camera feeds over HLS and websockets", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Enable verbose output (-v for debug, -vv for trace, -vvv for all)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP and websocket server
    Serve {
        /// Address to bind, overriding the configuration
        #[arg(long)]
        bind: Option<SocketAddr>,
    },

    /// Validate the configuration and list cameras
    Check,

    /// Connect to a camera's TCP source and read one chunk
    Probe {
        camera_id: String,

        /// Number of bytes to read
        #[arg(long, default_value = "4096")]
        bytes: NonZeroUsize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_serve_with_bind() {
        let cli = Cli::parse_from(["camproxy", "-vv", "serve", "--bind", "127.0.0.1:9000"]);
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Serve { bind } => {
                assert_eq!(bind, Some("127.0.0.1:9000".parse().unwrap()));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_probe_rejects_zero_bytes() {
        let err = Cli::try_parse_from(["camproxy", "probe", "cam1", "--bytes", "0"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn test_parse_probe_defaults() {
        let cli = Cli::parse_from(["camproxy", "probe", "cam1", "-c", "proxy.toml"]);
        assert_eq!(cli.config, Some(PathBuf::from("proxy.toml")));
        match cli.command {
            Commands::Probe { camera_id, bytes } => {
                assert_eq!(camera_id, "cam1");
                assert_eq!(bytes.get(), 4096);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
