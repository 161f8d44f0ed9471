//! # camproxy
//!
//! A camera proxy that turns raw TCP camera feeds into HLS playlists and
//! per-consumer websocket relays by supervising external transcoder
//! processes.
//!
//! ## Usage
//!
//! ```bash
//! camproxy [-v] [-c proxy.toml] serve [--bind 0.0.0.0:8000]
//! ```
//!
//! ## Modules
//!
//! - `camera` - Camera catalog and raw TCP source
//! - `cli` - Command-line argument structures and command handlers
//! - `config` - Configuration records, TOML loading and env overrides
//! - `error` - Errors shared by the publishers
//! - `registry` - One segmented transcoder per stream, serialized per identifier
//! - `relay` - Per-consumer live relay sessions
//! - `segmented` - HLS output layout and publisher
//! - `server` - axum control plane and websocket endpoint
//! - `transcoder` - Spawning, supervising and terminating transcoder processes
pub mod camera;
pub mod cli;
pub mod config;
pub mod error;
pub mod registry;
pub mod relay;
pub mod segmented;
pub mod server;
pub mod transcoder;
