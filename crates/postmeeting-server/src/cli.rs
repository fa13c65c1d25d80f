//! Command-line interface definition.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use postmeeting_core::TracingOutputFormat;

/// postmeeting - meeting recordings, follow-ups, and social posts
#[derive(Debug, Parser)]
#[command(name = "postmeeting")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, short, env = "POSTMEETING_CONFIG")]
    pub config: Option<PathBuf>,

    /// Address to listen on (overrides [server] bind)
    #[arg(long, env = "POSTMEETING_BIND")]
    pub bind: Option<SocketAddr>,

    /// Log output format (json, compact, pretty)
    #[arg(long)]
    pub log_format: Option<TracingOutputFormat>,

    /// Keep all state in memory
    #[arg(long)]
    pub in_memory: bool,

    /// Enable debug output
    #[arg(long, short = 'v')]
    pub debug: bool,
}
