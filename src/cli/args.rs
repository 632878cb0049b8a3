//! Command-line interface definitions.

use clap::{ColorChoice, Parser};
use std::net::IpAddr;
use std::path::PathBuf;

/// Live-reload development server
#[derive(Parser, Debug, Clone, Default)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Project root to watch (default: current directory)
    #[arg(value_hint = clap::ValueHint::DirPath)]
    pub root: Option<PathBuf>,

    /// Config file path (default: search for relive.toml / .reliverc.json)
    #[arg(short = 'C', long, value_hint = clap::ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    /// Network interface for the socket and status listeners
    #[arg(long)]
    pub host: Option<IpAddr>,

    /// Status server port
    #[arg(short, long)]
    pub port: Option<u16>,

    /// WebSocket port (next free port is used when taken)
    #[arg(long)]
    pub ws_port: Option<u16>,

    /// Reload the page on stylesheet changes instead of refreshing them
    #[arg(long)]
    pub no_css_inject: bool,

    /// Hot-patch the page body on HTML/PHP changes
    #[arg(long)]
    pub hot: bool,

    /// Delay before each reload/stylesheet message, in milliseconds
    #[arg(short, long, value_name = "MS")]
    pub wait: Option<u64>,

    /// Worker threads for hot-body processing
    #[arg(long, value_name = "N")]
    pub workers: Option<usize>,

    /// Forward browser console output to this terminal
    #[arg(long)]
    pub remote_logs: bool,

    /// Print debug output
    #[arg(short, long)]
    pub verbose: bool,

    /// Control colored output (auto, always, never)
    #[arg(long, default_value = "auto")]
    pub color: ColorChoice,
}
