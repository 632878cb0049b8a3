//! relive - a live-reload development server core.
//!
//! Watches a project, refreshes stylesheets in place, hot-patches page
//! bodies and reloads connected browsers.

#![allow(dead_code)]

mod actor;
mod cli;
mod client;
mod config;
mod core;
mod dom;
mod logger;
mod pool;
mod reload;

use std::sync::Arc;

use actor::Coordinator;
use anyhow::{Context, Result};
use clap::{ColorChoice, Parser};
use cli::Cli;
use config::Config;

fn main() -> Result<()> {
    // Setup global Ctrl+C handler (before any blocking operations)
    core::setup_shutdown_handler()?;

    let cli = Cli::parse();

    // Set global color override based on CLI option
    match cli.color {
        ColorChoice::Always => owo_colors::set_override(true),
        ColorChoice::Never => owo_colors::set_override(false),
        ColorChoice::Auto => {} // owo-colors auto-detects TTY
    }

    let config = Config::load(&cli)?;
    logger::set_level(config.log_level);
    match &config.config_path {
        Some(path) => debug!("config"; "loaded {}", path.display()),
        None => debug!("config"; "no config file, using defaults"),
    }

    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    rt.block_on(Coordinator::with_config(Arc::new(config)).run())
}
