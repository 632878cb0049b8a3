//! Server configuration from `relive.toml` or `.reliverc.json`.
//!
//! # Module Structure
//!
//! ```text
//! config/
//! ├── section    # [server], [workers]
//! ├── error      # ConfigError
//! ├── util       # File discovery, path resolution
//! └── mod.rs     # Config (this file)
//! ```
//!
//! # Lookup
//!
//! `--config` wins; otherwise the first of `relive.toml`, `.reliverc.json`
//! in the project root, the current directory, then `~`. No file means
//! defaults. CLI flags override file values.
//!
//! # Keys
//!
//! | Key              | Default | Purpose                                  |
//! |------------------|---------|------------------------------------------|
//! | `root`           | `.`     | Project root, change paths relative to it |
//! | `watch`          | `[root]`| Paths to watch                           |
//! | `ignore`         | `[]`    | Glob patterns never reloaded             |
//! | `ignore_pattern` | none    | Regex, same effect                       |
//! | `inject_css`     | `true`  | Refresh stylesheets in place             |
//! | `css_notice`     | `true`  | Notice in the browser after a refresh    |
//! | `inject_body`    | `false` | Hot-patch HTML/PHP bodies                |
//! | `wait`           | `100`   | Delay (ms) before reload messages        |
//! | `remote_logs`    | `false` | Forward browser console to the terminal  |
//! | `highlight`      | `false` | Mark the element under the editor cursor |
//! | `php`            | none    | PHP executable for `.php` bodies         |
//! | `log_level`      | `1`     | 0 errors, 1 changes, 2+ debug            |
//!
//! JSON files may use the camelCase spelling (`injectCss`, `logLevel`, ...).

mod error;
mod section;
mod util;

pub use error::ConfigError;
pub use section::{ServerConfig, WorkersConfig};

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cli::Cli;
use crate::reload::classify::{ClassifyOptions, IgnoreMatcher};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// File the values came from (internal use only)
    #[serde(skip)]
    pub config_path: Option<PathBuf>,

    pub root: PathBuf,

    pub watch: Vec<PathBuf>,

    pub ignore: Vec<String>,

    #[serde(alias = "ignorePattern")]
    pub ignore_pattern: Option<String>,

    #[serde(alias = "injectCss")]
    pub inject_css: bool,

    #[serde(alias = "cssNotice")]
    pub css_notice: bool,

    #[serde(alias = "injectBody")]
    pub inject_body: bool,

    /// Milliseconds
    pub wait: u64,

    #[serde(alias = "remoteLogs")]
    pub remote_logs: bool,

    pub highlight: bool,

    pub php: Option<PathBuf>,

    #[serde(alias = "logLevel")]
    pub log_level: u8,

    pub server: ServerConfig,

    pub workers: WorkersConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            config_path: None,
            root: PathBuf::from("."),
            watch: Vec::new(),
            ignore: Vec::new(),
            ignore_pattern: None,
            inject_css: true,
            css_notice: true,
            inject_body: false,
            wait: 100,
            remote_logs: false,
            highlight: false,
            php: None,
            log_level: 1,
            server: ServerConfig::default(),
            workers: WorkersConfig::default(),
        }
    }
}

impl Config {
    /// Locate, parse, merge CLI flags and validate.
    pub fn load(cli: &Cli) -> Result<Self, ConfigError> {
        let cwd = std::env::current_dir().map_err(|e| ConfigError::Io(PathBuf::from("."), e))?;
        let path = Self::resolve_config_path(cli, &cwd);

        let mut config = match &path {
            Some(path) => Self::from_path(path)?,
            None => Self::default(),
        };
        config.config_path = path;
        config.finalize(cli, &cwd);
        config.validate()?;
        Ok(config)
    }

    fn resolve_config_path(cli: &Cli, cwd: &Path) -> Option<PathBuf> {
        if let Some(explicit) = &cli.config {
            return Some(util::resolve_path(explicit, cwd));
        }

        let mut dirs = Vec::with_capacity(3);
        if let Some(root) = &cli.root {
            dirs.push(util::resolve_path(root, cwd));
        }
        dirs.push(cwd.to_path_buf());
        dirs.extend(util::home_dir());
        util::find_config_file(&dirs)
    }

    /// Parse TOML content.
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content =
            fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        if util::is_json(path) {
            serde_json::from_str(&content).map_err(|e| ConfigError::Json(path.to_path_buf(), e))
        } else {
            Self::from_str(&content)
        }
    }

    /// Apply CLI overrides and make every path absolute.
    fn finalize(&mut self, cli: &Cli, cwd: &Path) {
        self.apply_cli(cli);

        let root = cli.root.as_deref().unwrap_or(&self.root);
        self.root = util::resolve_path(root, cwd);

        let root = self.root.clone();
        self.watch = self
            .watch
            .iter()
            .map(|p| util::resolve_path(p, &root))
            .collect();
        if self.watch.is_empty() {
            self.watch.push(root);
        }
    }

    fn apply_cli(&mut self, cli: &Cli) {
        Self::update_option(&mut self.server.host, cli.host.as_ref());
        Self::update_option(&mut self.server.port, cli.port.as_ref());
        Self::update_option(&mut self.server.ws_port, cli.ws_port.as_ref());
        Self::update_option(&mut self.wait, cli.wait.as_ref());
        Self::update_option(&mut self.workers.size, cli.workers.as_ref());

        if cli.no_css_inject {
            self.inject_css = false;
        }
        if cli.hot {
            self.inject_body = true;
        }
        if cli.remote_logs {
            self.remote_logs = true;
        }
        if cli.verbose {
            self.log_level = self.log_level.max(2);
        }
    }

    fn update_option<T: Clone>(config_option: &mut T, cli_option: Option<&T>) {
        if let Some(value) = cli_option {
            *config_option = value.clone();
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers.size == 0 {
            return Err(ConfigError::Validation(
                "workers.size must be at least 1".into(),
            ));
        }
        if self.workers.rate_limit == 0 {
            return Err(ConfigError::Validation(
                "workers.rate_limit must be at least 1".into(),
            ));
        }
        self.ignore_matcher().map(|_| ())
    }

    pub fn ignore_matcher(&self) -> Result<IgnoreMatcher, ConfigError> {
        IgnoreMatcher::new(&self.ignore, self.ignore_pattern.as_deref())
    }

    pub fn classify_options(&self) -> Result<ClassifyOptions, ConfigError> {
        Ok(ClassifyOptions {
            inject_css: self.inject_css,
            css_notice: self.css_notice,
            inject_body: self.inject_body,
            ignore: self.ignore_matcher()?,
        })
    }

    pub fn wait(&self) -> Duration {
        Duration::from_millis(self.wait)
    }

    pub fn is_verbose(&self) -> bool {
        self.log_level >= 2
    }
}
