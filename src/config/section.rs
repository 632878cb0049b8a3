//! `[server]` and `[workers]` sections.
//!
//! ```toml
//! [server]
//! host = "127.0.0.1"   # Interface for both listeners
//! port = 5555          # Status server port
//! ws_port = 35729      # WebSocket port (retries upward when taken)
//!
//! [workers]
//! size = 2             # Worker threads
//! rate_limit = 50      # Tasks dispatched per second
//! max_queue = 64       # Waiting tasks before updates are dropped
//! grace_ms = 2000      # Shutdown wait for in-flight tasks
//! ```

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::pool::PoolConfig;

/// Listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// - `127.0.0.1` (default): localhost only
    /// - `0.0.0.0`: all interfaces (LAN accessible)
    pub host: IpAddr,

    pub port: u16,

    #[serde(alias = "wsPort")]
    pub ws_port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 5555,
            ws_port: 35729,
        }
    }
}

/// Worker pool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkersConfig {
    pub size: usize,
    #[serde(alias = "rateLimit")]
    pub rate_limit: u32,
    #[serde(alias = "maxQueue")]
    pub max_queue: usize,
    #[serde(alias = "graceMs")]
    pub grace_ms: u64,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            size: 2,
            rate_limit: 50,
            max_queue: 64,
            grace_ms: 2000,
        }
    }
}

impl WorkersConfig {
    pub fn pool_config(&self, time_tasks: bool) -> PoolConfig {
        PoolConfig {
            size: self.size,
            rate_limit: self.rate_limit,
            rate_window: Duration::from_secs(1),
            max_queue: self.max_queue,
            grace: Duration::from_millis(self.grace_ms),
            time_tasks,
        }
    }
}
