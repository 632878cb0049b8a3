//! Actor Coordinator - Wires up the Live Reload Actor System
//!
//! The Coordinator is a thin orchestrator that:
//! - Creates communication channels and the worker pool
//! - Starts the watcher, dispatcher, session actor and both listeners
//! - Tears everything down in order on shutdown:
//!   watcher → sessions → workers → listeners

mod runtime;

use std::sync::Arc;

use anyhow::{Context, Result};
use crossbeam::channel::Receiver;
use tokio::runtime::Handle;
use tokio::sync::mpsc;

use super::dispatch::{DispatchOptions, Dispatcher};
use super::fs::FsActor;
use super::messages::{DispatchMsg, WsMsg};
use super::ws::{SessionRegistry, WsActor};
use crate::config::Config;
use crate::pool::{ProcessorRegistry, TaskOutcome, WorkerPool};
use crate::reload::{server, status};
use runtime::Running;

const CHANNEL_BUFFER: usize = 32;

/// Coordinator - wires up and runs the actor system.
pub struct Coordinator {
    config: Arc<Config>,
    shutdown_rx: Option<Receiver<()>>,
}

impl Coordinator {
    pub fn with_config(config: Arc<Config>) -> Self {
        Self {
            config,
            shutdown_rx: None,
        }
    }

    /// Use this signal instead of registering with the Ctrl+C handler.
    pub fn with_shutdown_signal(mut self, rx: Receiver<()>) -> Self {
        self.shutdown_rx = Some(rx);
        self
    }

    fn dispatch_options(&self) -> Result<DispatchOptions> {
        Ok(DispatchOptions {
            classify: self.config.classify_options()?,
            root: self.config.root.clone(),
            wait: self.config.wait(),
            highlight: self.config.highlight,
        })
    }

    /// Run until shutdown is signalled, then tear down.
    pub async fn run(mut self) -> Result<()> {
        let config = Arc::clone(&self.config);
        let (dispatch_tx, dispatch_rx) = mpsc::channel::<DispatchMsg>(CHANNEL_BUFFER);
        let (ws_tx, ws_rx) = mpsc::channel::<WsMsg>(CHANNEL_BUFFER);
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel::<TaskOutcome>();

        let registry = Arc::new(SessionRegistry::new(Handle::current(), config.remote_logs));
        let ws_actor = WsActor::new(ws_rx, Arc::clone(&registry));

        let processors = ProcessorRegistry::with_defaults(config.php.clone());
        crate::debug!("pool"; "processors: {}", processors.extensions().join(", "));
        let pool = Arc::new(WorkerPool::new(
            config.workers.pool_config(config.is_verbose()),
            processors,
            Dispatcher::result_handler(outcome_tx),
        ));
        let dispatcher = Dispatcher::new(
            dispatch_rx,
            outcome_rx,
            ws_tx.clone(),
            Arc::clone(&pool),
            self.dispatch_options()?,
        );

        // Watch before accepting: a connected browser never misses a change
        let fs_actor = FsActor::new(config.watch.clone(), config.root.clone(), dispatch_tx.clone())
            .context("watcher failed")?;

        let listener = server::start_ws_server(config.server.host, config.server.ws_port, ws_tx.clone())?;
        let status = status::start_status_server(
            config.server.host,
            config.server.port,
            dispatch_tx.clone(),
        )?;

        let shutdown_rx = match self.shutdown_rx.take() {
            Some(rx) => rx,
            None => {
                let (tx, rx) = crossbeam::channel::bounded(1);
                crate::core::register_server(status.server(), tx);
                rx
            }
        };

        crate::log!(
            "serve";
            "ws://{}:{}  status http://{}{}",
            config.server.host,
            listener.port(),
            status.addr(),
            status::STATUS_PATH
        );

        crate::debug!("actor"; "start");
        let mut running = Running {
            fs: tokio::spawn(fs_actor.run()),
            ws: tokio::spawn(ws_actor.run()),
            dispatch: tokio::spawn(dispatcher.run()),
            ws_tx,
            dispatch_tx,
            registry,
            pool,
            listener,
            status,
        };

        running.wait(&shutdown_rx).await;
        running.shutdown().await;

        crate::debug!("actor"; "stopped");
        Ok(())
    }
}
