use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel::Receiver;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::actor::messages::{DispatchMsg, WsMsg};
use crate::actor::ws::SessionRegistry;
use crate::pool::WorkerPool;
use crate::reload::server::WsListener;
use crate::reload::status::StatusServer;

/// Bound on each actor's shutdown acknowledgement
const ACK_TIMEOUT: Duration = Duration::from_millis(500);

/// Everything started by the coordinator, in teardown order.
pub(super) struct Running {
    pub fs: JoinHandle<()>,
    pub ws: JoinHandle<()>,
    pub dispatch: JoinHandle<()>,
    pub ws_tx: mpsc::Sender<WsMsg>,
    pub dispatch_tx: mpsc::Sender<DispatchMsg>,
    pub registry: Arc<SessionRegistry>,
    pub pool: Arc<WorkerPool>,
    pub listener: WsListener,
    pub status: StatusServer,
}

impl Running {
    /// Block until a shutdown signal arrives or a core actor exits.
    pub(super) async fn wait(&mut self, shutdown_rx: &Receiver<()>) {
        loop {
            tokio::select! {
                _ = &mut self.ws => {
                    crate::log!("actor"; "session actor exited");
                    return;
                }
                _ = &mut self.dispatch => {
                    crate::log!("actor"; "dispatcher exited");
                    return;
                }
                _ = tokio::time::sleep(Duration::from_millis(100)) => {
                    if shutdown_rx.try_recv().is_ok() {
                        crate::debug!("actor"; "shutdown signal received");
                        return;
                    }
                }
            }
        }
    }

    /// Watcher → sessions → pool → listeners.
    pub(super) async fn shutdown(self) {
        let Self {
            fs,
            ws: _,
            dispatch: _,
            ws_tx,
            dispatch_tx,
            registry,
            pool,
            mut listener,
            mut status,
        } = self;

        fs.abort();
        let _ = fs.await;
        crate::debug!("actor"; "watcher stopped");

        let (ack, done) = oneshot::channel();
        if ws_tx.send(WsMsg::Shutdown(ack)).await.is_ok() {
            let _ = tokio::time::timeout(ACK_TIMEOUT, done).await;
        }
        // Covers an actor that already exited
        registry.shutdown();
        crate::debug!("actor"; "sessions closed");

        let (ack, done) = oneshot::channel();
        if dispatch_tx.send(DispatchMsg::Shutdown(ack)).await.is_ok() {
            let _ = tokio::time::timeout(ACK_TIMEOUT, done).await;
        }
        let _ = tokio::task::spawn_blocking(move || pool.shutdown()).await;
        crate::debug!("actor"; "workers stopped");

        let _ = tokio::task::spawn_blocking(move || {
            listener.stop();
            status.stop();
        })
        .await;
        crate::debug!("actor"; "listeners closed");
    }
}
