//! Worker Pool
//!
//! Fixed set of worker threads that validate and process hot-body
//! candidates off the dispatch path.
//!
//! ```text
//! submit --> [queue ≤ max_queue] --limiter--> worker --> run_task --> handler
//! ```
//!
//! - Tasks and results move by value; workers share nothing with callers.
//! - Every accepted task yields exactly one [`TaskOutcome`]: a result, an
//!   error, `Panicked`, or `Cancelled` at shutdown.
//! - Outcomes arrive in completion order; key them by `file_name`.

pub mod limiter;
pub mod process;
pub mod task;

use std::collections::VecDeque;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use rustc_hash::FxHashMap;
use thiserror::Error;

use limiter::FixedWindow;
pub use process::{Processor, ProcessorRegistry};
pub use task::{Report, TaskId, TaskOutcome, WorkerError, WorkerResult, WorkerTask};

/// Receives every task outcome, on whichever thread produced it.
pub type ResultHandler = Arc<dyn Fn(TaskOutcome) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    #[error("worker queue full ({0} tasks waiting)")]
    Overloaded(usize),
    #[error("worker pool is shutting down")]
    ShuttingDown,
}

#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Worker threads
    pub size: usize,
    /// Dispatches allowed per `rate_window`
    pub rate_limit: u32,
    pub rate_window: Duration,
    /// Queued (not yet dispatched) tasks beyond which `submit` fails
    pub max_queue: usize,
    /// How long shutdown waits for in-flight tasks
    pub grace: Duration,
    /// Time each task and log it
    pub time_tasks: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            size: 2,
            rate_limit: 50,
            rate_window: Duration::from_secs(1),
            max_queue: 64,
            grace: Duration::from_millis(2000),
            time_tasks: false,
        }
    }
}

struct Job {
    id: TaskId,
    task: WorkerTask,
}

struct Queue {
    jobs: VecDeque<Job>,
    limiter: FixedWindow,
}

struct Shared {
    queue: Mutex<Queue>,
    notify: Condvar,
    shutdown: AtomicBool,
    /// Dispatched tasks whose outcome is not yet delivered
    in_flight: Mutex<FxHashMap<TaskId, String>>,
    registry: ProcessorRegistry,
    handler: ResultHandler,
    time_tasks: bool,
}

pub struct WorkerPool {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    next_id: AtomicU64,
    max_queue: usize,
    grace: Duration,
}

impl WorkerPool {
    /// Start `config.size` workers.
    pub fn new(config: PoolConfig, registry: ProcessorRegistry, handler: ResultHandler) -> Self {
        let shared = Arc::new(Shared {
            queue: Mutex::new(Queue {
                jobs: VecDeque::new(),
                limiter: FixedWindow::new(config.rate_limit, config.rate_window),
            }),
            notify: Condvar::new(),
            shutdown: AtomicBool::new(false),
            in_flight: Mutex::new(FxHashMap::default()),
            registry,
            handler,
            time_tasks: config.time_tasks,
        });

        let workers = (0..config.size.max(1))
            .filter_map(|i| {
                let shared = Arc::clone(&shared);
                std::thread::Builder::new()
                    .name(format!("relive-worker-{i}"))
                    .spawn(move || shared.run_worker())
                    .map_err(|e| crate::log!("pool"; "failed to spawn worker {}: {}", i, e))
                    .ok()
            })
            .collect();

        Self {
            shared,
            workers: Mutex::new(workers),
            next_id: AtomicU64::new(1),
            max_queue: config.max_queue,
            grace: config.grace,
        }
    }

    /// Queue a task. Fails when the queue is full or the pool is stopping.
    pub fn submit(&self, task: WorkerTask) -> Result<TaskId, PoolError> {
        let mut queue = self.shared.queue.lock();
        if self.shared.is_shutdown() {
            return Err(PoolError::ShuttingDown);
        }
        if queue.jobs.len() >= self.max_queue {
            return Err(PoolError::Overloaded(queue.jobs.len()));
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        crate::debug!("pool"; "queued #{} {}", id, task.file_name);
        queue.jobs.push_back(Job { id, task });
        drop(queue);
        self.shared.notify.notify_one();
        Ok(id)
    }

    pub fn queued(&self) -> usize {
        self.shared.queue.lock().jobs.len()
    }

    pub fn in_flight(&self) -> usize {
        self.shared.in_flight.lock().len()
    }

    /// Stop accepting tasks, cancel queued ones, give in-flight tasks the
    /// grace period, then cancel whatever is still running. Idempotent.
    pub fn shutdown(&self) {
        if self.shared.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }

        let queued: Vec<Job> = self.shared.queue.lock().jobs.drain(..).collect();
        self.shared.notify.notify_all();
        for job in queued {
            (self.shared.handler)(TaskOutcome {
                id: job.id,
                file_name: job.task.file_name,
                result: Err(WorkerError::Cancelled),
            });
        }

        let deadline = Instant::now() + self.grace;
        let mut workers = std::mem::take(&mut *self.workers.lock());
        while !workers.is_empty() && Instant::now() < deadline {
            workers.retain(|w| !w.is_finished());
            std::thread::sleep(Duration::from_millis(5));
        }

        let stuck: Vec<_> = self.shared.in_flight.lock().drain().collect();
        for (id, file_name) in stuck {
            crate::debug!("pool"; "cancelled #{} {} after grace period", id, file_name);
            (self.shared.handler)(TaskOutcome {
                id,
                file_name,
                result: Err(WorkerError::Cancelled),
            });
        }

        if !workers.is_empty() {
            crate::debug!("pool"; "{} workers detached", workers.len());
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Shared {
    fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    fn run_worker(&self) {
        while let Some(job) = self.next_job() {
            let started = Instant::now();
            let result = catch_unwind(AssertUnwindSafe(|| {
                process::run_task(&self.registry, &job.task)
            }))
            .unwrap_or(Err(WorkerError::Panicked));

            let result = result.map(|mut r| {
                if self.time_tasks {
                    r.time = true;
                    crate::debug!("pool"; "{} processed in {:?}", r.file_name, started.elapsed());
                }
                r
            });

            self.deliver(job.id, job.task.file_name, result);
        }
    }

    /// Next job once the limiter allows it; `None` on shutdown.
    fn next_job(&self) -> Option<Job> {
        let mut queue = self.queue.lock();
        loop {
            if self.is_shutdown() {
                return None;
            }
            if queue.jobs.is_empty() {
                self.notify.wait(&mut queue);
                continue;
            }
            match queue.limiter.try_acquire(Instant::now()) {
                Ok(()) => {
                    let job = queue.jobs.pop_front()?;
                    self.in_flight.lock().insert(job.id, job.task.file_name.clone());
                    return Some(job);
                }
                Err(wait) => {
                    self.notify.wait_for(&mut queue, wait);
                }
            }
        }
    }

    /// Hand an outcome to the handler unless shutdown already cancelled it.
    fn deliver(&self, id: TaskId, file_name: String, result: Result<WorkerResult, WorkerError>) {
        if self.in_flight.lock().remove(&id).is_some() {
            (self.handler)(TaskOutcome {
                id,
                file_name,
                result,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel::{self, Receiver, Sender};

    /// Blocks until released, then renders the text.
    struct Gate(Receiver<()>);

    impl Processor for Gate {
        fn render(&self, task: &WorkerTask) -> Result<String, WorkerError> {
            let _ = self.0.recv();
            Ok(task.text.clone())
        }
    }

    /// Records when each task started.
    struct Clock(Arc<Mutex<Vec<Instant>>>);

    impl Processor for Clock {
        fn render(&self, task: &WorkerTask) -> Result<String, WorkerError> {
            self.0.lock().push(Instant::now());
            Ok(task.text.clone())
        }
    }

    struct Boom;

    impl Processor for Boom {
        fn render(&self, _: &WorkerTask) -> Result<String, WorkerError> {
            panic!("boom");
        }
    }

    fn collector() -> (ResultHandler, Receiver<TaskOutcome>) {
        let (tx, rx): (Sender<TaskOutcome>, _) = channel::unbounded();
        let handler: ResultHandler = Arc::new(move |outcome| {
            let _ = tx.send(outcome);
        });
        (handler, rx)
    }

    fn recv(rx: &Receiver<TaskOutcome>) -> TaskOutcome {
        rx.recv_timeout(Duration::from_secs(5)).expect("outcome")
    }

    fn page(body: &str) -> String {
        format!("<html><body>{body}</body></html>")
    }

    #[test]
    fn test_results_keyed_by_file() {
        let (handler, rx) = collector();
        let pool = WorkerPool::new(
            PoolConfig::default(),
            ProcessorRegistry::with_defaults(None),
            handler,
        );
        let a = pool.submit(WorkerTask::new("a.html", page("<p>a</p>"))).unwrap();
        let b = pool.submit(WorkerTask::new("b.html", page("<p>b</p>"))).unwrap();
        assert_ne!(a, b);

        let mut outcomes = vec![recv(&rx), recv(&rx)];
        outcomes.sort_by(|x, y| x.file_name.cmp(&y.file_name));
        assert_eq!(outcomes[0].id, a);
        assert_eq!(outcomes[0].result.as_ref().unwrap().body, "<p>a</p>");
        assert_eq!(outcomes[1].result.as_ref().unwrap().body, "<p>b</p>");
    }

    #[test]
    fn test_overloaded_when_queue_full() {
        let (release, gate) = channel::unbounded();
        let mut registry = ProcessorRegistry::default();
        registry.register("html", Arc::new(Gate(gate)));
        let (handler, rx) = collector();
        let pool = WorkerPool::new(
            PoolConfig {
                size: 1,
                max_queue: 2,
                ..PoolConfig::default()
            },
            registry,
            handler,
        );

        pool.submit(WorkerTask::new("0.html", page(""))).unwrap();
        while pool.in_flight() == 0 {
            std::thread::sleep(Duration::from_millis(1));
        }
        pool.submit(WorkerTask::new("1.html", page(""))).unwrap();
        pool.submit(WorkerTask::new("2.html", page(""))).unwrap();
        assert_eq!(
            pool.submit(WorkerTask::new("3.html", page(""))),
            Err(PoolError::Overloaded(2))
        );

        for _ in 0..3 {
            release.send(()).unwrap();
        }
        for _ in 0..3 {
            assert!(recv(&rx).result.is_ok());
        }
    }

    #[test]
    fn test_rate_limit_defers_excess() {
        let starts = Arc::new(Mutex::new(Vec::new()));
        let mut registry = ProcessorRegistry::default();
        registry.register("html", Arc::new(Clock(Arc::clone(&starts))));
        let (handler, rx) = collector();
        let window = Duration::from_millis(500);
        let pool = WorkerPool::new(
            PoolConfig {
                size: 4,
                rate_limit: 3,
                rate_window: window,
                ..PoolConfig::default()
            },
            registry,
            handler,
        );

        let t0 = Instant::now();
        for i in 0..7 {
            pool.submit(WorkerTask::new(format!("{i}.html"), page(""))).unwrap();
        }
        for _ in 0..7 {
            assert!(recv(&rx).result.is_ok());
        }

        let starts = starts.lock();
        assert_eq!(starts.len(), 7);
        let first_window = starts.iter().filter(|t| **t < t0 + window).count();
        assert_eq!(first_window, 3);
    }

    #[test]
    fn test_panicking_task_reports_once() {
        let mut registry = ProcessorRegistry::default();
        registry.register("html", Arc::new(Boom));
        let (handler, rx) = collector();
        let pool = WorkerPool::new(PoolConfig::default(), registry, handler);

        pool.submit(WorkerTask::new("x.html", "")).unwrap();
        assert_eq!(recv(&rx).result.unwrap_err(), WorkerError::Panicked);
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());

        // Worker survives the panic
        pool.submit(WorkerTask::new("y.html", "")).unwrap();
        assert_eq!(recv(&rx).result.unwrap_err(), WorkerError::Panicked);
    }

    #[test]
    fn test_shutdown_cancels_queued_and_stuck_tasks_once() {
        let (release, gate) = channel::unbounded();
        let mut registry = ProcessorRegistry::default();
        registry.register("html", Arc::new(Gate(gate)));
        let (handler, rx) = collector();
        let pool = WorkerPool::new(
            PoolConfig {
                size: 1,
                grace: Duration::from_millis(50),
                ..PoolConfig::default()
            },
            registry,
            handler,
        );

        let running = pool.submit(WorkerTask::new("run.html", page(""))).unwrap();
        while pool.in_flight() == 0 {
            std::thread::sleep(Duration::from_millis(1));
        }
        let queued = pool.submit(WorkerTask::new("wait.html", page(""))).unwrap();

        pool.shutdown();
        let mut cancelled: Vec<_> = [recv(&rx), recv(&rx)]
            .into_iter()
            .map(|o| {
                assert_eq!(o.result.unwrap_err(), WorkerError::Cancelled);
                o.id
            })
            .collect();
        cancelled.sort_unstable();
        assert_eq!(cancelled, vec![running, queued]);

        assert_eq!(
            pool.submit(WorkerTask::new("late.html", page(""))),
            Err(PoolError::ShuttingDown)
        );

        // The stuck worker finishing later must not deliver again
        release.send(()).unwrap();
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
    }

    #[test]
    fn test_timed_tasks_flagged() {
        let (handler, rx) = collector();
        let pool = WorkerPool::new(
            PoolConfig {
                time_tasks: true,
                ..PoolConfig::default()
            },
            ProcessorRegistry::with_defaults(None),
            handler,
        );
        pool.submit(WorkerTask::new("a.html", page("x"))).unwrap();
        assert!(recv(&rx).result.unwrap().time);
    }
}
