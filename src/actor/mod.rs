//! Actor System for Live Reload
//!
//! Message-passing concurrency for serve mode:
//!
//! ```text
//! FsActor --> Dispatcher --> WsActor --> browsers
//! (watch)        |  ^       (sessions)
//!                v  |
//!             WorkerPool
//!          (validate, extract)
//! ```
//!
//! # Module Structure
//!
//! - `messages` - Message types for inter-actor communication
//! - `fs` - File system watcher with debouncing
//! - `dispatch` - Change intents to session commands
//! - `ws` - Session registry and socket I/O
//! - `coordinator` - Wires up, runs and tears down actors

pub mod coordinator;
pub mod dispatch;
pub mod fs;
pub mod messages;
pub mod ws;

pub use coordinator::Coordinator;
