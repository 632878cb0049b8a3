//! Process-wide state shared across the codebase.

mod state;

pub use state::{register_server, request_shutdown, setup_shutdown_handler};
