//! Reload Module
//!
//! Protocol and classification logic for live reload, plus the two
//! listeners browsers talk to.
//!
//! # Architecture
//!
//! ```text
//! change --classify--> UpdateIntent --Dispatcher--> ServerMessage --socket--> Browser
//!                                                                  <--status check--
//! ```
//!
//! # Modules
//!
//! - `classify` - Change event to update intent (pure)
//! - `message` - Wire frames in both directions
//! - `server` - WebSocket listener handing sessions to the actor system
//! - `status` - HTTP status endpoint and editor hooks

pub mod classify;
pub mod message;
pub mod server;
pub mod status;
