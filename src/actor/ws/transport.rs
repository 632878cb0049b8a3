//! Socket abstraction the registry talks to.
//!
//! The production transport is a non-blocking `tungstenite` socket; tests
//! substitute an in-memory one.

use std::io::ErrorKind;
use std::net::TcpStream;

use thiserror::Error;
use tungstenite::WebSocket;
use tungstenite::protocol::Message;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection closed")]
    Closed,
    #[error(transparent)]
    WebSocket(#[from] tungstenite::Error),
}

/// One inbound event from a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Text(String),
    Close,
}

pub trait Transport: Send {
    fn send(&mut self, frame: &str) -> Result<(), TransportError>;

    /// Next inbound event without blocking; `Ok(None)` when nothing is ready.
    fn poll(&mut self) -> Result<Option<Inbound>, TransportError>;

    fn close(&mut self);
}

impl Transport for WebSocket<TcpStream> {
    fn send(&mut self, frame: &str) -> Result<(), TransportError> {
        match WebSocket::send(self, Message::Text(frame.into())) {
            Ok(()) => Ok(()),
            // Buffered; flushed by a later write
            Err(tungstenite::Error::Io(ref e)) if e.kind() == ErrorKind::WouldBlock => Ok(()),
            Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                Err(TransportError::Closed)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn poll(&mut self) -> Result<Option<Inbound>, TransportError> {
        match self.read() {
            Ok(Message::Text(text)) => Ok(Some(Inbound::Text(text.as_str().to_owned()))),
            Ok(Message::Close(_)) => Ok(Some(Inbound::Close)),
            // Ping/pong and binary frames carry nothing for us
            Ok(_) => Ok(None),
            Err(tungstenite::Error::Io(ref e)) if e.kind() == ErrorKind::WouldBlock => Ok(None),
            Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                Err(TransportError::Closed)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn close(&mut self) {
        let _ = WebSocket::close(self, None);
        let _ = self.flush();
    }
}
