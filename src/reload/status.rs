//! Status endpoint and editor hooks.
//!
//! Browsers poll `GET /relive/status` before opening the socket and again
//! while reconnecting; `{"status":"online"}` means sockets are accepted.
//!
//! Editor integrations post to the same server:
//!
//! | Request                  | Body                                   | Effect                      |
//! |--------------------------|----------------------------------------|-----------------------------|
//! | `POST /relive/editor`    | `{fileName, text, cursor?}`            | hot-body an unsaved buffer  |
//! | `POST /relive/navigate`  | `{url}`                                | point every session at `url`|
//!
//! Everything else is 404: static files are served elsewhere.

use std::io::Cursor;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::thread::JoinHandle;

use anyhow::{Context, Result};
use serde::Deserialize;
use tiny_http::{Header, Method, Request, Response, Server};
use tokio::sync::mpsc;

use super::message::CursorPosition;
use crate::actor::messages::DispatchMsg;

pub const STATUS_PATH: &str = "/relive/status";
pub const EDITOR_PATH: &str = "/relive/editor";
pub const NAVIGATE_PATH: &str = "/relive/navigate";

const ONLINE: &str = r#"{"status":"online"}"#;

/// Body of `POST /relive/editor`
#[derive(Debug, Deserialize)]
struct EditorBuffer {
    #[serde(alias = "fileName")]
    file_name: String,
    text: String,
    #[serde(default)]
    cursor: Option<CursorPosition>,
}

/// Body of `POST /relive/navigate`
#[derive(Debug, Deserialize)]
struct Navigate {
    url: String,
}

/// Running status server
pub struct StatusServer {
    server: Arc<Server>,
    addr: SocketAddr,
    handle: Option<JoinHandle<()>>,
}

impl StatusServer {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Shared handle, for unblocking from a signal handler
    pub fn server(&self) -> Arc<Server> {
        Arc::clone(&self.server)
    }

    /// Unblock the request loop and join it. Idempotent.
    pub fn stop(&mut self) {
        self.server.unblock();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for StatusServer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Serve on `host:port`, forwarding editor requests to `dispatch_tx`.
pub fn start_status_server(
    host: IpAddr,
    port: u16,
    dispatch_tx: mpsc::Sender<DispatchMsg>,
) -> Result<StatusServer> {
    let server = Server::http(SocketAddr::new(host, port))
        .map_err(|e| anyhow::anyhow!("failed to bind status server on {host}:{port}: {e}"))?;
    let addr = server
        .server_addr()
        .to_ip()
        .context("status server bound to a non-IP address")?;
    let server = Arc::new(server);

    let worker = Arc::clone(&server);
    let handle = std::thread::Builder::new()
        .name("relive-status".into())
        .spawn(move || {
            for request in worker.incoming_requests() {
                respond(request, &dispatch_tx);
            }
        })
        .context("failed to spawn status thread")?;

    Ok(StatusServer {
        server,
        addr,
        handle: Some(handle),
    })
}

fn respond(mut request: Request, dispatch_tx: &mpsc::Sender<DispatchMsg>) {
    let method = request.method().clone();
    let path = request.url().split('?').next().unwrap_or_default().to_string();
    let response = match (&method, path.as_str()) {
        (Method::Get, STATUS_PATH) => json(200, ONLINE),
        (Method::Post, EDITOR_PATH) => {
            match serde_json::from_reader::<_, EditorBuffer>(request.as_reader()) {
                Ok(buffer) => forward(
                    dispatch_tx,
                    DispatchMsg::EditorBuffer {
                        file_name: buffer.file_name,
                        text: buffer.text,
                        cursor: buffer.cursor,
                    },
                ),
                Err(e) => json(400, &error_body(&e.to_string())),
            }
        }
        (Method::Post, NAVIGATE_PATH) => {
            match serde_json::from_reader::<_, Navigate>(request.as_reader()) {
                Ok(Navigate { url }) => forward(dispatch_tx, DispatchMsg::Navigate { url }),
                Err(e) => json(400, &error_body(&e.to_string())),
            }
        }
        _ => {
            crate::debug!("status"; "404 {} {}", method, request.url());
            Response::from_string("").with_status_code(404)
        }
    };

    if let Err(e) = request.respond(response) {
        crate::debug!("status"; "response failed: {}", e);
    }
}

fn forward(dispatch_tx: &mpsc::Sender<DispatchMsg>, msg: DispatchMsg) -> Response<Cursor<Vec<u8>>> {
    match dispatch_tx.blocking_send(msg) {
        Ok(()) => json(202, r#"{"accepted":true}"#),
        Err(_) => json(503, &error_body("dispatcher stopped")),
    }
}

fn error_body(message: &str) -> String {
    serde_json::json!({ "error": message }).to_string()
}

fn json(status: u16, body: &str) -> Response<Cursor<Vec<u8>>> {
    let mut response = Response::from_string(body).with_status_code(status);
    for (name, value) in [
        ("Content-Type", "application/json"),
        ("Access-Control-Allow-Origin", "*"),
        ("Cache-Control", "no-store"),
    ] {
        if let Ok(header) = Header::from_bytes(name, value) {
            response.add_header(header);
        }
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::{Ipv4Addr, TcpStream};

    fn request(addr: SocketAddr, method: &str, path: &str, body: &str) -> String {
        let mut stream = TcpStream::connect(addr).unwrap();
        write!(
            stream,
            "{method} {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\nContent-Length: {}\r\n\r\n{body}",
            body.len()
        )
        .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).unwrap();
        response
    }

    fn start() -> (StatusServer, mpsc::Receiver<DispatchMsg>) {
        let (tx, rx) = mpsc::channel(4);
        let server = start_status_server(IpAddr::V4(Ipv4Addr::LOCALHOST), 0, tx).unwrap();
        (server, rx)
    }

    #[test]
    fn test_status_online() {
        let (mut server, _rx) = start();

        let response = request(server.addr(), "GET", STATUS_PATH, "");
        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.contains("application/json"));
        assert!(response.ends_with(ONLINE));

        let response = request(server.addr(), "GET", "/relive/status?t=1", "");
        assert!(response.starts_with("HTTP/1.1 200"));

        server.stop();
    }

    #[test]
    fn test_other_requests_404() {
        let (server, _rx) = start();
        assert!(request(server.addr(), "GET", "/index.html", "").starts_with("HTTP/1.1 404"));
        assert!(request(server.addr(), "POST", STATUS_PATH, "").starts_with("HTTP/1.1 404"));
        assert!(request(server.addr(), "GET", EDITOR_PATH, "").starts_with("HTTP/1.1 404"));
    }

    #[test]
    fn test_editor_buffer_forwarded() {
        let (server, mut rx) = start();
        let body = r#"{"fileName":"index.html","text":"<p>x</p>","cursor":{"line":0,"character":3}}"#;
        let response = request(server.addr(), "POST", EDITOR_PATH, body);
        assert!(response.starts_with("HTTP/1.1 202"), "{response}");

        match rx.blocking_recv() {
            Some(DispatchMsg::EditorBuffer {
                file_name,
                text,
                cursor,
            }) => {
                assert_eq!(file_name, "index.html");
                assert_eq!(text, "<p>x</p>");
                assert_eq!(
                    cursor,
                    Some(CursorPosition {
                        line: 0,
                        character: 3
                    })
                );
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_navigate_forwarded() {
        let (server, mut rx) = start();
        let response = request(server.addr(), "POST", NAVIGATE_PATH, r#"{"url":"/about.html"}"#);
        assert!(response.starts_with("HTTP/1.1 202"));
        assert!(matches!(
            rx.blocking_recv(),
            Some(DispatchMsg::Navigate { url }) if url == "/about.html"
        ));
    }

    #[test]
    fn test_bad_body_rejected() {
        let (server, mut rx) = start();
        let response = request(server.addr(), "POST", EDITOR_PATH, r#"{"text":1}"#);
        assert!(response.starts_with("HTTP/1.1 400"));
        assert!(response.contains("error"));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_stopped_dispatcher_is_503() {
        let (server, rx) = start();
        drop(rx);
        let response = request(server.addr(), "POST", NAVIGATE_PATH, r#"{"url":"/"}"#);
        assert!(response.starts_with("HTTP/1.1 503"));
    }
}
