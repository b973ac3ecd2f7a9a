// src/reload/server.rs

//! Development HTTP server.
//!
//! Serves the asset tree over plain HTTP/1.1, injects a small client script
//! into HTML pages and streams reload messages to browsers as Server-Sent
//! Events on [`EVENTS_PATH`].

use std::net::SocketAddr;
use std::path::{Component, Path, PathBuf};

use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::types::ReloadKind;
use crate::watch::path_utils::url_path;

use super::{ReloadMessage, ReloadNotifier};

pub const EVENTS_PATH: &str = "/__assetwatch/events";
pub const CLIENT_PATH: &str = "/__assetwatch/client.js";

const CLIENT_SCRIPT: &str = r#"(function () {
  var source = new EventSource("/__assetwatch/events");
  source.addEventListener("reload", function (e) {
    var msg = JSON.parse(e.data);
    if (msg.kind !== "inject") { location.reload(); return; }
    var links = document.querySelectorAll('link[rel="stylesheet"]');
    for (var i = 0; i < links.length; i++) {
      var href = links[i].href.replace(/[?&]assetwatch=\d+/, "");
      links[i].href = href + (href.indexOf("?") < 0 ? "?" : "&") + "assetwatch=" + Date.now();
    }
  });
})();
"#;

const CLIENT_TAG: &str = r#"<script src="/__assetwatch/client.js"></script>"#;

/// Longest request head accepted.
const MAX_HEAD_BYTES: usize = 16 * 1024;

/// Payload of one SSE `reload` event.
#[derive(Debug, Serialize)]
struct ClientMessage {
    kind: ReloadKind,
    paths: Vec<String>,
}

pub struct DevServer {
    listener: TcpListener,
    serve_dir: PathBuf,
    notifier: ReloadNotifier,
    shutdown_tx: broadcast::Sender<()>,
}

impl std::fmt::Debug for DevServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DevServer")
            .field("addr", &self.listener.local_addr().ok())
            .field("serve_dir", &self.serve_dir)
            .finish_non_exhaustive()
    }
}

/// Handle to signal server shutdown.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: broadcast::Sender<()>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        let _ = self.tx.send(());
    }
}

impl DevServer {
    /// Bind to `host:port` (`port = 0` picks a free port).
    pub async fn bind(
        host: &str,
        port: u16,
        serve_dir: impl Into<PathBuf>,
        notifier: ReloadNotifier,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind((host, port)).await?;
        let (shutdown_tx, _) = broadcast::channel(1);
        Ok(Self {
            listener,
            serve_dir: serve_dir.into(),
            notifier,
            shutdown_tx,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: self.shutdown_tx.clone(),
        }
    }

    /// Run the accept loop on a background task.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(self) {
        match self.listener.local_addr() {
            Ok(addr) => info!("dev server listening on http://{addr}"),
            Err(e) => warn!(error = %e, "dev server address unavailable"),
        }

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            let serve_dir = self.serve_dir.clone();
                            let notifier = self.notifier.clone();
                            let shutdown = self.shutdown_tx.subscribe();
                            tokio::spawn(async move {
                                if let Err(e) = handle_connection(stream, &serve_dir, notifier, shutdown).await {
                                    debug!(%peer, error = %e, "connection closed with error");
                                }
                            });
                        }
                        Err(e) => {
                            error!("accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("dev server shutting down");
                    break;
                }
            }
        }
    }
}

#[derive(Debug)]
struct Request {
    method: String,
    path: String,
}

async fn read_request(stream: &mut BufReader<TcpStream>) -> std::io::Result<Option<Request>> {
    let mut budget = MAX_HEAD_BYTES;
    let mut request_line = String::new();
    if read_head_line(stream, &mut request_line, &mut budget).await? == 0 {
        return Ok(None);
    }

    loop {
        let mut header = String::new();
        let n = read_head_line(stream, &mut header, &mut budget).await?;
        if n == 0 || header.trim().is_empty() {
            break;
        }
    }

    let mut parts = request_line.split_whitespace();
    let (Some(method), Some(target)) = (parts.next(), parts.next()) else {
        return Ok(None);
    };
    let path = target.split(['?', '#']).next().unwrap_or("/");
    Ok(Some(Request {
        method: method.to_string(),
        path: percent_decode(path),
    }))
}

/// Reads one line of the request head, never buffering more than the
/// remaining `budget` bytes.
async fn read_head_line(
    stream: &mut BufReader<TcpStream>,
    line: &mut String,
    budget: &mut usize,
) -> std::io::Result<usize> {
    let too_large = || std::io::Error::new(std::io::ErrorKind::InvalidData, "request head too large");
    if *budget == 0 {
        return Err(too_large());
    }
    let n = (&mut *stream).take(*budget as u64).read_line(line).await?;
    if n == *budget && !line.ends_with('\n') {
        return Err(too_large());
    }
    *budget -= n;
    Ok(n)
}

async fn handle_connection(
    stream: TcpStream,
    serve_dir: &Path,
    notifier: ReloadNotifier,
    shutdown: broadcast::Receiver<()>,
) -> std::io::Result<()> {
    let mut stream = BufReader::new(stream);
    let Some(request) = read_request(&mut stream).await? else {
        return Ok(());
    };
    let mut stream = stream.into_inner();

    debug!(method = %request.method, path = %request.path, "request");

    if request.method != "GET" && request.method != "HEAD" {
        return respond(&mut stream, "405 Method Not Allowed", "text/plain", b"method not allowed", true).await;
    }
    let with_body = request.method == "GET";

    match request.path.as_str() {
        EVENTS_PATH => stream_events(stream, serve_dir, notifier, shutdown).await,
        CLIENT_PATH => {
            respond(&mut stream, "200 OK", "application/javascript", CLIENT_SCRIPT.as_bytes(), with_body).await
        }
        path => serve_file(&mut stream, serve_dir, path, with_body).await,
    }
}

async fn serve_file<W: AsyncWrite + Unpin>(
    stream: &mut W,
    serve_dir: &Path,
    url: &str,
    with_body: bool,
) -> std::io::Result<()> {
    let Some(mut path) = resolve_url(serve_dir, url) else {
        return respond(stream, "403 Forbidden", "text/plain", b"forbidden", with_body).await;
    };
    if tokio::fs::metadata(&path).await.map(|m| m.is_dir()).unwrap_or(false) {
        path.push("index.html");
    }

    let body = match tokio::fs::read(&path).await {
        Ok(body) => body,
        Err(_) => return respond(stream, "404 Not Found", "text/plain", b"not found", with_body).await,
    };

    let content_type = content_type(&path);
    if content_type.starts_with("text/html") {
        let page = inject_client(&String::from_utf8_lossy(&body));
        respond(stream, "200 OK", content_type, page.as_bytes(), with_body).await
    } else {
        respond(stream, "200 OK", content_type, &body, with_body).await
    }
}

async fn stream_events(
    mut stream: TcpStream,
    serve_dir: &Path,
    notifier: ReloadNotifier,
    mut shutdown: broadcast::Receiver<()>,
) -> std::io::Result<()> {
    let mut messages = notifier.subscribe();

    stream
        .write_all(
            b"HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nCache-Control: no-cache\r\nConnection: keep-alive\r\n\r\n: connected\n\n",
        )
        .await?;
    stream.flush().await?;
    debug!("reload client connected");

    loop {
        tokio::select! {
            msg = messages.recv() => match msg {
                Ok(msg) => {
                    let frame = sse_frame(serve_dir, &msg)?;
                    stream.write_all(frame.as_bytes()).await?;
                    stream.flush().await?;
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "reload client lagging; messages dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = shutdown.recv() => break,
        }
    }

    debug!("reload client disconnected");
    Ok(())
}

fn sse_frame(serve_dir: &Path, msg: &ReloadMessage) -> std::io::Result<String> {
    let payload = ClientMessage {
        kind: msg.kind,
        paths: msg
            .paths
            .iter()
            .filter_map(|p| url_path(serve_dir, p))
            .collect(),
    };
    let json = serde_json::to_string(&payload)?;
    Ok(format!("event: reload\ndata: {json}\n\n"))
}

async fn respond<W: AsyncWrite + Unpin>(
    stream: &mut W,
    status: &str,
    content_type: &str,
    body: &[u8],
    with_body: bool,
) -> std::io::Result<()> {
    let head = format!(
        "HTTP/1.1 {status}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nCache-Control: no-cache\r\nConnection: close\r\n\r\n",
        body.len()
    );
    stream.write_all(head.as_bytes()).await?;
    if with_body {
        stream.write_all(body).await?;
    }
    stream.flush().await
}

/// Map a URL path onto `serve_dir`, refusing anything that escapes it.
fn resolve_url(serve_dir: &Path, url: &str) -> Option<PathBuf> {
    let mut path = serve_dir.to_path_buf();
    for component in Path::new(url.trim_start_matches('/')).components() {
        match component {
            Component::Normal(part) => path.push(part),
            Component::CurDir => {}
            _ => return None,
        }
    }
    Some(path)
}

/// Insert the client script tag before `</body>`, or append it.
pub fn inject_client(html: &str) -> String {
    let lower = html.to_ascii_lowercase();
    match lower.rfind("</body>") {
        Some(idx) => format!("{}{CLIENT_TAG}{}", &html[..idx], &html[idx..]),
        None => format!("{html}{CLIENT_TAG}"),
    }
}

fn content_type(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()).unwrap_or_default() {
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" | "mjs" => "application/javascript",
        "json" | "map" => "application/json",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "ico" => "image/x-icon",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "txt" => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}

fn percent_decode(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(byte) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
