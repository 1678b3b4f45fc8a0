//! Static dev server with live reload.
//!
//! ```text
//! GET /__livereload      websocket: {"type":"connected"|"reload"|"css"}
//! GET /__livereload.js   client runtime
//! GET /*                 files from the output root; HTML gets the client injected
//! ```

use crate::reload::ReloadHub;
use axum::{
    body::{to_bytes, Body},
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Request, State,
    },
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceExt;
use tower_http::services::ServeDir;
use tracing::{debug, warn};

/// Websocket endpoint.
pub const LIVERELOAD_PATH: &str = "/__livereload";
/// Client runtime endpoint.
pub const CLIENT_PATH: &str = "/__livereload.js";

/// Largest HTML page the server will rewrite.
const MAX_HTML_BYTES: usize = 16 * 1024 * 1024;

const CONNECTED_JSON: &str = r#"{"type":"connected"}"#;

/// Tag injected into every served HTML page.
#[must_use]
pub fn client_tag() -> String {
    format!(r#"<script src="{CLIENT_PATH}" async></script>"#)
}

/// Insert the client tag before `</body>`, or append it.
#[must_use]
pub fn inject_client(html: &str) -> String {
    let tag = client_tag();
    if html.contains(&tag) {
        return html.to_string();
    }
    // ASCII lowercasing keeps byte offsets.
    match html.to_ascii_lowercase().rfind("</body>") {
        Some(pos) => {
            let mut out = String::with_capacity(html.len() + tag.len());
            out.push_str(&html[..pos]);
            out.push_str(&tag);
            out.push_str(&html[pos..]);
            out
        }
        None => format!("{html}{tag}"),
    }
}

struct ServerState {
    root: PathBuf,
    hub: ReloadHub,
    notify: bool,
}

/// Serves the output directory and pushes reload events to browsers.
#[derive(Clone)]
pub struct DevServer {
    state: Arc<ServerState>,
}

impl DevServer {
    /// `root` is the directory served; `notify` enables the in-page banner.
    #[must_use]
    pub fn new(root: &Path, hub: ReloadHub, notify: bool) -> Self {
        Self {
            state: Arc::new(ServerState {
                root: root.to_path_buf(),
                hub,
                notify,
            }),
        }
    }

    #[must_use]
    pub fn router(&self) -> Router {
        Router::new()
            .route(LIVERELOAD_PATH, get(livereload_websocket))
            .route(CLIENT_PATH, get(serve_client))
            .fallback(serve_static)
            .with_state(self.state.clone())
    }

    /// Bind the listening socket. `localhost` binds the IPv4 loopback.
    pub async fn bind(host: &str, port: u16) -> Result<TcpListener, ServerError> {
        let host_ip = if host == "localhost" { "127.0.0.1" } else { host };
        let addr: SocketAddr = format!("{host_ip}:{port}")
            .parse()
            .map_err(|_| ServerError::InvalidAddress(format!("{host}:{port}")))?;
        TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind(addr, e.to_string()))
    }

    /// Serve until the process ends.
    pub async fn serve(self, listener: TcpListener) -> Result<(), ServerError> {
        axum::serve(listener, self.router())
            .await
            .map_err(|e| ServerError::Serve(e.to_string()))
    }
}

async fn serve_client(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    let runtime = CLIENT_RUNTIME.replace("__NOTIFY__", if state.notify { "true" } else { "false" });
    (
        [
            (header::CONTENT_TYPE, "application/javascript"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        runtime,
    )
}

async fn serve_static(State(state): State<Arc<ServerState>>, req: Request) -> Response {
    let served = ServeDir::new(&state.root)
        .append_index_html_on_directories(true)
        .oneshot(req)
        .await;
    let response = match served {
        Ok(response) => response,
        Err(never) => match never {},
    };

    let is_html = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("text/html"));
    if response.status() != StatusCode::OK || !is_html {
        return response.map(Body::new);
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match to_bytes(Body::new(body), MAX_HTML_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(error = %e, "Failed to read HTML for injection");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let html = inject_client(&String::from_utf8_lossy(&bytes));
    parts.headers.remove(header::CONTENT_LENGTH);
    parts
        .headers
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    Response::from_parts(parts, Body::from(html))
}

async fn livereload_websocket(
    ws: WebSocketUpgrade,
    State(state): State<Arc<ServerState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: Arc<ServerState>) {
    let mut rx = state.hub.subscribe();
    debug!("Live-reload client connected");

    if socket
        .send(Message::Text(CONNECTED_JSON.to_string()))
        .await
        .is_err()
    {
        return;
    }

    loop {
        tokio::select! {
            Ok(event) = rx.recv() => {
                if socket.send(Message::Text(event.to_json().to_string())).await.is_err() {
                    break;
                }
            }
            msg = socket.recv() => {
                // The client never sends anything meaningful; only watch for close.
                match msg {
                    Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
            else => break,
        }
    }

    debug!("Live-reload client disconnected");
}

/// Open `url` in the system browser.
pub fn open_browser(url: &str) -> std::io::Result<()> {
    #[cfg(target_os = "macos")]
    {
        std::process::Command::new("open").arg(url).spawn()?;
    }
    #[cfg(target_os = "linux")]
    {
        std::process::Command::new("xdg-open").arg(url).spawn()?;
    }
    #[cfg(target_os = "windows")]
    {
        std::process::Command::new("cmd")
            .args(["/C", "start", url])
            .spawn()?;
    }
    Ok(())
}

/// Dev server error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerError {
    InvalidAddress(String),
    Bind(SocketAddr, String),
    Serve(String),
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidAddress(addr) => write!(f, "Invalid server address: {addr}"),
            Self::Bind(addr, msg) => write!(f, "Failed to bind {addr}: {msg}"),
            Self::Serve(msg) => write!(f, "Dev server failed: {msg}"),
        }
    }
}

impl std::error::Error for ServerError {}

/// Browser side of live reload.
///
/// - `reload` reloads the page
/// - `css` re-fetches every stylesheet link with a cache-busting query
/// - reconnects after the server goes away
const CLIENT_RUNTIME: &str = r"
(function () {
  const notifyEnabled = __NOTIFY__;
  let banner;
  let bannerTimer;

  function notify(text) {
    if (!notifyEnabled || !document.body) return;
    if (!banner) {
      banner = document.createElement('div');
      banner.setAttribute('data-assetline-notify', '');
      banner.style.cssText = 'position:fixed;top:0;right:0;z-index:2147483647;' +
        'padding:12px 18px;font:14px/1.4 system-ui,sans-serif;color:#fff;' +
        'background:#1d1f21;border-bottom-left-radius:6px;transition:opacity .3s';
      document.body.appendChild(banner);
    }
    banner.textContent = text;
    banner.style.opacity = '1';
    clearTimeout(bannerTimer);
    bannerTimer = setTimeout(() => { banner.style.opacity = '0'; }, 2000);
  }

  function reloadStyles() {
    const stamp = Date.now();
    document.querySelectorAll('link[rel=stylesheet][href]').forEach((link) => {
      const url = new URL(link.href, location.href);
      if (url.origin !== location.origin) return;
      url.searchParams.set('t', String(stamp));
      link.href = url.toString();
    });
  }

  function connect() {
    const scheme = location.protocol === 'https:' ? 'wss' : 'ws';
    const ws = new WebSocket(`${scheme}://${location.host}/__livereload`);
    let connected = false;

    ws.onmessage = (event) => {
      const msg = JSON.parse(event.data);
      switch (msg.type) {
        case 'connected':
          connected = true;
          notify('Connected to assetline');
          break;
        case 'css':
          reloadStyles();
          notify('Injected styles');
          break;
        case 'reload':
          notify('Reloading');
          location.reload();
          break;
      }
    };

    ws.onclose = () => {
      if (connected) console.log('[assetline] connection lost, retrying...');
      setTimeout(connect, 1000);
    };
  }

  connect();
})();
";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inject_before_body_close() {
        let out = inject_client("<html><body><p>x</p></body></html>");
        assert_eq!(
            out,
            format!("<html><body><p>x</p>{}</body></html>", client_tag())
        );
    }

    #[test]
    fn test_inject_before_uppercase_body_close() {
        let out = inject_client("<HTML><BODY><p>é</p></BODY></HTML>");
        assert_eq!(
            out,
            format!("<HTML><BODY><p>é</p>{}</BODY></HTML>", client_tag())
        );
    }

    #[test]
    fn test_inject_appends_without_body() {
        let out = inject_client("<p>fragment</p>");
        assert!(out.ends_with(&client_tag()));
    }

    #[test]
    fn test_inject_is_idempotent() {
        let once = inject_client("<body></body>");
        assert_eq!(inject_client(&once), once);
    }

    fn site() -> (tempfile::TempDir, DevServer) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("index.html"),
            "<html><body><h1>hi</h1></body></html>",
        )
        .unwrap();
        std::fs::create_dir_all(dir.path().join("styles")).unwrap();
        std::fs::write(dir.path().join("styles/main.min.css"), "a{color:red}").unwrap();
        let server = DevServer::new(dir.path(), ReloadHub::default(), true);
        (dir, server)
    }

    async fn get_body(server: &DevServer, uri: &str) -> (StatusCode, String) {
        let req = axum::http::Request::builder().uri(uri).body(Body::empty()).unwrap();
        let res = server.router().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_index_gets_client_injected() {
        let (_dir, server) = site();
        let (status, body) = get_body(&server, "/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            format!("<html><body><h1>hi</h1>{}</body></html>", client_tag())
        );
    }

    #[tokio::test]
    async fn test_css_is_served_untouched() {
        let (_dir, server) = site();
        let (status, body) = get_body(&server, "/styles/main.min.css").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "a{color:red}");
    }

    #[tokio::test]
    async fn test_client_runtime_route() {
        let (_dir, server) = site();
        let (status, body) = get_body(&server, CLIENT_PATH).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("const notifyEnabled = true;"));
        assert!(body.contains("/__livereload"));
    }

    #[tokio::test]
    async fn test_missing_file_is_404() {
        let (_dir, server) = site();
        let (status, _) = get_body(&server, "/nope.html").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_bind_rejects_bad_host() {
        let err = DevServer::bind("not a host", 0).await.unwrap_err();
        assert!(matches!(err, ServerError::InvalidAddress(_)));
    }
}
