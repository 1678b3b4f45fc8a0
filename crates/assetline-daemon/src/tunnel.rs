//! Public URL for the dev server through a localtunnel-compatible relay.
//!
//! The relay hands out a public URL and a TCP port. Each of the relay's
//! connection slots is kept filled with one socket that is piped to the
//! local server once a request arrives on it.

use reqwest::{Client, Url};
use serde::Deserialize;
use std::time::Duration;
use tokio::io::copy_bidirectional;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Delay before re-opening a slot after an error or an empty session.
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Relay response to a new-tunnel request.
#[derive(Debug, Clone, Deserialize)]
struct TunnelInfo {
    id: String,
    port: u16,
    #[serde(default = "default_conn_count")]
    max_conn_count: usize,
    url: String,
}

fn default_conn_count() -> usize {
    1
}

/// An open tunnel. Dropping it closes every relay connection.
#[derive(Debug)]
pub struct Tunnel {
    url: String,
    handles: Vec<JoinHandle<()>>,
}

impl Tunnel {
    /// Public URL of the tunnel.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Drop for Tunnel {
    fn drop(&mut self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}

/// Request a tunnel from `relay` and start forwarding to `local_host:local_port`.
///
/// # Errors
/// Returns an error if the relay cannot be reached or answers with
/// something other than tunnel details.
pub async fn open_tunnel(
    relay: &str,
    local_host: &str,
    local_port: u16,
) -> Result<Tunnel, TunnelError> {
    let mut endpoint = Url::parse(relay)
        .map_err(|e| TunnelError::Relay(format!("Invalid relay URL '{relay}': {e}")))?;
    let relay_host = endpoint
        .host_str()
        .ok_or_else(|| TunnelError::Relay(format!("Relay URL '{relay}' has no host")))?
        .to_string();
    endpoint.set_query(Some("new"));

    let http = Client::builder()
        .connect_timeout(Duration::from_secs(5))
        .timeout(Duration::from_secs(15))
        .user_agent(concat!("assetline/", env!("CARGO_PKG_VERSION")))
        .build()?;

    let response = http.get(endpoint.as_str()).send().await?;
    if !response.status().is_success() {
        return Err(TunnelError::Relay(format!(
            "Relay returned status {}",
            response.status()
        )));
    }
    let info: TunnelInfo = response.json().await?;
    debug!(id = %info.id, port = info.port, slots = info.max_conn_count, "Tunnel assigned");

    let remote = format!("{relay_host}:{}", info.port);
    let local_host = if local_host == "localhost" {
        "127.0.0.1"
    } else {
        local_host
    };
    let local = format!("{local_host}:{local_port}");

    let handles = (0..info.max_conn_count.max(1))
        .map(|_| tokio::spawn(keep_slot(remote.clone(), local.clone())))
        .collect();

    info!(url = %info.url, "Tunnel open");
    Ok(Tunnel {
        url: info.url,
        handles,
    })
}

async fn keep_slot(remote: String, local: String) {
    loop {
        match forward_once(&remote, &local).await {
            Ok(0) => {
                debug!("Tunnel connection closed by relay, reopening");
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
            Ok(bytes) => debug!(bytes, "Tunnel connection finished"),
            Err(e) => {
                debug!(error = %e, "Tunnel connection failed, retrying");
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }
}

/// Hold one relay connection and pipe it to the local server once a request
/// arrives. Returns the bytes moved; 0 when the relay closed the slot first.
async fn forward_once(remote: &str, local: &str) -> std::io::Result<u64> {
    let mut upstream = TcpStream::connect(remote).await?;
    let mut first = [0_u8; 1];
    if upstream.peek(&mut first).await? == 0 {
        return Ok(0);
    }
    let mut downstream = TcpStream::connect(local).await?;
    let (sent, received) = copy_bidirectional(&mut upstream, &mut downstream).await?;
    Ok(sent + received)
}

/// Tunnel error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TunnelError {
    Request(String),
    Relay(String),
}

impl std::fmt::Display for TunnelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Request(msg) => write!(f, "Tunnel request failed: {msg}"),
            Self::Relay(msg) => write!(f, "Tunnel relay error: {msg}"),
        }
    }
}

impl std::error::Error for TunnelError {}

impl From<reqwest::Error> for TunnelError {
    fn from(e: reqwest::Error) -> Self {
        Self::Request(e.to_string())
    }
}
