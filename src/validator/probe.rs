//! Tunnel probes through candidate proxies
//!
//! A candidate is reachable when a tunnel to the probe target can be
//! established through it: HTTP CONNECT for http/https proxies, a SOCKS5
//! handshake for socks5. No payload is exchanged beyond the handshake.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_socks::tcp::Socks5Stream;
use tracing::debug;
use url::Url;

use crate::error::{Result, ShepherdError};
use crate::models::{Candidate, ProxyProtocol};

/// Host and port extracted from a configured probe URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeTarget {
    pub host: String,
    pub port: u16,
}

impl ProbeTarget {
    pub fn from_url(probe_url: &str) -> Result<Self> {
        let url = Url::parse(probe_url)?;
        let host = url
            .host_str()
            .ok_or_else(|| {
                ShepherdError::InvalidConfig(format!("probe URL has no host: {}", probe_url))
            })?
            .to_string();
        let port = url.port_or_known_default().ok_or_else(|| {
            ShepherdError::InvalidConfig(format!("probe URL has no port: {}", probe_url))
        })?;
        Ok(ProbeTarget { host, port })
    }
}

impl std::fmt::Display for ProbeTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Probe handler for the supported proxy protocols
pub struct ProxyProbe;

impl ProxyProbe {
    /// Establish a tunnel to the target through the candidate proxy
    pub async fn connect(candidate: &Candidate, target: &ProbeTarget) -> Result<()> {
        match candidate.protocol {
            ProxyProtocol::Http | ProxyProtocol::Https => {
                Self::connect_http(candidate, target).await
            }
            ProxyProtocol::Socks5 => Self::connect_socks5(candidate, target).await,
        }
    }

    /// Connect through HTTP CONNECT method
    async fn connect_http(candidate: &Candidate, target: &ProbeTarget) -> Result<()> {
        debug!("Probing HTTP proxy at {}", candidate.address);

        let mut stream = TcpStream::connect(&candidate.address).await.map_err(|e| {
            ShepherdError::ProxyConnectionFailed(format!("TCP connect failed: {}", e))
        })?;

        let request = build_connect_request(candidate, target);
        stream.write_all(request.as_bytes()).await.map_err(|e| {
            ShepherdError::ProxyConnectionFailed(format!("Failed to send CONNECT: {}", e))
        })?;

        let mut response = vec![0u8; 1024];
        let n = stream.read(&mut response).await.map_err(|e| {
            ShepherdError::ProxyConnectionFailed(format!("Failed to read CONNECT response: {}", e))
        })?;

        let response_str = String::from_utf8_lossy(&response[..n]);
        if !response_str.starts_with("HTTP/1.1 200") && !response_str.starts_with("HTTP/1.0 200") {
            return Err(ShepherdError::ProxyConnectionFailed(format!(
                "CONNECT failed: {}",
                response_str.lines().next().unwrap_or("empty response")
            )));
        }

        debug!("HTTP CONNECT tunnel established via {}", candidate.address);
        Ok(())
    }

    /// Connect through SOCKS5 proxy
    async fn connect_socks5(candidate: &Candidate, target: &ProbeTarget) -> Result<()> {
        debug!("Probing SOCKS5 proxy at {}", candidate.address);

        let proxy_addr: std::net::SocketAddr = candidate.address.parse().map_err(|_| {
            ShepherdError::InvalidProxyAddress(format!(
                "invalid proxy address: {}",
                candidate.address
            ))
        })?;

        let target_addr = (target.host.as_str(), target.port);
        let result = if let (Some(username), Some(password)) =
            (&candidate.username, &candidate.password)
        {
            Socks5Stream::connect_with_password(proxy_addr, target_addr, username, password).await
        } else {
            Socks5Stream::connect(proxy_addr, target_addr).await
        };

        result.map_err(|e| {
            ShepherdError::ProxyConnectionFailed(format!("SOCKS5 connect failed: {}", e))
        })?;

        debug!("SOCKS5 tunnel established via {}", candidate.address);
        Ok(())
    }
}

/// Build HTTP CONNECT request with optional proxy authentication
fn build_connect_request(candidate: &Candidate, target: &ProbeTarget) -> String {
    let mut request = format!(
        "CONNECT {}:{} HTTP/1.1\r\nHost: {}:{}\r\n",
        target.host, target.port, target.host, target.port
    );

    if let (Some(username), Some(password)) = (&candidate.username, &candidate.password) {
        let credentials = format!("{}:{}", username, password);
        let encoded = BASE64.encode(credentials.as_bytes());
        request.push_str(&format!("Proxy-Authorization: Basic {}\r\n", encoded));
    }

    request.push_str("\r\n");
    request
}
