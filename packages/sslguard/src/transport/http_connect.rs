//! HTTP proxy support: CONNECT tunnels and proxy address parsing

use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;

use base64::Engine;

use crate::error::{TransportError, TransportErrorKind};

/// Proxy endpoint parsed from `http://[user:pass@]host:port` or `host:port`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyEndpoint {
    pub host: String,
    pub port: u16,
    /// Pre-encoded `Proxy-Authorization: Basic` credentials
    pub auth: Option<String>,
}

impl ProxyEndpoint {
    pub fn parse(proxy: &str) -> Result<Self, TransportError> {
        let with_scheme = if proxy.contains("://") {
            proxy.to_string()
        } else {
            format!("http://{proxy}")
        };
        let url = url::Url::parse(&with_scheme).map_err(|e| {
            TransportError::new(TransportErrorKind::Proxy, format!("Invalid proxy '{proxy}': {e}"))
        })?;
        let host = url
            .host_str()
            .ok_or_else(|| TransportError::new(TransportErrorKind::Proxy, format!("Proxy '{proxy}' has no host")))?
            .to_string();
        let port = url.port_or_known_default().unwrap_or(8080);
        let auth = if url.username().is_empty() {
            None
        } else {
            let credentials = format!("{}:{}", url.username(), url.password().unwrap_or(""));
            Some(base64::engine::general_purpose::STANDARD.encode(credentials.as_bytes()))
        };
        Ok(Self { host, port, auth })
    }
}

/// Establish an HTTP CONNECT tunnel through an already connected proxy stream
pub fn establish_connect_tunnel(
    mut proxy_stream: TcpStream,
    target_host: &str,
    target_port: u16,
    auth: Option<&str>,
) -> Result<TcpStream, TransportError> {
    let proxy_error = |message: String| TransportError::new(TransportErrorKind::Proxy, message);

    let connect_request = if let Some(auth) = auth {
        format!(
            "CONNECT {target_host}:{target_port} HTTP/1.1\r\nHost: {target_host}:{target_port}\r\nProxy-Authorization: Basic {auth}\r\n\r\n"
        )
    } else {
        format!("CONNECT {target_host}:{target_port} HTTP/1.1\r\nHost: {target_host}:{target_port}\r\n\r\n")
    };

    proxy_stream
        .write_all(connect_request.as_bytes())
        .map_err(|e| proxy_error(format!("Failed to send CONNECT request: {e}")))?;

    let mut reader = BufReader::new(&proxy_stream);
    let mut response_line = String::new();
    reader
        .read_line(&mut response_line)
        .map_err(|e| proxy_error(format!("Failed to read CONNECT response: {e}")))?;

    let status_ok = response_line
        .split_whitespace()
        .nth(1)
        .is_some_and(|code| code == "200");
    if !status_ok {
        return Err(proxy_error(format!("CONNECT failed: {}", response_line.trim())));
    }

    // Skip remaining headers
    let mut line = String::new();
    loop {
        line.clear();
        let read = reader
            .read_line(&mut line)
            .map_err(|e| proxy_error(format!("Failed to read CONNECT headers: {e}")))?;
        if read == 0 || line.trim().is_empty() {
            break;
        }
    }

    Ok(proxy_stream)
}
