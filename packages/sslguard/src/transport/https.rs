//! Blocking HTTP(S) GET over std sockets and rustls

use std::io::Write;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rustls::pki_types::ServerName;
use rustls::{ClientConnection, StreamOwned};
use url::{Host, Url};

use super::http_connect::{ProxyEndpoint, establish_connect_tunnel};
use super::response::read_response;
use super::settings::TransportSettings;
use super::{Fetch, FetchOptions, FetchResponse};
use crate::error::{TransportError, TransportErrorKind};

const USER_AGENT: &str = concat!("sslguard/", env!("CARGO_PKG_VERSION"));

/// Reference [`Fetch`] implementation configured through [`TransportSettings`]
#[derive(Debug, Clone, Default)]
pub struct HttpsFetcher {
    settings: TransportSettings,
}

#[derive(Debug)]
struct Target {
    https: bool,
    host: String,
    port: u16,
    host_header: String,
    path: String,
    absolute: String,
}

impl HttpsFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(settings: TransportSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &TransportSettings {
        &self.settings
    }

    /// Mutable settings, the [`TransportHandle`](super::TransportHandle) to configure
    pub fn settings_mut(&mut self) -> &mut TransportSettings {
        &mut self.settings
    }

    fn parse_target(url: &str) -> Result<Target, TransportError> {
        let parsed = Url::parse(url)
            .map_err(|e| TransportError::new(TransportErrorKind::InvalidUrl, format!("'{url}': {e}")))?;
        let https = match parsed.scheme() {
            "https" => true,
            "http" => false,
            other => {
                return Err(TransportError::new(
                    TransportErrorKind::InvalidUrl,
                    format!("unsupported scheme '{other}'"),
                ));
            }
        };
        let host = match parsed.host() {
            Some(Host::Domain(domain)) => domain.to_string(),
            Some(Host::Ipv4(addr)) => addr.to_string(),
            Some(Host::Ipv6(addr)) => addr.to_string(),
            None => {
                return Err(TransportError::new(
                    TransportErrorKind::InvalidUrl,
                    format!("'{url}' has no host"),
                ));
            }
        };
        let port = parsed.port_or_known_default().unwrap_or(if https { 443 } else { 80 });
        let host_header = match parsed.port() {
            Some(port) => format!("{}:{port}", parsed.host_str().unwrap_or(&host)),
            None => parsed.host_str().unwrap_or(&host).to_string(),
        };
        let mut path = parsed.path().to_string();
        if let Some(query) = parsed.query() {
            path.push('?');
            path.push_str(query);
        }
        Ok(Target {
            https,
            host,
            port,
            host_header,
            path,
            absolute: parsed.to_string(),
        })
    }

    fn connect_tcp(&self, host: &str, port: u16, timeout: Duration) -> Result<TcpStream, TransportError> {
        let addrs: Vec<SocketAddr> = (host, port)
            .to_socket_addrs()
            .map_err(|e| TransportError::connect(format!("could not resolve {host}:{port}: {e}")))?
            .collect();

        let mut last_error = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => {
                    self.settings.debug_line(format!("connected to {addr}"));
                    return Ok(stream);
                }
                Err(e) => last_error = Some(e),
            }
        }

        Err(match last_error {
            Some(e) if e.kind() == std::io::ErrorKind::TimedOut => {
                TransportError::timeout(format!("connect to {host}:{port} timed out"))
            }
            Some(e) => TransportError::connect(format!("connect to {host}:{port} failed: {e}")),
            None => TransportError::connect(format!("no addresses for {host}:{port}")),
        })
    }

    /// Open the socket to the origin, tunnelling through the proxy when configured
    fn open_stream(&self, target: &Target, timeout: Duration) -> Result<TcpStream, TransportError> {
        let Some(proxy) = &self.settings.proxy else {
            return self.connect_tcp(&target.host, target.port, timeout);
        };
        let endpoint = ProxyEndpoint::parse(proxy)?;
        let stream = self.connect_tcp(&endpoint.host, endpoint.port, timeout)?;
        if target.https {
            self.settings
                .debug_line(format!("tunnelling via {}:{}", endpoint.host, endpoint.port));
            establish_connect_tunnel(stream, &target.host, target.port, endpoint.auth.as_deref())
        } else {
            Ok(stream)
        }
    }

    fn request_bytes(&self, target: &Target) -> Vec<u8> {
        let via_plain_proxy = self.settings.proxy.is_some() && !target.https;
        let request_target = if via_plain_proxy { &target.absolute } else { &target.path };
        let mut request = format!(
            "GET {request_target} HTTP/1.1\r\nHost: {}\r\nUser-Agent: {USER_AGENT}\r\nAccept: */*\r\nConnection: close\r\n",
            target.host_header
        );
        if via_plain_proxy
            && let Some(auth) = self
                .settings
                .proxy
                .as_deref()
                .and_then(|proxy| ProxyEndpoint::parse(proxy).ok())
                .and_then(|endpoint| endpoint.auth)
        {
            request.push_str(&format!("Proxy-Authorization: Basic {auth}\r\n"));
        }
        request.push_str("\r\n");
        request.into_bytes()
    }
}

impl Fetch for HttpsFetcher {
    fn fetch(&self, url: &str, options: &FetchOptions) -> Result<FetchResponse, TransportError> {
        let target = Self::parse_target(url)?;
        let started = Instant::now();
        let deadline = started + options.timeout;
        let connect_timeout = options.connect_timeout.unwrap_or(options.timeout);

        let stream = self.open_stream(&target, connect_timeout)?;
        stream
            .set_read_timeout(Some(options.timeout))
            .and_then(|()| stream.set_write_timeout(Some(options.timeout)))
            .map_err(|e| TransportError::io(&e))?;

        let request = self.request_bytes(&target);

        let response = if target.https {
            let config = self.settings.client_config(options.verify_peer)?;
            let server_name = ServerName::try_from(target.host.clone())
                .map_err(|e| TransportError::tls(format!("invalid server name '{}': {e}", target.host)))?;
            let connection = ClientConnection::new(Arc::new(config), server_name)
                .map_err(|e| TransportError::tls(format!("failed to start TLS session: {e}")))?;
            let mut tls = StreamOwned::new(connection, stream);
            tls.write_all(&request).map_err(|e| tls_io_error(&e))?;
            read_response(&mut tls, deadline)?
        } else {
            let mut stream = stream;
            stream.write_all(&request).map_err(|e| TransportError::io(&e))?;
            read_response(&mut stream, deadline)?
        };

        self.settings.debug_line(format!(
            "GET {} -> {} ({} bytes in {:?})",
            target.absolute,
            response.status,
            response.body.len(),
            started.elapsed()
        ));
        tracing::debug!(url = %target.absolute, status = %response.status, bytes = response.body.len(), "fetch completed");
        Ok(response)
    }
}

/// rustls surfaces handshake failures as `InvalidData` IO errors on first write
fn tls_io_error(error: &std::io::Error) -> TransportError {
    if error.kind() == std::io::ErrorKind::InvalidData {
        TransportError::tls(format!("handshake failed: {error}"))
    } else {
        TransportError::io(error)
    }
}
