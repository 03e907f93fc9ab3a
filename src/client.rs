//! TLS protocol client.
//!
//! A minimal client for the line protocol: it validates the server
//! certificate against a caller-supplied root store, sends `COMMAND::DATA`
//! lines and parses each response line.
//!
//! ## Example
//!
//! ```ignore
//! use stockroom::client::{load_roots, Client};
//! use std::path::Path;
//!
//! let roots = load_roots(Path::new("ca.pem"))?;
//! let mut client = Client::connect("127.0.0.1:8443", "localhost", roots).await?;
//!
//! let response = client.request("GET_ALL_PRODUCTS", "").await?;
//! for record in response.records() {
//!     println!("{record}");
//! }
//! client.close().await?;
//! ```

use crate::protocol::{ParseError, Response, COMMAND_SEPARATOR, LINE_TERMINATOR};
use crate::server::tls::{load_certs, TlsError};
use rustls::pki_types::ServerName;
use rustls::RootCertStore;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;
use tracing::debug;

/// Errors raised by the client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Network failure, including a failed TLS handshake
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The TLS client configuration was rejected
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// Root certificates could not be loaded
    #[error(transparent)]
    Certificates(#[from] TlsError),

    /// The server name is not a valid DNS name or IP address
    #[error("invalid server name: {0}")]
    InvalidServerName(String),

    /// A request contained a line break
    #[error("request must be a single line")]
    MultiLineRequest,

    /// The server sent a line that is not a valid response
    #[error("malformed response: {0}")]
    Protocol(#[from] ParseError),

    /// The server closed the connection
    #[error("connection closed by server")]
    ConnectionClosed,
}

/// A connected protocol client.
pub struct Client {
    stream: BufReader<TlsStream<TcpStream>>,
}

impl Client {
    /// Connects and completes the TLS handshake.
    ///
    /// `server_name` is checked against the server certificate.
    pub async fn connect(
        addr: impl ToSocketAddrs,
        server_name: &str,
        roots: RootCertStore,
    ) -> Result<Self, ClientError> {
        let config = rustls::ClientConfig::builder_with_provider(Arc::new(
            rustls::crypto::ring::default_provider(),
        ))
        .with_safe_default_protocol_versions()?
        .with_root_certificates(roots)
        .with_no_client_auth();

        let name = ServerName::try_from(server_name.to_string())
            .map_err(|_| ClientError::InvalidServerName(server_name.to_string()))?;

        let tcp = TcpStream::connect(addr).await?;
        let tls = TlsConnector::from(Arc::new(config)).connect(name, tcp).await?;
        debug!(server = server_name, "Connected");

        Ok(Self {
            stream: BufReader::new(tls),
        })
    }

    /// Sends `COMMAND::DATA` and waits for the response.
    pub async fn request(&mut self, command: &str, data: &str) -> Result<Response, ClientError> {
        self.send_line(&format!("{command}{COMMAND_SEPARATOR}{data}"))
            .await
    }

    /// Sends one raw request line (without terminator) and waits for the response.
    pub async fn send_line(&mut self, line: &str) -> Result<Response, ClientError> {
        if line.contains(['\r', '\n']) {
            return Err(ClientError::MultiLineRequest);
        }

        let stream = self.stream.get_mut();
        stream.write_all(line.as_bytes()).await?;
        stream.write_all(&[LINE_TERMINATOR]).await?;
        stream.flush().await?;

        let mut response = String::new();
        if self.stream.read_line(&mut response).await? == 0 {
            return Err(ClientError::ConnectionClosed);
        }

        Ok(Response::parse(&response)?)
    }

    /// Closes the connection, sending a TLS close notification.
    pub async fn close(mut self) -> Result<(), ClientError> {
        self.stream.get_mut().shutdown().await?;
        Ok(())
    }
}

/// Loads trusted root certificates from a PEM file.
pub fn load_roots(path: &Path) -> Result<RootCertStore, ClientError> {
    let mut roots = RootCertStore::empty();
    for cert in load_certs(path)? {
        roots.add(cert)?;
    }
    Ok(roots)
}
