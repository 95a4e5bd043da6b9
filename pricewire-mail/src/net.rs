//! Shared connection plumbing for the line-based mailbox protocols.

use rustls::pki_types::ServerName;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

use crate::{MailError, Result};

/// A plain or TLS stream behind one object-safe type.
pub(crate) trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> AsyncStream for T {}

pub(crate) type BoxedStream = Box<dyn AsyncStream>;

/// Connect to `host:port`, wrapping in TLS when requested.
pub(crate) async fn connect(host: &str, port: u16, tls: bool) -> Result<BoxedStream> {
    let tcp = TcpStream::connect((host, port)).await?;

    if !tls {
        return Ok(Box::new(tcp));
    }

    let mut roots = rustls::RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let config = rustls::ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();

    let server_name = ServerName::try_from(host.to_string())
        .map_err(|e| MailError::Tls(format!("invalid server name '{}': {}", host, e)))?;

    let connector = TlsConnector::from(Arc::new(config));
    let stream = connector
        .connect(server_name, tcp)
        .await
        .map_err(|e| MailError::Tls(e.to_string()))?;

    Ok(Box::new(stream))
}
