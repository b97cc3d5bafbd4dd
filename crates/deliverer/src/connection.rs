//! Gateway connection lifecycle.
//!
//! [`ConnectionManager`] holds only configuration; every `connect()` call
//! performs the full load-identity / TCP / TLS-handshake sequence and hands
//! back a fresh, fully handshaked [`GatewayConnection`]. No partially
//! handshaked connection is ever returned, and no state carries over between
//! calls.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use rustls::{ClientConfig, RootCertStore};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;

use push_common::config::AppConfig;
use push_common::error::DeliveryError;

/// Write seam the delivery loop sends encoded payloads through.
pub trait GatewayWrite {
    fn write(&mut self, bytes: &[u8]) -> impl Future<Output = Result<(), DeliveryError>> + Send;
}

/// Connection factory seam. Production implementation is
/// [`ConnectionManager`]; tests substitute scripted fakes.
pub trait Connect {
    type Conn: GatewayWrite;

    fn connect(&self) -> impl Future<Output = Result<Self::Conn, DeliveryError>> + Send;
}

/// Produces ready-to-write, encrypted, authenticated streams to the gateway.
pub struct ConnectionManager {
    cert_path: PathBuf,
    cert_passphrase: Option<String>,
    ca_path: Option<PathBuf>,
    host: String,
    port: u16,
}

impl ConnectionManager {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            cert_path: config.gateway_cert_path.clone(),
            cert_passphrase: config.gateway_cert_passphrase.clone(),
            ca_path: config.gateway_ca_path.clone(),
            host: config.gateway_host.clone(),
            port: config.gateway_port,
        }
    }

    /// Establish a connection to the gateway.
    ///
    /// Credential problems (missing path, unreadable bundle, unparseable key)
    /// are `Config` errors: fatal, never retried. Network problems during
    /// connect or handshake are `Transport` errors the caller may retry.
    pub async fn connect(&self) -> Result<GatewayConnection, DeliveryError> {
        let (certs, key) = self.load_identity()?;
        let roots = self.load_roots()?;

        let tls_config = ClientConfig::builder()
            .with_root_certificates(roots)
            .with_client_auth_cert(certs, key)
            .map_err(|e| DeliveryError::Config(format!("client TLS config rejected: {e}")))?;

        let server_name = ServerName::try_from(self.host.clone())
            .map_err(|_| DeliveryError::Config(format!("invalid gateway hostname: {}", self.host)))?;

        let tcp = TcpStream::connect((self.host.as_str(), self.port))
            .await
            .map_err(DeliveryError::from_io)?;
        tcp.set_nodelay(true).map_err(DeliveryError::from_io)?;

        let connector = TlsConnector::from(Arc::new(tls_config));
        let stream = connector
            .connect(server_name, tcp)
            .await
            .map_err(DeliveryError::from_io)?;

        tracing::info!(
            host = %self.host,
            port = self.port,
            "Connection to push gateway completed"
        );

        Ok(GatewayConnection { stream })
    }

    /// Load the client certificate chain and private key from the PEM bundle.
    fn load_identity(
        &self,
    ) -> Result<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>), DeliveryError> {
        if self.cert_path.as_os_str().is_empty() {
            return Err(DeliveryError::Config(
                "the path to the certificate bundle is not set".to_string(),
            ));
        }
        if !self.cert_path.exists() {
            return Err(DeliveryError::Config(format!(
                "the certificate bundle does not exist: {}",
                self.cert_path.display()
            )));
        }

        let pem = std::fs::read(&self.cert_path).map_err(|e| {
            DeliveryError::Config(format!(
                "failed to read certificate bundle {}: {e}",
                self.cert_path.display()
            ))
        })?;

        let certs: Vec<CertificateDer<'static>> = CertificateDer::pem_slice_iter(&pem)
            .collect::<Result<_, _>>()
            .map_err(|e| DeliveryError::Config(format!("failed to parse certificates: {e}")))?;
        if certs.is_empty() {
            return Err(DeliveryError::Config(format!(
                "no certificates found in {}",
                self.cert_path.display()
            )));
        }

        let key = PrivateKeyDer::from_pem_slice(&pem).map_err(|e| {
            DeliveryError::Config(format!(
                "failed to parse private key in {}: {e}; passphrase-protected keys are not \
                 supported, provide a decrypted bundle",
                self.cert_path.display()
            ))
        })?;

        if self.cert_passphrase.is_some() {
            tracing::warn!(
                "GATEWAY_CERT_PASSPHRASE is set but the key bundle parsed without it; ignoring"
            );
        }

        Ok((certs, key))
    }

    /// Build the server-certificate trust store: the configured CA bundle
    /// when one is set, the webpki roots otherwise.
    fn load_roots(&self) -> Result<RootCertStore, DeliveryError> {
        let mut roots = RootCertStore::empty();

        match &self.ca_path {
            Some(path) => {
                let pem = std::fs::read(path).map_err(|e| {
                    DeliveryError::Config(format!(
                        "failed to read CA bundle {}: {e}",
                        path.display()
                    ))
                })?;
                for cert in CertificateDer::pem_slice_iter(&pem) {
                    let cert = cert.map_err(|e| {
                        DeliveryError::Config(format!("failed to parse CA certificate: {e}"))
                    })?;
                    roots.add(cert).map_err(|e| {
                        DeliveryError::Config(format!("failed to add CA certificate: {e}"))
                    })?;
                }
                if roots.is_empty() {
                    return Err(DeliveryError::Config(format!(
                        "no CA certificates found in {}",
                        path.display()
                    )));
                }
            }
            None => {
                roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
            }
        }

        Ok(roots)
    }
}

impl Connect for ConnectionManager {
    type Conn = GatewayConnection;

    async fn connect(&self) -> Result<GatewayConnection, DeliveryError> {
        ConnectionManager::connect(self).await
    }
}

/// A fully handshaked TLS stream to the gateway.
pub struct GatewayConnection {
    stream: TlsStream<TcpStream>,
}

impl GatewayWrite for GatewayConnection {
    /// Unbuffered write: every call is flushed to the wire before returning.
    async fn write(&mut self, bytes: &[u8]) -> Result<(), DeliveryError> {
        self.stream
            .write_all(bytes)
            .await
            .map_err(DeliveryError::from_io)?;
        self.stream.flush().await.map_err(DeliveryError::from_io)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::path::Path;

    use rcgen::{CertifiedKey, generate_simple_self_signed};
    use rustls::ServerConfig;
    use rustls::pki_types::PrivatePkcs8KeyDer;
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;
    use tokio_rustls::TlsAcceptor;

    fn test_config(cert_path: &Path, ca_path: Option<&Path>, host: &str, port: u16) -> AppConfig {
        AppConfig {
            gateway_cert_path: cert_path.to_path_buf(),
            gateway_cert_passphrase: None,
            gateway_ca_path: ca_path.map(Path::to_path_buf),
            gateway_host: host.to_string(),
            gateway_port: port,
            redis_url: "redis://localhost:6379".to_string(),
            queue_key: "push_emissary.queue".to_string(),
            empty_poll_interval_ms: 1000,
            reconnect_backoff_ms: 2000,
            requeue_backoff_ms: 30000,
        }
    }

    /// Write a self-signed identity (certificate + PKCS#8 key, one PEM
    /// bundle) for `hostname` and return its path.
    fn write_identity(dir: &TempDir, name: &str, hostname: &str) -> PathBuf {
        let CertifiedKey { cert, key_pair } =
            generate_simple_self_signed(vec![hostname.to_string()]).unwrap();
        let path = dir.path().join(name);
        std::fs::write(&path, format!("{}{}", cert.pem(), key_pair.serialize_pem())).unwrap();
        path
    }

    /// Start a TLS server on a fresh loopback port; each accepted connection
    /// is served on its own task and contributes one entry of exactly
    /// `bytes_per_conn` bytes to the returned buffer.
    async fn spawn_tls_server(
        dir: &TempDir,
        accept_count: usize,
        bytes_per_conn: usize,
    ) -> (u16, PathBuf, Arc<std::sync::Mutex<Vec<Vec<u8>>>>) {
        let CertifiedKey { cert, key_pair } =
            generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();

        let ca_path = dir.path().join("server-ca.pem");
        std::fs::write(&ca_path, cert.pem()).unwrap();

        let server_config = ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(
                vec![cert.der().clone()],
                PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_pair.serialize_der())),
            )
            .unwrap();
        let acceptor = TlsAcceptor::from(Arc::new(server_config));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let received = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = received.clone();
        tokio::spawn(async move {
            for _ in 0..accept_count {
                let (tcp, _) = listener.accept().await.unwrap();
                let acceptor = acceptor.clone();
                let sink = sink.clone();
                tokio::spawn(async move {
                    let mut tls = acceptor.accept(tcp).await.unwrap();
                    let mut buf = vec![0u8; bytes_per_conn];
                    tls.read_exact(&mut buf).await.unwrap();
                    sink.lock().unwrap().push(buf);
                });
            }
        });

        (port, ca_path, received)
    }

    #[tokio::test]
    async fn test_missing_cert_path_is_fatal_config_error() {
        let config = test_config(Path::new("/nonexistent/push.pem"), None, "localhost", 2195);
        let manager = ConnectionManager::new(&config);

        let result = manager.connect().await;
        match result {
            Err(DeliveryError::Config(msg)) => assert!(msg.contains("does not exist")),
            Err(other) => panic!("expected Config error, got {other:?}"),
            Ok(_) => panic!("expected Config error, got a connection"),
        }
    }

    #[tokio::test]
    async fn test_unset_cert_path_is_fatal_config_error() {
        let config = test_config(Path::new(""), None, "localhost", 2195);
        let manager = ConnectionManager::new(&config);

        let result = manager.connect().await;
        match result {
            Err(DeliveryError::Config(msg)) => assert!(msg.contains("not set")),
            Err(other) => panic!("expected Config error, got {other:?}"),
            Ok(_) => panic!("expected Config error, got a connection"),
        }
    }

    #[tokio::test]
    async fn test_garbage_bundle_is_fatal_config_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("garbage.pem");
        std::fs::write(&path, "this is not a pem bundle").unwrap();

        let config = test_config(&path, None, "localhost", 2195);
        let manager = ConnectionManager::new(&config);

        let result = manager.connect().await;
        assert!(matches!(result, Err(DeliveryError::Config(_))));
    }

    #[tokio::test]
    async fn test_refused_connection_is_transport_error() {
        let dir = TempDir::new().unwrap();
        let identity = write_identity(&dir, "client.pem", "client.test");

        // Bind then drop a listener so the port is known to be closed
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let config = test_config(&identity, None, "127.0.0.1", port);
        let manager = ConnectionManager::new(&config);

        let result = manager.connect().await;
        match result {
            Err(err @ DeliveryError::Transport { .. }) => assert!(err.is_transient()),
            Err(other) => panic!("expected Transport error, got {other:?}"),
            Ok(_) => panic!("expected Transport error, got a connection"),
        }
    }

    #[tokio::test]
    async fn test_handshake_and_unbuffered_write() {
        let dir = TempDir::new().unwrap();
        let identity = write_identity(&dir, "client.pem", "client.test");
        let (port, ca_path, received) = spawn_tls_server(&dir, 1, 20).await;

        let config = test_config(&identity, Some(&ca_path), "localhost", port);
        let manager = ConnectionManager::new(&config);

        let mut conn = manager.connect().await.unwrap();
        conn.write(b"frame-one.").await.unwrap();
        conn.write(b"frame-two.").await.unwrap();

        // Give the server task a moment to drain the stream
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        let received = received.lock().unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0], b"frame-one.frame-two.");
    }

    #[tokio::test]
    async fn test_reconnect_yields_independent_connections() {
        let dir = TempDir::new().unwrap();
        let identity = write_identity(&dir, "client.pem", "client.test");
        let (port, ca_path, received) = spawn_tls_server(&dir, 2, 10).await;

        let config = test_config(&identity, Some(&ca_path), "localhost", port);
        let manager = ConnectionManager::new(&config);

        // Two connects in a row; no state leaks from the first into the second
        let mut first = manager.connect().await.unwrap();
        let mut second = manager.connect().await.unwrap();

        first.write(b"conn-first").await.unwrap();
        second.write(b"conn-secnd").await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        let mut payloads: Vec<Vec<u8>> = received.lock().unwrap().clone();
        payloads.sort();
        assert_eq!(
            payloads,
            vec![b"conn-first".to_vec(), b"conn-secnd".to_vec()]
        );
    }
}
