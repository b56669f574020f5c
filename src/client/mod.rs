// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mutual-TLS transport to the Talos machine API.
//!
//! [`ConnectionCredentials`] validates the PEM material when it is
//! constructed; [`Transport::connect`] dials the endpoint eagerly and hands
//! back a ready gRPC channel. The channel is closed when the transport is
//! dropped.

use crate::api::machine::machine_service_client::MachineServiceClient;
use crate::config::{SessionConfig, TalosContext};
use crate::error::{ConnectionErrorKind, Result, TalosError};
use hyper_util::rt::TokioIo;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use std::fmt;
use std::sync::Arc;
use tonic::transport::{Channel, Endpoint};
use tracing::debug;

/// Endpoint plus PEM material for a mutually authenticated session.
///
/// Construction parses the CA bundle and the client key pair, so an
/// existing value always holds a usable TLS identity.
#[derive(Clone)]
pub struct ConnectionCredentials {
    endpoint: String,
    ca_cert: Vec<u8>,
    client_cert: Vec<u8>,
    client_key: Vec<u8>,
    tls_config: Arc<rustls::ClientConfig>,
}

impl fmt::Debug for ConnectionCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionCredentials")
            .field("endpoint", &self.endpoint)
            .field("ca_cert_len", &self.ca_cert.len())
            .field("client_cert_len", &self.client_cert.len())
            .field("client_key", &"<redacted>")
            .finish()
    }
}

impl ConnectionCredentials {
    /// Validate the PEM material and build the TLS identity.
    ///
    /// # Errors
    ///
    /// - `InvalidCaBundle` if no certificate can be parsed from `ca_cert`
    /// - `InvalidKeyPair` if the certificate or key is malformed, or the key
    ///   does not belong to the certificate
    #[allow(clippy::result_large_err)]
    pub fn new(
        endpoint: impl Into<String>,
        ca_cert: impl Into<Vec<u8>>,
        client_cert: impl Into<Vec<u8>>,
        client_key: impl Into<Vec<u8>>,
    ) -> Result<Self> {
        // Install ring as default crypto provider (supports ED25519)
        let _ = rustls::crypto::ring::default_provider().install_default();

        let endpoint = endpoint.into();
        if endpoint.trim().is_empty() {
            return Err(TalosError::Config("Endpoint must not be empty".to_string()));
        }

        let ca_cert = ca_cert.into();
        let client_cert = client_cert.into();
        let client_key = client_key.into();
        let tls_config = build_tls_config(&ca_cert, &client_cert, &client_key)?;

        Ok(Self {
            endpoint,
            ca_cert,
            client_cert,
            client_key,
            tls_config: Arc::new(tls_config),
        })
    }

    /// Build credentials from a talosconfig context.
    ///
    /// Uses the first endpoint of the context.
    #[allow(clippy::result_large_err)]
    pub fn from_context(context: &TalosContext) -> Result<Self> {
        let endpoint = context
            .first_endpoint()
            .ok_or_else(|| TalosError::Config("Context has no endpoints".to_string()))?;
        let missing = |field: &str| TalosError::Config(format!("Context has no {field}"));
        let ca = context.ca_pem()?.ok_or_else(|| missing("ca"))?;
        let crt = context.crt_pem()?.ok_or_else(|| missing("crt"))?;
        let key = context.key_pem()?.ok_or_else(|| missing("key"))?;
        Self::new(endpoint.clone(), ca, crt, key)
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    #[must_use]
    pub fn ca_cert(&self) -> &[u8] {
        &self.ca_cert
    }

    #[must_use]
    pub fn client_cert(&self) -> &[u8] {
        &self.client_cert
    }

    #[must_use]
    pub fn client_key(&self) -> &[u8] {
        &self.client_key
    }
}

/// Build the client TLS config: supplied CA only, client auth, ALPN h2.
#[allow(clippy::result_large_err)]
fn build_tls_config(
    ca_pem: &[u8],
    cert_pem: &[u8],
    key_pem: &[u8],
) -> Result<rustls::ClientConfig> {
    let ca_certs = load_pem_certs(ca_pem)
        .map_err(|msg| TalosError::connection(ConnectionErrorKind::InvalidCaBundle, msg))?;
    let mut root_store = rustls::RootCertStore::empty();
    for cert in ca_certs {
        root_store.add(cert).map_err(|e| {
            TalosError::connection(
                ConnectionErrorKind::InvalidCaBundle,
                format!("Failed to add CA cert: {e}"),
            )
        })?;
    }

    let client_certs = load_pem_certs(cert_pem)
        .map_err(|msg| TalosError::connection(ConnectionErrorKind::InvalidKeyPair, msg))?;
    let client_key = load_pem_key(key_pem)
        .map_err(|msg| TalosError::connection(ConnectionErrorKind::InvalidKeyPair, msg))?;

    let mut tls_config = rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_client_auth_cert(client_certs, client_key)
        .map_err(|e| {
            TalosError::connection(
                ConnectionErrorKind::InvalidKeyPair,
                format!("Failed to configure client auth: {e}"),
            )
        })?;

    // gRPC requires ALPN h2
    tls_config.alpn_protocols = vec![b"h2".to_vec()];
    Ok(tls_config)
}

/// Load PEM-encoded certificates
fn load_pem_certs(pem_data: &[u8]) -> std::result::Result<Vec<CertificateDer<'static>>, String> {
    let mut reader = std::io::BufReader::new(pem_data);
    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut reader)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| format!("Failed to parse PEM certificates: {e}"))?;
    if certs.is_empty() {
        return Err("No certificates found in PEM data".to_string());
    }
    Ok(certs)
}

/// Load PEM-encoded private key (supports RSA, EC, PKCS8, and ED25519)
fn load_pem_key(pem_data: &[u8]) -> std::result::Result<PrivateKeyDer<'static>, String> {
    let mut reader = std::io::BufReader::new(pem_data);

    loop {
        match rustls_pemfile::read_one(&mut reader) {
            Ok(Some(rustls_pemfile::Item::Pkcs1Key(key))) => return Ok(PrivateKeyDer::Pkcs1(key)),
            Ok(Some(rustls_pemfile::Item::Pkcs8Key(key))) => return Ok(PrivateKeyDer::Pkcs8(key)),
            Ok(Some(rustls_pemfile::Item::Sec1Key(key))) => return Ok(PrivateKeyDer::Sec1(key)),
            Ok(Some(_)) => continue,
            Ok(None) => break,
            Err(e) => return Err(format!("Failed to parse PEM key: {e}")),
        }
    }

    // Talos labels its PKCS#8 Ed25519 keys "ED25519 PRIVATE KEY"
    let pem_str =
        std::str::from_utf8(pem_data).map_err(|e| format!("Invalid UTF-8 in key: {e}"))?;
    let start_marker = "-----BEGIN ED25519 PRIVATE KEY-----";
    let end_marker = "-----END ED25519 PRIVATE KEY-----";

    if let (Some(start), Some(end)) = (pem_str.find(start_marker), pem_str.find(end_marker)) {
        if start < end {
            let base64_clean: String = pem_str[start + start_marker.len()..end]
                .chars()
                .filter(|c| !c.is_whitespace())
                .collect();
            let der_bytes =
                base64::Engine::decode(&base64::engine::general_purpose::STANDARD, &base64_clean)
                    .map_err(|e| format!("Failed to decode ED25519 key: {e}"))?;
            return Ok(PrivateKeyDer::Pkcs8(
                rustls::pki_types::PrivatePkcs8KeyDer::from(der_bytes),
            ));
        }
    }

    Err("No private key found in PEM data".to_string())
}

/// Host and port the transport dials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetAddress {
    pub host: String,
    pub port: u16,
}

impl TargetAddress {
    /// Parse `host`, `host:port`, `[v6]:port` or a URL; a missing port
    /// becomes `default_port`.
    #[allow(clippy::result_large_err)]
    pub fn parse(endpoint: &str, default_port: u16) -> Result<Self> {
        let trimmed = endpoint.trim();
        let without_scheme = trimmed
            .split_once("://")
            .map_or(trimmed, |(_, rest)| rest);
        let parsed = url::Url::parse(&format!("tcp://{without_scheme}"))
            .map_err(|e| TalosError::Config(format!("Invalid endpoint {endpoint:?}: {e}")))?;
        let host = parsed
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| TalosError::Config(format!("No host in endpoint {endpoint:?}")))?
            .to_string();
        Ok(Self {
            host,
            port: parsed.port().unwrap_or(default_port),
        })
    }

    /// Host without IPv6 brackets, as used for SNI.
    #[must_use]
    pub fn server_name(&self) -> &str {
        self.host.trim_start_matches('[').trim_end_matches(']')
    }
}

impl fmt::Display for TargetAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// An established mTLS channel to one endpoint.
///
/// Owned by exactly one session; dropping it releases the connection.
#[derive(Debug)]
pub struct Transport {
    target: TargetAddress,
    channel: Channel,
}

impl Transport {
    /// Dial the endpoint and complete the TLS and HTTP/2 handshakes.
    ///
    /// Blocks until the channel is ready or `config.connect_timeout`
    /// elapses; there is no lazy connect.
    ///
    /// # Errors
    ///
    /// - `ConnectionFailed` if the endpoint cannot be reached or the
    ///   handshake fails
    /// - `DeadlineExceeded` if the connect timeout elapses
    pub async fn connect(credentials: &ConnectionCredentials, config: &SessionConfig) -> Result<Self> {
        let target = TargetAddress::parse(credentials.endpoint(), config.port)?;
        debug!(endpoint = %target, "connecting to machine API");

        let connect = Self::connect_with_tls(&target, credentials.tls_config.clone());
        let channel = tokio::time::timeout(config.connect_timeout, connect)
            .await
            .map_err(|_| {
                TalosError::connection(
                    ConnectionErrorKind::DeadlineExceeded,
                    format!(
                        "Could not connect to {target} within {:?}",
                        config.connect_timeout
                    ),
                )
            })??;

        Ok(Self { target, channel })
    }

    async fn connect_with_tls(
        target: &TargetAddress,
        tls_config: Arc<rustls::ClientConfig>,
    ) -> Result<Channel> {
        let connector = tokio_rustls::TlsConnector::from(tls_config);
        let server_name = ServerName::try_from(target.server_name().to_string()).map_err(|e| {
            TalosError::Config(format!("Invalid server name {}: {e}", target.server_name()))
        })?;

        // TLS is handled by the connector, so the URI uses plain http
        let endpoint = Endpoint::from_shared(format!("http://{target}"))
            .map_err(|e| TalosError::Config(e.to_string()))?;

        let channel = endpoint
            .connect_with_connector(tower::service_fn(move |uri: tonic::transport::Uri| {
                let connector = connector.clone();
                let server_name = server_name.clone();
                async move {
                    let host = uri.host().unwrap_or("127.0.0.1");
                    let port = uri.port_u16().unwrap_or(crate::config::APID_PORT);
                    let tcp = tokio::net::TcpStream::connect(format!("{host}:{port}")).await?;
                    let tls_stream = connector.connect(server_name, tcp).await?;
                    Ok::<_, std::io::Error>(TokioIo::new(tls_stream))
                }
            }))
            .await?;

        Ok(channel)
    }

    #[must_use]
    pub fn target(&self) -> &TargetAddress {
        &self.target
    }

    /// Access the Machine API group
    pub fn machine(&self) -> MachineServiceClient<Channel> {
        MachineServiceClient::new(self.channel.clone())
    }
}
