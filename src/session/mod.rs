// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bootstrap and kubeconfig retrieval over one mTLS session.
//!
//! A [`Session`] owns its transport; dropping the session (including
//! dropping an in-flight operation future) closes the connection.
//!
//! The kubeconfig stream is drained completely before anything is
//! extracted. Errors reported in chunk metadata or as a terminal status
//! fail the retrieval even when every archive byte arrived.
//!
//! # Example
//!
//! ```no_run
//! use talos_bootstrap::client::ConnectionCredentials;
//! use talos_bootstrap::config::SessionConfig;
//! use talos_bootstrap::session;
//!
//! # async fn example() -> Result<(), talos_bootstrap::TalosError> {
//! let credentials = ConnectionCredentials::new(
//!     "10.0.0.2",
//!     std::fs::read("ca.crt").unwrap_or_default(),
//!     std::fs::read("admin.crt").unwrap_or_default(),
//!     std::fs::read("admin.key").unwrap_or_default(),
//! )?;
//!
//! let bundle = session::bootstrap(&credentials, &SessionConfig::default()).await?;
//! println!("kubeconfig {} from {:?}", bundle.id(), bundle.node());
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio_stream::{Stream, StreamExt};
use tonic::transport::Channel;
use tonic::Status;
use tracing::{info, warn};

use crate::api::common::Data;
use crate::api::machine::machine_service_client::MachineServiceClient;
use crate::api::machine::{BootstrapRequest, BootstrapResponse};
use crate::archive;
use crate::client::{ConnectionCredentials, TargetAddress, Transport};
use crate::config::SessionConfig;
use crate::error::{RemoteCallErrorKind, Result, TalosError};
use crate::resources::{BootstrapOptions, BootstrapOutcome, CredentialBundle};
use crate::runtime::{LoggingConfig, StageLogger};

/// Chunks of the kubeconfig archive as sent by the machine API.
pub type KubeconfigStream =
    Pin<Box<dyn Stream<Item = std::result::Result<Data, Status>> + Send + 'static>>;

/// The two machine API calls a session needs.
#[tonic::async_trait]
pub trait ClusterControl: Send {
    async fn bootstrap(
        &mut self,
        request: BootstrapRequest,
    ) -> std::result::Result<BootstrapResponse, Status>;

    async fn kubeconfig(&mut self) -> std::result::Result<KubeconfigStream, Status>;
}

#[tonic::async_trait]
impl ClusterControl for MachineServiceClient<Channel> {
    async fn bootstrap(
        &mut self,
        request: BootstrapRequest,
    ) -> std::result::Result<BootstrapResponse, Status> {
        MachineServiceClient::bootstrap(self, request)
            .await
            .map(tonic::Response::into_inner)
    }

    async fn kubeconfig(&mut self) -> std::result::Result<KubeconfigStream, Status> {
        let stream: KubeconfigStream =
            Box::pin(MachineServiceClient::kubeconfig(self, ()).await?.into_inner());
        Ok(stream)
    }
}

/// How a drained stream ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamStatus {
    /// End of stream with no reported error.
    Complete,
    /// A chunk carried an error in its metadata.
    ChunkError { node: Option<String>, message: String },
    /// The stream ended with a non-OK status.
    Terminated { code: tonic::Code, message: String },
    /// Reading stopped because the data outgrew the byte limit.
    TooLarge { limit: usize },
}

/// Everything a drained stream delivered, together with how it ended.
#[derive(Debug, Clone)]
pub struct StreamOutcome {
    /// Concatenated bytes of every chunk without a metadata error.
    pub data: Vec<u8>,
    pub chunks: usize,
    /// First hostname reported in chunk metadata.
    pub node: Option<String>,
    pub status: StreamStatus,
}

impl StreamOutcome {
    /// Fail unless the stream ended cleanly.
    ///
    /// # Errors
    ///
    /// - `StreamChunk` if a chunk reported an error
    /// - `StreamTerminated` (or `DeadlineExceeded`) for a non-OK terminal
    ///   status
    /// - `ResponseTooLarge` if reading stopped at the byte limit
    #[allow(clippy::result_large_err)]
    pub fn into_result(self) -> Result<Self> {
        match &self.status {
            StreamStatus::Complete => Ok(self),
            StreamStatus::ChunkError { node, message } => Err(TalosError::remote(
                RemoteCallErrorKind::StreamChunk,
                match node {
                    Some(node) => format!("{node}: {message}"),
                    None => message.clone(),
                },
            )),
            StreamStatus::Terminated { code, message } => Err(TalosError::from_status(
                RemoteCallErrorKind::StreamTerminated,
                &Status::new(*code, message.clone()),
            )),
            StreamStatus::TooLarge { limit } => Err(TalosError::remote(
                RemoteCallErrorKind::ResponseTooLarge,
                format!("stream exceeded {limit} bytes"),
            )),
        }
    }
}

/// Read `stream` to its end, keeping at most `max_bytes` of data.
///
/// Metadata errors are recorded and reading continues; the first recorded
/// error is kept. A status error ends the stream, and so does data beyond
/// `max_bytes`.
pub async fn drain_stream<S>(mut stream: S, max_bytes: usize) -> StreamOutcome
where
    S: Stream<Item = std::result::Result<Data, Status>> + Unpin,
{
    let mut outcome = StreamOutcome {
        data: Vec::new(),
        chunks: 0,
        node: None,
        status: StreamStatus::Complete,
    };

    while let Some(item) = stream.next().await {
        let chunk = match item {
            Ok(chunk) => chunk,
            Err(status) if status.code() == tonic::Code::Ok => break,
            Err(status) => {
                if outcome.status == StreamStatus::Complete {
                    outcome.status = StreamStatus::Terminated {
                        code: status.code(),
                        message: status.message().to_string(),
                    };
                }
                break;
            }
        };
        outcome.chunks += 1;

        let (hostname, error) = chunk
            .metadata
            .map(|m| (m.hostname, m.error))
            .unwrap_or_default();
        let hostname = (!hostname.is_empty()).then_some(hostname);

        if !error.is_empty() {
            if outcome.status == StreamStatus::Complete {
                outcome.status = StreamStatus::ChunkError {
                    node: hostname,
                    message: error,
                };
            }
            continue;
        }

        if outcome.data.len().saturating_add(chunk.bytes.len()) > max_bytes {
            if outcome.status == StreamStatus::Complete {
                outcome.status = StreamStatus::TooLarge { limit: max_bytes };
            }
            break;
        }
        if outcome.node.is_none() {
            outcome.node = hostname;
        }
        outcome.data.extend_from_slice(&chunk.bytes);
    }

    outcome
}

/// One connection to one endpoint, able to bootstrap and retrieve
/// credentials.
pub struct Session<C = MachineServiceClient<Channel>> {
    control: C,
    config: SessionConfig,
    logging: LoggingConfig,
    target: Option<TargetAddress>,
    // Held so the channel lives exactly as long as the session.
    _transport: Option<Transport>,
}

impl Session {
    /// Open the mTLS transport and wrap it in a session.
    ///
    /// # Errors
    ///
    /// Returns the transport builder's `Connection` errors.
    pub async fn connect(credentials: &ConnectionCredentials, config: SessionConfig) -> Result<Self> {
        let transport = Transport::connect(credentials, &config).await?;
        let control = transport.machine();
        Ok(Self {
            control,
            config,
            logging: LoggingConfig::default(),
            target: Some(transport.target().clone()),
            _transport: Some(transport),
        })
    }
}

impl<C: ClusterControl> Session<C> {
    /// Wrap an already connected control service.
    pub fn with_control(control: C, config: SessionConfig) -> Self {
        Self {
            control,
            config,
            logging: LoggingConfig::default(),
            target: None,
            _transport: None,
        }
    }

    #[must_use]
    pub fn with_logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = logging;
        self
    }

    pub fn control(&self) -> &C {
        &self.control
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    fn endpoint_label(&self) -> String {
        self.target
            .as_ref()
            .map_or_else(|| "custom".to_string(), ToString::to_string)
    }

    /// Initialize the cluster, then retrieve its credentials.
    ///
    /// # Errors
    ///
    /// `RemoteCall/Bootstrap` if initialization is rejected; retrieval is
    /// not attempted in that case. Otherwise see
    /// [`Session::retrieve_credentials`].
    pub async fn bootstrap(&mut self) -> Result<CredentialBundle> {
        self.bootstrap_with(BootstrapOptions::default()).await
    }

    /// [`Session::bootstrap`] with explicit options.
    pub async fn bootstrap_with(&mut self, options: BootstrapOptions) -> Result<CredentialBundle> {
        let mut logger = StageLogger::new("bootstrap", self.logging.clone());
        let limit = self.config.request_timeout;
        let control = &mut self.control;

        let outcome = logger
            .stage(
                "bootstrap",
                with_deadline(limit, "bootstrap", async {
                    let response = control
                        .bootstrap(options.into())
                        .await
                        .map_err(|s| TalosError::from_status(RemoteCallErrorKind::Bootstrap, &s))?;
                    BootstrapOutcome::from_response(response)
                }),
            )
            .await;
        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(endpoint = %self.endpoint_label(), error = %err, "bootstrap rejected");
                logger.complete();
                return Err(err);
            }
        };
        info!(endpoint = %self.endpoint_label(), nodes = ?outcome.nodes, "cluster bootstrapped");

        let result = self.fetch_credentials(&mut logger).await;
        logger.complete();
        result
    }

    /// Stream the kubeconfig archive and parse the credentials out of it.
    ///
    /// # Errors
    ///
    /// - `RemoteCall` if the call fails, a chunk reports an error, the
    ///   stream terminates with an error or the request timeout elapses
    /// - `Archive` if the archive is malformed or has no kubeconfig entry
    /// - `Document` if the kubeconfig cannot be used
    pub async fn retrieve_credentials(&mut self) -> Result<CredentialBundle> {
        let mut logger = StageLogger::new("retrieve_credentials", self.logging.clone());
        let result = self.fetch_credentials(&mut logger).await;
        logger.complete();
        result
    }

    async fn fetch_credentials(&mut self, logger: &mut StageLogger) -> Result<CredentialBundle> {
        let limit = self.config.request_timeout;
        let max_bytes = self.config.max_archive_bytes;
        let control = &mut self.control;

        let outcome = logger
            .stage(
                "stream",
                with_deadline(limit, "kubeconfig", async {
                    let stream = control
                        .kubeconfig()
                        .await
                        .map_err(|s| TalosError::from_status(RemoteCallErrorKind::Kubeconfig, &s))?;
                    drain_stream(stream, max_bytes).await.into_result()
                }),
            )
            .await?;

        let entry = self.config.archive_entry.as_str();
        let raw = logger.stage_sync("extract", || {
            archive::extract_entry(outcome.data.as_slice(), entry)
        })?;

        let node = outcome.node;
        let bundle = logger.stage_sync("parse", || CredentialBundle::from_raw(raw, node))?;

        info!(
            endpoint = %self.endpoint_label(),
            id = %bundle.id(),
            chunks = outcome.chunks,
            bytes = bundle.raw().len(),
            client_key = %logger.describe_secret(bundle.client_key()),
            "credentials retrieved"
        );
        Ok(bundle)
    }
}

async fn with_deadline<T, F>(limit: Duration, call: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::time::timeout(limit, fut).await.map_err(|_| {
        TalosError::remote(
            RemoteCallErrorKind::DeadlineExceeded,
            format!("{call} did not finish within {limit:?}"),
        )
    })?
}

/// Connect, bootstrap the cluster and retrieve its credentials.
///
/// The transport is closed before this returns, on every path.
pub async fn bootstrap(
    credentials: &ConnectionCredentials,
    config: &SessionConfig,
) -> Result<CredentialBundle> {
    let mut session = Session::connect(credentials, config.clone()).await?;
    session.bootstrap().await
}

/// Connect and retrieve the credentials of an initialized cluster.
///
/// The transport is closed before this returns, on every path.
pub async fn retrieve_credentials(
    credentials: &ConnectionCredentials,
    config: &SessionConfig,
) -> Result<CredentialBundle> {
    let mut session = Session::connect(credentials, config.clone()).await?;
    session.retrieve_credentials().await
}
