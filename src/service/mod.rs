// SPDX-License-Identifier: MIT OR Apache-2.0

//! One entry point per use case.
//!
//! A host that drives resources through a create/read/update/delete
//! lifecycle maps each resource to one [`Operation`] and persists the
//! [`OperationOutput`]. Nothing here retries; retry policy belongs to the
//! host.
//!
//! # Example
//!
//! ```no_run
//! use talos_bootstrap::client::ConnectionCredentials;
//! use talos_bootstrap::generate::GenerationInputs;
//! use talos_bootstrap::service::{Operation, OperationOutput, Provisioner};
//!
//! # async fn example() -> Result<(), talos_bootstrap::TalosError> {
//! let provisioner = Provisioner::from_env()?;
//!
//! let inputs = GenerationInputs::builder("demo", "https://10.0.0.1:6443").build()?;
//! let configs = provisioner.generate_config(&inputs)?;
//!
//! let credentials = ConnectionCredentials::new(
//!     "10.0.0.2",
//!     std::fs::read("ca.crt").unwrap_or_default(),
//!     std::fs::read("admin.crt").unwrap_or_default(),
//!     std::fs::read("admin.key").unwrap_or_default(),
//! )?;
//! match provisioner.invoke(Operation::Bootstrap(credentials)).await? {
//!     OperationOutput::Credentials(bundle) => println!("kubeconfig {}", bundle.id()),
//!     OperationOutput::Config(_) => unreachable!(),
//! }
//! # let _ = configs;
//! # Ok(())
//! # }
//! ```

use tracing::debug;

use crate::client::ConnectionCredentials;
use crate::config::{GenerationDefaults, SessionConfig};
use crate::error::Result;
use crate::generate::{BundleSynthesizer, ConfigBundle, GenerationInputs};
use crate::resources::{BootstrapOptions, CredentialBundle};
use crate::runtime::LoggingConfig;
use crate::session::Session;

/// A single use case with its inputs.
#[derive(Debug, Clone)]
pub enum Operation {
    /// Initialize the cluster, then retrieve its kubeconfig.
    Bootstrap(ConnectionCredentials),
    /// Retrieve the kubeconfig of an initialized cluster.
    RetrieveCredentials(ConnectionCredentials),
    /// Synthesize control-plane, worker and client configs.
    GenerateConfig(GenerationInputs),
}

impl Operation {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Bootstrap(_) => "bootstrap",
            Self::RetrieveCredentials(_) => "retrieve_credentials",
            Self::GenerateConfig(_) => "generate_config",
        }
    }
}

/// Result of an [`Operation`].
#[derive(Debug, Clone)]
pub enum OperationOutput {
    Credentials(CredentialBundle),
    Config(ConfigBundle),
}

impl OperationOutput {
    #[must_use]
    pub fn credentials(&self) -> Option<&CredentialBundle> {
        match self {
            Self::Credentials(bundle) => Some(bundle),
            Self::Config(_) => None,
        }
    }

    #[must_use]
    pub fn config(&self) -> Option<&ConfigBundle> {
        match self {
            Self::Config(bundle) => Some(bundle),
            Self::Credentials(_) => None,
        }
    }

    /// External identifier of the produced state.
    #[must_use]
    pub fn id(&self) -> String {
        match self {
            Self::Credentials(bundle) => bundle.id(),
            Self::Config(bundle) => bundle.id.clone(),
        }
    }
}

/// Runs operations with shared session settings and generation defaults.
#[derive(Debug, Clone, Default)]
pub struct Provisioner {
    session: SessionConfig,
    synthesizer: BundleSynthesizer,
    logging: LoggingConfig,
    bootstrap: BootstrapOptions,
}

impl Provisioner {
    #[must_use]
    pub fn new(session: SessionConfig, defaults: GenerationDefaults) -> Self {
        Self {
            session,
            synthesizer: BundleSynthesizer::with_defaults(defaults),
            logging: LoggingConfig::default(),
            bootstrap: BootstrapOptions::default(),
        }
    }

    /// Settings and defaults from the environment.
    ///
    /// # Errors
    ///
    /// Returns `Config` if a variable is set but malformed.
    #[allow(clippy::result_large_err)]
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(
            SessionConfig::from_env()?,
            GenerationDefaults::from_env()?,
        ))
    }

    #[must_use]
    pub fn with_logging(mut self, logging: LoggingConfig) -> Self {
        self.synthesizer = self.synthesizer.with_logging(logging.clone());
        self.logging = logging;
        self
    }

    /// Options sent with every bootstrap call.
    #[must_use]
    pub fn with_bootstrap_options(mut self, options: BootstrapOptions) -> Self {
        self.bootstrap = options;
        self
    }

    #[must_use]
    pub fn session_config(&self) -> &SessionConfig {
        &self.session
    }

    #[must_use]
    pub fn generation_defaults(&self) -> &GenerationDefaults {
        self.synthesizer.compiler().defaults()
    }

    /// Connect, bootstrap and retrieve the kubeconfig.
    ///
    /// # Errors
    ///
    /// See [`Session::connect`] and [`Session::bootstrap`].
    pub async fn bootstrap(&self, credentials: &ConnectionCredentials) -> Result<CredentialBundle> {
        let mut session = Session::connect(credentials, self.session.clone())
            .await?
            .with_logging(self.logging.clone());
        session.bootstrap_with(self.bootstrap).await
    }

    /// Connect and retrieve the kubeconfig.
    ///
    /// # Errors
    ///
    /// See [`Session::connect`] and [`Session::retrieve_credentials`].
    pub async fn retrieve_credentials(
        &self,
        credentials: &ConnectionCredentials,
    ) -> Result<CredentialBundle> {
        let mut session = Session::connect(credentials, self.session.clone())
            .await?
            .with_logging(self.logging.clone());
        session.retrieve_credentials().await
    }

    /// Synthesize a config bundle.
    ///
    /// # Errors
    ///
    /// See [`BundleSynthesizer::synthesize`].
    #[allow(clippy::result_large_err)]
    pub fn generate_config(&self, inputs: &GenerationInputs) -> Result<ConfigBundle> {
        self.synthesizer.synthesize(inputs)
    }

    /// Run one operation.
    ///
    /// # Errors
    ///
    /// Whatever the selected operation returns.
    pub async fn invoke(&self, operation: Operation) -> Result<OperationOutput> {
        debug!(operation = operation.name(), "Invoking operation");
        match operation {
            Operation::Bootstrap(credentials) => self
                .bootstrap(&credentials)
                .await
                .map(OperationOutput::Credentials),
            Operation::RetrieveCredentials(credentials) => self
                .retrieve_credentials(&credentials)
                .await
                .map(OperationOutput::Credentials),
            Operation::GenerateConfig(inputs) => {
                self.generate_config(&inputs).map(OperationOutput::Config)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TalosConfig;
    use crate::testkit::CertFixture;
    use std::time::Duration;

    fn inputs() -> GenerationInputs {
        GenerationInputs::builder("test", "https://10.0.0.1:6443")
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_invoke_generate_config() {
        let provisioner = Provisioner::default();
        let output = provisioner
            .invoke(Operation::GenerateConfig(inputs()))
            .await
            .unwrap();

        let bundle = output.config().unwrap();
        assert!(output.credentials().is_none());
        assert_eq!(output.id(), bundle.id);
        assert!(TalosConfig::from_yaml(&bundle.talosconfig).is_ok());
    }

    #[test]
    fn test_defaults_flow_into_generation() {
        let defaults = GenerationDefaults {
            install_disk: "/dev/vda".to_string(),
            ..GenerationDefaults::default()
        };
        let provisioner = Provisioner::new(SessionConfig::default(), defaults);
        assert_eq!(provisioner.generation_defaults().install_disk, "/dev/vda");

        let bundle = provisioner.generate_config(&inputs()).unwrap();
        assert!(bundle.control_plane.contains("disk: /dev/vda"));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_connection_error() {
        let fixture = CertFixture::mint().unwrap();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let credentials = ConnectionCredentials::new(
            addr.to_string(),
            fixture.ca_pem.clone(),
            fixture.client_cert_pem.clone(),
            fixture.client_key_pem.clone(),
        )
        .unwrap();
        let provisioner = Provisioner::new(
            SessionConfig::default().with_connect_timeout(Duration::from_secs(2)),
            GenerationDefaults::default(),
        );

        for operation in [
            Operation::Bootstrap(credentials.clone()),
            Operation::RetrieveCredentials(credentials),
        ] {
            let name = operation.name();
            let err = provisioner.invoke(operation).await.unwrap_err();
            assert!(
                err.category().starts_with("connection/"),
                "{name}: {}",
                err.category()
            );
        }
    }
}
