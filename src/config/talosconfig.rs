// SPDX-License-Identifier: MIT OR Apache-2.0

//! Talos client configuration document (talosconfig)
//!
//! This is the client-access document produced by config generation. It
//! holds one context per cluster with the endpoints to talk to and the
//! base64-encoded PEM material for mutual TLS.
//!
//! # Example
//!
//! ```
//! use talos_bootstrap::config::{TalosConfig, TalosContext};
//!
//! let context = TalosContext::new(vec!["10.0.0.2".to_string()])
//!     .with_credentials(b"ca-pem", b"crt-pem", b"key-pem");
//! let config = TalosConfig::single("my-cluster", context);
//!
//! let yaml = config.to_yaml().unwrap();
//! let parsed = TalosConfig::from_yaml(&yaml).unwrap();
//! assert_eq!(parsed, config);
//! ```

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::error::{Result, TalosError};

/// Represents the entire talosctl configuration file structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TalosConfig {
    /// The currently active context name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,

    /// Map of context names to their configurations
    pub contexts: BTreeMap<String, TalosContext>,
}

/// Configuration for a single Talos cluster context
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TalosContext {
    /// List of control plane endpoints (IP addresses or DNS names)
    pub endpoints: Vec<String>,

    /// Optional list of specific node targets
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nodes: Option<Vec<String>>,

    /// CA certificate, base64-encoded PEM
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca: Option<String>,

    /// Client certificate, base64-encoded PEM
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crt: Option<String>,

    /// Client private key, base64-encoded PEM
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

impl TalosConfig {
    /// Build a config with a single context that is also the active one.
    #[must_use]
    pub fn single(name: impl Into<String>, context: TalosContext) -> Self {
        let name = name.into();
        let mut contexts = BTreeMap::new();
        contexts.insert(name.clone(), context);
        Self {
            context: Some(name),
            contexts,
        }
    }

    /// Load configuration from a specific path
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file cannot be read
    /// - The file is malformed YAML
    #[allow(clippy::result_large_err)]
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            TalosError::Config(format!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;

        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML string
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is malformed
    #[allow(clippy::result_large_err)]
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| TalosError::Config(format!("Failed to parse config YAML: {}", e)))
    }

    /// Serialize to the canonical YAML form.
    ///
    /// # Errors
    ///
    /// Returns the serializer's message if encoding fails.
    pub fn to_yaml(&self) -> std::result::Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    /// Get the currently active context
    ///
    /// # Returns
    ///
    /// Returns `None` if no active context is set or if the context doesn't exist
    pub fn active_context(&self) -> Option<&TalosContext> {
        self.context
            .as_ref()
            .and_then(|name| self.contexts.get(name))
    }

    /// Get a context by name
    pub fn get_context(&self, name: &str) -> Option<&TalosContext> {
        self.contexts.get(name)
    }
}

impl TalosContext {
    /// Create a context without credentials.
    #[must_use]
    pub fn new(endpoints: Vec<String>) -> Self {
        Self {
            endpoints,
            nodes: None,
            ca: None,
            crt: None,
            key: None,
        }
    }

    /// Attach PEM credentials, stored base64-encoded.
    #[must_use]
    pub fn with_credentials(mut self, ca_pem: &[u8], crt_pem: &[u8], key_pem: &[u8]) -> Self {
        self.ca = Some(STANDARD.encode(ca_pem));
        self.crt = Some(STANDARD.encode(crt_pem));
        self.key = Some(STANDARD.encode(key_pem));
        self
    }

    /// Restrict the context to specific nodes.
    #[must_use]
    pub fn with_nodes(mut self, nodes: Vec<String>) -> Self {
        self.nodes = Some(nodes);
        self
    }

    /// Get the first endpoint, if any
    pub fn first_endpoint(&self) -> Option<&String> {
        self.endpoints.first()
    }

    /// Decoded CA certificate PEM.
    ///
    /// # Errors
    ///
    /// Returns an error if the field is present but not valid base64.
    #[allow(clippy::result_large_err)]
    pub fn ca_pem(&self) -> Result<Option<Vec<u8>>> {
        decode_field("ca", self.ca.as_deref())
    }

    /// Decoded client certificate PEM.
    #[allow(clippy::result_large_err)]
    pub fn crt_pem(&self) -> Result<Option<Vec<u8>>> {
        decode_field("crt", self.crt.as_deref())
    }

    /// Decoded client key PEM.
    #[allow(clippy::result_large_err)]
    pub fn key_pem(&self) -> Result<Option<Vec<u8>>> {
        decode_field("key", self.key.as_deref())
    }
}

#[allow(clippy::result_large_err)]
fn decode_field(name: &str, value: Option<&str>) -> Result<Option<Vec<u8>>> {
    value
        .map(|encoded| {
            STANDARD
                .decode(encoded.trim())
                .map_err(|e| TalosError::Config(format!("Invalid base64 in context {name}: {e}")))
        })
        .transpose()
}
