// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed wrappers for the cluster initialization call.
//!
//! Bootstrap initializes etcd on the first control-plane node. The call is
//! issued exactly once per session and never retried here.

use crate::api::machine::{BootstrapRequest as ProtoRequest, BootstrapResponse as ProtoResponse};
use crate::error::{RemoteCallErrorKind, Result, TalosError};

/// Options for the cluster initialization call.
///
/// The default is a plain bootstrap of a new cluster.
///
/// # Example
///
/// ```
/// use talos_bootstrap::resources::BootstrapOptions;
///
/// let fresh = BootstrapOptions::default();
/// assert!(!fresh.recover_etcd);
///
/// let recovery = BootstrapOptions::recovery();
/// assert!(recovery.recover_etcd);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BootstrapOptions {
    /// Recover etcd from a previously uploaded snapshot.
    pub recover_etcd: bool,
    /// Skip the snapshot hash check when recovering.
    pub recover_skip_hash_check: bool,
}

impl BootstrapOptions {
    /// Recover etcd from an uploaded snapshot.
    #[must_use]
    pub fn recovery() -> Self {
        Self {
            recover_etcd: true,
            recover_skip_hash_check: false,
        }
    }

    #[must_use]
    pub fn skip_hash_check(mut self) -> Self {
        self.recover_skip_hash_check = true;
        self
    }
}

impl From<BootstrapOptions> for ProtoRequest {
    fn from(options: BootstrapOptions) -> Self {
        ProtoRequest {
            recover_etcd: options.recover_etcd,
            recover_skip_hash_check: options.recover_skip_hash_check,
        }
    }
}

/// Nodes that acknowledged the initialization call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootstrapOutcome {
    pub nodes: Vec<String>,
}

impl BootstrapOutcome {
    /// Convert the wire response, failing if any node reported an error.
    ///
    /// Responses proxied through apid carry per-node errors in metadata
    /// instead of a failed status.
    #[allow(clippy::result_large_err)]
    pub fn from_response(response: ProtoResponse) -> Result<Self> {
        let mut nodes = Vec::with_capacity(response.messages.len());
        for message in response.messages {
            let Some(metadata) = message.metadata else {
                continue;
            };
            if !metadata.error.is_empty() {
                let node = if metadata.hostname.is_empty() {
                    "unknown node".to_string()
                } else {
                    metadata.hostname
                };
                return Err(TalosError::remote(
                    RemoteCallErrorKind::Bootstrap,
                    format!("{node}: {}", metadata.error),
                ));
            }
            if !metadata.hostname.is_empty() {
                nodes.push(metadata.hostname);
            }
        }
        Ok(Self { nodes })
    }
}
