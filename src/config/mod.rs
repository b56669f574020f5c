// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration for sessions, config generation, and the talosconfig
//! client document.
//!
//! # Environment Variables
//!
//! The following environment variables are supported:
//!
//! - `TALOS_CONNECT_TIMEOUT_SECS` - Transport connect timeout (default: 10)
//! - `TALOS_REQUEST_TIMEOUT_SECS` - Remote call timeout (default: 30)
//! - `TALOS_APID_PORT` - Port used when the endpoint has none (default: 50000)
//! - `TALOS_DEFAULT_KUBERNETES_VERSION` - Kubernetes version used when unset
//! - `TALOS_INSTALLER_IMAGE` - Installer image used when unset
//!
//! # Example
//!
//! ```no_run
//! use talos_bootstrap::config::SessionConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SessionConfig::from_env()?;
//! println!("connect timeout: {:?}", config.connect_timeout);
//! # Ok(())
//! # }
//! ```

mod settings;
mod talosconfig;

pub use settings::{
    GenerationDefaults, SessionConfig, APID_PORT, DEFAULT_DNS_DOMAIN,
    DEFAULT_INSTALLER_IMAGE_REPOSITORY, DEFAULT_INSTALL_DISK, DEFAULT_KUBERNETES_VERSION,
    DEFAULT_MAX_ARCHIVE_BYTES, DEFAULT_TALOS_TAG, ENV_APID_PORT, ENV_CONNECT_TIMEOUT,
    ENV_DEFAULT_KUBERNETES_VERSION, ENV_INSTALLER_IMAGE, ENV_MAX_ARCHIVE_BYTES, ENV_REQUEST_TIMEOUT,
    KUBECONFIG_ENTRY,
};
pub use talosconfig::{TalosConfig, TalosContext};
