// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session and generation settings with environment overrides.

use std::time::Duration;

use crate::error::{Result, TalosError};

/// Port of the Talos machine API (apid).
pub const APID_PORT: u16 = 50000;

/// Archive entry holding the kubeconfig document.
pub const KUBECONFIG_ENTRY: &str = "kubeconfig";

/// Largest kubeconfig archive a session reads before giving up.
pub const DEFAULT_MAX_ARCHIVE_BYTES: usize = 16 * 1024 * 1024;

pub const DEFAULT_KUBERNETES_VERSION: &str = "1.25.2";
pub const DEFAULT_INSTALL_DISK: &str = "/dev/sda";
pub const DEFAULT_DNS_DOMAIN: &str = "cluster.local";
pub const DEFAULT_INSTALLER_IMAGE_REPOSITORY: &str = "ghcr.io/siderolabs/installer";
pub const DEFAULT_TALOS_TAG: &str = "v1.2.5";

pub const ENV_CONNECT_TIMEOUT: &str = "TALOS_CONNECT_TIMEOUT_SECS";
pub const ENV_REQUEST_TIMEOUT: &str = "TALOS_REQUEST_TIMEOUT_SECS";
pub const ENV_APID_PORT: &str = "TALOS_APID_PORT";
pub const ENV_MAX_ARCHIVE_BYTES: &str = "TALOS_MAX_ARCHIVE_BYTES";
pub const ENV_DEFAULT_KUBERNETES_VERSION: &str = "TALOS_DEFAULT_KUBERNETES_VERSION";
pub const ENV_INSTALLER_IMAGE: &str = "TALOS_INSTALLER_IMAGE";

/// Settings for one bootstrap or kubeconfig session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Upper bound for establishing the mTLS transport.
    pub connect_timeout: Duration,
    /// Upper bound for the remote calls, including the stream read loop.
    pub request_timeout: Duration,
    /// Port used when the endpoint does not name one.
    pub port: u16,
    /// Name of the archive entry to extract.
    pub archive_entry: String,
    /// Compressed archive bytes accepted from the kubeconfig stream.
    pub max_archive_bytes: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            port: APID_PORT,
            archive_entry: KUBECONFIG_ENTRY.to_string(),
            max_archive_bytes: DEFAULT_MAX_ARCHIVE_BYTES,
        }
    }
}

impl SessionConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    #[must_use]
    pub fn with_max_archive_bytes(mut self, max_bytes: usize) -> Self {
        self.max_archive_bytes = max_bytes;
        self
    }

    /// Defaults overridden by `TALOS_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`TalosError::Config`] when a variable is set but malformed.
    #[allow(clippy::result_large_err)]
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`SessionConfig::from_env`] with an explicit variable source.
    #[allow(clippy::result_large_err)]
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(secs) = parse_var::<u64, _>(&lookup, ENV_CONNECT_TIMEOUT)? {
            config.connect_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, ENV_REQUEST_TIMEOUT)? {
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Some(port) = parse_var::<u16, _>(&lookup, ENV_APID_PORT)? {
            config.port = port;
        }
        if let Some(max_bytes) = parse_var::<usize, _>(&lookup, ENV_MAX_ARCHIVE_BYTES)? {
            config.max_archive_bytes = max_bytes;
        }
        Ok(config)
    }
}

/// Values applied by the option compiler when an input is unset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationDefaults {
    pub kubernetes_version: String,
    pub install_disk: String,
    pub dns_domain: String,
    pub installer_image_repository: String,
    pub talos_tag: String,
    /// Full installer image reference; wins over repository and tag.
    pub installer_image_override: Option<String>,
}

impl Default for GenerationDefaults {
    fn default() -> Self {
        Self {
            kubernetes_version: DEFAULT_KUBERNETES_VERSION.to_string(),
            install_disk: DEFAULT_INSTALL_DISK.to_string(),
            dns_domain: DEFAULT_DNS_DOMAIN.to_string(),
            installer_image_repository: DEFAULT_INSTALLER_IMAGE_REPOSITORY.to_string(),
            talos_tag: DEFAULT_TALOS_TAG.to_string(),
            installer_image_override: None,
        }
    }
}

impl GenerationDefaults {
    /// Installer image used when the inputs do not name one.
    #[must_use]
    pub fn default_install_image(&self) -> String {
        match &self.installer_image_override {
            Some(image) => image.clone(),
            None => format!("{}:{}", self.installer_image_repository, self.talos_tag),
        }
    }

    #[allow(clippy::result_large_err)]
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    #[allow(clippy::result_large_err)]
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut defaults = Self::default();
        if let Some(version) = lookup(ENV_DEFAULT_KUBERNETES_VERSION) {
            let version = version.trim().trim_start_matches('v').to_string();
            if version.is_empty() {
                return Err(TalosError::Config(format!(
                    "{ENV_DEFAULT_KUBERNETES_VERSION} is set but empty"
                )));
            }
            defaults.kubernetes_version = version;
        }
        if let Some(image) = lookup(ENV_INSTALLER_IMAGE) {
            if image.trim().is_empty() {
                return Err(TalosError::Config(format!(
                    "{ENV_INSTALLER_IMAGE} is set but empty"
                )));
            }
            defaults.installer_image_override = Some(image.trim().to_string());
        }
        Ok(defaults)
    }
}

#[allow(clippy::result_large_err)]
fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| TalosError::Config(format!("Invalid value {raw:?} for {key}: {e}")))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_session_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.port, 50000);
        assert_eq!(config.archive_entry, "kubeconfig");
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.max_archive_bytes, DEFAULT_MAX_ARCHIVE_BYTES);
    }

    #[test]
    fn test_session_env_overrides() {
        let config = SessionConfig::from_lookup(lookup(&[
            (ENV_CONNECT_TIMEOUT, "3"),
            (ENV_REQUEST_TIMEOUT, " 7 "),
            (ENV_APID_PORT, "50001"),
            (ENV_MAX_ARCHIVE_BYTES, "4096"),
        ]))
        .unwrap();
        assert_eq!(config.max_archive_bytes, 4096);
        assert_eq!(config.connect_timeout, Duration::from_secs(3));
        assert_eq!(config.request_timeout, Duration::from_secs(7));
        assert_eq!(config.port, 50001);
    }

    #[test]
    fn test_session_env_rejects_garbage() {
        let err = SessionConfig::from_lookup(lookup(&[(ENV_APID_PORT, "seventy")])).unwrap_err();
        assert!(matches!(err, TalosError::Config(msg) if msg.contains(ENV_APID_PORT)));
    }

    #[test]
    fn test_default_install_image() {
        let defaults = GenerationDefaults::default();
        assert_eq!(
            defaults.default_install_image(),
            "ghcr.io/siderolabs/installer:v1.2.5"
        );
    }

    #[test]
    fn test_generation_env_overrides() {
        let defaults = GenerationDefaults::from_lookup(lookup(&[
            (ENV_DEFAULT_KUBERNETES_VERSION, "v1.26.0"),
            (ENV_INSTALLER_IMAGE, "registry.local/installer:dev"),
        ]))
        .unwrap();
        assert_eq!(defaults.kubernetes_version, "1.26.0");
        assert_eq!(defaults.default_install_image(), "registry.local/installer:dev");
    }

    #[test]
    fn test_generation_env_rejects_empty() {
        let err =
            GenerationDefaults::from_lookup(lookup(&[(ENV_INSTALLER_IMAGE, "  ")])).unwrap_err();
        assert_eq!(err.category(), "config");
    }
}
