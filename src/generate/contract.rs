// SPDX-License-Identifier: MIT OR Apache-2.0

//! Version compatibility contract.
//!
//! A contract pins generation to what a given Talos release understands.
//! Only the major and minor components matter; anything after a dot that
//! follows the minor component is ignored.

use std::fmt;

use crate::error::{Result, TalosError};

/// Major/minor version a generated config must stay compatible with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VersionContract {
    pub major: u32,
    pub minor: u32,
}

impl VersionContract {
    /// Contract used when no selector is given.
    pub const CURRENT: Self = Self::new(1, 2);

    #[must_use]
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// Parse `[v]MAJOR.MINOR` optionally followed by `.` and anything.
    ///
    /// Whatever follows the minor component must start with a dot and is
    /// ignored, so `v1.2.3-beta.0` and `1.2.x` both select `v1.2` while
    /// `v1.2-beta` is rejected.
    ///
    /// # Errors
    ///
    /// Returns [`TalosError::VersionSelector`] for anything else.
    ///
    /// # Example
    ///
    /// ```
    /// use talos_bootstrap::generate::VersionContract;
    ///
    /// let contract = VersionContract::parse("v0.8").unwrap();
    /// assert_eq!(contract, VersionContract::new(0, 8));
    /// assert_eq!(VersionContract::parse("1.2.3-beta.0").unwrap().to_string(), "v1.2");
    /// assert!(VersionContract::parse("not-a-version").is_err());
    /// ```
    #[allow(clippy::result_large_err)]
    pub fn parse(selector: &str) -> Result<Self> {
        let invalid = || TalosError::VersionSelector {
            selector: selector.to_string(),
            message: "expected vMAJOR.MINOR".to_string(),
        };

        let version = selector.strip_prefix('v').unwrap_or(selector);
        let (major, rest) = version.split_once('.').ok_or_else(invalid)?;
        let minor = rest.split_once('.').map_or(rest, |(minor, _)| minor);

        let major = parse_component(major).ok_or_else(invalid)?;
        let minor = parse_component(minor).ok_or_else(invalid)?;
        Ok(Self::new(major, minor))
    }

    #[must_use]
    pub fn greater_or_equal(&self, major: u32, minor: u32) -> bool {
        *self >= Self::new(major, minor)
    }

    /// Cluster membership discovery.
    #[must_use]
    pub fn supports_cluster_discovery(&self) -> bool {
        self.greater_or_equal(0, 13)
    }

    #[must_use]
    pub fn supports_kubespan(&self) -> bool {
        self.greater_or_equal(0, 13)
    }

    #[must_use]
    pub fn supports_rbac_feature(&self) -> bool {
        self.greater_or_equal(0, 11)
    }

    /// Aggregator CA and service account key in the cluster secrets.
    #[must_use]
    pub fn supports_aggregator_ca(&self) -> bool {
        self.greater_or_equal(0, 8)
    }

    /// Secretbox replaces AES-CBC for secrets encryption at rest.
    #[must_use]
    pub fn supports_secretbox_encryption(&self) -> bool {
        self.greater_or_equal(0, 9)
    }

    #[must_use]
    pub fn supports_pod_security_admission(&self) -> bool {
        self.greater_or_equal(1, 0)
    }
}

impl Default for VersionContract {
    fn default() -> Self {
        Self::CURRENT
    }
}

impl fmt::Display for VersionContract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}.{}", self.major, self.minor)
    }
}

fn parse_component(part: &str) -> Option<u32> {
    if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    part.parse().ok()
}
