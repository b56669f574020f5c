// SPDX-License-Identifier: MIT OR Apache-2.0

//! Compiles [`GenerationInputs`] into generation directives.
//!
//! Directive order is fixed: registry mirrors (sorted by host), the version
//! contract, KubeSpan, then install disk, install image, extra SANs, DNS
//! domain, persistence and cluster discovery.

use std::fmt;

use crate::config::GenerationDefaults;
use crate::error::Result;
use crate::generate::contract::VersionContract;
use crate::generate::inputs::{GenerationInputs, PatchSet};

/// One instruction to the generation engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenOption {
    RegistryMirror { host: String, endpoint: String },
    VersionContract(VersionContract),
    NetworkKubeSpan,
    InstallDisk(String),
    InstallImage(String),
    AdditionalSubjectAltNames(Vec<String>),
    DnsDomain(String),
    Persist(bool),
    ClusterDiscovery(bool),
}

impl GenOption {
    /// Short directive name for logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::RegistryMirror { .. } => "registry-mirror",
            Self::VersionContract(_) => "version-contract",
            Self::NetworkKubeSpan => "kubespan",
            Self::InstallDisk(_) => "install-disk",
            Self::InstallImage(_) => "install-image",
            Self::AdditionalSubjectAltNames(_) => "additional-sans",
            Self::DnsDomain(_) => "dns-domain",
            Self::Persist(_) => "persist",
            Self::ClusterDiscovery(_) => "cluster-discovery",
        }
    }
}

impl fmt::Display for GenOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RegistryMirror { host, endpoint } => write!(f, "registry-mirror {host}={endpoint}"),
            Self::VersionContract(contract) => write!(f, "version-contract {contract}"),
            Self::NetworkKubeSpan => f.write_str("kubespan"),
            Self::InstallDisk(disk) => write!(f, "install-disk {disk}"),
            Self::InstallImage(image) => write!(f, "install-image {image}"),
            Self::AdditionalSubjectAltNames(sans) => write!(f, "additional-sans {}", sans.join(",")),
            Self::DnsDomain(domain) => write!(f, "dns-domain {domain}"),
            Self::Persist(persist) => write!(f, "persist {persist}"),
            Self::ClusterDiscovery(enabled) => write!(f, "cluster-discovery {enabled}"),
        }
    }
}

/// Directives plus everything else the engine needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledOptions {
    pub directives: Vec<GenOption>,
    pub cluster_name: String,
    pub cluster_endpoint: String,
    /// Without a leading `v`.
    pub kubernetes_version: String,
    pub patches: PatchSet,
}

impl CompiledOptions {
    /// Contract named by a directive, if any.
    #[must_use]
    pub fn contract(&self) -> Option<VersionContract> {
        self.directives.iter().find_map(|d| match d {
            GenOption::VersionContract(contract) => Some(*contract),
            _ => None,
        })
    }

    /// Mirror directives as `(host, endpoint)` pairs.
    pub fn mirrors(&self) -> impl Iterator<Item = (&str, &str)> {
        self.directives.iter().filter_map(|d| match d {
            GenOption::RegistryMirror { host, endpoint } => Some((host.as_str(), endpoint.as_str())),
            _ => None,
        })
    }
}

/// Turns inputs into directives, filling unset fields from its defaults.
#[derive(Debug, Clone, Default)]
pub struct OptionCompiler {
    defaults: GenerationDefaults,
}

impl OptionCompiler {
    #[must_use]
    pub fn new(defaults: GenerationDefaults) -> Self {
        Self { defaults }
    }

    #[must_use]
    pub fn defaults(&self) -> &GenerationDefaults {
        &self.defaults
    }

    /// Compile `inputs`.
    ///
    /// # Errors
    ///
    /// Returns `VersionSelector` if the Talos version selector does not
    /// parse. Nothing else is compiled in that case.
    #[allow(clippy::result_large_err)]
    pub fn compile(&self, inputs: &GenerationInputs) -> Result<CompiledOptions> {
        let contract = inputs
            .talos_version
            .as_deref()
            .map(VersionContract::parse)
            .transpose()?;

        let mut directives: Vec<GenOption> = inputs
            .registry_mirrors
            .iter()
            .map(|(host, endpoint)| GenOption::RegistryMirror {
                host: host.clone(),
                endpoint: endpoint.clone(),
            })
            .collect();

        if let Some(contract) = contract {
            directives.push(GenOption::VersionContract(contract));
        }
        if inputs.kubespan.unwrap_or(false) {
            directives.push(GenOption::NetworkKubeSpan);
        }

        let defaults = &self.defaults;
        directives.extend([
            GenOption::InstallDisk(
                inputs
                    .install_disk
                    .clone()
                    .unwrap_or_else(|| defaults.install_disk.clone()),
            ),
            GenOption::InstallImage(
                inputs
                    .install_image
                    .clone()
                    .unwrap_or_else(|| defaults.default_install_image()),
            ),
            GenOption::AdditionalSubjectAltNames(inputs.additional_sans.clone()),
            GenOption::DnsDomain(
                inputs
                    .dns_domain
                    .clone()
                    .unwrap_or_else(|| defaults.dns_domain.clone()),
            ),
            GenOption::Persist(inputs.persist.unwrap_or(true)),
            GenOption::ClusterDiscovery(inputs.cluster_discovery.unwrap_or(true)),
        ]);

        let kubernetes_version = inputs
            .kubernetes_version
            .as_deref()
            .unwrap_or(&defaults.kubernetes_version)
            .trim()
            .trim_start_matches('v')
            .to_string();

        Ok(CompiledOptions {
            directives,
            cluster_name: inputs.cluster_name.clone(),
            cluster_endpoint: inputs.cluster_endpoint.clone(),
            kubernetes_version,
            patches: inputs.patches.clone(),
        })
    }
}
