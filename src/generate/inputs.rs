// SPDX-License-Identifier: MIT OR Apache-2.0

//! Declarative inputs for config generation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TalosError};

/// Free-form patches grouped by the machines they target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatchSet {
    /// Applied to control-plane and worker documents.
    pub all: Vec<String>,
    pub control_plane: Vec<String>,
    pub worker: Vec<String>,
}

impl PatchSet {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.all.is_empty() && self.control_plane.is_empty() && self.worker.is_empty()
    }
}

/// Everything a caller can say about the cluster to generate.
///
/// Unset optional fields are filled in by the option compiler from
/// [`GenerationDefaults`](crate::config::GenerationDefaults).
///
/// # Example
///
/// ```
/// use talos_bootstrap::generate::GenerationInputs;
///
/// let inputs = GenerationInputs::builder("demo", "https://10.0.0.1:6443")
///     .talos_version("v1.2")
///     .registry_mirror("docker.io", "https://mirror.local")
///     .kubespan(true)
///     .build()
///     .unwrap();
/// assert_eq!(inputs.registry_mirrors.len(), 1);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationInputs {
    pub cluster_name: String,
    /// Kubernetes API endpoint, `https://host:port`.
    pub cluster_endpoint: String,
    pub kubernetes_version: Option<String>,
    /// Compatibility selector such as `v0.8`.
    pub talos_version: Option<String>,
    pub install_disk: Option<String>,
    pub install_image: Option<String>,
    pub dns_domain: Option<String>,
    pub persist: Option<bool>,
    pub cluster_discovery: Option<bool>,
    pub kubespan: Option<bool>,
    /// Kept in order, duplicates included.
    pub additional_sans: Vec<String>,
    /// Registry host to mirror URL.
    pub registry_mirrors: BTreeMap<String, String>,
    pub patches: PatchSet,
}

impl GenerationInputs {
    #[must_use]
    pub fn builder(
        cluster_name: impl Into<String>,
        cluster_endpoint: impl Into<String>,
    ) -> GenerationInputsBuilder {
        GenerationInputsBuilder {
            inputs: GenerationInputs {
                cluster_name: cluster_name.into(),
                cluster_endpoint: cluster_endpoint.into(),
                ..Default::default()
            },
        }
    }

    /// Parse inputs from a YAML record, then validate them.
    ///
    /// # Errors
    ///
    /// `Config` for unparseable YAML, otherwise see [`GenerationInputs::validate`].
    #[allow(clippy::result_large_err)]
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let inputs: Self = serde_yaml::from_str(yaml)
            .map_err(|e| TalosError::Config(format!("Failed to parse generation inputs: {e}")))?;
        inputs.validate()?;
        Ok(inputs)
    }

    /// Structural checks at the boundary.
    ///
    /// # Errors
    ///
    /// Returns [`TalosError::Validation`] when the cluster name is empty or
    /// the endpoint is not an `https://` URL with a host.
    #[allow(clippy::result_large_err)]
    pub fn validate(&self) -> Result<()> {
        if self.cluster_name.trim().is_empty() {
            return Err(TalosError::Validation(
                "cluster_name must not be empty".to_string(),
            ));
        }
        if self.cluster_endpoint.trim().is_empty() {
            return Err(TalosError::Validation(
                "cluster_endpoint must not be empty".to_string(),
            ));
        }
        endpoint_host(&self.cluster_endpoint)?;

        if let Some((host, _)) = self
            .registry_mirrors
            .iter()
            .find(|(host, url)| host.trim().is_empty() || url.trim().is_empty())
        {
            return Err(TalosError::Validation(format!(
                "registry mirror {host:?} needs both a host and a URL"
            )));
        }
        Ok(())
    }

    /// Host part of the cluster endpoint.
    #[allow(clippy::result_large_err)]
    pub fn endpoint_host(&self) -> Result<String> {
        endpoint_host(&self.cluster_endpoint)
    }
}

#[allow(clippy::result_large_err)]
fn endpoint_host(endpoint: &str) -> Result<String> {
    let url = url::Url::parse(endpoint.trim()).map_err(|e| {
        TalosError::Validation(format!("cluster_endpoint {endpoint:?} is not a URL: {e}"))
    })?;
    if url.scheme() != "https" {
        return Err(TalosError::Validation(format!(
            "cluster_endpoint {endpoint:?} must use https"
        )));
    }
    url.host_str()
        .filter(|h| !h.is_empty())
        .map(|h| h.trim_start_matches('[').trim_end_matches(']').to_string())
        .ok_or_else(|| TalosError::Validation(format!("cluster_endpoint {endpoint:?} has no host")))
}

/// Builder for [`GenerationInputs`].
#[derive(Debug, Clone)]
pub struct GenerationInputsBuilder {
    inputs: GenerationInputs,
}

impl GenerationInputsBuilder {
    #[must_use]
    pub fn kubernetes_version(mut self, version: impl Into<String>) -> Self {
        self.inputs.kubernetes_version = Some(version.into());
        self
    }

    #[must_use]
    pub fn talos_version(mut self, selector: impl Into<String>) -> Self {
        self.inputs.talos_version = Some(selector.into());
        self
    }

    #[must_use]
    pub fn install_disk(mut self, disk: impl Into<String>) -> Self {
        self.inputs.install_disk = Some(disk.into());
        self
    }

    #[must_use]
    pub fn install_image(mut self, image: impl Into<String>) -> Self {
        self.inputs.install_image = Some(image.into());
        self
    }

    #[must_use]
    pub fn dns_domain(mut self, domain: impl Into<String>) -> Self {
        self.inputs.dns_domain = Some(domain.into());
        self
    }

    #[must_use]
    pub fn persist(mut self, persist: bool) -> Self {
        self.inputs.persist = Some(persist);
        self
    }

    #[must_use]
    pub fn cluster_discovery(mut self, enabled: bool) -> Self {
        self.inputs.cluster_discovery = Some(enabled);
        self
    }

    #[must_use]
    pub fn kubespan(mut self, enabled: bool) -> Self {
        self.inputs.kubespan = Some(enabled);
        self
    }

    #[must_use]
    pub fn additional_san(mut self, san: impl Into<String>) -> Self {
        self.inputs.additional_sans.push(san.into());
        self
    }

    /// Add a mirror; a repeated host replaces the earlier URL.
    #[must_use]
    pub fn registry_mirror(mut self, host: impl Into<String>, url: impl Into<String>) -> Self {
        self.inputs.registry_mirrors.insert(host.into(), url.into());
        self
    }

    #[must_use]
    pub fn patch_all(mut self, patch: impl Into<String>) -> Self {
        self.inputs.patches.all.push(patch.into());
        self
    }

    #[must_use]
    pub fn patch_control_plane(mut self, patch: impl Into<String>) -> Self {
        self.inputs.patches.control_plane.push(patch.into());
        self
    }

    #[must_use]
    pub fn patch_worker(mut self, patch: impl Into<String>) -> Self {
        self.inputs.patches.worker.push(patch.into());
        self
    }

    /// Validate and return the inputs.
    ///
    /// # Errors
    ///
    /// See [`GenerationInputs::validate`].
    #[allow(clippy::result_large_err)]
    pub fn build(self) -> Result<GenerationInputs> {
        self.inputs.validate()?;
        Ok(self.inputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_collects_fields() {
        let inputs = GenerationInputs::builder("test", "https://10.0.0.1:6443")
            .additional_san("10.0.0.1")
            .additional_san("10.0.0.1")
            .registry_mirror("ghcr.io", "https://a")
            .registry_mirror("docker.io", "https://b")
            .patch_all("machine: {}")
            .patch_worker("@worker.yaml")
            .persist(false)
            .build()
            .unwrap();

        assert_eq!(inputs.additional_sans, vec!["10.0.0.1", "10.0.0.1"]);
        let hosts: Vec<_> = inputs.registry_mirrors.keys().cloned().collect();
        assert_eq!(hosts, vec!["docker.io", "ghcr.io"]);
        assert_eq!(inputs.patches.all.len(), 1);
        assert_eq!(inputs.patches.worker, vec!["@worker.yaml"]);
        assert!(inputs.patches.control_plane.is_empty());
        assert_eq!(inputs.persist, Some(false));
        assert_eq!(inputs.kubespan, None);
    }

    #[test]
    fn test_validation_failures() {
        let cases = [
            ("", "https://10.0.0.1:6443"),
            ("test", ""),
            ("test", "10.0.0.1:6443"),
            ("test", "http://10.0.0.1:6443"),
            ("test", "https://"),
        ];
        for (name, endpoint) in cases {
            let err = GenerationInputs::builder(name, endpoint).build().unwrap_err();
            assert_eq!(err.category(), "validation", "{name:?} {endpoint:?}");
        }

        let err = GenerationInputs::builder("test", "https://10.0.0.1:6443")
            .registry_mirror("docker.io", " ")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("docker.io"));
    }

    #[test]
    fn test_endpoint_host() {
        let inputs = GenerationInputs::builder("test", "https://cp.example.com:6443")
            .build()
            .unwrap();
        assert_eq!(inputs.endpoint_host().unwrap(), "cp.example.com");

        let inputs = GenerationInputs::builder("test", "https://[fd00::1]:6443")
            .build()
            .unwrap();
        assert_eq!(inputs.endpoint_host().unwrap(), "fd00::1");
    }

    #[test]
    fn test_from_yaml() {
        let inputs = GenerationInputs::from_yaml(
            r#"
cluster_name: demo
cluster_endpoint: https://10.0.0.1:6443
talos_version: v0.8
registry_mirrors:
  docker.io: https://mirror.local
patches:
  control_plane:
    - "cluster: {allowSchedulingOnControlPlanes: true}"
"#,
        )
        .unwrap();
        assert_eq!(inputs.talos_version.as_deref(), Some("v0.8"));
        assert_eq!(inputs.patches.control_plane.len(), 1);
        assert!(inputs.patches.all.is_empty());

        let err = GenerationInputs::from_yaml("cluster_name: [").unwrap_err();
        assert_eq!(err.category(), "config");
    }
}
