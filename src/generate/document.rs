// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed subset of the v1alpha1 machine config document.
//!
//! Only the fields generation fills in are modelled. Patches operate on the
//! serialized YAML value, so anything outside this subset can still be set
//! by a patch.

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::generate::contract::VersionContract;
use crate::generate::secrets::{CertificateAndKey, SecretsBundle};

pub const CONFIG_VERSION: &str = "v1alpha1";
pub const KUBERNETES_IMAGE_REPOSITORY: &str = "registry.k8s.io";
pub const KUBELET_IMAGE_REPOSITORY: &str = "ghcr.io/siderolabs/kubelet";
pub const DEFAULT_POD_SUBNET: &str = "10.244.0.0/16";
pub const DEFAULT_SERVICE_SUBNET: &str = "10.96.0.0/12";

/// Resolved generation settings, one value per directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blueprint {
    pub contract: VersionContract,
    pub cluster_name: String,
    pub cluster_endpoint: String,
    pub endpoint_host: String,
    /// Without a leading `v`.
    pub kubernetes_version: String,
    pub install_disk: String,
    pub install_image: String,
    pub additional_sans: Vec<String>,
    pub dns_domain: String,
    pub persist: bool,
    pub cluster_discovery: bool,
    pub kubespan: bool,
    /// Registry host to mirror endpoints.
    pub mirrors: BTreeMap<String, Vec<String>>,
}

impl Blueprint {
    fn kubernetes_image(&self, component: &str) -> String {
        format!(
            "{KUBERNETES_IMAGE_REPOSITORY}/{component}:v{}",
            self.kubernetes_version
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MachineType {
    ControlPlane,
    Worker,
}

/// Base64-encoded PEM certificate and, on control planes, its key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PemEncoded {
    pub crt: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub key: String,
}

impl PemEncoded {
    fn full(pair: &CertificateAndKey) -> Self {
        Self {
            crt: pair.crt_base64(),
            key: pair.key_base64(),
        }
    }

    fn certificate_only(pair: &CertificateAndKey) -> Self {
        Self {
            crt: pair.crt_base64(),
            key: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineConfigDocument {
    pub version: String,
    pub debug: bool,
    pub persist: bool,
    pub machine: MachineSection,
    pub cluster: ClusterSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineSection {
    #[serde(rename = "type")]
    pub machine_type: MachineType,
    pub token: String,
    pub ca: PemEncoded,
    #[serde(rename = "certSANs")]
    pub cert_sans: Vec<String>,
    pub kubelet: KubeletSection,
    pub network: NetworkSection,
    pub install: InstallSection,
    pub registries: RegistriesSection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub features: Option<FeaturesSection>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KubeletSection {
    pub image: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubespan: Option<EnabledFlag>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnabledFlag {
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallSection {
    pub disk: String,
    pub image: String,
    pub bootloader: bool,
    pub wipe: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistriesSection {
    #[serde(default)]
    pub mirrors: BTreeMap<String, MirrorSection>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MirrorSection {
    pub endpoints: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeaturesSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rbac: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSection {
    pub id: String,
    pub secret: String,
    pub control_plane: ControlPlaneSection,
    pub cluster_name: String,
    pub network: ClusterNetworkSection,
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secretbox_encryption_secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aescbc_encryption_secret: Option<String>,
    pub ca: PemEncoded,
    #[serde(rename = "aggregatorCA", default, skip_serializing_if = "Option::is_none")]
    pub aggregator_ca: Option<PemEncoded>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account: Option<ServiceAccountSection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_server: Option<ApiServerSection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controller_manager: Option<ImageSection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<ImageSection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduler: Option<ImageSection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discovery: Option<EnabledFlag>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etcd: Option<EtcdSection>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlPlaneSection {
    pub endpoint: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterNetworkSection {
    pub dns_domain: String,
    pub pod_subnets: Vec<String>,
    pub service_subnets: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceAccountSection {
    /// Base64 PEM private key.
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageSection {
    pub image: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiServerSection {
    pub image: String,
    #[serde(rename = "certSANs")]
    pub cert_sans: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub admission_control: Vec<AdmissionPlugin>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdmissionPlugin {
    pub name: String,
    pub configuration: PodSecurityConfiguration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodSecurityConfiguration {
    pub api_version: String,
    pub kind: String,
    pub defaults: PodSecurityDefaults,
    pub exemptions: PodSecurityExemptions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PodSecurityDefaults {
    pub enforce: String,
    pub enforce_version: String,
    pub audit: String,
    pub audit_version: String,
    pub warn: String,
    pub warn_version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodSecurityExemptions {
    pub namespaces: Vec<String>,
}

impl AdmissionPlugin {
    /// Baseline enforcement, restricted audit and warn; `kube-system` exempt.
    #[must_use]
    pub fn pod_security() -> Self {
        Self {
            name: "PodSecurity".to_string(),
            configuration: PodSecurityConfiguration {
                api_version: "pod-security.admission.config.k8s.io/v1alpha1".to_string(),
                kind: "PodSecurityConfiguration".to_string(),
                defaults: PodSecurityDefaults {
                    enforce: "baseline".to_string(),
                    enforce_version: "latest".to_string(),
                    audit: "restricted".to_string(),
                    audit_version: "latest".to_string(),
                    warn: "restricted".to_string(),
                    warn_version: "latest".to_string(),
                },
                exemptions: PodSecurityExemptions {
                    namespaces: vec!["kube-system".to_string()],
                },
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EtcdSection {
    pub ca: PemEncoded,
}

impl MachineConfigDocument {
    /// Render the document for one machine type.
    #[must_use]
    pub fn render(machine_type: MachineType, blueprint: &Blueprint, secrets: &SecretsBundle) -> Self {
        let control_plane = machine_type == MachineType::ControlPlane;
        let contract = blueprint.contract;

        let mirrors = blueprint
            .mirrors
            .iter()
            .map(|(host, endpoints)| {
                (
                    host.clone(),
                    MirrorSection {
                        endpoints: endpoints.clone(),
                    },
                )
            })
            .collect();

        let machine = MachineSection {
            machine_type,
            token: secrets.trustd_token.clone(),
            ca: if control_plane {
                PemEncoded::full(&secrets.os_ca)
            } else {
                PemEncoded::certificate_only(&secrets.os_ca)
            },
            cert_sans: blueprint.additional_sans.clone(),
            kubelet: KubeletSection {
                image: format!("{KUBELET_IMAGE_REPOSITORY}:v{}", blueprint.kubernetes_version),
            },
            network: NetworkSection {
                kubespan: blueprint.kubespan.then_some(EnabledFlag { enabled: true }),
            },
            install: InstallSection {
                disk: blueprint.install_disk.clone(),
                image: blueprint.install_image.clone(),
                bootloader: true,
                wipe: false,
            },
            registries: RegistriesSection { mirrors },
            features: contract
                .supports_rbac_feature()
                .then_some(FeaturesSection { rbac: Some(true) }),
        };

        let discovery = (blueprint.cluster_discovery && contract.supports_cluster_discovery())
            .then_some(EnabledFlag { enabled: true });

        let mut cluster = ClusterSection {
            id: secrets.cluster_id.clone(),
            secret: secrets.cluster_secret.clone(),
            control_plane: ControlPlaneSection {
                endpoint: blueprint.cluster_endpoint.clone(),
            },
            cluster_name: blueprint.cluster_name.clone(),
            network: ClusterNetworkSection {
                dns_domain: blueprint.dns_domain.clone(),
                pod_subnets: vec![DEFAULT_POD_SUBNET.to_string()],
                service_subnets: vec![DEFAULT_SERVICE_SUBNET.to_string()],
            },
            token: secrets.bootstrap_token.clone(),
            secretbox_encryption_secret: None,
            aescbc_encryption_secret: None,
            ca: PemEncoded::certificate_only(&secrets.kubernetes_ca),
            aggregator_ca: None,
            service_account: None,
            api_server: None,
            controller_manager: None,
            proxy: None,
            scheduler: None,
            discovery,
            etcd: None,
        };

        if control_plane {
            let mut api_sans = vec![blueprint.endpoint_host.clone()];
            api_sans.extend(blueprint.additional_sans.iter().cloned());

            cluster.secretbox_encryption_secret = secrets.secretbox_encryption_secret.clone();
            cluster.aescbc_encryption_secret = secrets.aescbc_encryption_secret.clone();
            cluster.ca = PemEncoded::full(&secrets.kubernetes_ca);
            cluster.aggregator_ca = secrets.aggregator_ca.as_ref().map(PemEncoded::full);
            cluster.service_account = secrets
                .service_account_key
                .as_ref()
                .map(|key| ServiceAccountSection {
                    key: STANDARD.encode(key),
                });
            cluster.api_server = Some(ApiServerSection {
                image: blueprint.kubernetes_image("kube-apiserver"),
                cert_sans: api_sans,
                admission_control: if contract.supports_pod_security_admission() {
                    vec![AdmissionPlugin::pod_security()]
                } else {
                    Vec::new()
                },
            });
            cluster.controller_manager = Some(ImageSection {
                image: blueprint.kubernetes_image("kube-controller-manager"),
            });
            cluster.proxy = Some(ImageSection {
                image: blueprint.kubernetes_image("kube-proxy"),
            });
            cluster.scheduler = Some(ImageSection {
                image: blueprint.kubernetes_image("kube-scheduler"),
            });
            cluster.etcd = Some(EtcdSection {
                ca: PemEncoded::full(&secrets.etcd_ca),
            });
        }

        Self {
            version: CONFIG_VERSION.to_string(),
            debug: false,
            persist: blueprint.persist,
            machine,
            cluster,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blueprint(contract: VersionContract) -> Blueprint {
        Blueprint {
            contract,
            cluster_name: "test".to_string(),
            cluster_endpoint: "https://10.0.0.1:6443".to_string(),
            endpoint_host: "10.0.0.1".to_string(),
            kubernetes_version: "1.25.2".to_string(),
            install_disk: "/dev/sda".to_string(),
            install_image: "ghcr.io/siderolabs/installer:v1.2.5".to_string(),
            additional_sans: vec!["lb.example".to_string()],
            dns_domain: "cluster.local".to_string(),
            persist: true,
            cluster_discovery: true,
            kubespan: false,
            mirrors: BTreeMap::from([(
                "docker.io".to_string(),
                vec!["https://mirror.local".to_string()],
            )]),
        }
    }

    #[test]
    fn test_control_plane_carries_keys() {
        let secrets = SecretsBundle::generate(VersionContract::CURRENT).unwrap();
        let doc = MachineConfigDocument::render(
            MachineType::ControlPlane,
            &blueprint(VersionContract::CURRENT),
            &secrets,
        );

        assert_eq!(doc.version, "v1alpha1");
        assert!(!doc.machine.ca.key.is_empty());
        assert!(!doc.cluster.ca.key.is_empty());
        assert!(doc.cluster.etcd.is_some());
        assert!(doc.cluster.aggregator_ca.is_some());

        let api = doc.cluster.api_server.unwrap();
        assert_eq!(api.image, "registry.k8s.io/kube-apiserver:v1.25.2");
        assert_eq!(api.cert_sans, vec!["10.0.0.1", "lb.example"]);
        assert_eq!(api.admission_control.len(), 1);
        assert_eq!(doc.machine.kubelet.image, "ghcr.io/siderolabs/kubelet:v1.25.2");
        assert_eq!(doc.cluster.discovery, Some(EnabledFlag { enabled: true }));
    }

    #[test]
    fn test_worker_has_no_keys() {
        let secrets = SecretsBundle::generate(VersionContract::CURRENT).unwrap();
        let doc = MachineConfigDocument::render(
            MachineType::Worker,
            &blueprint(VersionContract::CURRENT),
            &secrets,
        );

        assert_eq!(doc.machine.machine_type, MachineType::Worker);
        assert!(doc.machine.ca.key.is_empty());
        assert!(doc.cluster.ca.key.is_empty());
        assert!(doc.cluster.api_server.is_none());
        assert!(doc.cluster.etcd.is_none());
        assert!(doc.cluster.secretbox_encryption_secret.is_none());
        assert_eq!(doc.cluster.token, secrets.bootstrap_token);
    }

    #[test]
    fn test_old_contract_drops_gated_sections() {
        let contract = VersionContract::new(0, 8);
        let secrets = SecretsBundle::generate(contract).unwrap();
        let doc =
            MachineConfigDocument::render(MachineType::ControlPlane, &blueprint(contract), &secrets);

        assert!(doc.machine.features.is_none());
        assert!(doc.cluster.discovery.is_none());
        assert!(doc.cluster.api_server.unwrap().admission_control.is_empty());
        assert!(doc.cluster.aescbc_encryption_secret.is_some());
    }

    #[test]
    fn test_serialized_field_names() {
        let secrets = SecretsBundle::generate(VersionContract::CURRENT).unwrap();
        let mut bp = blueprint(VersionContract::CURRENT);
        bp.kubespan = true;
        let doc = MachineConfigDocument::render(MachineType::ControlPlane, &bp, &secrets);
        let yaml = serde_yaml::to_string(&doc).unwrap();

        for needle in [
            "type: controlplane",
            "certSANs:",
            "controlPlane:",
            "endpoint: https://10.0.0.1:6443",
            "clusterName: test",
            "dnsDomain: cluster.local",
            "aggregatorCA:",
            "serviceAccount:",
            "enforce-version: latest",
            "kubespan:",
            "docker.io:",
        ] {
            assert!(yaml.contains(needle), "missing {needle:?} in\n{yaml}");
        }
    }
}
