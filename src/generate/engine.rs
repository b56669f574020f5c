// SPDX-License-Identifier: MIT OR Apache-2.0

//! Generation engine.
//!
//! [`ConfigGenerator`] is the seam between directive compilation and the
//! machine config model. [`V1Alpha1Generator`] is the built-in engine.

use std::collections::BTreeMap;

use serde_yaml::Value;
use tracing::debug;

use crate::config::{TalosConfig, TalosContext};
use crate::error::{GenerationErrorKind, Result, SerializationErrorKind, TalosError};
use crate::generate::contract::VersionContract;
use crate::generate::document::{Blueprint, MachineConfigDocument, MachineType};
use crate::generate::options::{CompiledOptions, GenOption};
use crate::generate::patch::{load_patches, ConfigPatch};
use crate::generate::secrets::SecretsBundle;

/// Engine output before serialization.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedConfigs {
    pub control_plane: Value,
    pub worker: Value,
    pub talosconfig: TalosConfig,
}

/// Produces control-plane, worker and client configs from compiled options.
pub trait ConfigGenerator: Send + Sync {
    /// # Errors
    ///
    /// Returns [`TalosError::Generation`] when the directives or patches are
    /// rejected.
    #[allow(clippy::result_large_err)]
    fn generate(&self, options: &CompiledOptions) -> Result<GeneratedConfigs>;
}

/// Built-in engine for v1alpha1 machine configs.
///
/// Every call mints a fresh [`SecretsBundle`].
#[derive(Debug, Clone, Copy, Default)]
pub struct V1Alpha1Generator;

impl V1Alpha1Generator {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl ConfigGenerator for V1Alpha1Generator {
    fn generate(&self, options: &CompiledOptions) -> Result<GeneratedConfigs> {
        // Patches are parsed before any key material is minted.
        let all = load_patches(&options.patches.all)?;
        let control_plane_patches = load_patches(&options.patches.control_plane)?;
        let worker_patches = load_patches(&options.patches.worker)?;

        let blueprint = blueprint(options)?;
        debug!(
            contract = %blueprint.contract,
            directives = options.directives.len(),
            patches = all.len() + control_plane_patches.len() + worker_patches.len(),
            "Generating v1alpha1 configs"
        );

        let secrets = SecretsBundle::generate(blueprint.contract)?;

        let mut control_plane = to_value(
            &MachineConfigDocument::render(MachineType::ControlPlane, &blueprint, &secrets),
            SerializationErrorKind::ControlPlane,
        )?;
        let mut worker = to_value(
            &MachineConfigDocument::render(MachineType::Worker, &blueprint, &secrets),
            SerializationErrorKind::Worker,
        )?;

        apply_all(&all, &mut control_plane)?;
        apply_all(&all, &mut worker)?;
        apply_all(&control_plane_patches, &mut control_plane)?;
        apply_all(&worker_patches, &mut worker)?;

        let context = TalosContext::new(vec![blueprint.endpoint_host.clone()]).with_credentials(
            secrets.os_ca.crt.as_bytes(),
            secrets.admin.crt.as_bytes(),
            secrets.admin.key.as_bytes(),
        );
        let talosconfig = TalosConfig::single(blueprint.cluster_name.clone(), context);

        Ok(GeneratedConfigs {
            control_plane,
            worker,
            talosconfig,
        })
    }
}

#[allow(clippy::result_large_err)]
fn apply_all(patches: &[ConfigPatch], document: &mut Value) -> Result<()> {
    for patch in patches {
        patch.apply(document)?;
    }
    Ok(())
}

#[allow(clippy::result_large_err)]
fn to_value(document: &MachineConfigDocument, kind: SerializationErrorKind) -> Result<Value> {
    serde_yaml::to_value(document).map_err(|e| TalosError::serialization(kind, e.to_string()))
}

/// Fold directives into one resolved value per setting.
#[allow(clippy::result_large_err)]
fn blueprint(options: &CompiledOptions) -> Result<Blueprint> {
    let endpoint = url::Url::parse(&options.cluster_endpoint).map_err(|e| {
        TalosError::generation(
            GenerationErrorKind::InvalidInput,
            format!("cluster endpoint {:?}: {e}", options.cluster_endpoint),
        )
    })?;
    let endpoint_host = endpoint
        .host_str()
        .map(|h| h.trim_start_matches('[').trim_end_matches(']').to_string())
        .ok_or_else(|| {
            TalosError::generation(
                GenerationErrorKind::InvalidInput,
                format!("cluster endpoint {:?} has no host", options.cluster_endpoint),
            )
        })?;

    let mut blueprint = Blueprint {
        contract: options.contract().unwrap_or(VersionContract::CURRENT),
        cluster_name: options.cluster_name.clone(),
        cluster_endpoint: options.cluster_endpoint.clone(),
        endpoint_host,
        kubernetes_version: options.kubernetes_version.clone(),
        install_disk: String::new(),
        install_image: String::new(),
        additional_sans: Vec::new(),
        dns_domain: String::new(),
        persist: true,
        cluster_discovery: true,
        kubespan: false,
        mirrors: BTreeMap::new(),
    };

    for directive in &options.directives {
        match directive {
            GenOption::RegistryMirror { host, endpoint } => blueprint
                .mirrors
                .entry(host.clone())
                .or_default()
                .push(endpoint.clone()),
            GenOption::VersionContract(_) => {}
            GenOption::NetworkKubeSpan => {
                if !blueprint.contract.supports_kubespan() {
                    return Err(TalosError::generation(
                        GenerationErrorKind::UnsupportedDirective,
                        format!(
                            "KubeSpan is not supported by version contract {}",
                            blueprint.contract
                        ),
                    ));
                }
                blueprint.kubespan = true;
            }
            GenOption::InstallDisk(disk) => blueprint.install_disk = disk.clone(),
            GenOption::InstallImage(image) => blueprint.install_image = image.clone(),
            GenOption::AdditionalSubjectAltNames(sans) => {
                blueprint.additional_sans.extend(sans.iter().cloned());
            }
            GenOption::DnsDomain(domain) => blueprint.dns_domain = domain.clone(),
            GenOption::Persist(persist) => blueprint.persist = *persist,
            GenOption::ClusterDiscovery(enabled) => blueprint.cluster_discovery = *enabled,
        }
    }

    Ok(blueprint)
}
