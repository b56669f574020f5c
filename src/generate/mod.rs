// SPDX-License-Identifier: MIT OR Apache-2.0

//! Declarative config generation.
//!
//! [`GenerationInputs`] are compiled by the [`OptionCompiler`] into an
//! ordered list of [`GenOption`] directives. A [`ConfigGenerator`] turns
//! those into control-plane, worker and client configs, and the
//! [`BundleSynthesizer`] serializes all three into a [`ConfigBundle`].
//!
//! # Example
//!
//! ```no_run
//! use talos_bootstrap::generate::{BundleSynthesizer, GenerationInputs};
//!
//! # fn main() -> Result<(), talos_bootstrap::TalosError> {
//! let inputs = GenerationInputs::builder("demo", "https://10.0.0.1:6443")
//!     .talos_version("v1.2")
//!     .install_disk("/dev/nvme0n1")
//!     .patch_control_plane("cluster: {allowSchedulingOnControlPlanes: true}")
//!     .build()?;
//!
//! let bundle = BundleSynthesizer::new().synthesize(&inputs)?;
//! std::fs::write("controlplane.yaml", &bundle.control_plane).ok();
//! # Ok(())
//! # }
//! ```

mod bundle;
mod contract;
mod document;
mod engine;
mod inputs;
mod options;
mod patch;
mod secrets;

pub use bundle::{BundleSynthesizer, ConfigBundle};
pub use contract::VersionContract;
pub use document::{Blueprint, MachineConfigDocument, MachineType};
pub use engine::{ConfigGenerator, GeneratedConfigs, V1Alpha1Generator};
pub use inputs::{GenerationInputs, GenerationInputsBuilder, PatchSet};
pub use options::{CompiledOptions, GenOption, OptionCompiler};
pub use patch::{load_patches, ConfigPatch};
pub use secrets::{CertificateAndKey, SecretsBundle};
