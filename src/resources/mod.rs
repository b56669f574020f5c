// SPDX-License-Identifier: MIT OR Apache-2.0

//! Strongly typed domain wrappers for the machine API responses.

mod bootstrap;
mod kubeconfig;

pub use bootstrap::{BootstrapOptions, BootstrapOutcome};
pub use kubeconfig::{
    ClusterEntry, CredentialBundle, Kubeconfig, NamedCluster, NamedUser, ParsedCredentials,
    UserEntry,
};
