// SPDX-License-Identifier: MIT OR Apache-2.0

//! Protobuf bindings for the subset of the Talos machine API used to
//! bootstrap a cluster and stream its kubeconfig.

pub mod generated;

// Re-export API modules
pub use generated::common;
pub use generated::machine;
