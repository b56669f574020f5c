// SPDX-License-Identifier: MIT OR Apache-2.0

pub mod api;
pub mod archive;
pub mod client;
pub mod config;
pub mod error;
pub mod generate;
pub mod resources;
pub mod runtime;
pub mod service;
pub mod session;
pub mod testkit;

pub use client::{ConnectionCredentials, TargetAddress, Transport};
pub use config::{GenerationDefaults, SessionConfig, TalosConfig, TalosContext};
pub use error::{Result, TalosError};
pub use generate::{BundleSynthesizer, ConfigBundle, GenerationInputs, VersionContract};
pub use resources::{BootstrapOptions, CredentialBundle};
pub use service::{Operation, OperationOutput, Provisioner};
pub use session::{bootstrap, retrieve_credentials, Session};
