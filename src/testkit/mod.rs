// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fixtures for exercising sessions and generation without a real cluster.
//!
//! - [`CertFixture`] mints a throwaway CA with server and client identities
//! - [`build_tar_gz`] packs entries the way the machine API packs the
//!   kubeconfig archive
//! - [`sample_kubeconfig`] renders a kubeconfig document
//! - [`ScriptedControl`] replays a scripted bootstrap and kubeconfig stream
//! - [`TalosCluster`] provisions a local docker cluster when
//!   `TALOS_DEV_TESTS` is set

use std::env;
use std::io::Write;
use std::path::PathBuf;
use std::process::Command;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use flate2::write::GzEncoder;
use flate2::Compression;
use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose, IsCa,
    KeyPair,
};
use tonic::Status;

use crate::api::common::{Data, Metadata};
use crate::api::machine::{Bootstrap, BootstrapRequest, BootstrapResponse};
use crate::session::{ClusterControl, KubeconfigStream};

/// PEM material for a CA, a server identity and a client identity.
#[derive(Debug, Clone)]
pub struct CertFixture {
    pub ca_pem: String,
    pub server_cert_pem: String,
    pub server_key_pem: String,
    pub client_cert_pem: String,
    pub client_key_pem: String,
}

impl CertFixture {
    /// Mint a fresh CA and sign a server certificate for `localhost` and
    /// `127.0.0.1` plus a client certificate with it.
    pub fn mint() -> Result<Self, rcgen::Error> {
        let ca_key = KeyPair::generate()?;
        let mut ca_params = CertificateParams::new(Vec::<String>::new())?;
        ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        ca_params.distinguished_name = name("testkit-ca");
        let ca_cert = ca_params.self_signed(&ca_key)?;

        let server_key = KeyPair::generate()?;
        let mut server_params =
            CertificateParams::new(vec!["localhost".to_string(), "127.0.0.1".to_string()])?;
        server_params.distinguished_name = name("testkit-server");
        server_params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];
        let server_cert = server_params.signed_by(&server_key, &ca_cert, &ca_key)?;

        let client_key = KeyPair::generate()?;
        let mut client_params = CertificateParams::new(Vec::<String>::new())?;
        client_params.distinguished_name = name("admin");
        client_params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ClientAuth];
        let client_cert = client_params.signed_by(&client_key, &ca_cert, &ca_key)?;

        Ok(Self {
            ca_pem: ca_cert.pem(),
            server_cert_pem: server_cert.pem(),
            server_key_pem: server_key.serialize_pem(),
            client_cert_pem: client_cert.pem(),
            client_key_pem: client_key.serialize_pem(),
        })
    }
}

fn name(common_name: &str) -> DistinguishedName {
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, common_name);
    dn
}

/// Pack `entries` into a gzip-compressed tar archive, in order.
pub fn build_tar_gz(entries: &[(&str, &[u8])]) -> std::io::Result<Vec<u8>> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (path, contents) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o600);
        header.set_cksum();
        builder.append_data(&mut header, path, *contents)?;
    }
    let mut encoder = builder.into_inner()?;
    encoder.flush()?;
    encoder.finish()
}

/// Render a kubeconfig with one cluster and one user holding the given PEM.
pub fn sample_kubeconfig(cluster: &str, ca_pem: &[u8], crt_pem: &[u8], key_pem: &[u8]) -> String {
    format!(
        r#"apiVersion: v1
kind: Config
clusters:
- name: {cluster}
  cluster:
    server: https://10.0.0.1:6443
    certificate-authority-data: {ca}
users:
- name: admin@{cluster}
  user:
    client-certificate-data: {crt}
    client-key-data: {key}
contexts:
- name: admin@{cluster}
  context:
    cluster: {cluster}
    user: admin@{cluster}
current-context: admin@{cluster}
"#,
        ca = STANDARD.encode(ca_pem),
        crt = STANDARD.encode(crt_pem),
        key = STANDARD.encode(key_pem),
    )
}

/// Scripted stand-in for the machine API.
///
/// Records every call in order so tests can assert on sequencing.
#[derive(Debug)]
pub struct ScriptedControl {
    bootstrap: Option<Result<BootstrapResponse, Status>>,
    kubeconfig_error: Option<Status>,
    chunks: Vec<Result<Data, Status>>,
    stall: bool,
    calls: Vec<&'static str>,
}

impl ScriptedControl {
    /// Serve `archive` split into `chunk_size` pieces from node `hostname`.
    pub fn serving(archive: &[u8], chunk_size: usize, hostname: &str) -> Self {
        let chunks = archive
            .chunks(chunk_size.max(1))
            .map(|piece| {
                Ok(Data {
                    metadata: Some(Metadata {
                        hostname: hostname.to_string(),
                        error: String::new(),
                    }),
                    bytes: piece.to_vec(),
                })
            })
            .collect();
        Self {
            bootstrap: Some(Ok(BootstrapResponse {
                messages: vec![Bootstrap {
                    metadata: Some(Metadata {
                        hostname: hostname.to_string(),
                        error: String::new(),
                    }),
                }],
            })),
            kubeconfig_error: None,
            chunks,
            stall: false,
            calls: Vec::new(),
        }
    }

    /// Terminate the stream with `status` after the last chunk.
    #[must_use]
    pub fn with_trailing_status(mut self, status: Status) -> Self {
        self.chunks.push(Err(status));
        self
    }

    /// Append a chunk whose metadata carries `error`.
    #[must_use]
    pub fn with_chunk_error(mut self, error: &str) -> Self {
        self.chunks.push(Ok(Data {
            metadata: Some(Metadata {
                hostname: String::new(),
                error: error.to_string(),
            }),
            bytes: Vec::new(),
        }));
        self
    }

    /// Reject the bootstrap call.
    #[must_use]
    pub fn rejecting_bootstrap(mut self, status: Status) -> Self {
        self.bootstrap = Some(Err(status));
        self
    }

    /// Reject the kubeconfig call before any chunk is sent.
    #[must_use]
    pub fn failing_kubeconfig(mut self, status: Status) -> Self {
        self.kubeconfig_error = Some(status);
        self
    }

    /// Never terminate the stream after the scripted chunks.
    #[must_use]
    pub fn stalled(mut self) -> Self {
        self.stall = true;
        self
    }

    /// Calls received so far, in order.
    pub fn calls(&self) -> &[&'static str] {
        &self.calls
    }
}

#[tonic::async_trait]
impl ClusterControl for ScriptedControl {
    async fn bootstrap(&mut self, _request: BootstrapRequest) -> Result<BootstrapResponse, Status> {
        self.calls.push("bootstrap");
        self.bootstrap
            .take()
            .unwrap_or_else(|| Err(Status::failed_precondition("bootstrap already called")))
    }

    async fn kubeconfig(&mut self) -> Result<KubeconfigStream, Status> {
        self.calls.push("kubeconfig");
        if let Some(status) = self.kubeconfig_error.take() {
            return Err(status);
        }
        let scripted = tokio_stream::iter(std::mem::take(&mut self.chunks));
        let stream: KubeconfigStream = if self.stall {
            use tokio_stream::StreamExt;
            Box::pin(scripted.chain(tokio_stream::pending()))
        } else {
            Box::pin(scripted)
        };
        Ok(stream)
    }
}

/// A local docker cluster driven through `talosctl`.
pub struct TalosCluster {
    pub name: String,
    pub endpoint: String,
    pub talosconfig_path: PathBuf,
}

impl TalosCluster {
    /// Provisions a new local Talos cluster in Docker.
    /// SKIPS if `TALOS_DEV_TESTS` is not set.
    pub fn create(name: &str) -> Option<Self> {
        if env::var("TALOS_DEV_TESTS").is_err() {
            println!("Skipping integration test: TALOS_DEV_TESTS not set");
            return None;
        }

        if Command::new("talosctl").arg("version").output().is_err() {
            eprintln!("talosctl not found");
            return None;
        }

        let talosconfig_path = env::temp_dir().join(format!("{name}-talosconfig"));
        println!("Creating Talos cluster '{name}' ...");

        // talosctl bootstraps the cluster itself; the tests only retrieve
        let output = Command::new("talosctl")
            .args(["cluster", "create", "--name", name, "--skip-kubeconfig"])
            .arg("--talosconfig")
            .arg(&talosconfig_path)
            .output()
            .ok()?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("Pool overlaps") {
                eprintln!("Docker network overlap detected; clean up with `docker network prune`");
            }
            eprintln!("talosctl error: {stderr}");
            return None;
        }

        Some(Self {
            name: name.to_string(),
            endpoint: "127.0.0.1:50000".to_string(),
            talosconfig_path,
        })
    }
}

impl Drop for TalosCluster {
    fn drop(&mut self) {
        if env::var("TALOS_DEV_TESTS").is_err() {
            return;
        }
        println!("Destroying Talos cluster '{}'...", self.name);
        let _ = Command::new("talosctl")
            .args(["cluster", "destroy", "--name", &self.name])
            .status();
        let _ = std::fs::remove_file(&self.talosconfig_path);
    }
}
