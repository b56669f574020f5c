// SPDX-License-Identifier: MIT OR Apache-2.0

//! Kubeconfig parsing and the credential bundle assembled from it.
//!
//! The machine API returns an admin kubeconfig. Only the first cluster and
//! the first user are read; further entries are ignored.

use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::error::{DocumentErrorKind, Result, TalosError};

/// The subset of a kubeconfig document the parser reads.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Kubeconfig {
    #[serde(default)]
    pub clusters: Vec<NamedCluster>,
    #[serde(default)]
    pub users: Vec<NamedUser>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NamedCluster {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub cluster: ClusterEntry,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ClusterEntry {
    #[serde(default)]
    pub server: String,
    /// Base64-encoded CA bundle.
    #[serde(default)]
    pub certificate_authority_data: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NamedUser {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub user: UserEntry,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct UserEntry {
    #[serde(default)]
    pub client_certificate_data: Option<String>,
    #[serde(default)]
    pub client_key_data: Option<String>,
}

impl Kubeconfig {
    /// Parse a kubeconfig document.
    ///
    /// # Errors
    ///
    /// Returns `MalformedDocument` if the bytes are not a kubeconfig.
    #[allow(clippy::result_large_err)]
    pub fn parse(raw: &[u8]) -> Result<Self> {
        serde_yaml::from_slice(raw).map_err(|e| {
            TalosError::document(
                DocumentErrorKind::MalformedDocument,
                format!("Failed to parse kubeconfig: {e}"),
            )
        })
    }

    /// Decoded CA of the first cluster and key pair of the first user.
    ///
    /// Absent data fields decode to empty bytes.
    ///
    /// # Errors
    ///
    /// - `InvalidBundle` if there is no cluster or no user
    /// - `MalformedDocument` if a data field is not valid base64
    #[allow(clippy::result_large_err)]
    pub fn first_credentials(&self) -> Result<ParsedCredentials> {
        let (Some(cluster), Some(user)) = (self.clusters.first(), self.users.first()) else {
            return Err(TalosError::document(
                DocumentErrorKind::InvalidBundle,
                format!(
                    "Kubeconfig needs at least one cluster and one user, found {} and {}",
                    self.clusters.len(),
                    self.users.len()
                ),
            ));
        };

        Ok(ParsedCredentials {
            cluster_ca_certificate: decode(
                "certificate-authority-data",
                cluster.cluster.certificate_authority_data.as_deref(),
            )?,
            client_certificate: decode(
                "client-certificate-data",
                user.user.client_certificate_data.as_deref(),
            )?,
            client_key: decode("client-key-data", user.user.client_key_data.as_deref())?,
        })
    }
}

#[allow(clippy::result_large_err)]
fn decode(field: &str, value: Option<&str>) -> Result<Vec<u8>> {
    match value {
        None => Ok(Vec::new()),
        Some(encoded) => STANDARD.decode(encoded.trim()).map_err(|e| {
            TalosError::document(
                DocumentErrorKind::MalformedDocument,
                format!("Invalid base64 in {field}: {e}"),
            )
        }),
    }
}

/// PEM material taken from a kubeconfig.
#[derive(Clone, PartialEq, Eq)]
pub struct ParsedCredentials {
    pub cluster_ca_certificate: Vec<u8>,
    pub client_certificate: Vec<u8>,
    pub client_key: Vec<u8>,
}

impl fmt::Debug for ParsedCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParsedCredentials")
            .field("cluster_ca_certificate", &self.cluster_ca_certificate.len())
            .field("client_certificate", &self.client_certificate.len())
            .field("client_key", &"<redacted>")
            .finish()
    }
}

/// Credentials retrieved from a cluster.
///
/// Created fresh by every successful retrieval and never mutated. `id()` is
/// derived from the raw kubeconfig bytes only.
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialBundle {
    raw: Vec<u8>,
    credentials: ParsedCredentials,
    content_hash: [u8; 32],
    node: Option<String>,
}

impl CredentialBundle {
    /// Parse `raw` and assemble the bundle.
    ///
    /// # Errors
    ///
    /// Propagates [`Kubeconfig::parse`] and [`Kubeconfig::first_credentials`]
    /// failures.
    #[allow(clippy::result_large_err)]
    pub fn from_raw(raw: Vec<u8>, node: Option<String>) -> Result<Self> {
        let credentials = Kubeconfig::parse(&raw)?.first_credentials()?;
        let content_hash: [u8; 32] = Sha256::digest(&raw).into();
        Ok(Self {
            raw,
            credentials,
            content_hash,
            node,
        })
    }

    /// Lowercase hex SHA-256 of the raw kubeconfig.
    #[must_use]
    pub fn id(&self) -> String {
        hex::encode(self.content_hash)
    }

    #[must_use]
    pub fn content_hash(&self) -> &[u8; 32] {
        &self.content_hash
    }

    /// The kubeconfig exactly as received.
    #[must_use]
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// Get the kubeconfig as a UTF-8 string.
    ///
    /// # Errors
    ///
    /// Returns an error if the kubeconfig is not valid UTF-8.
    pub fn raw_str(&self) -> std::result::Result<&str, std::str::Utf8Error> {
        std::str::from_utf8(&self.raw)
    }

    #[must_use]
    pub fn client_certificate(&self) -> &[u8] {
        &self.credentials.client_certificate
    }

    #[must_use]
    pub fn client_key(&self) -> &[u8] {
        &self.credentials.client_key
    }

    #[must_use]
    pub fn cluster_ca_certificate(&self) -> &[u8] {
        &self.credentials.cluster_ca_certificate
    }

    /// Hostname of the node that served the kubeconfig, when reported.
    #[must_use]
    pub fn node(&self) -> Option<&str> {
        self.node.as_deref()
    }

    /// Write the kubeconfig to a file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn write_to_file(&self, path: impl AsRef<std::path::Path>) -> std::io::Result<()> {
        std::fs::write(path, &self.raw)
    }
}

impl fmt::Debug for CredentialBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialBundle")
            .field("id", &self.id())
            .field("raw_len", &self.raw.len())
            .field("credentials", &self.credentials)
            .field("node", &self.node)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::sample_kubeconfig;

    const TWO_CLUSTERS: &str = r#"
clusters:
- name: first
  cluster:
    server: https://10.0.0.1:6443
    certificate-authority-data: Zmlyc3QtY2E=
- name: second
  cluster:
    server: https://10.0.0.2:6443
    certificate-authority-data: c2Vjb25kLWNh
users:
- name: admin
  user:
    client-certificate-data: Y3J0
    client-key-data: a2V5
- name: other
  user:
    client-certificate-data: b3RoZXI=
    client-key-data: b3RoZXI=
"#;

    #[test]
    fn test_single_cluster_and_user() {
        let doc = sample_kubeconfig("demo", b"ca-pem", b"crt-pem", b"key-pem");
        let creds = Kubeconfig::parse(doc.as_bytes())
            .unwrap()
            .first_credentials()
            .unwrap();

        assert_eq!(creds.cluster_ca_certificate, b"ca-pem");
        assert_eq!(creds.client_certificate, b"crt-pem");
        assert_eq!(creds.client_key, b"key-pem");
    }

    #[test]
    fn test_first_entries_win() {
        for _ in 0..3 {
            let creds = Kubeconfig::parse(TWO_CLUSTERS.as_bytes())
                .unwrap()
                .first_credentials()
                .unwrap();
            assert_eq!(creds.cluster_ca_certificate, b"first-ca");
            assert_eq!(creds.client_certificate, b"crt");
            assert_eq!(creds.client_key, b"key");
        }
    }

    #[test]
    fn test_no_clusters_is_invalid_bundle() {
        let doc = "clusters: []\nusers:\n- name: admin\n  user:\n    client-key-data: a2V5\n";
        let err = Kubeconfig::parse(doc.as_bytes())
            .unwrap()
            .first_credentials()
            .unwrap_err();
        assert_eq!(err.category(), "document/invalid-bundle");
    }

    #[test]
    fn test_no_users_is_invalid_bundle() {
        let doc = "clusters:\n- name: c\n  cluster:\n    server: https://x\n";
        let err = CredentialBundle::from_raw(doc.as_bytes().to_vec(), None).unwrap_err();
        assert_eq!(err.category(), "document/invalid-bundle");
    }

    #[test]
    fn test_not_yaml_is_malformed() {
        let err = Kubeconfig::parse(b"clusters: [unterminated").unwrap_err();
        assert_eq!(err.category(), "document/malformed-document");

        let err = Kubeconfig::parse(b"- just\n- a list\n").unwrap_err();
        assert_eq!(err.category(), "document/malformed-document");
    }

    #[test]
    fn test_bad_base64_is_malformed() {
        let doc = TWO_CLUSTERS.replace("Zmlyc3QtY2E=", "!!not-base64!!");
        let err = Kubeconfig::parse(doc.as_bytes())
            .unwrap()
            .first_credentials()
            .unwrap_err();
        assert_eq!(err.category(), "document/malformed-document");
        assert!(err.to_string().contains("certificate-authority-data"));
    }

    #[test]
    fn test_id_is_sha256_of_raw() {
        let doc = sample_kubeconfig("demo", b"ca", b"crt", b"key").into_bytes();
        let bundle = CredentialBundle::from_raw(doc.clone(), Some("cp-1".to_string())).unwrap();

        let expected = hex::encode(Sha256::digest(&doc));
        assert_eq!(bundle.id(), expected);
        assert_eq!(bundle.id().len(), 64);
        assert_eq!(bundle.raw(), doc.as_slice());
        assert_eq!(bundle.node(), Some("cp-1"));

        let again = CredentialBundle::from_raw(doc, None).unwrap();
        assert_eq!(again.id(), bundle.id());
    }

    #[test]
    fn test_single_byte_change_changes_id() {
        let doc = sample_kubeconfig("demo", b"ca", b"crt", b"key");
        let changed = doc.replace("demo", "demp");

        let a = CredentialBundle::from_raw(doc.into_bytes(), None).unwrap();
        let b = CredentialBundle::from_raw(changed.into_bytes(), None).unwrap();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_debug_redacts_key() {
        let doc = sample_kubeconfig("demo", b"ca", b"crt", b"super-secret-key");
        let bundle = CredentialBundle::from_raw(doc.into_bytes(), None).unwrap();
        let rendered = format!("{bundle:?}");
        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains("super-secret-key"));
    }
}
