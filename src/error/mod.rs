// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error taxonomy for bootstrap, kubeconfig retrieval and config generation.
//!
//! Every variant names the stage that failed. [`TalosError::category`]
//! gives a short machine-addressable category, the `Display` output is the
//! human-readable detail.

use std::fmt;
use thiserror::Error;

/// Failure modes of the transport builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionErrorKind {
    /// Client certificate and key are malformed or do not belong together.
    InvalidKeyPair,
    /// No certificate could be parsed from the CA bundle.
    InvalidCaBundle,
    /// The endpoint could not be reached or the handshake failed.
    ConnectionFailed,
    /// The connect step did not finish before the deadline.
    DeadlineExceeded,
}

/// Failure modes of the remote control service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteCallErrorKind {
    /// The cluster initialization call was rejected.
    Bootstrap,
    /// The kubeconfig call could not be started.
    Kubeconfig,
    /// A chunk carried an upstream error in its metadata.
    StreamChunk,
    /// The stream terminated with an error status after its data.
    StreamTerminated,
    /// The stream delivered more bytes than the session allows.
    ResponseTooLarge,
    /// The call did not finish before the deadline.
    DeadlineExceeded,
}

/// Failure modes of the archive extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveErrorKind {
    EntryNotFound,
    MalformedArchive,
}

/// Failure modes of the credential bundle parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentErrorKind {
    /// The document parsed but has no cluster or no identity.
    InvalidBundle,
    /// The bytes are not a kubeconfig document.
    MalformedDocument,
}

/// Failure modes of the generation engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationErrorKind {
    MalformedPatch,
    UnsupportedDirective,
    KeyMaterial,
    InvalidInput,
}

/// Which document failed to serialize.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerializationErrorKind {
    ControlPlane,
    Worker,
    ClientConfig,
}

impl ConnectionErrorKind {
    fn as_str(self) -> &'static str {
        match self {
            Self::InvalidKeyPair => "invalid-key-pair",
            Self::InvalidCaBundle => "invalid-ca-bundle",
            Self::ConnectionFailed => "connection-failed",
            Self::DeadlineExceeded => "deadline-exceeded",
        }
    }
}

impl RemoteCallErrorKind {
    fn as_str(self) -> &'static str {
        match self {
            Self::Bootstrap => "bootstrap",
            Self::Kubeconfig => "kubeconfig",
            Self::StreamChunk => "stream-chunk",
            Self::StreamTerminated => "stream-terminated",
            Self::ResponseTooLarge => "response-too-large",
            Self::DeadlineExceeded => "deadline-exceeded",
        }
    }
}

impl ArchiveErrorKind {
    fn as_str(self) -> &'static str {
        match self {
            Self::EntryNotFound => "entry-not-found",
            Self::MalformedArchive => "malformed-archive",
        }
    }
}

impl DocumentErrorKind {
    fn as_str(self) -> &'static str {
        match self {
            Self::InvalidBundle => "invalid-bundle",
            Self::MalformedDocument => "malformed-document",
        }
    }
}

impl GenerationErrorKind {
    fn as_str(self) -> &'static str {
        match self {
            Self::MalformedPatch => "malformed-patch",
            Self::UnsupportedDirective => "unsupported-directive",
            Self::KeyMaterial => "key-material",
            Self::InvalidInput => "invalid-input",
        }
    }
}

impl SerializationErrorKind {
    fn as_str(self) -> &'static str {
        match self {
            Self::ControlPlane => "control-plane",
            Self::Worker => "worker",
            Self::ClientConfig => "client-config",
        }
    }
}

macro_rules! impl_kind_display {
    ($($kind:ty),*) => {
        $(impl fmt::Display for $kind {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        })*
    };
}

impl_kind_display!(
    ConnectionErrorKind,
    RemoteCallErrorKind,
    ArchiveErrorKind,
    DocumentErrorKind,
    GenerationErrorKind,
    SerializationErrorKind
);

#[allow(clippy::result_large_err)]
#[derive(Debug, Error)]
pub enum TalosError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Connection error ({kind}): {message}")]
    Connection {
        kind: ConnectionErrorKind,
        message: String,
    },

    #[error("Remote call failed ({kind}): {message}")]
    RemoteCall {
        kind: RemoteCallErrorKind,
        message: String,
    },

    #[error("Archive error ({kind}): {message}")]
    Archive {
        kind: ArchiveErrorKind,
        message: String,
    },

    #[error("Kubeconfig document error ({kind}): {message}")]
    Document {
        kind: DocumentErrorKind,
        message: String,
    },

    #[error("Invalid Talos version selector {selector:?}: {message}")]
    VersionSelector { selector: String, message: String },

    #[error("Config generation failed ({kind}): {message}")]
    Generation {
        kind: GenerationErrorKind,
        message: String,
    },

    #[error("Failed to serialize {kind} configuration: {message}")]
    Serialization {
        kind: SerializationErrorKind,
        message: String,
    },
}

impl TalosError {
    pub(crate) fn connection(kind: ConnectionErrorKind, message: impl Into<String>) -> Self {
        Self::Connection {
            kind,
            message: message.into(),
        }
    }

    pub(crate) fn remote(kind: RemoteCallErrorKind, message: impl Into<String>) -> Self {
        Self::RemoteCall {
            kind,
            message: message.into(),
        }
    }

    pub(crate) fn archive(kind: ArchiveErrorKind, message: impl Into<String>) -> Self {
        Self::Archive {
            kind,
            message: message.into(),
        }
    }

    pub(crate) fn document(kind: DocumentErrorKind, message: impl Into<String>) -> Self {
        Self::Document {
            kind,
            message: message.into(),
        }
    }

    pub(crate) fn generation(kind: GenerationErrorKind, message: impl Into<String>) -> Self {
        Self::Generation {
            kind,
            message: message.into(),
        }
    }

    pub(crate) fn serialization(kind: SerializationErrorKind, message: impl Into<String>) -> Self {
        Self::Serialization {
            kind,
            message: message.into(),
        }
    }

    /// Short machine-addressable category, e.g. `archive/entry-not-found`.
    #[must_use]
    pub fn category(&self) -> String {
        match self {
            Self::Config(_) => "config".to_string(),
            Self::Validation(_) => "validation".to_string(),
            Self::Connection { kind, .. } => format!("connection/{kind}"),
            Self::RemoteCall { kind, .. } => format!("remote-call/{kind}"),
            Self::Archive { kind, .. } => format!("archive/{kind}"),
            Self::Document { kind, .. } => format!("document/{kind}"),
            Self::VersionSelector { .. } => "version-selector".to_string(),
            Self::Generation { kind, .. } => format!("generation/{kind}"),
            Self::Serialization { kind, .. } => format!("serialization/{kind}"),
        }
    }
}

impl From<tonic::transport::Error> for TalosError {
    fn from(err: tonic::transport::Error) -> Self {
        Self::connection(ConnectionErrorKind::ConnectionFailed, err.to_string())
    }
}

impl TalosError {
    /// Map a gRPC status from the given stage; a deadline status keeps its
    /// own kind so callers can tell timeouts apart.
    pub(crate) fn from_status(kind: RemoteCallErrorKind, status: &tonic::Status) -> Self {
        let kind = match status.code() {
            tonic::Code::DeadlineExceeded => RemoteCallErrorKind::DeadlineExceeded,
            _ => kind,
        };
        Self::remote(
            kind,
            format!("{:?}: {}", status.code(), status.message()),
        )
    }
}

impl From<tonic::Status> for TalosError {
    fn from(status: tonic::Status) -> Self {
        Self::from_status(RemoteCallErrorKind::StreamTerminated, &status)
    }
}

pub type Result<T> = std::result::Result<T, TalosError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_includes_kind() {
        let err = TalosError::archive(ArchiveErrorKind::EntryNotFound, "kubeconfig");
        assert_eq!(err.category(), "archive/entry-not-found");

        let err = TalosError::connection(ConnectionErrorKind::InvalidKeyPair, "bad key");
        assert_eq!(err.category(), "connection/invalid-key-pair");
    }

    #[test]
    fn test_display_is_human_readable() {
        let err = TalosError::VersionSelector {
            selector: "not-a-version".to_string(),
            message: "expected vMAJOR.MINOR".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("not-a-version"));
        assert!(text.contains("expected vMAJOR.MINOR"));
        assert_eq!(err.category(), "version-selector");
    }

    #[test]
    fn test_status_keeps_deadline_kind() {
        let err = TalosError::from_status(
            RemoteCallErrorKind::Bootstrap,
            &tonic::Status::deadline_exceeded("too slow"),
        );
        assert_eq!(err.category(), "remote-call/deadline-exceeded");

        let err: TalosError = tonic::Status::unavailable("gone").into();
        assert_eq!(err.category(), "remote-call/stream-terminated");
        assert!(err.to_string().contains("gone"));
    }

    #[test]
    fn test_transport_error_maps_to_connection() {
        let err: TalosError = tonic::transport::Endpoint::from_shared("not a uri")
            .map(|_| ())
            .map_err(TalosError::from)
            .unwrap_err();
        assert!(matches!(
            err,
            TalosError::Connection {
                kind: ConnectionErrorKind::ConnectionFailed,
                ..
            }
        ));
    }
}
