// SPDX-License-Identifier: MIT OR Apache-2.0

//! Extraction of a single entry from a gzip-compressed tar archive.
//!
//! The machine API ships the kubeconfig as a `.tar.gz` with one entry named
//! `kubeconfig`; entries are scanned in stream order and the first entry
//! with the requested name wins.

use std::io::Read;

use flate2::read::GzDecoder;
use tracing::debug;

use crate::error::{ArchiveErrorKind, Result, TalosError};

/// Return the bytes of the first entry named `name`.
///
/// Stops reading as soon as the entry is found. No bytes are returned unless
/// the entry was read completely.
///
/// # Errors
///
/// - `EntryNotFound` if the archive ends without a matching entry
/// - `MalformedArchive` if decompression or tar parsing fails
#[allow(clippy::result_large_err)]
pub fn extract_entry<R: Read>(reader: R, name: &str) -> Result<Vec<u8>> {
    let mut archive = tar::Archive::new(GzDecoder::new(reader));
    let entries = archive.entries().map_err(malformed)?;

    let mut scanned = 0usize;
    for entry in entries {
        let mut entry = entry.map_err(malformed)?;
        scanned += 1;

        if entry.path().map_err(malformed)?.as_os_str() != name {
            continue;
        }

        let capacity = usize::try_from(entry.size()).unwrap_or(0).min(1 << 20);
        let mut contents = Vec::with_capacity(capacity);
        entry.read_to_end(&mut contents).map_err(malformed)?;
        debug!(entry = name, bytes = contents.len(), scanned, "archive entry extracted");
        return Ok(contents);
    }

    Err(TalosError::archive(
        ArchiveErrorKind::EntryNotFound,
        format!("No entry named {name:?} among {scanned} archive entries"),
    ))
}

fn malformed(err: std::io::Error) -> TalosError {
    TalosError::archive(ArchiveErrorKind::MalformedArchive, err.to_string())
}
