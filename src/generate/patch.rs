// SPDX-License-Identifier: MIT OR Apache-2.0

//! Free-form config patches.
//!
//! A patch is either inline YAML/JSON or `@path` naming a file to load.
//! A mapping is a strategic merge patch: mappings merge recursively,
//! sequences are appended to and scalars replaced. A sequence is an
//! RFC 6902 JSON patch.

use std::fs;

use json_patch::PatchOperation;
use serde_yaml::{Mapping, Value};

use crate::error::{GenerationErrorKind, Result, TalosError};

/// A parsed patch ready to apply to a machine config document.
#[derive(Debug, Clone)]
pub enum ConfigPatch {
    StrategicMerge(Mapping),
    JsonPatch(json_patch::Patch),
}

fn malformed(message: impl Into<String>) -> TalosError {
    TalosError::generation(GenerationErrorKind::MalformedPatch, message)
}

impl ConfigPatch {
    /// Load a patch from inline text or an `@path` reference.
    ///
    /// # Errors
    ///
    /// Returns `MalformedPatch` if the file cannot be read, the text is not
    /// YAML/JSON, or it is neither a mapping nor a list of operations.
    #[allow(clippy::result_large_err)]
    pub fn load(text: &str) -> Result<Self> {
        let trimmed = text.trim();
        if let Some(path) = trimmed.strip_prefix('@') {
            let contents = fs::read_to_string(path)
                .map_err(|e| malformed(format!("Failed to read patch file {path}: {e}")))?;
            return Self::parse(&contents).map_err(|err| match err {
                TalosError::Generation { kind, message } => TalosError::Generation {
                    kind,
                    message: format!("{path}: {message}"),
                },
                other => other,
            });
        }
        Self::parse(trimmed)
    }

    #[allow(clippy::result_large_err)]
    fn parse(text: &str) -> Result<Self> {
        let value: Value =
            serde_yaml::from_str(text).map_err(|e| malformed(format!("Invalid patch: {e}")))?;
        match value {
            Value::Mapping(mapping) => Ok(Self::StrategicMerge(mapping)),
            Value::Sequence(items) => {
                if items.is_empty() {
                    return Err(malformed("JSON patch has no operations"));
                }
                items
                    .into_iter()
                    .enumerate()
                    .map(|(index, item)| {
                        serde_yaml::from_value::<PatchOperation>(item).map_err(|e| {
                            malformed(format!("Invalid JSON patch operation #{index}: {e}"))
                        })
                    })
                    .collect::<Result<Vec<_>>>()
                    .map(|operations| Self::JsonPatch(json_patch::Patch(operations)))
            }
            other => Err(malformed(format!(
                "Patch must be a mapping or a list of operations, got {}",
                kind_of(&other)
            ))),
        }
    }

    /// Apply the patch to `document` in place.
    ///
    /// JSON patches are applied to a copy first, so a failing operation
    /// leaves `document` untouched.
    ///
    /// # Errors
    ///
    /// Returns `MalformedPatch` if an operation cannot be applied.
    #[allow(clippy::result_large_err)]
    pub fn apply(&self, document: &mut Value) -> Result<()> {
        match self {
            Self::StrategicMerge(mapping) => {
                merge(document, &Value::Mapping(mapping.clone()));
                Ok(())
            }
            Self::JsonPatch(operations) => {
                let mut working = serde_json::to_value(&*document)
                    .map_err(|e| malformed(format!("Document is not JSON-compatible: {e}")))?;
                json_patch::patch(&mut working, &operations.0)
                    .map_err(|e| malformed(format!("JSON patch failed: {e}")))?;
                *document = serde_yaml::to_value(&working)
                    .map_err(|e| malformed(format!("Patched document is invalid: {e}")))?;
                Ok(())
            }
        }
    }
}

/// Load every patch in order, failing on the first bad one.
#[allow(clippy::result_large_err)]
pub fn load_patches(texts: &[String]) -> Result<Vec<ConfigPatch>> {
    texts.iter().map(|text| ConfigPatch::load(text)).collect()
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a sequence",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}

fn merge(base: &mut Value, patch: &Value) {
    match (base, patch) {
        (Value::Mapping(base), Value::Mapping(patch)) => {
            for (key, value) in patch {
                match base.get_mut(key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        base.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (Value::Sequence(base), Value::Sequence(patch)) => base.extend(patch.iter().cloned()),
        (base, patch) => *base = patch.clone(),
    }
}
