#![allow(clippy::result_large_err)] // Loader returns AppError so callers see the failing path and parse context.

use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use crate::core::workflow::document::{WorkflowDocument, WORKFLOW_FILE_EXTENSION};
use crate::core::workflow::parser;
use crate::core::workflow::validate::{self, ValidationIssue};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

/// Compute the SHA-256 hash encoded as lowercase hex.
pub fn compute_sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Owns every loaded workflow document, keyed by workflow id. Read-only and
/// safe for concurrent readers once the load phase completes.
#[derive(Debug, Default)]
pub struct WorkflowRegistry {
    workflows: HashMap<String, WorkflowDocument>,
}

impl WorkflowRegistry {
    pub fn new() -> Self {
        WorkflowRegistry {
            workflows: HashMap::new(),
        }
    }

    /// Load every `.jcwf` file in `dir` (non-recursive). Files that fail to
    /// parse are logged and skipped; the rest of the directory still loads.
    /// Returns the number of workflows registered.
    pub fn load_directory(&mut self, dir: &Path) -> Result<usize, AppError> {
        let entries = fs::read_dir(dir).map_err(|err| {
            AppError::new(
                ErrorCategory::IoError,
                format!("failed to read workflow directory {}: {}", dir.display(), err),
            )
            .with_code("WFL-REG-001")
        })?;

        let mut paths: Vec<_> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| ext == WORKFLOW_FILE_EXTENSION)
                    .unwrap_or(false)
            })
            .collect();
        paths.sort();

        let mut loaded = 0;
        for path in paths {
            match self.load_file(&path) {
                Ok(id) => {
                    tracing::info!(workflow = %id, path = %path.display(), "loaded workflow");
                    loaded += 1;
                }
                Err(err) => {
                    tracing::error!(path = %path.display(), "workflow rejected: {}", err);
                }
            }
        }
        Ok(loaded)
    }

    /// Read, parse, and register a single workflow file. An existing id is
    /// replaced in place with a reload warning.
    pub fn load_file(&mut self, path: &Path) -> Result<String, AppError> {
        let bytes = fs::read(path).map_err(|err| {
            AppError::new(
                ErrorCategory::IoError,
                format!("failed to read {}: {}", path.display(), err),
            )
            .with_code("WFL-REG-002")
        })?;
        let text = std::str::from_utf8(&bytes).map_err(|err| {
            AppError::new(
                ErrorCategory::ParseError,
                format!("{} is not valid UTF-8: {}", path.display(), err),
            )
            .with_code("WFL-PARSE-003")
        })?;

        let mut document = parser::parse_document(text, &path.display().to_string())?;
        document.content_hash = compute_sha256_hex(&bytes);

        let id = document.id.clone();
        if self.workflows.contains_key(&id) {
            tracing::warn!(workflow = %id, path = %path.display(), "reloading workflow, replacing previous definition");
        }
        self.workflows.insert(id.clone(), document);
        Ok(id)
    }

    pub fn get_workflow(&self, id: &str) -> Option<&WorkflowDocument> {
        self.workflows.get(id)
    }

    pub fn has_workflow(&self, id: &str) -> bool {
        self.workflows.contains_key(id)
    }

    /// Registered workflow ids, sorted for stable output.
    pub fn get_workflow_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.workflows.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Validate every registered workflow. Invalid workflows stay registered;
    /// the issue list tells callers what to refuse.
    pub fn validate_all(&self) -> BTreeMap<String, Vec<ValidationIssue>> {
        self.workflows
            .iter()
            .map(|(id, document)| (id.clone(), validate::validate_document(document)))
            .collect()
    }
}
