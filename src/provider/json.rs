//! JSON file provider.
//!
//! Reads paper records from either a JSON array or a JSON Lines file (one
//! record per line). The format is detected from the first non-whitespace
//! character.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use super::{PaperProvider, ProviderError, ProviderResult};
use crate::models::PaperRecord;

/// Provider backed by records parsed from a local file.
#[derive(Debug)]
pub struct JsonFilePaperProvider {
    path: PathBuf,
    name: String,
    papers: Vec<PaperRecord>,
}

impl JsonFilePaperProvider {
    /// Load and parse all records from `path`.
    ///
    /// # Errors
    /// Returns `ProviderError::IoError` if the file cannot be read and
    /// `ProviderError::ParseError` if any record is malformed
    pub async fn from_file(path: impl AsRef<Path>) -> ProviderResult<Self> {
        let path = path.as_ref().to_path_buf();
        let raw = tokio::fs::read_to_string(&path).await?;
        let papers = parse_records(&raw)?;
        debug!("Parsed {} records from {}", papers.len(), path.display());

        Ok(Self {
            name: format!("json file {}", path.display()),
            path,
            papers,
        })
    }

    /// Path the records were read from.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Parse records from a JSON array or JSON Lines document.
pub fn parse_records(raw: &str) -> ProviderResult<Vec<PaperRecord>> {
    let trimmed = raw.trim_start();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    if trimmed.starts_with('[') {
        return serde_json::from_str(trimmed)
            .map_err(|e| ProviderError::ParseError(format!("Invalid JSON array: {}", e)));
    }

    raw.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            serde_json::from_str(line).map_err(|e| {
                ProviderError::ParseError(format!("Invalid record on line {}: {}", idx + 1, e))
            })
        })
        .collect()
}

#[async_trait]
impl PaperProvider for JsonFilePaperProvider {
    async fn fetch_papers(&self) -> ProviderResult<Vec<PaperRecord>> {
        Ok(self.papers.clone())
    }

    async fn count_papers(&self) -> ProviderResult<usize> {
        Ok(self.papers.len())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
