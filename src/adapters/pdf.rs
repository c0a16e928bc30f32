//! PDF text extraction via the `pdftotext` CLI.
//!
//! Runs the poppler `pdftotext` binary as a subprocess, reading only the
//! first pages and collecting text from stdout.

use std::path::Path;
use std::process::Stdio;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::Extractor;
use crate::domain::DocumentItem;

/// Extractor backed by `pdftotext`
pub struct PdftotextExtractor {
    /// Path to the pdftotext binary (default: "pdftotext")
    binary_path: String,
}

impl Default for PdftotextExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl PdftotextExtractor {
    pub fn new() -> Self {
        Self {
            binary_path: "pdftotext".to_string(),
        }
    }

    /// Use a custom binary path
    pub fn with_binary_path(binary_path: impl Into<String>) -> Self {
        Self {
            binary_path: binary_path.into(),
        }
    }
}

#[async_trait]
impl Extractor for PdftotextExtractor {
    fn name(&self) -> &str {
        "pdftotext"
    }

    async fn extract(&self, item: &DocumentItem, local: &Path, max_pages: u32) -> Result<String> {
        if !local.exists() {
            anyhow::bail!("Local copy of {} is missing: {}", item.id, local.display());
        }

        debug!(document = %item.id, max_pages, "Extracting text");

        let last_page = max_pages.max(1).to_string();

        // `-` sends text to stdout; kill_on_drop reaps the child if the caller times out
        let output = Command::new(&self.binary_path)
            .args(["-f", "1", "-l", last_page.as_str(), "-enc", "UTF-8"])
            .arg(local)
            .arg("-")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("Failed to run {}", self.binary_path))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let exit_code = output.status.code().unwrap_or(-1);
            anyhow::bail!(
                "{} failed for {} with exit code {}: {}",
                self.binary_path,
                item.id,
                exit_code,
                stderr.trim()
            );
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_file_is_an_error() {
        let extractor = PdftotextExtractor::new();
        let item = DocumentItem::placeholder("x");
        let result = extractor
            .extract(&item, Path::new("/definitely/not/here.pdf"), 5)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_missing_binary_is_an_error() {
        let temp = tempfile::NamedTempFile::new().unwrap();
        let extractor = PdftotextExtractor::with_binary_path("/nonexistent/pdftotext");
        let item = DocumentItem::placeholder("x");
        let result = extractor.extract(&item, temp.path(), 5).await;
        assert!(result.is_err());
    }
}
