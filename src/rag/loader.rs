use async_trait::async_trait;
use log::info;
use std::path::Path;
use tokio::process::Command;

use crate::error::ChatError;

/// Text of one page of a loaded document.
#[derive(Debug, Clone, PartialEq)]
pub struct PageDocument {
    /// Zero-based.
    pub page: usize,
    pub text: String,
}

#[async_trait]
pub trait DocumentLoader: Send + Sync {
    async fn load(&self, path: &Path) -> Result<Vec<PageDocument>, ChatError>;
}

/// Extracts PDF text with poppler's `pdftotext`.
pub struct PdfLoader {
    program: String,
}

impl PdfLoader {
    pub fn new(program: impl Into<String>) -> Self {
        Self { program: program.into() }
    }
}

impl Default for PdfLoader {
    fn default() -> Self {
        Self::new("pdftotext")
    }
}

#[async_trait]
impl DocumentLoader for PdfLoader {
    async fn load(&self, path: &Path) -> Result<Vec<PageDocument>, ChatError> {
        let output = Command::new(&self.program)
            .arg("-layout")
            .arg(path)
            .arg("-")
            .kill_on_drop(true)
            .output().await
            .map_err(|e| ChatError::Document(format!("failed to run {}: {}", self.program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(
                ChatError::Document(
                    format!("{} exited with {}: {}", self.program, output.status, stderr.trim())
                )
            );
        }

        let pages = split_pages(&String::from_utf8_lossy(&output.stdout));
        info!("Extracted {} page(s) from {}", pages.len(), path.display());
        Ok(pages)
    }
}

/// Splits `pdftotext` output on form feeds. Pages without text are skipped
/// but keep their position in the numbering.
pub fn split_pages(text: &str) -> Vec<PageDocument> {
    text.split('\u{c}')
        .enumerate()
        .filter(|(_, page)| !page.trim().is_empty())
        .map(|(page, text)| PageDocument { page, text: text.to_string() })
        .collect()
}
