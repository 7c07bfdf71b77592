// SPDX-License-Identifier: MIT OR Apache-2.0
//! Default extraction seams for the stock worker binary.
//!
//! The core consumes opaque splitter/extractor implementations. Deployments
//! link real adapters (rasterizer + vision client); the stock binary ships a
//! cache-only pair that re-processes packages whose artifacts already exist
//! on disk, and refuses fresh extraction.

use apc_artifact::ArtifactStore;
use apc_core::document::{InvoiceDocument, StatementDocument};
use apc_error::{ApError, ApResult};
use apc_workflow::{Extractor, PageSplit, PdfSplitter};
use async_trait::async_trait;
use std::path::Path;

/// Derives the page split from the artifact tree instead of the PDF: one
/// statement page when `statement.json` exists, one invoice page per cached
/// invoice artifact.
#[derive(Debug, Clone)]
pub struct CachedArtifactSplitter {
    artifacts: ArtifactStore,
    feedlot_key: String,
}

impl CachedArtifactSplitter {
    /// Split against the given family's artifact directory.
    #[must_use]
    pub fn new(artifacts: ArtifactStore, feedlot_key: impl Into<String>) -> Self {
        Self {
            artifacts,
            feedlot_key: feedlot_key.into(),
        }
    }
}

#[async_trait]
impl PdfSplitter for CachedArtifactSplitter {
    async fn categorize_pages(
        &self,
        _pdf_path: &Path,
        _statement_keyword: &str,
        _invoice_keyword: &str,
    ) -> ApResult<PageSplit> {
        let has_statement = self
            .artifacts
            .exists(&format!("{}/statement.json", self.feedlot_key));
        let invoices = self
            .artifacts
            .list(&format!("{}/invoices", self.feedlot_key))?;
        if !has_statement && invoices.is_empty() {
            return Err(ApError::validation(
                "no cached artifacts to reprocess and no extraction adapter linked",
            ));
        }
        let statement_pages = if has_statement { vec![0] } else { vec![] };
        let invoice_pages = (1..=invoices.len()).collect();
        Ok(PageSplit {
            total_pages: statement_pages.len() + invoices.len(),
            statement_pages,
            invoice_pages,
        })
    }
}

/// Refuses extraction outright. With `use_cache` on, cached artifacts are
/// still served by the activities before this seam is ever reached.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnlinkedExtractor;

#[async_trait]
impl Extractor for UnlinkedExtractor {
    async fn extract_statement(
        &self,
        _pdf_path: &Path,
        _pages: &[usize],
        _prompt: &str,
    ) -> ApResult<StatementDocument> {
        Err(ApError::validation(
            "no extraction adapter linked; only cached artifacts can be processed",
        ))
    }

    async fn extract_invoice(
        &self,
        _pdf_path: &Path,
        _page: usize,
        _prompt: &str,
    ) -> ApResult<InvoiceDocument> {
        Err(ApError::validation(
            "no extraction adapter linked; only cached artifacts can be processed",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn splitter_reports_cached_pages() {
        let dir = tempfile::tempdir().unwrap();
        let artifacts = ArtifactStore::new(dir.path()).unwrap();
        artifacts
            .put_binary(b"{}", "bovina/statement.json", "application/json")
            .unwrap();
        artifacts
            .put_binary(b"{}", "bovina/invoices/13330.json", "application/json")
            .unwrap();
        let splitter = CachedArtifactSplitter::new(artifacts, "bovina");
        let split = splitter
            .categorize_pages(Path::new("unused.pdf"), "statement of notes", "feed invoice")
            .await
            .unwrap();
        assert_eq!(split.statement_pages, vec![0]);
        assert_eq!(split.invoice_pages, vec![1]);
        assert_eq!(split.total_pages, 2);
    }

    #[tokio::test]
    async fn empty_cache_is_a_validation_error() {
        let dir = tempfile::tempdir().unwrap();
        let artifacts = ArtifactStore::new(dir.path()).unwrap();
        let splitter = CachedArtifactSplitter::new(artifacts, "bovina");
        let err = splitter
            .categorize_pages(Path::new("unused.pdf"), "s", "i")
            .await
            .unwrap_err();
        assert!(matches!(err, ApError::Validation { .. }));
    }

    #[tokio::test]
    async fn unlinked_extractor_refuses() {
        let err = UnlinkedExtractor
            .extract_statement(Path::new("x.pdf"), &[0], "prompt")
            .await
            .unwrap_err();
        assert!(matches!(err, ApError::Validation { .. }));
    }
}
