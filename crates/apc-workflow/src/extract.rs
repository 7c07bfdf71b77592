// SPDX-License-Identifier: MIT OR Apache-2.0
//! Extraction seams and activities.
//!
//! The core does not rasterize PDFs or call vision models; it consumes the
//! [`PdfSplitter`] and [`Extractor`] traits. The activities here wrap those
//! seams with caching, artifact storage, progress logging, and heartbeats.

use crate::engine::{ActivityContext, ActivityDeps};
use apc_core::document::{InvoiceDocument, StatementDocument};
use apc_core::progress::ProgressStep;
use apc_core::{DataReference, FeedlotFamily, safe_invoice_number};
use apc_error::{ApError, ApResult};
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

/// Result of categorizing a PDF's pages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSplit {
    /// Zero-based statement page indices.
    pub statement_pages: Vec<usize>,
    /// Zero-based invoice page indices, in document order.
    pub invoice_pages: Vec<usize>,
    /// Total pages in the document.
    pub total_pages: usize,
}

/// Categorizes PDF pages by keyword. Implemented outside the core.
#[async_trait]
pub trait PdfSplitter: Send + Sync {
    /// Split a document into statement and invoice pages using the
    /// family-specific keyword pair.
    async fn categorize_pages(
        &self,
        pdf_path: &Path,
        statement_keyword: &str,
        invoice_keyword: &str,
    ) -> ApResult<PageSplit>;
}

/// Extracts structured documents from PDF pages. Implemented outside the
/// core (vision provider, OCR, fixtures; the core does not care).
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Extract the statement spanning `pages`.
    async fn extract_statement(
        &self,
        pdf_path: &Path,
        pages: &[usize],
        prompt: &str,
    ) -> ApResult<StatementDocument>;

    /// Extract the invoice on `page`.
    async fn extract_invoice(
        &self,
        pdf_path: &Path,
        page: usize,
        prompt: &str,
    ) -> ApResult<InvoiceDocument>;
}

// ---------------------------------------------------------------------------
// Activity outputs
// ---------------------------------------------------------------------------

/// Output of the `split_pdf` activity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitPdfOutput {
    /// Statement page indices.
    pub statement_pages: Vec<usize>,
    /// Invoice page indices.
    pub invoice_pages: Vec<usize>,
    /// Total pages in the PDF.
    pub total_pages: usize,
}

/// Output of the `extract_statement` activity. References only; the
/// document body stays in the artifact store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractStatementOutput {
    /// Stored statement artifact.
    pub statement_ref: DataReference,
    /// Extracted feedlot name, for logging and entity signals.
    pub feedlot_name: Option<String>,
    /// Extracted owner name.
    pub owner_name: Option<String>,
    /// Statement period start.
    pub period_start: Option<NaiveDate>,
    /// Statement period end.
    pub period_end: Option<NaiveDate>,
}

/// Output of the `extract_invoice` activity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractInvoiceOutput {
    /// Stored invoice artifact.
    pub invoice_ref: DataReference,
    /// Extracted invoice number, when the page carried one.
    pub invoice_number: Option<String>,
    /// Extracted lot number.
    pub lot_number: Option<String>,
    /// Extracted invoice date.
    pub invoice_date: Option<NaiveDate>,
    /// Extracted total.
    pub total_amount: Option<Decimal>,
}

// ---------------------------------------------------------------------------
// Activities
// ---------------------------------------------------------------------------

/// Categorize a package PDF into statement and invoice pages.
pub async fn split_pdf(
    actx: &ActivityContext,
    deps: &ActivityDeps,
    package_id: &str,
    family: FeedlotFamily,
    pdf_path: &str,
) -> ApResult<SplitPdfOutput> {
    let path = Path::new(pdf_path);
    if !path.exists() {
        return Err(ApError::not_found(format!("pdf {pdf_path}")));
    }
    actx.check_cancelled()?;

    let split = deps
        .splitter
        .categorize_pages(path, family.statement_keyword(), family.invoice_keyword())
        .await?;

    let message = format!(
        "PDF split: {} statement pages, {} invoices to extract",
        split.statement_pages.len(),
        split.invoice_pages.len()
    );
    info!(target: "ap.workflow", package_id, %family, message);
    deps.store
        .log_progress(package_id, ProgressStep::SplitPdf, &message)?;
    deps.store
        .set_total_invoices(package_id, split.invoice_pages.len() as u32)?;

    Ok(SplitPdfOutput {
        statement_pages: split.statement_pages,
        invoice_pages: split.invoice_pages,
        total_pages: split.total_pages,
    })
}

fn statement_output(
    statement: &StatementDocument,
    statement_ref: DataReference,
) -> ExtractStatementOutput {
    ExtractStatementOutput {
        statement_ref,
        feedlot_name: statement.feedlot.name.clone(),
        owner_name: statement.owner.name.clone(),
        period_start: statement.period_start,
        period_end: statement.period_end,
    }
}

/// Extract the statement document, preferring a cached artifact.
pub async fn extract_statement(
    actx: &ActivityContext,
    deps: &ActivityDeps,
    package_id: &str,
    family: FeedlotFamily,
    pdf_path: &str,
    pages: &[usize],
    use_cache: bool,
) -> ApResult<ExtractStatementOutput> {
    let relative = format!("{}/statement.json", family.artifact_key());

    if use_cache && deps.artifacts.exists(&relative) {
        let cached = deps
            .artifacts
            .reference_existing(&relative, "application/json")?;
        match deps.artifacts.get_json::<StatementDocument>(&cached, true) {
            Ok(statement) => {
                let message = format!(
                    "Statement loaded from cache (feedlot: {})",
                    statement.feedlot.name.as_deref().unwrap_or("unknown")
                );
                info!(target: "ap.workflow", package_id, message);
                deps.store
                    .log_progress(package_id, ProgressStep::ExtractStatement, &message)?;
                return Ok(statement_output(&statement, cached));
            }
            Err(e) => {
                warn!(
                    target: "ap.workflow",
                    package_id,
                    error = %e,
                    "cached statement unusable, extracting fresh"
                );
            }
        }
    }

    let path = Path::new(pdf_path);
    if !path.exists() {
        return Err(ApError::not_found(format!("pdf {pdf_path}")));
    }

    actx.heartbeat("starting statement extraction")?;
    let statement = deps
        .extractor
        .extract_statement(path, pages, &family.prompt_name("statement"))
        .await?;
    actx.heartbeat("statement extraction complete, saving")?;

    let statement_ref = deps.artifacts.put_json(&statement, &relative)?;
    let message = format!(
        "Statement extracted successfully (feedlot: {})",
        statement.feedlot.name.as_deref().unwrap_or("unknown")
    );
    info!(target: "ap.workflow", package_id, message);
    deps.store
        .log_progress(package_id, ProgressStep::ExtractStatement, &message)?;

    Ok(statement_output(&statement, statement_ref))
}

fn invoice_output(invoice: &InvoiceDocument, invoice_ref: DataReference) -> ExtractInvoiceOutput {
    ExtractInvoiceOutput {
        invoice_ref,
        invoice_number: invoice.invoice_number.clone(),
        lot_number: invoice.lot.lot_number.clone(),
        invoice_date: invoice.invoice_date,
        total_amount: invoice.resolved_total(),
    }
}

fn load_cached_invoice(
    deps: &ActivityDeps,
    relative: &str,
) -> Option<(InvoiceDocument, DataReference)> {
    let cached = deps
        .artifacts
        .reference_existing(relative, "application/json")
        .ok()?;
    let invoice = deps
        .artifacts
        .get_json::<InvoiceDocument>(&cached, true)
        .ok()?;
    Some((invoice, cached))
}

/// Extract one invoice page, preferring cached artifacts.
///
/// Cache matching is two-stage: first by the page index recorded inside the
/// artifact, then (for caches written before page indices were recorded)
/// by ordinal position when the file count covers the expected total.
#[allow(clippy::too_many_arguments)]
pub async fn extract_invoice(
    actx: &ActivityContext,
    deps: &ActivityDeps,
    package_id: &str,
    family: FeedlotFamily,
    pdf_path: &str,
    page_index: usize,
    invoice_index: usize,
    total_invoices: usize,
    use_cache: bool,
) -> ApResult<ExtractInvoiceOutput> {
    let dir = format!("{}/invoices", family.artifact_key());

    if use_cache {
        let files = deps.artifacts.list(&dir)?;

        // First pass: match by recorded page index.
        for name in &files {
            let relative = format!("{dir}/{name}");
            if let Some((invoice, cached)) = load_cached_invoice(deps, &relative)
                && invoice.page_index == Some(page_index)
            {
                return cache_hit(deps, package_id, invoice, cached, invoice_index, total_invoices);
            }
        }

        // Second pass: positional match for caches without page indices.
        if invoice_index > 0 && files.len() >= total_invoices {
            let relative = format!("{dir}/{}", files[invoice_index - 1]);
            if let Some((invoice, cached)) = load_cached_invoice(deps, &relative) {
                return cache_hit(deps, package_id, invoice, cached, invoice_index, total_invoices);
            }
        }
    }

    let path = Path::new(pdf_path);
    if !path.exists() {
        return Err(ApError::not_found(format!("pdf {pdf_path}")));
    }

    actx.heartbeat(&format!("starting invoice extraction for page {page_index}"))?;
    let mut invoice = deps
        .extractor
        .extract_invoice(path, page_index, &family.prompt_name("invoice"))
        .await?;
    actx.heartbeat(&format!(
        "invoice extraction complete for {}",
        invoice.invoice_number.as_deref().unwrap_or("unknown")
    ))?;

    // Record the source page so later runs can match the cache precisely.
    invoice.page_index = Some(page_index);

    let fallback = format!("page_{}", page_index + 1);
    let number = invoice
        .invoice_number
        .clone()
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| fallback.clone());
    let safe = {
        let stripped = safe_invoice_number(&number);
        if stripped.is_empty() { fallback } else { stripped }
    };

    let relative = format!("{dir}/{safe}.json");
    let invoice_ref = match deps.artifacts.put_json(&invoice, &relative) {
        Ok(r) => r,
        // A different invoice already owns this number's file name.
        Err(apc_artifact::ArtifactError::WouldClobber { .. }) => deps
            .artifacts
            .put_json(&invoice, &format!("{dir}/{safe}_page_{}.json", page_index + 1))?,
        Err(e) => return Err(e.into()),
    };

    let message = format!(
        "Invoice {number} extracted ({invoice_index}/{total_invoices})"
    );
    info!(target: "ap.workflow", package_id, message);
    deps.store
        .log_progress(package_id, ProgressStep::ExtractInvoice, &message)?;
    deps.store.increment_extracted_invoices(package_id)?;

    Ok(invoice_output(&invoice, invoice_ref))
}

fn cache_hit(
    deps: &ActivityDeps,
    package_id: &str,
    invoice: InvoiceDocument,
    cached: DataReference,
    invoice_index: usize,
    total_invoices: usize,
) -> ApResult<ExtractInvoiceOutput> {
    let number = invoice.invoice_number.as_deref().unwrap_or("unknown");
    let message =
        format!("Invoice {number} loaded from cache ({invoice_index}/{total_invoices})");
    info!(target: "ap.workflow", package_id, message);
    deps.store
        .log_progress(package_id, ProgressStep::ExtractInvoice, &message)?;
    deps.store.increment_extracted_invoices(package_id)?;
    Ok(invoice_output(&invoice, cached))
}
