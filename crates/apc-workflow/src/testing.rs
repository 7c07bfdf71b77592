// SPDX-License-Identifier: MIT OR Apache-2.0
//! Deterministic extraction fixtures.
//!
//! The real splitter and extractor live outside the core; these in-memory
//! implementations stand in for them in tests and dry runs. The scripted
//! extractor returns canned documents and can inject failures to exercise
//! retry and crash-recovery paths.

use crate::extract::{Extractor, PageSplit, PdfSplitter};
use apc_core::document::{InvoiceDocument, StatementDocument};
use apc_error::{ApError, ApResult};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A splitter that returns a fixed [`PageSplit`] for every document.
#[derive(Debug, Clone)]
pub struct FixedSplitter {
    split: PageSplit,
}

impl FixedSplitter {
    /// Split every PDF into the given pages.
    #[must_use]
    pub fn new(split: PageSplit) -> Self {
        Self { split }
    }

    /// One statement page followed by `invoices` invoice pages.
    #[must_use]
    pub fn statement_and_invoices(invoices: usize) -> Self {
        Self::new(PageSplit {
            statement_pages: vec![0],
            invoice_pages: (1..=invoices).collect(),
            total_pages: invoices + 1,
        })
    }
}

#[async_trait]
impl PdfSplitter for FixedSplitter {
    async fn categorize_pages(
        &self,
        _pdf_path: &Path,
        _statement_keyword: &str,
        _invoice_keyword: &str,
    ) -> ApResult<PageSplit> {
        Ok(self.split.clone())
    }
}

/// Failure a [`ScriptedExtractor`] injects once its call allowance is spent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectedFailure {
    /// Further calls fail terminally (schema violation).
    Terminal,
    /// Further calls observe cancellation, the closest stand-in for a
    /// worker killed mid-activity, since cancellations are never journaled.
    Cancelled,
}

/// An extractor that serves canned documents keyed by page index.
#[derive(Default)]
pub struct ScriptedExtractor {
    statement: Mutex<Option<StatementDocument>>,
    invoices: Mutex<BTreeMap<usize, InvoiceDocument>>,
    calls: AtomicUsize,
    flaky_remaining: AtomicUsize,
    fail_after: Mutex<Option<(usize, InjectedFailure)>>,
}

impl ScriptedExtractor {
    /// Empty script; add documents with the `with_*` builders.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve this statement.
    #[must_use]
    pub fn with_statement(self, statement: StatementDocument) -> Self {
        *self.statement.lock().expect("script lock poisoned") = Some(statement);
        self
    }

    /// Serve this invoice for a page index.
    #[must_use]
    pub fn with_invoice(self, page: usize, invoice: InvoiceDocument) -> Self {
        self.invoices
            .lock()
            .expect("script lock poisoned")
            .insert(page, invoice);
        self
    }

    /// Fail the next `times` calls transiently, then recover. Exercises the
    /// retry loop.
    #[must_use]
    pub fn flaky(self, times: usize) -> Self {
        self.flaky_remaining.store(times, Ordering::SeqCst);
        self
    }

    /// Inject `failure` on every call after `calls` successful ones.
    #[must_use]
    pub fn failing_after(self, calls: usize, failure: InjectedFailure) -> Self {
        *self.fail_after.lock().expect("script lock poisoned") = Some((calls, failure));
        self
    }

    /// Clear the injected failure (the "fixed worker" in recovery tests).
    pub fn heal(&self) {
        *self.fail_after.lock().expect("script lock poisoned") = None;
    }

    /// Extraction calls served so far (successful or failed).
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn gate(&self) -> ApResult<()> {
        if self
            .flaky_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(ApError::transient("injected extractor outage"));
        }
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some((after, failure)) = *self.fail_after.lock().expect("script lock poisoned")
            && call >= after
        {
            return Err(match failure {
                InjectedFailure::Terminal => {
                    ApError::schema("invoice", "injected schema violation")
                }
                InjectedFailure::Cancelled => ApError::Cancelled,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Extractor for ScriptedExtractor {
    async fn extract_statement(
        &self,
        _pdf_path: &Path,
        _pages: &[usize],
        _prompt: &str,
    ) -> ApResult<StatementDocument> {
        self.gate()?;
        self.statement
            .lock()
            .expect("script lock poisoned")
            .clone()
            .ok_or_else(|| ApError::schema("statement", "no scripted statement"))
    }

    async fn extract_invoice(
        &self,
        _pdf_path: &Path,
        page: usize,
        _prompt: &str,
    ) -> ApResult<InvoiceDocument> {
        self.gate()?;
        self.invoices
            .lock()
            .expect("script lock poisoned")
            .get(&page)
            .cloned()
            .ok_or_else(|| ApError::schema("invoice", format!("no scripted invoice for page {page}")))
    }
}
