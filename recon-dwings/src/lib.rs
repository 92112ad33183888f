#![deny(clippy::print_stdout, clippy::print_stderr)]

//! C5: resolves the best-matching DWINGS invoice (and derived guarantee id)
//! for a movement, and caches the DWINGS dictionaries per data-source path.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use movement_model::DwingsGuarantee;
use movement_model::DwingsInvoice;
use movement_model::Movement;
use recon_ingest::extract_bgi;
use recon_ingest::extract_bgpmt;
use recon_ingest::extract_for_receivable;
use recon_ingest::extract_guarantee_id;
use thiserror::Error;
use tokio::sync::Mutex;

pub type DwingsResult<T> = Result<T, DwingsError>;

#[derive(Debug, Error)]
pub enum DwingsError {
    #[error("dwings data source error: {0}")]
    Source(String),
}

/// A loaded DWINGS dictionary: every invoice and guarantee for a data source.
#[derive(Debug, Clone, Default)]
pub struct DwingsData {
    pub invoices: Vec<DwingsInvoice>,
    pub guarantees: Vec<DwingsGuarantee>,
}

/// The outcome of resolving a movement against the DWINGS dictionaries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DwingsLinkage {
    pub invoice_id: Option<String>,
    pub guarantee_id: Option<String>,
    pub commission_id: Option<String>,
}

/// Loads the full DWINGS dictionary for a data-source path. Implemented by
/// whatever reads the underlying DWINGS export; the linker never parses a
/// file directly.
#[async_trait]
pub trait DwingsSource: Send + Sync {
    async fn load(&self, data_source: &str) -> DwingsResult<DwingsData>;
}

/// Forwards through an `Arc`, so a cache can be built over `Arc<dyn
/// DwingsSource>` when the concrete source type is chosen at runtime.
#[async_trait]
impl<T: DwingsSource + ?Sized> DwingsSource for Arc<T> {
    async fn load(&self, data_source: &str) -> DwingsResult<DwingsData> {
        (**self).load(data_source).await
    }
}

/// Caches a `DwingsSource` per data-source path, loaded lazily and at most
/// once concurrently: a load in flight is held behind the same per-path
/// mutex, so a second caller for the same path waits on the first rather
/// than issuing a duplicate load, the same cache-aside shape this
/// workspace's other durable lookup stores use.
pub struct DwingsCache<S: DwingsSource> {
    source: S,
    entries: Mutex<HashMap<String, Arc<DwingsData>>>,
}

impl<S: DwingsSource> DwingsCache<S> {
    #[must_use]
    pub fn new(source: S) -> Self {
        Self {
            source,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub async fn get(&self, data_source: &str) -> DwingsResult<Arc<DwingsData>> {
        let mut entries = self.entries.lock().await;
        if let Some(cached) = entries.get(data_source) {
            return Ok(Arc::clone(cached));
        }
        let loaded = Arc::new(self.source.load(data_source).await?);
        entries.insert(data_source.to_string(), Arc::clone(&loaded));
        Ok(loaded)
    }

    /// Drops the cached entry for a data source so the next `get` reloads
    /// it; called by the orchestrator once an import completes.
    pub async fn invalidate(&self, data_source: &str) {
        let mut entries = self.entries.lock().await;
        entries.remove(data_source);
    }
}

fn reconciliation_tokens(movement: &Movement) -> [Option<&str>; 3] {
    [
        movement.reconciliation_num.as_deref(),
        movement.reconciliation_origin_num.as_deref(),
        Some(movement.raw_label.as_str()),
    ]
}

fn first_token<'a>(
    tokens: &[Option<&'a str>],
    extract: impl Fn(&str) -> Option<String>,
) -> Option<String> {
    tokens
        .iter()
        .flatten()
        .find_map(|candidate| extract(candidate))
}

/// Normalizes `Receivable_InvoiceFromAmbre` into an invoice id. The field is
/// usually a bare digit string (the bank strips the `BGI` prefix when it
/// echoes the reference back), but may also be a full reference sentence
/// with the token embedded in it; both forms are handled.
fn normalize_receivable_token(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let extracted = extract_for_receivable(trimmed);
    if !extracted.is_empty() {
        return Some(extracted);
    }
    if trimmed.len() == 13 && trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Some(format!("BGI{trimmed}"));
    }
    None
}

fn closest_by_amount<'a>(
    invoices: impl Iterator<Item = &'a DwingsInvoice>,
    target: movement_model::Money,
) -> Option<&'a DwingsInvoice> {
    invoices.min_by_key(|invoice| {
        invoice
            .amount_priority()
            .into_iter()
            .flatten()
            .map(|amount| amount.abs_diff(target))
            .min()
            .unwrap_or(i64::MAX)
    })
}

/// Resolves the best-matching invoice for `movement` against `data`,
/// following the By-BGPMT, By-BGI, receivable-explicit-BGI, By-guarantee-id
/// resolution order, stopping at the first hit.
#[must_use]
pub fn resolve(movement: &Movement, data: &DwingsData, is_receivable: bool) -> DwingsLinkage {
    let tokens = reconciliation_tokens(movement);

    if let Some(bgpmt) = first_token(&tokens, extract_bgpmt) {
        if let Some(invoice) = data
            .invoices
            .iter()
            .find(|invoice| invoice.bgpmt.as_deref().is_some_and(|candidate| {
                candidate.eq_ignore_ascii_case(&bgpmt)
            }))
        {
            return DwingsLinkage {
                invoice_id: Some(invoice.invoice_id.clone()),
                guarantee_id: guarantee_id_for(invoice, &bgpmt),
                commission_id: Some(bgpmt),
            };
        }
    }

    if let Some(bgi) = first_token(&tokens, extract_bgi) {
        let matches = data
            .invoices
            .iter()
            .filter(|invoice| invoice.references_token(&bgi));
        if let Some(invoice) = closest_by_amount(matches, movement.signed_amount) {
            return DwingsLinkage {
                invoice_id: Some(invoice.invoice_id.clone()),
                guarantee_id: guarantee_id_for(invoice, &bgi),
                commission_id: None,
            };
        }
    }

    if is_receivable {
        let bgi = movement
            .receivable_invoice_from_ambre
            .as_deref()
            .and_then(normalize_receivable_token);
        if let Some(bgi) = bgi {
            if let Some(invoice) = data
                .invoices
                .iter()
                .find(|invoice| invoice.invoice_id.eq_ignore_ascii_case(&bgi))
            {
                return DwingsLinkage {
                    invoice_id: Some(invoice.invoice_id.clone()),
                    guarantee_id: guarantee_id_for(invoice, &bgi),
                    commission_id: None,
                };
            }
        }
    }

    if let Some(guarantee_id) = first_token(&tokens, |candidate| {
        extract_guarantee_id(candidate, None)
    }) {
        let operation_date = movement.operation_date;
        let fallback_date = movement.value_date;
        let candidates: Vec<&DwingsInvoice> = data
            .invoices
            .iter()
            .filter(|invoice| invoice.references_token(&guarantee_id))
            .collect();
        let in_window: Vec<&DwingsInvoice> = candidates
            .iter()
            .copied()
            .filter(|invoice| {
                invoice.covers_date(operation_date) || invoice.covers_date(fallback_date)
            })
            .collect();
        let pool = if in_window.is_empty() {
            candidates
        } else {
            in_window
        };
        if let Some(invoice) = closest_by_amount(pool.into_iter(), movement.signed_amount) {
            return DwingsLinkage {
                invoice_id: Some(invoice.invoice_id.clone()),
                guarantee_id: Some(guarantee_id),
                commission_id: None,
            };
        }
        return DwingsLinkage {
            invoice_id: None,
            guarantee_id: Some(guarantee_id),
            commission_id: None,
        };
    }

    DwingsLinkage::default()
}

fn guarantee_id_for(invoice: &DwingsInvoice, token: &str) -> Option<String> {
    Some(
        invoice
            .business_case_reference
            .clone()
            .or_else(|| invoice.business_case_id.clone())
            .unwrap_or_else(|| token.to_string()),
    )
}
