use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{StoreError, SyncError};
use crate::models::{ListingStatus, ListingStub, PropertyRecord};
use crate::scrapers::traits::{DetailFetcher, ListingFetcher};
use crate::store::{index_of, PropertyStore, RunLog, SyncRun};

use super::detector::classify;
use super::fingerprint::fingerprint_record;
use super::retry::with_retry;
use super::types::{SyncOptions, MAX_CONSECUTIVE_PAGE_FAILURES};

/// Stubs gathered from one pass over the search pages
#[derive(Debug, Default)]
struct ListingHarvest {
    stubs: Vec<ListingStub>,
    pages_fetched: u32,
    failed_pages: u32,
    credits: u64,
    /// The pass was cut short by cancellation
    cancelled: bool,
}

impl ListingHarvest {
    /// Unseen ids may only be treated as delisted when no page in the
    /// pass was lost. Stopping at the page cap does not count as lost.
    fn supports_removal(&self) -> bool {
        self.failed_pages == 0 && !self.cancelled
    }
}

/// Result of one detail task
#[derive(Debug)]
enum DetailOutcome {
    Saved { credits: u64 },
    Failed { id: String, credits: u64 },
}

/// Drives an incremental sync: list, classify, fetch what changed, persist.
pub struct SyncOrchestrator {
    listings: Arc<dyn ListingFetcher>,
    details: Arc<dyn DetailFetcher>,
    store: PropertyStore,
    run_log: RunLog,
    options: SyncOptions,
}

impl SyncOrchestrator {
    pub fn new(
        listings: Arc<dyn ListingFetcher>,
        details: Arc<dyn DetailFetcher>,
        store: PropertyStore,
        run_log: RunLog,
        options: SyncOptions,
    ) -> Self {
        Self {
            listings,
            details,
            store,
            run_log,
            options,
        }
    }

    pub fn store(&self) -> &PropertyStore {
        &self.store
    }

    pub fn run_log(&self) -> &RunLog {
        &self.run_log
    }

    /// Run one sync pass against the search at `listing_url`.
    ///
    /// At most `max_detail_fetches` new or changed listings get a detail
    /// fetch; the rest are reported as skipped. Per-page and per-property
    /// failures are recorded in the returned summary. Only store setup
    /// failures are returned as errors.
    ///
    /// Cancelling `cancel` stops new work from starting. Detail fetches in
    /// flight finish and persist, and the run is logged as incomplete.
    pub async fn run_sync(
        &self,
        listing_url: &str,
        max_detail_fetches: usize,
        cancel: &CancellationToken,
    ) -> Result<SyncRun, SyncError> {
        let mut run = SyncRun::started(Utc::now());
        info!("🔄 Starting incremental sync from {}", listing_url);

        let harvest = self.collect_listings(listing_url, cancel).await;
        run.found_count = harvest.stubs.len();
        run.pages_fetched = harvest.pages_fetched;
        run.failed_pages = harvest.failed_pages;
        run.credits_used = harvest.credits;

        if harvest.stubs.is_empty() {
            warn!("No properties found in current listings, leaving the store untouched");
            return self.finish(run, cancel).await;
        }

        let existing = self.store.load_all().await.map_err(|e| {
            SyncError::Setup(format!(
                "cannot load property store at {}: {}",
                self.store.root().display(),
                e
            ))
        })?;
        let classification = classify(&index_of(&existing), &harvest.stubs);
        info!(
            "Changes detected - New: {}, Changed: {}, Removed: {}, Unchanged: {}",
            classification.new.len(),
            classification.changed.len(),
            classification.removed.len(),
            classification.unchanged.len()
        );
        run.new_ids = classification.new.clone();
        run.changed_ids = classification.changed.clone();
        run.unchanged_count = classification.unchanged.len();

        let mut failed: Vec<String> = Vec::new();

        if harvest.supports_removal() {
            for id in &classification.removed {
                match self.store.mark_removed(id, Utc::now()).await {
                    Ok(_) => run.removed_ids.push(id.clone()),
                    Err(e @ StoreError::NotFound(_)) => {
                        error!("Cannot mark {} removed: {}", id, e);
                        failed.push(id.clone());
                    }
                    Err(e) => {
                        error!("Error updating removed property {}: {}", id, e);
                        failed.push(id.clone());
                    }
                }
            }
        } else if !classification.removed.is_empty() {
            warn!(
                "Listing pass lost {} pages{}, not marking {} unseen properties as removed",
                harvest.failed_pages,
                if harvest.cancelled { " and was cancelled" } else { "" },
                classification.removed.len()
            );
        }

        let mut to_fetch = classification.to_fetch();
        if to_fetch.len() > max_detail_fetches {
            info!("📊 Limiting to first {} new/changed properties", max_detail_fetches);
            run.skipped_ids = to_fetch.split_off(max_detail_fetches);
        }

        let (attempted, saved) = self
            .capture_details(&to_fetch, &harvest.stubs, &existing, cancel, &mut run, &mut failed)
            .await;
        run.record_success_rate(attempted, saved);

        failed.sort();
        failed.dedup();
        run.failed_ids = failed;

        self.finish(run, cancel).await
    }

    /// Walk the search pages in order, retrying each and stepping over pages
    /// that keep failing when the source supports numbered pages.
    async fn collect_listings(&self, base_url: &str, cancel: &CancellationToken) -> ListingHarvest {
        let mut harvest = ListingHarvest::default();
        let mut seen: HashSet<String> = HashSet::new();
        let mut next = Some(base_url.to_string());
        let mut page_number: u32 = 1;
        let mut consecutive_failures = 0;

        while let Some(url) = next.take() {
            if cancel.is_cancelled() {
                warn!("Sync cancelled during listing pass");
                harvest.cancelled = true;
                break;
            }
            if page_number > self.options.max_pages {
                info!("Reached page cap of {}, stopping pagination", self.options.max_pages);
                break;
            }

            info!("Scraping page {}: {}", page_number, url);
            let label = format!("listing page {page_number}");
            match with_retry(&self.options.retry, &label, || self.listings.fetch_page(&url)).await {
                Ok(fetched) => {
                    consecutive_failures = 0;
                    harvest.pages_fetched += 1;
                    harvest.credits += fetched.credits;

                    let page = fetched.value;
                    if page.stubs.is_empty() {
                        debug!("Page {} has no listings, end of results", page_number);
                        break;
                    }

                    let total = page.stubs.len();
                    let mut fresh = 0;
                    for stub in page.stubs {
                        if seen.insert(stub.id.clone()) {
                            harvest.stubs.push(stub);
                            fresh += 1;
                        }
                    }
                    info!("Page {}: found {} listings ({} not seen earlier)", page_number, total, fresh);
                    next = page.next_page_url;
                }
                Err(e) => {
                    harvest.failed_pages += 1;
                    consecutive_failures += 1;
                    warn!("Skipping page {} after {} error: {}", page_number, e.kind(), e);

                    if consecutive_failures >= MAX_CONSECUTIVE_PAGE_FAILURES {
                        warn!("{} pages failed in a row, ending listing pass", consecutive_failures);
                        break;
                    }
                    next = self.listings.page_url(base_url, page_number + 1);
                }
            }
            page_number += 1;
        }

        info!(
            "Listing pass done: {} listings over {} pages ({} failed)",
            harvest.stubs.len(),
            harvest.pages_fetched,
            harvest.failed_pages
        );
        harvest
    }

    /// Fetch and persist `ids` on a bounded worker pool.
    ///
    /// Returns (attempted, saved). Failures are appended to `failed`.
    async fn capture_details(
        &self,
        ids: &[String],
        stubs: &[ListingStub],
        existing: &BTreeMap<String, PropertyRecord>,
        cancel: &CancellationToken,
        run: &mut SyncRun,
        failed: &mut Vec<String>,
    ) -> (usize, usize) {
        if ids.is_empty() {
            info!("✅ No new or changed properties to fetch");
            return (0, 0);
        }

        let by_id: HashMap<&str, &ListingStub> = stubs.iter().map(|s| (s.id.as_str(), s)).collect();
        let jobs: Vec<&ListingStub> = ids.iter().filter_map(|id| by_id.get(id.as_str()).copied()).collect();
        let total = jobs.len();
        let concurrency = self.options.concurrency.max(1);
        info!("Scraping {} new/changed properties ({} at a time)...", total, concurrency);

        let outcomes: Vec<DetailOutcome> = stream::iter(jobs)
            .take_while(|_| futures::future::ready(!cancel.is_cancelled()))
            .map(|stub| self.capture_one(stub, existing.get(&stub.id)))
            .buffer_unordered(concurrency)
            .collect()
            .await;

        let attempted = outcomes.len();
        let mut saved = 0;
        for outcome in outcomes {
            match outcome {
                DetailOutcome::Saved { credits } => {
                    saved += 1;
                    run.credits_used += credits;
                }
                DetailOutcome::Failed { id, credits } => {
                    run.credits_used += credits;
                    failed.push(id);
                }
            }
        }

        if attempted < total {
            warn!("Sync cancelled, {} properties not fetched", total - attempted);
        }
        info!("Detail pass done: {}/{} saved", saved, attempted);
        (attempted, saved)
    }

    /// Fetch one property's detail page and persist it straight away.
    async fn capture_one(&self, stub: &ListingStub, previous: Option<&PropertyRecord>) -> DetailOutcome {
        let label = format!("property {}", stub.id);
        let id = stub.id.clone();

        let fetched = match with_retry(&self.options.retry, &label, || self.details.fetch_detail(&stub.url)).await {
            Ok(fetched) => fetched,
            Err(e) => {
                warn!("❌ Failed to fetch property {} ({} error): {}", id, e.kind(), e);
                return DetailOutcome::Failed { id, credits: 0 };
            }
        };
        let credits = fetched.credits;

        let record = build_record(stub, fetched.value, previous);
        match with_retry(&self.options.retry.once(), &label, || self.store.write(&record)).await {
            Ok(()) => {
                info!("💾 Saved property {}", id);
                DetailOutcome::Saved { credits }
            }
            Err(e) => {
                error!("Error saving property {}: {}", id, e);
                DetailOutcome::Failed { id, credits }
            }
        }
    }

    async fn finish(&self, mut run: SyncRun, cancel: &CancellationToken) -> Result<SyncRun, SyncError> {
        run.completed = !cancel.is_cancelled();
        run.timestamp = Utc::now();
        self.run_log.append(&run).await?;

        info!(
            "🎉 Sync {}: found {}, new {}, changed {}, removed {}, failed {}, skipped {}",
            if run.completed { "complete" } else { "aborted" },
            run.found_count,
            run.new_ids.len(),
            run.changed_ids.len(),
            run.removed_ids.len(),
            run.failed_ids.len(),
            run.skipped_ids.len()
        );
        Ok(run)
    }
}

/// Assemble the stored record for a freshly fetched listing.
///
/// `first_seen_at` carries over from the previous version. `last_updated_at`
/// only moves when the fingerprint or status changed, and never backwards.
fn build_record(
    stub: &ListingStub,
    mut fields: crate::models::PropertyFields,
    previous: Option<&PropertyRecord>,
) -> PropertyRecord {
    let now = Utc::now();
    fields.backfill_from(&stub.basic);
    let fingerprint = fingerprint_record(&stub.id, &stub.basic, ListingStatus::Active);

    let (first_seen_at, last_updated_at) = match previous {
        None => (now, now),
        Some(prev) if prev.fingerprint == fingerprint && prev.status == ListingStatus::Active => {
            (prev.first_seen_at, prev.last_updated_at)
        }
        Some(prev) => (prev.first_seen_at, now.max(prev.last_updated_at)),
    };

    PropertyRecord {
        id: stub.id.clone(),
        url: stub.url.clone(),
        fields,
        listing: stub.basic.clone(),
        status: ListingStatus::Active,
        fingerprint,
        first_seen_at,
        last_updated_at,
    }
}
