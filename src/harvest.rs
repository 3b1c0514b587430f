// Batch driver: pages over active records and fetches every URL-bearing field
use crate::fetcher::{DocumentFetcher, FetchOptions, FetchOutcome, SkipReason};
use crate::id_range::IdRange;
use crate::record::RecordId;
use crate::storage::StorageBackend;
use crate::store::RecordStore;
use anyhow::Result;

/// Counters of a harvest run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HarvestSummary {
    pub records: usize,
    pub obsolete: usize,
    pub fields: usize,
    pub stored: usize,
    pub skipped: usize,
    pub unwanted: usize,
    pub http_errors: usize,
    pub ssl_errors: usize,
    pub timeouts: usize,
    pub unknown_errors: usize,
    pub storage_failures: usize,
    pub last_id: Option<RecordId>,
}

impl HarvestSummary {
    pub fn record(&mut self, outcome: &FetchOutcome) {
        self.fields += 1;
        match outcome {
            FetchOutcome::Stored(_) => self.stored += 1,
            FetchOutcome::Skipped(_) => self.skipped += 1,
            FetchOutcome::UnwantedType(_) => self.unwanted += 1,
            FetchOutcome::SslError(_) => self.ssl_errors += 1,
            FetchOutcome::Timeout => self.timeouts += 1,
            FetchOutcome::HttpError(_) => self.http_errors += 1,
            FetchOutcome::UnknownError(_) => self.unknown_errors += 1,
            FetchOutcome::StorageFailed(_) => self.storage_failures += 1,
        }
    }

    pub fn network_errors(&self) -> usize {
        self.http_errors + self.ssl_errors + self.timeouts + self.unknown_errors
    }
}

/// Runs the fetcher over every active record of an id range.
pub struct Harvester<'a> {
    fetcher: DocumentFetcher,
    storage: &'a dyn StorageBackend,
    options: FetchOptions,
    page_size: usize,
}

impl<'a> Harvester<'a> {
    pub fn new(
        fetcher: DocumentFetcher,
        storage: &'a dyn StorageBackend,
        options: FetchOptions,
        page_size: usize,
    ) -> Self {
        Self {
            fetcher,
            storage,
            options,
            page_size: page_size.max(1),
        }
    }

    /// Harvest `range`; `on_record` is called after each record with the running totals
    pub async fn run<F>(
        &mut self,
        store: &dyn RecordStore,
        range: &IdRange,
        mut on_record: F,
    ) -> Result<HarvestSummary>
    where
        F: FnMut(&HarvestSummary),
    {
        let mut summary = HarvestSummary::default();
        let mut skip = 0;

        loop {
            let page = store.scan(range, skip, self.page_size)?;
            let count = page.len();
            skip += count;

            for record in page {
                summary.last_id = Some(record.id.clone());
                if record.obsolete {
                    summary.obsolete += 1;
                    continue;
                }
                summary.records += 1;
                log::info!("Processing {}", record.id);

                for (field, _) in record.url_fields() {
                    let outcome = self
                        .fetcher
                        .fetch(&record, &field, self.storage, &self.options)
                        .await;
                    match &outcome {
                        FetchOutcome::Stored(ext) => {
                            log::info!("{} {} stored ({})", record.id, field, ext)
                        }
                        FetchOutcome::Skipped(SkipReason::Exists) => {
                            log::info!(
                                "{} skipped, file already exists and --replace not set",
                                field
                            )
                        }
                        FetchOutcome::StorageFailed(detail) => {
                            log::error!("{} {}: storage failure: {}", record.id, field, detail)
                        }
                        other => log::info!("{} {}: {}", record.id, field, other),
                    }
                    summary.record(&outcome);
                }
                on_record(&summary);
            }

            if count < self.page_size {
                break;
            }
        }

        log::info!("Processed {} entries", summary.records);
        Ok(summary)
    }
}
