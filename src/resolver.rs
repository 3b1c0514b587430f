// Version resolution - one active record per natural key, obsolete stubs pointing at it
use crate::error::{ConsistencyError, StoreError};
use crate::id_range::IdRange;
use crate::record::{natural_key_of, Partition, Record, RecordId, RecordPatch, Updated};
use crate::store::{BulkReport, BulkWriter, RecordStore};
use anyhow::Result;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::io::Write;

// ============================================================================
// Election
// ============================================================================

fn rank(a: &Record, b: &Record) -> Ordering {
    // Latest update wins, records without one rank lowest; ties go to the smallest id
    a.latest_update()
        .cmp(&b.latest_update())
        .then_with(|| b.id.cmp(&a.id))
}

/// Index of the canonical record among the active candidates of a group
pub fn elect(candidates: &[Record]) -> Option<usize> {
    candidates
        .iter()
        .enumerate()
        .filter(|(_, record)| !record.obsolete)
        .max_by(|(_, a), (_, b)| rank(a, b))
        .map(|(idx, _)| idx)
}

/// Sorted, deduplicated truncated timestamps of several records
fn merged_updates<'r>(records: impl IntoIterator<Item = &'r Record>) -> Option<Updated> {
    let mut all: Vec<String> = records
        .into_iter()
        .filter_map(|r| r.updated.as_ref())
        .flat_map(|u| u.truncated().into_iter().map(str::to_string).collect::<Vec<_>>())
        .collect();
    if all.is_empty() {
        return None;
    }
    all.sort_unstable();
    all.dedup();
    Some(Updated::Many(all))
}

// ============================================================================
// Patches
// ============================================================================

/// Field-level diff of a superseded version against the canonical record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatchEntry {
    pub natural_key: String,
    pub base_id: RecordId,
    pub id: RecordId,
    pub patch: RecordPatch,
}

/// Receiver of patches produced while versions are rewritten to stubs
pub trait PatchSink {
    fn record(&mut self, entry: PatchEntry) -> Result<()>;
}

impl PatchSink for Vec<PatchEntry> {
    fn record(&mut self, entry: PatchEntry) -> Result<()> {
        self.push(entry);
        Ok(())
    }
}

/// Patch sink writing one JSON document per line
pub struct JsonlPatchSink<W: Write> {
    out: W,
}

impl<W: Write> JsonlPatchSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> PatchSink for JsonlPatchSink<W> {
    fn record(&mut self, entry: PatchEntry) -> Result<()> {
        serde_json::to_writer(&mut self.out, &entry)?;
        self.out.write_all(b"\n")?;
        Ok(())
    }
}

// ============================================================================
// Summaries
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolveSummary {
    /// Natural-key groups examined
    pub groups: usize,
    /// Groups that had more than one active record
    pub elected: usize,
    /// Records rewritten to obsolete stubs
    pub stubbed: usize,
    /// Canonical records whose update list was extended
    pub merged: usize,
    /// Obsolete pointers rewritten to their terminal record
    pub repointed: usize,
    /// Chains left untouched because they are dangling, cyclic or too long
    pub broken_chains: usize,
    pub writes: BulkReport,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GapSummary {
    pub missing: usize,
    pub recovered: usize,
    /// Legacy records whose natural key has no active record
    pub unresolved: usize,
    /// Ids absent from both stores
    pub not_in_legacy: usize,
    pub writes: BulkReport,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Update already known: timestamps merged into this active record
    Merged(RecordId),
    /// Stored as a new version
    Inserted(RecordId),
    /// Id already taken by a stored record; nothing written
    Conflict(RecordId),
}

// ============================================================================
// Resolver
// ============================================================================

pub struct VersionResolver<'a> {
    store: &'a mut dyn RecordStore,
    legacy: Option<&'a dyn RecordStore>,
    patches: Option<&'a mut dyn PatchSink>,
    page_size: usize,
    bulk_size: usize,
    max_chain_hops: usize,
}

impl<'a> VersionResolver<'a> {
    pub fn new(store: &'a mut dyn RecordStore) -> Self {
        Self {
            store,
            legacy: None,
            patches: None,
            page_size: crate::constants::DEFAULT_PAGE_SIZE,
            bulk_size: crate::constants::DEFAULT_BULK_SIZE,
            max_chain_hops: crate::constants::MAX_CHAIN_HOPS,
        }
    }

    pub fn with_legacy(mut self, legacy: &'a dyn RecordStore) -> Self {
        self.legacy = Some(legacy);
        self
    }

    pub fn with_patches(mut self, patches: &'a mut dyn PatchSink) -> Self {
        self.patches = Some(patches);
        self
    }

    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn bulk_size(mut self, bulk_size: usize) -> Self {
        self.bulk_size = bulk_size.max(1);
        self
    }

    pub fn max_chain_hops(mut self, hops: usize) -> Self {
        self.max_chain_hops = hops.max(1);
        self
    }

    /// Elect one canonical record per natural key found in `range`, rewrite the
    /// other versions to stubs, then collapse every obsolete chain in range.
    pub fn resolve(&mut self, range: &IdRange) -> Result<ResolveSummary> {
        let mut summary = ResolveSummary::default();
        let mut writer = BulkWriter::new("resolve", self.bulk_size);
        let mut seen: HashSet<String> = HashSet::new();
        let mut skip = 0;

        loop {
            let page = self.store.scan(range, skip, self.page_size)?;
            let count = page.len();
            skip += count;

            for record in page {
                let key = record.natural_key().to_string();
                if !seen.insert(key.clone()) {
                    continue;
                }
                summary.groups += 1;
                let group = self.store.versions(&key)?;
                self.resolve_group(&key, group, &mut writer, &mut summary)?;
                writer.commit_if_full(&mut *self.store)?;
            }

            if count < self.page_size {
                break;
            }
        }
        writer.commit(&mut *self.store)?;
        summary.writes = writer.totals().clone();
        log::info!(
            "{} groups, {} with several active versions, {} stubs written",
            summary.groups,
            summary.elected,
            summary.stubbed
        );

        let chains = self.collapse_chains(range)?;
        summary.repointed = chains.repointed;
        summary.broken_chains = chains.broken_chains;
        summary.writes.absorb(chains.writes);
        self.store.flush()?;
        Ok(summary)
    }

    fn resolve_group(
        &mut self,
        key: &str,
        group: Vec<Record>,
        writer: &mut BulkWriter,
        summary: &mut ResolveSummary,
    ) -> Result<()> {
        let active: Vec<&Record> = group.iter().filter(|r| !r.obsolete).collect();
        if active.len() < 2 {
            return Ok(());
        }
        let Some(winner) = elect(&group) else {
            return Ok(());
        };
        summary.elected += 1;
        let canonical = &group[winner];
        log::debug!("{}: {} active versions, {} elected", key, active.len(), canonical.id);

        let mut updated_canonical = canonical.clone();
        let merged = merged_updates(active.iter().copied());
        if merged.is_some() && merged != canonical.updated {
            updated_canonical.updated = merged;
            summary.merged += 1;
        }

        for other in active.iter().filter(|r| r.id != canonical.id) {
            if let Some(sink) = self.patches.as_deref_mut() {
                let patch = other.diff(canonical);
                if patch.is_empty() {
                    log::warn!("Potential duplicate {}, {}", canonical.id, other.id);
                }
                sink.record(PatchEntry {
                    natural_key: key.to_string(),
                    base_id: canonical.id.clone(),
                    id: other.id.clone(),
                    patch,
                })?;
            }
            log::debug!("Found old version {}, adding pointer to {}", other.id, canonical.id);
            writer.push(other.obsolete_stub(&canonical.id));
            summary.stubbed += 1;
        }

        if updated_canonical != *canonical {
            writer.push(updated_canonical);
        }
        Ok(())
    }

    /// Rewrite every obsolete pointer in `range` to the end of its chain
    pub fn collapse_chains(&mut self, range: &IdRange) -> Result<ResolveSummary> {
        let mut summary = ResolveSummary::default();
        let mut writer = BulkWriter::new("chains", self.bulk_size);
        let mut skip = 0;

        loop {
            let page = self.store.scan(range, skip, self.page_size)?;
            let count = page.len();
            skip += count;

            for record in page.into_iter().filter(|r| r.obsolete) {
                match self.follow(&record)? {
                    Ok(terminal) => {
                        if record.obsolete_target.as_ref() != Some(&terminal) {
                            log::info!("Updating pointer of {} to {}", record.id, terminal);
                            let mut fixed = record;
                            fixed.obsolete_target = Some(terminal);
                            writer.push(fixed);
                            summary.repointed += 1;
                        }
                    }
                    Err(e) => {
                        log::error!("{}", e);
                        summary.broken_chains += 1;
                    }
                }
            }
            writer.commit_if_full(&mut *self.store)?;

            if count < self.page_size {
                break;
            }
        }
        writer.commit(&mut *self.store)?;
        summary.writes = writer.totals().clone();
        Ok(summary)
    }

    /// Active record the chain starting at `start` ends in.
    ///
    /// Outer error: the store failed. Inner error: the chain is broken.
    pub fn follow(&self, start: &Record) -> Result<Result<RecordId, ConsistencyError>, StoreError> {
        let mut visited: HashSet<RecordId> = HashSet::from([start.id.clone()]);
        let mut current = match &start.obsolete_target {
            Some(target) => target.clone(),
            None => match self.active_for_key(start.natural_key())? {
                Some(active) => return Ok(Ok(active)),
                None => {
                    return Ok(Err(ConsistencyError::NoActiveRecord(
                        start.natural_key().to_string(),
                    )))
                }
            },
        };

        for hop in 1..=self.max_chain_hops {
            if !visited.insert(current.clone()) {
                return Ok(Err(ConsistencyError::Cycle {
                    id: start.id.to_string(),
                    repeated: current.to_string(),
                }));
            }

            let Some(record) = self.store.get(&current)? else {
                return Ok(match self.legacy_terminal(&current)? {
                    Some(terminal) => Ok(terminal),
                    None => Err(ConsistencyError::DanglingTarget {
                        id: start.id.to_string(),
                        target: current.to_string(),
                    }),
                });
            };
            if !record.obsolete {
                return Ok(Ok(record.id));
            }

            log::warn!(
                "{}: updated_to points to another obsolete version {} (hop {})",
                start.id,
                record.id,
                hop
            );
            current = match record.obsolete_target {
                Some(next) => next,
                None => match self.active_for_key(record.natural_key())? {
                    Some(active) => active,
                    None => {
                        return Ok(Err(ConsistencyError::NoActiveRecord(
                            record.natural_key().to_string(),
                        )))
                    }
                },
            };
        }

        Ok(Err(ConsistencyError::TooLong {
            id: start.id.to_string(),
            hops: self.max_chain_hops,
        }))
    }

    /// Canonical active record of a natural key in the primary store
    fn active_for_key(&self, key: &str) -> Result<Option<RecordId>, StoreError> {
        let versions = self.store.versions(key)?;
        Ok(elect(&versions).map(|idx| versions[idx].id.clone()))
    }

    /// Resolve a target missing from primary through the legacy store
    fn legacy_terminal(&self, target: &RecordId) -> Result<Option<RecordId>, StoreError> {
        let Some(legacy) = self.legacy else {
            return Ok(None);
        };
        let Some(old) = legacy.get(target)? else {
            return Ok(None);
        };
        log::warn!("{} missing, found in legacy store as {}", target, old.source_uri);
        self.active_for_key(old.natural_key())
    }

    /// Store an incoming version.
    ///
    /// When an active record of the same natural key already carries the
    /// incoming update, its timestamps are merged and nothing new is created.
    /// Records are never overwritten: an id already in the store is a conflict.
    pub fn ingest(&mut self, record: Record) -> Result<IngestOutcome> {
        if let Some(incoming) = &record.updated {
            for existing in self.store.versions(record.natural_key())? {
                if existing.obsolete {
                    continue;
                }
                let Some(known) = &existing.updated else {
                    continue;
                };
                if !incoming.matches(known) {
                    continue;
                }
                let merged = known.merged(incoming);
                if merged != *known {
                    let mut updated = existing.clone();
                    updated.updated = Some(merged);
                    self.store.replace(updated)?;
                }
                log::debug!("{} already known as {}", record.id, existing.id);
                return Ok(IngestOutcome::Merged(existing.id));
            }
        }

        let id = record.id.clone();
        if let Some(stored) = self.store.get(&id)? {
            log::error!(
                "{} already stores {}, refusing to overwrite it with {}",
                id,
                stored.source_uri,
                record.source_uri
            );
            return Ok(IngestOutcome::Conflict(id));
        }
        self.store.replace(record)?;
        Ok(IngestOutcome::Inserted(id))
    }

    /// Recreate ids missing from the primary store as obsolete stubs.
    ///
    /// Walks every id number of `partition` inside `range` up to the highest
    /// stored id; a missing id found in the legacy store becomes a stub
    /// pointing at the active record of its natural key.
    pub fn recover_gaps(&mut self, partition: Partition, range: &IdRange) -> Result<GapSummary> {
        let mut summary = GapSummary::default();
        let Some(legacy) = self.legacy else {
            anyhow::bail!("Gap recovery needs a legacy store (store.legacy)");
        };
        let Some(max_id) = self.store.max_id(partition)? else {
            log::info!("No {} records found", partition);
            return Ok(summary);
        };
        let Some((lo, hi)) = range.numbers_within(partition) else {
            return Ok(summary);
        };
        let hi = hi.min(max_id.number());

        let mut writer = BulkWriter::new("gaps", self.bulk_size);
        for number in lo..=hi {
            let id = RecordId::from_number(number);
            if self.store.get(&id)?.is_some() {
                continue;
            }
            summary.missing += 1;
            log::warn!("Document {} not found, recovering from legacy store", id);

            let Some(old) = legacy.get(&id)? else {
                log::warn!("{} not found in legacy store, skipping", id);
                summary.not_in_legacy += 1;
                continue;
            };
            let key = natural_key_of(&old.source_uri).to_string();
            match self.active_for_key(&key)? {
                Some(target) => {
                    log::info!("{} found updated on {}", id, target);
                    let stub = Record::new(id, old.source_uri.clone(), None).obsolete_stub(&target);
                    writer.push(stub);
                    writer.commit_if_full(&mut *self.store)?;
                    summary.recovered += 1;
                }
                None => {
                    log::error!("{}", ConsistencyError::NoActiveRecord(key));
                    summary.unresolved += 1;
                }
            }
        }
        writer.commit(&mut *self.store)?;
        summary.writes = writer.totals().clone();
        self.store.flush()?;
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryRecordStore;

    fn rec(n: u64, key: &str, updated: Option<&str>) -> Record {
        Record::new(
            RecordId::from_number(n),
            format!("https://contrataciondelestado.es/licitacion/{}", key),
            updated.map(|u| Updated::One(u.to_string())),
        )
    }

    #[test]
    fn test_elect_latest_then_smallest_id() {
        let group = vec![
            rec(3, "T", Some("2024-01-01 00:00:00")),
            rec(1, "T", Some("2024-02-01 00:00:00.999")),
            rec(2, "T", Some("2024-02-01 00:00:00")),
            rec(4, "T", None),
        ];
        assert_eq!(elect(&group), Some(1));

        let undated = vec![rec(9, "T", None), rec(8, "T", None)];
        assert_eq!(elect(&undated), Some(1));

        let mut obsolete = rec(1, "T", Some("2030-01-01 00:00:00"));
        obsolete.obsolete = true;
        assert_eq!(elect(&[obsolete, rec(2, "T", None)]), Some(1));
    }

    #[test]
    fn test_follow_detects_cycles_and_limits() {
        let a = rec(1, "T", None).obsolete_stub(&RecordId::from_number(2));
        let b = rec(2, "T", None).obsolete_stub(&RecordId::from_number(1));
        let mut store = MemoryRecordStore::from_records(vec![a.clone(), b]);
        let resolver = VersionResolver::new(&mut store);
        assert!(matches!(
            resolver.follow(&a).unwrap(),
            Err(ConsistencyError::Cycle { .. })
        ));

        let chain: Vec<Record> = (1..=5)
            .map(|n| rec(n, "L", None).obsolete_stub(&RecordId::from_number(n + 1)))
            .chain(std::iter::once(rec(6, "L", None)))
            .collect();
        let first = chain[0].clone();
        let mut store = MemoryRecordStore::from_records(chain);
        let short = VersionResolver::new(&mut store).max_chain_hops(3);
        assert!(matches!(
            short.follow(&first).unwrap(),
            Err(ConsistencyError::TooLong { hops: 3, .. })
        ));
    }

    #[test]
    fn test_jsonl_patch_sink() {
        let mut sink = JsonlPatchSink::new(Vec::new());
        sink.record(PatchEntry {
            natural_key: "T".into(),
            base_id: RecordId::from_number(2),
            id: RecordId::from_number(1),
            patch: RecordPatch::default(),
        })
        .unwrap();
        let text = String::from_utf8(sink.into_inner()).unwrap();
        assert!(text.starts_with(r#"{"natural_key":"T","base_id":"ntp00000002""#));
        assert!(text.ends_with('\n'));
    }
}
