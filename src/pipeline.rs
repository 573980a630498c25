// ⚙️ Bout Pipeline - parse → index → flatten → match → dedup → emit
// One in-memory batch per snapshot; snapshots are independent of each other.

use crate::bout::Bout;
use crate::canonical::{canonicalize, MatchKey};
use crate::config::Config;
use crate::db::{PersistOutcome, RikishiRecord};
use crate::discovery;
use crate::flatten::flatten_snapshot;
use crate::matcher::{BoutMatcher, MatchStats};
use crate::sink::{BoutSink, SqliteBoutSink};
use crate::snapshot::{BashoSnapshot, RikishiId, SnapshotError};
use crate::unmatched::unmatched_bouts;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

// ============================================================================
// RECONSTRUCTION
// ============================================================================

/// Every bout reconstructed from one snapshot
#[derive(Debug, Clone, Default)]
pub struct BoutSet {
    pub basho_id: String,

    /// Canonical bouts, one per MatchKey
    pub matched: Vec<Bout>,

    /// MatchKey of each entry in `matched`
    pub match_keys: Vec<MatchKey>,

    /// One-sided bouts for records without a usable counterpart
    pub unmatched: Vec<Bout>,

    /// Rikishi named in the snapshot, rosters first, then opponents
    pub rikishi: Vec<RikishiRecord>,

    pub stats: MatchStats,
}

impl BoutSet {
    /// Matched bouts first, then unmatched, each in input order
    pub fn iter(&self) -> impl Iterator<Item = &Bout> {
        self.matched.iter().chain(self.unmatched.iter())
    }

    pub fn len(&self) -> usize {
        self.matched.len() + self.unmatched.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Turn one snapshot into its canonical bout set. Pure; no I/O.
pub fn reconstruct_bouts(snapshot: &BashoSnapshot) -> BoutSet {
    let rows = flatten_snapshot(snapshot);
    let table = BoutMatcher::new(&rows).find_pairs();
    let canonical = canonicalize(&rows, &table.pairs);
    let unmatched = unmatched_bouts(&rows, &canonical.covered);

    BoutSet {
        basho_id: snapshot.basho_id.clone(),
        matched: canonical.bouts,
        match_keys: canonical.keys,
        unmatched,
        rikishi: rikishi_records(snapshot),
        stats: table.stats,
    }
}

/// One record per rikishi id. Roster attributes win; an opponent name only
/// fills a gap.
pub fn rikishi_records(snapshot: &BashoSnapshot) -> Vec<RikishiRecord> {
    let mut records: Vec<RikishiRecord> = Vec::new();
    let mut by_id: HashMap<RikishiId, usize> = HashMap::new();

    for (_, roster) in snapshot.sides() {
        for entry in roster {
            match by_id.get(&entry.rikishi_id) {
                Some(&i) => {
                    let record = &mut records[i];
                    if record.shikona_en.is_none() {
                        record.shikona_en = entry.shikona_en.clone();
                    }
                    if record.rank.is_none() {
                        record.rank = entry.rank.clone();
                    }
                }
                None => {
                    by_id.insert(entry.rikishi_id, records.len());
                    records.push(RikishiRecord {
                        rikishi_id: entry.rikishi_id,
                        shikona_en: entry.shikona_en.clone(),
                        rank: entry.rank.clone(),
                    });
                }
            }
        }
    }

    for (_, roster) in snapshot.sides() {
        for fight in roster.iter().flat_map(|entry| entry.fights()) {
            let Some(name) = &fight.opponent_shikona_en else {
                continue;
            };
            match by_id.get(&fight.opponent_id) {
                Some(&i) => {
                    if records[i].shikona_en.is_none() {
                        records[i].shikona_en = Some(name.clone());
                    }
                }
                None => {
                    by_id.insert(fight.opponent_id, records.len());
                    records.push(RikishiRecord {
                        rikishi_id: fight.opponent_id,
                        shikona_en: Some(name.clone()),
                        rank: None,
                    });
                }
            }
        }
    }

    records
}

// ============================================================================
// DELIVERY
// ============================================================================

/// Counts for one snapshot pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotReport {
    pub basho_id: String,
    pub matched: usize,
    pub unmatched: usize,
    pub failed: usize,
    pub created: usize,
    pub already_present: usize,

    /// Records whose opponent's view was not found
    pub without_candidate: usize,

    /// Records with more than one possible counterpart; only the first is paired
    pub surplus_candidates: usize,

    /// False when the basho itself could not be recorded (or was never offered)
    pub basho_recorded: bool,

    pub rikishi_recorded: usize,
    pub rikishi_failed: usize,
}

impl SnapshotReport {
    pub fn summary(&self) -> String {
        let mut line = format!(
            "basho {}: {} matched, {} unmatched, {} failed ({} new, {} already stored); \
             {} records without candidate, {} with surplus candidates; {} rikishi recorded",
            self.basho_id,
            self.matched,
            self.unmatched,
            self.failed,
            self.created,
            self.already_present,
            self.without_candidate,
            self.surplus_candidates,
            self.rikishi_recorded,
        );
        if self.rikishi_failed > 0 {
            line.push_str(&format!(", {} rikishi failed", self.rikishi_failed));
        }
        if !self.basho_recorded {
            line.push_str(" [basho not recorded]");
        }
        line
    }
}

/// Deliver every bout of a set to the sink.
/// A failed delivery is logged and counted; the remaining bouts are still delivered.
pub fn deliver_bouts(set: &BoutSet, sink: &mut dyn BoutSink) -> SnapshotReport {
    let mut report = SnapshotReport {
        basho_id: set.basho_id.clone(),
        matched: set.matched.len(),
        unmatched: set.unmatched.len(),
        without_candidate: set.stats.rows_without_candidate,
        surplus_candidates: set.stats.rows_with_surplus_candidates,
        ..Default::default()
    };

    for bout in set.iter() {
        match sink.deliver(bout) {
            Ok(PersistOutcome::Created) => report.created += 1,
            Ok(PersistOutcome::AlreadyPresent) => report.already_present += 1,
            Err(e) => {
                report.failed += 1;
                log::warn!(
                    "basho {}: failed to deliver bout {} (rikishi {}): {:#}",
                    bout.basho_id,
                    bout.fight_number,
                    bout.participant_1.rikishi_id,
                    e
                );
            }
        }
    }

    report
}

/// Reconstruct one snapshot and deliver its bouts
pub fn process_snapshot(snapshot: &BashoSnapshot, sink: &mut dyn BoutSink) -> SnapshotReport {
    emit_set(&reconstruct_bouts(snapshot), sink)
}

fn emit_set(set: &BoutSet, sink: &mut dyn BoutSink) -> SnapshotReport {
    let basho_recorded = match sink.begin_basho(&set.basho_id) {
        Ok(()) => true,
        Err(e) => {
            log::warn!("basho {}: failed to record basho: {:#}", set.basho_id, e);
            false
        }
    };

    let (mut rikishi_recorded, mut rikishi_failed) = (0, 0);
    for rikishi in &set.rikishi {
        match sink.record_rikishi(rikishi) {
            Ok(()) => rikishi_recorded += 1,
            Err(e) => {
                rikishi_failed += 1;
                log::warn!(
                    "basho {}: failed to record rikishi {}: {:#}",
                    set.basho_id,
                    rikishi.rikishi_id,
                    e
                );
            }
        }
    }

    let report = SnapshotReport {
        basho_recorded,
        rikishi_recorded,
        rikishi_failed,
        ..deliver_bouts(set, sink)
    };

    if report.surplus_candidates > 0 {
        log::warn!(
            "basho {}: {} records had more than one counterpart",
            set.basho_id,
            report.surplus_candidates
        );
    }
    log::info!("{}", report.summary());
    report
}

// ============================================================================
// DIRECTORY RUNS
// ============================================================================

/// Outcome of processing a folder of snapshot files
#[derive(Debug, Default)]
pub struct RunSummary {
    pub reports: Vec<SnapshotReport>,

    /// Files without a basho id
    pub skipped: Vec<PathBuf>,

    /// Files that could not be read or parsed, with the reason
    pub rejected: Vec<(PathBuf, String)>,
}

impl RunSummary {
    pub fn total_matched(&self) -> usize {
        self.reports.iter().map(|r| r.matched).sum()
    }

    pub fn total_unmatched(&self) -> usize {
        self.reports.iter().map(|r| r.unmatched).sum()
    }

    pub fn total_failed(&self) -> usize {
        self.reports.iter().map(|r| r.failed).sum()
    }

    pub fn total_surplus_candidates(&self) -> usize {
        self.reports.iter().map(|r| r.surplus_candidates).sum()
    }

    pub fn total_without_candidate(&self) -> usize {
        self.reports.iter().map(|r| r.without_candidate).sum()
    }
}

type Reconstructed = (PathBuf, Result<BoutSet, SnapshotError>);

/// Read and reconstruct files on up to `workers` threads, keeping file order
fn reconstruct_files(files: &[PathBuf], workers: usize) -> Vec<Reconstructed> {
    let chunk_size = files.len().div_ceil(workers.max(1)).max(1);

    std::thread::scope(|scope| {
        let handles: Vec<_> = files
            .chunks(chunk_size)
            .map(|chunk| {
                scope.spawn(move || {
                    chunk
                        .iter()
                        .map(|path| {
                            let set = BashoSnapshot::from_path(path).map(|s| reconstruct_bouts(&s));
                            (path.clone(), set)
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        handles
            .into_iter()
            .flat_map(|handle| match handle.join() {
                Ok(results) => results,
                Err(panic) => std::panic::resume_unwind(panic),
            })
            .collect()
    })
}

/// Process every snapshot file in `dir`. Reconstruction runs in parallel;
/// delivery to the sink is sequential so identical bouts are never raced.
pub fn process_snapshot_dir(
    dir: &Path,
    workers: usize,
    sink: &mut dyn BoutSink,
) -> Result<RunSummary> {
    let files = discovery::list_snapshot_files(dir)?;
    log::info!("Found {} snapshot files in {}", files.len(), dir.display());

    let mut summary = RunSummary::default();

    for (path, result) in reconstruct_files(&files, workers) {
        match result {
            Ok(set) => summary.reports.push(emit_set(&set, sink)),
            Err(e) if e.is_skippable() => {
                log::warn!("Skipped {} because of missing data: {}", path.display(), e);
                summary.skipped.push(path);
            }
            Err(e) => {
                log::warn!("Rejected {}: {}", path.display(), e);
                summary.rejected.push((path, e.to_string()));
            }
        }
    }

    Ok(summary)
}

/// Full ingest run driven by configuration: locate snapshots, open the store, process.
pub fn run(config: &Config) -> Result<RunSummary> {
    config.validate()?;

    let snapshot_dir = if config.latest_only {
        discovery::latest_snapshot_dir(&config.data_dir)?.with_context(|| {
            format!("No YYYYMM run directory found under {}", config.data_dir.display())
        })?
    } else {
        config.data_dir.clone()
    };

    let mut sink = SqliteBoutSink::open(&config.db_path)?;
    process_snapshot_dir(&snapshot_dir, config.workers, &mut sink)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{FightRecord, FightResult, RosterEntry};
    use std::collections::HashMap;

    fn create_test_entry(rikishi_id: u32, fights: &[(FightResult, u32, &str)]) -> RosterEntry {
        RosterEntry {
            rikishi_id,
            shikona_en: None,
            rank: None,
            record: Some(
                fights
                    .iter()
                    .map(|(result, opponent_id, kimarite)| FightRecord {
                        result: *result,
                        opponent_id: *opponent_id,
                        kimarite: kimarite.to_string(),
                        opponent_shikona_en: None,
                    })
                    .collect(),
            ),
        }
    }

    fn create_test_snapshot() -> BashoSnapshot {
        use FightResult::*;
        BashoSnapshot {
            basho_id: "202401".to_string(),
            east: vec![
                create_test_entry(1, &[(Win, 2, "yorikiri"), (Loss, 3, "oshidashi"), (Win, 99, "hatakikomi")]),
                create_test_entry(4, &[(Win, 3, "uwatenage")]),
            ],
            west: vec![
                create_test_entry(2, &[(Loss, 1, "yorikiri")]),
                create_test_entry(3, &[(Loss, 4, "uwatenage"), (Win, 1, "oshidashi")]),
            ],
        }
    }

    /// Sink that records deliveries in memory and can be told to fail for one rikishi
    #[derive(Default)]
    struct MemorySink {
        stored: HashMap<String, Bout>,
        fail_for: Option<u32>,
        fail_basho: bool,
        bashos: Vec<String>,
        rikishi: Vec<RikishiRecord>,
    }

    impl BoutSink for MemorySink {
        fn begin_basho(&mut self, basho_id: &str) -> Result<()> {
            if self.fail_basho {
                anyhow::bail!("simulated basho failure");
            }
            self.bashos.push(basho_id.to_string());
            Ok(())
        }

        fn record_rikishi(&mut self, rikishi: &RikishiRecord) -> Result<()> {
            self.rikishi.push(rikishi.clone());
            Ok(())
        }

        fn deliver(&mut self, bout: &Bout) -> Result<PersistOutcome> {
            if self.fail_for == Some(bout.participant_1.rikishi_id) {
                anyhow::bail!("simulated sink failure");
            }
            let hash = bout.compute_idempotency_hash();
            if self.stored.contains_key(&hash) {
                return Ok(PersistOutcome::AlreadyPresent);
            }
            self.stored.insert(hash, bout.clone());
            Ok(PersistOutcome::Created)
        }
    }

    #[test]
    fn test_reconstruct_pairs_and_leftovers() {
        let set = reconstruct_bouts(&create_test_snapshot());

        // rikishi 1's third fight names an opponent missing from the roster
        let keys: Vec<String> = set.match_keys.iter().map(|k| k.to_string()).collect();
        assert_eq!(keys, vec!["1_2_yorikiri_1", "1_3_oshidashi_2", "3_4_uwatenage_1"]);

        assert_eq!(set.unmatched.len(), 1);
        assert_eq!(set.unmatched[0].participant_1.rikishi_id, 1);
        assert_eq!(set.unmatched[0].fight_number, 3);
        assert_eq!(set.len(), 4);
    }

    #[test]
    fn test_every_record_covered_exactly_once() {
        let snapshot = create_test_snapshot();
        let set = reconstruct_bouts(&snapshot);

        let mut covered: Vec<(u32, u32)> = Vec::new();
        for bout in set.iter() {
            covered.push((bout.participant_1.rikishi_id, bout.fight_number));
            if let Some(p2) = &bout.participant_2 {
                covered.push((p2.rikishi_id, bout.fight_number));
            }
        }
        covered.sort();

        let mut expected: Vec<(u32, u32)> = Vec::new();
        for (_, roster) in snapshot.sides() {
            for entry in roster {
                for k in 1..=entry.fights().len() as u32 {
                    expected.push((entry.rikishi_id, k));
                }
            }
        }
        expected.sort();

        assert_eq!(covered, expected);
    }

    #[test]
    fn test_failed_delivery_does_not_stop_the_rest() {
        let set = reconstruct_bouts(&create_test_snapshot());
        let mut sink = MemorySink {
            fail_for: Some(4),
            ..Default::default()
        };

        let report = deliver_bouts(&set, &mut sink);

        assert_eq!(report.failed, 1);
        assert_eq!(report.created, 3);
        assert_eq!(report.matched, 3);
        assert_eq!(report.unmatched, 1);
        assert_eq!(sink.stored.len(), 3);
    }

    #[test]
    fn test_process_snapshot_twice_is_idempotent() {
        let snapshot = create_test_snapshot();
        let mut sink = MemorySink::default();

        let first = process_snapshot(&snapshot, &mut sink);
        let second = process_snapshot(&snapshot, &mut sink);

        assert_eq!(first.created, 4);
        assert_eq!(second.created, 0);
        assert_eq!(second.already_present, 4);
        assert_eq!(sink.stored.len(), 4);
        assert_eq!(sink.bashos, vec!["202401", "202401"]);

        let payloads = |set: &BoutSet| set.iter().map(|b| b.payload()).collect::<Vec<_>>();
        let (a, b) = (reconstruct_bouts(&snapshot), reconstruct_bouts(&snapshot));
        assert_eq!(a.match_keys, b.match_keys);
        assert_eq!(payloads(&a), payloads(&b));
    }

    #[test]
    fn test_process_snapshot_dir_skips_and_rejects() {
        let tmp = tempfile::TempDir::new().unwrap();
        let good = serde_json::to_string(&create_test_snapshot()).unwrap();
        std::fs::write(tmp.path().join("202401.json"), good).unwrap();
        std::fs::write(tmp.path().join("202403.json"), r#"{"east": [], "west": []}"#).unwrap();
        std::fs::write(tmp.path().join("202405.json"), "not json").unwrap();

        let mut sink = MemorySink::default();
        let summary = process_snapshot_dir(tmp.path(), 2, &mut sink).unwrap();

        assert_eq!(summary.reports.len(), 1);
        assert_eq!(summary.reports[0].basho_id, "202401");
        assert_eq!(summary.skipped.len(), 1);
        assert_eq!(summary.rejected.len(), 1);
        assert_eq!(summary.total_matched(), 3);
        assert_eq!(summary.total_unmatched(), 1);
        assert_eq!(summary.total_failed(), 0);
    }

    #[test]
    fn test_duplicated_roster_entry_is_reported() {
        use FightResult::*;
        let snapshot = BashoSnapshot {
            basho_id: "202401".to_string(),
            east: vec![
                create_test_entry(1, &[(Win, 2, "yorikiri")]),
                create_test_entry(1, &[(Win, 2, "yorikiri")]),
            ],
            west: vec![create_test_entry(2, &[(Loss, 1, "yorikiri")])],
        };
        let mut sink = MemorySink::default();

        let report = process_snapshot(&snapshot, &mut sink);

        assert_eq!(report.matched, 1);
        assert_eq!(report.unmatched, 1);
        assert_eq!(report.created, 2);
        assert_eq!(report.surplus_candidates, 1);
        assert_eq!(report.without_candidate, 0);
        assert!(report.summary().contains("1 with surplus candidates"));

        // the duplicate collapses to one rikishi record
        assert_eq!(report.rikishi_recorded, 2);
        assert_eq!(sink.rikishi.len(), 2);
    }

    #[test]
    fn test_basho_failure_is_reported_and_bouts_still_delivered() {
        let mut sink = MemorySink {
            fail_basho: true,
            ..Default::default()
        };

        let report = process_snapshot(&create_test_snapshot(), &mut sink);

        assert!(!report.basho_recorded);
        assert!(report.summary().contains("basho not recorded"));
        assert_eq!(report.created, 4);
        assert_eq!(report.without_candidate, 1);
        assert_eq!(sink.stored.len(), 4);
    }

    #[test]
    fn test_rikishi_records_prefer_roster_attributes() {
        let mut snapshot = create_test_snapshot();
        snapshot.east[0].shikona_en = Some("Terunofuji".to_string());
        snapshot.east[0].rank = Some("Yokozuna 1 East".to_string());
        if let Some(record) = snapshot.west[1].record.as_mut() {
            record[1].opponent_shikona_en = Some("Teru".to_string());
        }
        if let Some(record) = snapshot.east[0].record.as_mut() {
            record[2].opponent_shikona_en = Some("Newcomer".to_string());
        }

        let records = rikishi_records(&snapshot);
        let ids: Vec<u32> = records.iter().map(|r| r.rikishi_id).collect();

        assert_eq!(ids, vec![1, 4, 2, 3, 99]);
        assert_eq!(records[0].shikona_en.as_deref(), Some("Terunofuji"));
        assert_eq!(records[0].rank.as_deref(), Some("Yokozuna 1 East"));
        assert_eq!(records[4].shikona_en.as_deref(), Some("Newcomer"));
        assert_eq!(records[4].rank, None);
    }
}
