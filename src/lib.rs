// Sumo Bouts - Core Library
// Reconstructs paired bouts from per-rikishi fight logs in banzuke snapshots.
// Exposes all modules for use in CLI, API server, and tests

pub mod snapshot;   // Input schema: basho snapshots, rosters, fight records
pub mod indexer;    // Fight numbers per rikishi
pub mod flatten;    // One row per rikishi per fight
pub mod matcher;    // Opponent-view matching
pub mod canonical;  // MatchKey + mirror deduplication
pub mod unmatched;  // One-sided bouts for leftovers
pub mod bout;       // Bout entity + sink payload
pub mod db;         // SQLite persistence
pub mod sink;       // Bout delivery
pub mod discovery;  // Snapshot folder discovery
pub mod config;
pub mod pipeline;

// Re-export commonly used types
pub use snapshot::{
    BashoSnapshot, RosterEntry, FightRecord, FightResult, Side, RikishiId, SnapshotError,
};
pub use indexer::{index_fights, FightNumber, IndexedFight};
pub use flatten::{flatten_snapshot, BoutRow};
pub use matcher::{BoutMatcher, MatchedPair, MatchStats, MatchTable};
pub use canonical::{canonicalize, CanonicalBouts, MatchKey};
pub use unmatched::unmatched_bouts;
pub use bout::{Bout, BoutPayload, Participant};
pub use db::{
    Persistable, PersistOutcome, BashoRecord, RikishiRecord, RikishiBoutLink, Event, BashoStat,
    persist_entity, setup_database, insert_event, get_bout_events, get_rikishi,
    get_bouts_for_basho, get_bouts_for_rikishi, count_bouts, get_basho_ids, get_basho_stats,
};
pub use sink::{BoutSink, SqliteBoutSink};
pub use config::Config;
pub use pipeline::{
    BoutSet, SnapshotReport, RunSummary,
    reconstruct_bouts, rikishi_records, deliver_bouts, process_snapshot, process_snapshot_dir, run,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
