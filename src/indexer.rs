// 🔢 Fight-Record Indexer
// Assigns each fight its 1-based position within its owner's own log

use crate::snapshot::{FightRecord, RosterEntry};

/// 1-based ordinal of a fight within one rikishi's log for one basho.
/// Computed per rikishi, so it is not a global ordering across rikishi.
pub type FightNumber = u32;

/// A fight record tagged with its fight number
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndexedFight<'a> {
    pub fight_number: FightNumber,
    pub record: &'a FightRecord,
}

/// Number the fights of one roster entry in log order.
/// Entries with an absent or empty record contribute nothing.
pub fn index_fights(entry: &RosterEntry) -> Vec<IndexedFight<'_>> {
    entry
        .fights()
        .iter()
        .enumerate()
        .map(|(position, record)| IndexedFight {
            fight_number: position as FightNumber + 1,
            record,
        })
        .collect()
}
