// 🧬 Canonicalizer - Collapse mirrored pairs into one bout per MatchKey

use crate::bout::Bout;
use crate::flatten::BoutRow;
use crate::indexer::FightNumber;
use crate::matcher::MatchedPair;
use crate::snapshot::RikishiId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

// ============================================================================
// MATCH KEY
// ============================================================================

/// Order-independent identity of a bout: sorted rikishi pair, kimarite, fight number
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MatchKey {
    pub low: RikishiId,
    pub high: RikishiId,
    pub kimarite: String,
    pub fight_number: FightNumber,
}

impl MatchKey {
    /// Key of the bout a row takes part in. Both mirrored rows give the same key.
    pub fn for_row(row: &BoutRow) -> Self {
        MatchKey {
            low: row.rikishi_id.min(row.opponent_id),
            high: row.rikishi_id.max(row.opponent_id),
            kimarite: row.kimarite.clone(),
            fight_number: row.fight_number,
        }
    }
}

impl fmt::Display for MatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}_{}_{}", self.low, self.high, self.kimarite, self.fight_number)
    }
}

// ============================================================================
// CANONICAL SET
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct CanonicalBouts {
    /// One bout per distinct MatchKey, in input order of participant 1
    pub bouts: Vec<Bout>,

    pub keys: Vec<MatchKey>,

    /// covered[i] is true when row i is a participant of a kept bout
    pub covered: Vec<bool>,
}

/// Keep the first pair seen for each MatchKey and drop its mirror.
///
/// Pairs arrive in input order of their `row`, so participant 1 is the
/// rikishi whose row comes first in the flattened table.
pub fn canonicalize(rows: &[BoutRow], pairs: &[MatchedPair]) -> CanonicalBouts {
    let mut seen: HashSet<MatchKey> = HashSet::new();
    let mut result = CanonicalBouts {
        covered: vec![false; rows.len()],
        ..Default::default()
    };

    for pair in pairs {
        let first = &rows[pair.row];
        let second = &rows[pair.counterpart];

        let key = MatchKey::for_row(first);
        if seen.contains(&key) {
            continue;
        }
        if result.covered[pair.row] || result.covered[pair.counterpart] {
            continue;
        }

        result.covered[pair.row] = true;
        result.covered[pair.counterpart] = true;
        result.bouts.push(Bout::matched(first, second));
        result.keys.push(key.clone());
        seen.insert(key);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::BoutMatcher;
    use crate::snapshot::{FightResult, Side};

    fn create_test_row(rikishi_id: u32, side: Side, opponent_id: u32, fight_number: u32) -> BoutRow {
        BoutRow {
            rikishi_id,
            side,
            result: if side == Side::East { FightResult::Win } else { FightResult::Loss },
            opponent_id,
            kimarite: "yorikiri".to_string(),
            fight_number,
            basho_id: "202401".to_string(),
        }
    }

    #[test]
    fn test_match_key_is_order_independent() {
        let a = create_test_row(1404, Side::East, 1383, 2);
        let b = create_test_row(1383, Side::West, 1404, 2);

        assert_eq!(MatchKey::for_row(&a), MatchKey::for_row(&b));
        assert_eq!(MatchKey::for_row(&a).to_string(), "1383_1404_yorikiri_2");
    }

    #[test]
    fn test_mirror_is_discarded() {
        let rows = vec![
            create_test_row(1404, Side::East, 1383, 1),
            create_test_row(1383, Side::West, 1404, 1),
        ];
        let table = BoutMatcher::new(&rows).find_pairs();

        let canonical = canonicalize(&rows, &table.pairs);

        assert_eq!(canonical.bouts.len(), 1);
        assert_eq!(canonical.bouts[0].participant_1.rikishi_id, 1404);
        assert_eq!(canonical.bouts[0].participant_2.unwrap().rikishi_id, 1383);
        assert_eq!(canonical.covered, vec![true, true]);
    }

    #[test]
    fn test_surplus_candidate_stays_uncovered() {
        let rows = vec![
            create_test_row(1, Side::East, 2, 1),
            create_test_row(2, Side::West, 1, 1),
            create_test_row(2, Side::West, 1, 1),
        ];
        let table = BoutMatcher::new(&rows).find_pairs();

        let canonical = canonicalize(&rows, &table.pairs);

        assert_eq!(canonical.bouts.len(), 1);
        assert_eq!(canonical.covered, vec![true, true, false]);
    }

    #[test]
    fn test_distinct_keys_are_all_kept() {
        let rows = vec![
            create_test_row(1, Side::East, 2, 1),
            create_test_row(1, Side::East, 2, 2),
            create_test_row(2, Side::West, 1, 1),
            create_test_row(2, Side::West, 1, 2),
        ];
        let table = BoutMatcher::new(&rows).find_pairs();

        let canonical = canonicalize(&rows, &table.pairs);

        assert_eq!(canonical.bouts.len(), 2);
        let keys: Vec<String> = canonical.keys.iter().map(|k| k.to_string()).collect();
        assert_eq!(keys, vec!["1_2_yorikiri_1", "1_2_yorikiri_2"]);
        assert!(canonical.covered.iter().all(|&c| c));
    }
}
