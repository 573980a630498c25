// 🔍 Bout Matcher - Find the opponent's view of each fight
// Two rows describe the same bout when each names the other as opponent
// and both agree on kimarite and fight number.

use crate::flatten::BoutRow;
use crate::indexer::FightNumber;
use crate::snapshot::RikishiId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// MATCH RESULT
// ============================================================================

/// Row `row` paired with its chosen counterpart `counterpart` (indices into the flat table).
/// Every mutual match shows up twice, once from each side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchedPair {
    pub row: usize,
    pub counterpart: usize,
}

/// Diagnostic counts for one matching pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchStats {
    pub rows: usize,
    pub rows_without_candidate: usize,
    pub rows_with_surplus_candidates: usize,
}

/// Output of a matching pass over one basho's rows
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchTable {
    /// Mirrored pairs in input order of `row`
    pub pairs: Vec<MatchedPair>,
    pub stats: MatchStats,
}

// ============================================================================
// BOUT MATCHER
// ============================================================================

/// Lookup key: (rikishi, opponent, kimarite, fight number)
type RowKey<'a> = (RikishiId, RikishiId, &'a str, FightNumber);

pub struct BoutMatcher<'a> {
    rows: &'a [BoutRow],

    /// Row indices by their own key, in input order
    index: HashMap<RowKey<'a>, Vec<usize>>,
}

impl<'a> BoutMatcher<'a> {
    /// Build the lookup index over a flattened table
    pub fn new(rows: &'a [BoutRow]) -> Self {
        let mut index: HashMap<RowKey<'a>, Vec<usize>> = HashMap::with_capacity(rows.len());

        for (i, row) in rows.iter().enumerate() {
            index
                .entry((row.rikishi_id, row.opponent_id, row.kimarite.as_str(), row.fight_number))
                .or_default()
                .push(i);
        }

        BoutMatcher { rows, index }
    }

    /// All rows describing the opponent's view of row `i`, in input order.
    ///
    /// A candidate B satisfies B.rikishi = A.opponent, B.opponent = A.rikishi,
    /// same kimarite, same fight number. A row never matches itself.
    pub fn candidates(&self, i: usize) -> Vec<usize> {
        let row = &self.rows[i];
        let key = (row.opponent_id, row.rikishi_id, row.kimarite.as_str(), row.fight_number);

        self.index
            .get(&key)
            .map(|found| found.iter().copied().filter(|&j| j != i).collect())
            .unwrap_or_default()
    }

    /// Pair every row with its first candidate in input order.
    ///
    /// Rows without a candidate are left out of the pair list; the
    /// unmatched handler picks them up. Surplus candidates are only counted.
    pub fn find_pairs(&self) -> MatchTable {
        let mut table = MatchTable::default();
        table.stats.rows = self.rows.len();

        for i in 0..self.rows.len() {
            let candidates = self.candidates(i);

            match candidates.first() {
                None => {
                    table.stats.rows_without_candidate += 1;
                }
                Some(&counterpart) => {
                    if candidates.len() > 1 {
                        table.stats.rows_with_surplus_candidates += 1;
                        let row = &self.rows[i];
                        log::debug!(
                            "basho {}: rikishi {} fight {} has {} candidate matches, using first",
                            row.basho_id,
                            row.rikishi_id,
                            row.fight_number,
                            candidates.len()
                        );
                    }
                    table.pairs.push(MatchedPair { row: i, counterpart });
                }
            }
        }

        table
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{FightResult, Side};

    fn create_test_row(
        rikishi_id: u32,
        opponent_id: u32,
        kimarite: &str,
        fight_number: u32,
    ) -> BoutRow {
        BoutRow {
            rikishi_id,
            side: Side::East,
            result: FightResult::Win,
            opponent_id,
            kimarite: kimarite.to_string(),
            fight_number,
            basho_id: "202401".to_string(),
        }
    }

    #[test]
    fn test_mutual_match_is_mirrored() {
        let rows = vec![
            create_test_row(1404, 1383, "sotogake", 1),
            create_test_row(1383, 1404, "sotogake", 1),
        ];

        let table = BoutMatcher::new(&rows).find_pairs();

        assert_eq!(
            table.pairs,
            vec![
                MatchedPair { row: 0, counterpart: 1 },
                MatchedPair { row: 1, counterpart: 0 },
            ]
        );
        assert_eq!(table.stats.rows_without_candidate, 0);
    }

    #[test]
    fn test_predicate_is_symmetric() {
        let rows = vec![
            create_test_row(1, 2, "yorikiri", 3),
            create_test_row(2, 1, "yorikiri", 3),
            create_test_row(3, 4, "oshidashi", 1),
        ];
        let matcher = BoutMatcher::new(&rows);

        assert_eq!(matcher.candidates(0), vec![1]);
        assert_eq!(matcher.candidates(1), vec![0]);
        assert!(matcher.candidates(2).is_empty());
    }

    #[test]
    fn test_no_match_on_kimarite_or_fight_number_mismatch() {
        let rows = vec![
            create_test_row(1, 2, "yorikiri", 1),
            create_test_row(2, 1, "oshidashi", 1),
            create_test_row(3, 4, "hatakikomi", 2),
            create_test_row(4, 3, "hatakikomi", 3),
        ];

        let table = BoutMatcher::new(&rows).find_pairs();

        assert!(table.pairs.is_empty());
        assert_eq!(table.stats.rows_without_candidate, 4);
    }

    #[test]
    fn test_surplus_candidates_pick_first_in_input_order() {
        // Rikishi 2 listed twice (data-quality issue): two candidates for row 0
        let rows = vec![
            create_test_row(1, 2, "yorikiri", 1),
            create_test_row(2, 1, "yorikiri", 1),
            create_test_row(2, 1, "yorikiri", 1),
        ];

        let table = BoutMatcher::new(&rows).find_pairs();

        assert_eq!(table.pairs[0], MatchedPair { row: 0, counterpart: 1 });
        assert_eq!(table.stats.rows_with_surplus_candidates, 1);
        assert_eq!(table.pairs.len(), 3);
    }

    #[test]
    fn test_row_never_matches_itself() {
        let rows = vec![create_test_row(5, 5, "yorikiri", 1)];
        let matcher = BoutMatcher::new(&rows);

        assert!(matcher.candidates(0).is_empty());
        assert!(matcher.find_pairs().pairs.is_empty());
    }

    #[test]
    fn test_same_opponent_twice_disambiguated_by_fight_number() {
        let rows = vec![
            create_test_row(1, 2, "yorikiri", 1),
            create_test_row(1, 2, "yorikiri", 2),
            create_test_row(2, 1, "yorikiri", 1),
            create_test_row(2, 1, "yorikiri", 2),
        ];
        let matcher = BoutMatcher::new(&rows);

        assert_eq!(matcher.candidates(0), vec![2]);
        assert_eq!(matcher.candidates(1), vec![3]);
    }
}
