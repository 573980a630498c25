// 🧩 Unmatched-Record Handler
// Any row not covered by a canonical bout becomes a one-sided bout, so no record is lost

use crate::bout::Bout;
use crate::flatten::BoutRow;

/// One-sided bouts for every uncovered row, in input order
pub fn unmatched_bouts(rows: &[BoutRow], covered: &[bool]) -> Vec<Bout> {
    rows.iter()
        .zip(covered.iter())
        .filter(|(_, &is_covered)| !is_covered)
        .map(|(row, _)| Bout::unmatched(row))
        .collect()
}
