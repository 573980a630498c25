// 📋 Roster Flattener
// Merges both sides' fight logs into one table of per-rikishi, per-fight rows

use crate::indexer::{index_fights, FightNumber};
use crate::snapshot::{BashoSnapshot, FightResult, RikishiId, Side};
use serde::{Deserialize, Serialize};

/// One fight seen from one rikishi's side
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoutRow {
    pub rikishi_id: RikishiId,
    pub side: Side,
    pub result: FightResult,
    pub opponent_id: RikishiId,
    pub kimarite: String,
    pub fight_number: FightNumber,
    pub basho_id: String,
}

/// Flatten a snapshot into rows.
///
/// Row order is east roster then west roster, each in roster order and then
/// fight order. Later stages use this order as the stable input order.
pub fn flatten_snapshot(snapshot: &BashoSnapshot) -> Vec<BoutRow> {
    let mut rows = Vec::with_capacity(snapshot.record_count());

    for (side, roster) in snapshot.sides() {
        for entry in roster {
            for fight in index_fights(entry) {
                rows.push(BoutRow {
                    rikishi_id: entry.rikishi_id,
                    side,
                    result: fight.record.result,
                    opponent_id: fight.record.opponent_id,
                    kimarite: fight.record.kimarite.clone(),
                    fight_number: fight.fight_number,
                    basho_id: snapshot.basho_id.clone(),
                });
            }
        }
    }

    rows
}
