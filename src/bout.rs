// 🤼 Bout - The reconciled record of one fight
// Built from one row (unmatched) or two mirrored rows (matched)

use crate::flatten::BoutRow;
use crate::indexer::FightNumber;
use crate::snapshot::{FightResult, RikishiId, Side};
use serde::{Deserialize, Serialize, Serializer};
use sha2::{Digest, Sha256};

// ============================================================================
// PARTICIPANT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Participant {
    pub rikishi_id: RikishiId,
    pub side: Side,
    pub result: FightResult,
}

impl From<&BoutRow> for Participant {
    fn from(row: &BoutRow) -> Self {
        Participant {
            rikishi_id: row.rikishi_id,
            side: row.side,
            result: row.result,
        }
    }
}

// ============================================================================
// BOUT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Bout {
    pub basho_id: String,
    pub kimarite: String,
    pub fight_number: FightNumber,
    pub participant_1: Participant,

    /// None for a one-sided (unmatched) bout
    pub participant_2: Option<Participant>,
}

impl Bout {
    /// Bout built from a row and its opponent's mirrored row
    pub fn matched(first: &BoutRow, second: &BoutRow) -> Self {
        Bout {
            basho_id: first.basho_id.clone(),
            kimarite: first.kimarite.clone(),
            fight_number: first.fight_number,
            participant_1: Participant::from(first),
            participant_2: Some(Participant::from(second)),
        }
    }

    /// One-sided bout for a row with no usable counterpart
    pub fn unmatched(row: &BoutRow) -> Self {
        Bout {
            basho_id: row.basho_id.clone(),
            kimarite: row.kimarite.clone(),
            fight_number: row.fight_number,
            participant_1: Participant::from(row),
            participant_2: None,
        }
    }

    pub fn is_matched(&self) -> bool {
        self.participant_2.is_some()
    }

    /// Participant ids covered by this bout
    pub fn rikishi_ids(&self) -> Vec<RikishiId> {
        let mut ids = vec![self.participant_1.rikishi_id];
        if let Some(p2) = &self.participant_2 {
            ids.push(p2.rikishi_id);
        }
        ids
    }

    /// Flat shape handed to the sink
    pub fn payload(&self) -> BoutPayload {
        let p1 = &self.participant_1;
        let p2 = self.participant_2.as_ref();

        BoutPayload {
            basho_id: self.basho_id.clone(),
            kimarite: self.kimarite.clone(),
            fight_number: self.fight_number,
            rikishi_id_1: p1.rikishi_id,
            side_1: p1.side.name().to_string(),
            result_1: p1.result.label().to_string(),
            rikishi_id_2: p2.map(|p| p.rikishi_id),
            side_2: p2.map(|p| p.side.name().to_string()).unwrap_or_default(),
            result_2: p2.map(|p| p.result.label().to_string()).unwrap_or_default(),
        }
    }

    /// Compute idempotency hash over every attribute of the bout.
    /// The sink keys storage on this, so re-delivering a bout is a no-op.
    pub fn compute_idempotency_hash(&self) -> String {
        let p = self.payload();
        let mut hasher = Sha256::new();
        hasher.update(format!(
            "{}|{}|{}|{}|{}|{}|{}|{}|{}",
            p.basho_id,
            p.kimarite,
            p.fight_number,
            p.rikishi_id_1,
            p.side_1,
            p.result_1,
            p.rikishi_id_2.map(|id| id.to_string()).unwrap_or_default(),
            p.side_2,
            p.result_2
        ));
        format!("{:x}", hasher.finalize())
    }
}

// ============================================================================
// SINK PAYLOAD
// ============================================================================

/// Sink payload. Participant-2 fields are empty strings for unmatched bouts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BoutPayload {
    #[serde(rename = "bashoId")]
    pub basho_id: String,
    pub kimarite: String,
    #[serde(rename = "fightNumber")]
    pub fight_number: FightNumber,
    #[serde(rename = "rikishiId_1")]
    pub rikishi_id_1: RikishiId,
    pub side_1: String,
    pub result_1: String,
    #[serde(rename = "rikishiId_2", serialize_with = "empty_when_none")]
    pub rikishi_id_2: Option<RikishiId>,
    pub side_2: String,
    pub result_2: String,
}

fn empty_when_none<S: Serializer>(value: &Option<RikishiId>, serializer: S) -> Result<S::Ok, S::Error> {
    match value {
        Some(id) => serializer.serialize_u32(*id),
        None => serializer.serialize_str(""),
    }
}
