// 📥 Snapshot Schema - Banzuke roster snapshots
// One JSON document per basho: two rosters (east/west), each rikishi with an ordered fight log

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use thiserror::Error;

/// Rikishi identifier as issued by the upstream API
pub type RikishiId = u32;

// ============================================================================
// CORE TYPES
// ============================================================================

/// Side of the banzuke a rikishi is listed on (display only, never used for matching)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    East,
    West,
}

impl Side {
    pub fn name(&self) -> &'static str {
        match self {
            Side::East => "East",
            Side::West => "West",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "East" => Some(Side::East),
            "West" => Some(Side::West),
            _ => None,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome of one fight from its owner's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FightResult {
    #[serde(rename = "win")]
    Win,
    #[serde(rename = "loss")]
    Loss,
    /// Empty result strings mark days the rikishi did not fight
    #[serde(rename = "absent", alias = "")]
    Absent,
    #[serde(rename = "fusen win")]
    FusenWin,
    #[serde(rename = "fusen loss")]
    FusenLoss,
}

impl FightResult {
    /// Label used in bout payloads and storage
    pub fn label(&self) -> &'static str {
        match self {
            FightResult::Win => "win",
            FightResult::Loss => "loss",
            FightResult::Absent => "absent",
            FightResult::FusenWin => "fusen win",
            FightResult::FusenLoss => "fusen loss",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "win" => Some(FightResult::Win),
            "loss" => Some(FightResult::Loss),
            "absent" | "" => Some(FightResult::Absent),
            "fusen win" => Some(FightResult::FusenWin),
            "fusen loss" => Some(FightResult::FusenLoss),
            _ => None,
        }
    }
}

impl fmt::Display for FightResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One entry of a rikishi's fight log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FightRecord {
    pub result: FightResult,

    #[serde(rename = "opponentID")]
    pub opponent_id: RikishiId,

    /// Winning technique; empty for absences
    pub kimarite: String,

    #[serde(rename = "opponentShikonaEn", default, skip_serializing_if = "Option::is_none")]
    pub opponent_shikona_en: Option<String>,
}

/// One rikishi on one side of the banzuke
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RosterEntry {
    #[serde(rename = "rikishiID")]
    pub rikishi_id: RikishiId,

    #[serde(rename = "shikonaEn", default, skip_serializing_if = "Option::is_none")]
    pub shikona_en: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rank: Option<String>,

    /// Missing or null means the rikishi has no fights recorded
    #[serde(default)]
    pub record: Option<Vec<FightRecord>>,
}

impl RosterEntry {
    /// Recorded fights, empty when the record is absent
    pub fn fights(&self) -> &[FightRecord] {
        self.record.as_deref().unwrap_or(&[])
    }
}

/// A full basho snapshot as delivered by the upstream collaborator
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BashoSnapshot {
    #[serde(rename = "bashoId")]
    pub basho_id: String,
    pub east: Vec<RosterEntry>,
    pub west: Vec<RosterEntry>,
}

// ============================================================================
// INGESTION ERRORS
// ============================================================================

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("snapshot has no bashoId")]
    MissingBashoId,

    #[error("malformed snapshot: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("IO error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl SnapshotError {
    /// Snapshots without an id are skipped by the runner rather than failing the run
    pub fn is_skippable(&self) -> bool {
        matches!(self, SnapshotError::MissingBashoId)
    }
}

/// Wire shape before validation: bashoId may be absent and rosters may be null
#[derive(Deserialize)]
struct RawSnapshot {
    #[serde(rename = "bashoId", default)]
    basho_id: Option<String>,
    #[serde(default)]
    east: Option<Vec<RosterEntry>>,
    #[serde(default)]
    west: Option<Vec<RosterEntry>>,
}

// ============================================================================
// PARSING
// ============================================================================

impl BashoSnapshot {
    /// Parse and validate a snapshot document
    pub fn from_json(text: &str) -> Result<Self, SnapshotError> {
        let raw: RawSnapshot = serde_json::from_str(text)?;

        let basho_id = match raw.basho_id {
            Some(id) if !id.trim().is_empty() => id.trim().to_string(),
            _ => return Err(SnapshotError::MissingBashoId),
        };

        Ok(BashoSnapshot {
            basho_id,
            east: raw.east.unwrap_or_default(),
            west: raw.west.unwrap_or_default(),
        })
    }

    /// Read and parse a snapshot file
    pub fn from_path(path: &Path) -> Result<Self, SnapshotError> {
        let text = std::fs::read_to_string(path).map_err(|source| SnapshotError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&text)
    }

    /// Both rosters tagged with their side, east first
    pub fn sides(&self) -> [(Side, &[RosterEntry]); 2] {
        [(Side::East, self.east.as_slice()), (Side::West, self.west.as_slice())]
    }

    /// Total number of fight records across both sides
    pub fn record_count(&self) -> usize {
        self.east
            .iter()
            .chain(self.west.iter())
            .map(|entry| entry.fights().len())
            .sum()
    }
}

// ============================================================================
// TESTS
// ============================================================================
