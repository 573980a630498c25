use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params, Connection, OptionalExtension, ToSql};
use serde::{Deserialize, Serialize};

use crate::bout::{Bout, Participant};
use crate::snapshot::{FightResult, RikishiId, Side};

// ============================================================================
// GENERIC ENTITY PERSISTENCE
// One insert path for every stored entity: a statement template plus a
// named field mapping. Storage is keyed on the entity's full content.
// ============================================================================

/// An entity that can be written with `persist_entity`
pub trait Persistable {
    /// Entity type name used in the audit trail
    const ENTITY_TYPE: &'static str;

    /// INSERT statement using named parameters (`:name`)
    const INSERT_TEMPLATE: &'static str;

    /// Stable content-derived identity
    fn identity(&self) -> String;

    /// Named parameter values for `INSERT_TEMPLATE`
    fn fields(&self) -> Vec<(&'static str, Value)>;
}

/// What happened to one persisted entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PersistOutcome {
    Created,
    AlreadyPresent,
}

/// Insert an entity. A UNIQUE violation means it is already stored and is not an error.
pub fn persist_entity<E: Persistable>(conn: &Connection, entity: &E) -> Result<PersistOutcome> {
    let fields = entity.fields();
    let named: Vec<(&str, &dyn ToSql)> = fields
        .iter()
        .map(|(name, value)| (*name, value as &dyn ToSql))
        .collect();

    match conn.execute(E::INSERT_TEMPLATE, named.as_slice()) {
        Ok(_) => Ok(PersistOutcome::Created),
        Err(rusqlite::Error::SqliteFailure(err, _))
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            Ok(PersistOutcome::AlreadyPresent)
        }
        Err(e) => Err(e).with_context(|| {
            format!("Failed to persist {} {}", E::ENTITY_TYPE, entity.identity())
        }),
    }
}

// ============================================================================
// ENTITIES
// ============================================================================

/// A basho seen in at least one processed snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BashoRecord {
    pub basho_id: String,
}

impl Persistable for BashoRecord {
    const ENTITY_TYPE: &'static str = "basho";
    const INSERT_TEMPLATE: &'static str = "INSERT INTO bashos (basho_id) VALUES (:basho_id)";

    fn identity(&self) -> String {
        self.basho_id.clone()
    }

    fn fields(&self) -> Vec<(&'static str, Value)> {
        vec![(":basho_id", Value::Text(self.basho_id.clone()))]
    }
}

impl Persistable for Bout {
    const ENTITY_TYPE: &'static str = "bout";
    const INSERT_TEMPLATE: &'static str = "INSERT INTO bouts (
            idempotency_hash, basho_id, kimarite, fight_number,
            rikishi_id_1, side_1, result_1,
            rikishi_id_2, side_2, result_2
        ) VALUES (
            :idempotency_hash, :basho_id, :kimarite, :fight_number,
            :rikishi_id_1, :side_1, :result_1,
            :rikishi_id_2, :side_2, :result_2
        )";

    fn identity(&self) -> String {
        self.compute_idempotency_hash()
    }

    fn fields(&self) -> Vec<(&'static str, Value)> {
        let p = self.payload();
        vec![
            (":idempotency_hash", Value::Text(self.compute_idempotency_hash())),
            (":basho_id", Value::Text(p.basho_id)),
            (":kimarite", Value::Text(p.kimarite)),
            (":fight_number", Value::Integer(i64::from(p.fight_number))),
            (":rikishi_id_1", Value::Integer(i64::from(p.rikishi_id_1))),
            (":side_1", Value::Text(p.side_1)),
            (":result_1", Value::Text(p.result_1)),
            (
                ":rikishi_id_2",
                p.rikishi_id_2
                    .map(|id| Value::Integer(i64::from(id)))
                    .unwrap_or(Value::Null),
            ),
            (":side_2", Value::Text(p.side_2)),
            (":result_2", Value::Text(p.result_2)),
        ]
    }
}

/// Link between a rikishi and a bout they took part in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RikishiBoutLink {
    pub rikishi_id: RikishiId,
    pub bout_hash: String,
}

impl Persistable for RikishiBoutLink {
    const ENTITY_TYPE: &'static str = "rikishi_bout";
    const INSERT_TEMPLATE: &'static str =
        "INSERT INTO rikishi_bouts (rikishi_id, bout_hash) VALUES (:rikishi_id, :bout_hash)";

    fn identity(&self) -> String {
        format!("{}:{}", self.rikishi_id, self.bout_hash)
    }

    fn fields(&self) -> Vec<(&'static str, Value)> {
        vec![
            (":rikishi_id", Value::Integer(i64::from(self.rikishi_id))),
            (":bout_hash", Value::Text(self.bout_hash.clone())),
        ]
    }
}

/// A rikishi as last described by a roster. Attributes are upserted: a later
/// snapshot overwrites them, a missing value keeps what is stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RikishiRecord {
    pub rikishi_id: RikishiId,
    pub shikona_en: Option<String>,
    pub rank: Option<String>,
}

impl Persistable for RikishiRecord {
    const ENTITY_TYPE: &'static str = "rikishi";
    const INSERT_TEMPLATE: &'static str = "INSERT INTO rikishis (rikishi_id, shikona_en, rank)
        VALUES (:rikishi_id, :shikona_en, :rank)
        ON CONFLICT (rikishi_id) DO UPDATE SET
            shikona_en = COALESCE(excluded.shikona_en, rikishis.shikona_en),
            rank = COALESCE(excluded.rank, rikishis.rank),
            updated_at = CURRENT_TIMESTAMP";

    fn identity(&self) -> String {
        self.rikishi_id.to_string()
    }

    fn fields(&self) -> Vec<(&'static str, Value)> {
        let text = |v: &Option<String>| v.clone().map(Value::Text).unwrap_or(Value::Null);
        vec![
            (":rikishi_id", Value::Integer(i64::from(self.rikishi_id))),
            (":shikona_en", text(&self.shikona_en)),
            (":rank", text(&self.rank)),
        ]
    }
}

/// Audit entry written when a bout is first stored; `data` is the bout payload
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
}

impl Event {
    pub fn bout_created(bout: &Bout) -> Result<Self> {
        Ok(Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: "bout_created".to_string(),
            entity_type: <Bout as Persistable>::ENTITY_TYPE.to_string(),
            entity_id: bout.compute_idempotency_hash(),
            data: serde_json::to_value(bout.payload())?,
        })
    }
}

// ============================================================================
// SCHEMA
// ============================================================================

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS bashos (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            basho_id TEXT UNIQUE NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // The hash covers every bout attribute; the UNIQUE tuple guards it
    conn.execute(
        "CREATE TABLE IF NOT EXISTS bouts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            idempotency_hash TEXT UNIQUE NOT NULL,
            basho_id TEXT NOT NULL,
            kimarite TEXT NOT NULL,
            fight_number INTEGER NOT NULL,
            rikishi_id_1 INTEGER NOT NULL,
            side_1 TEXT NOT NULL,
            result_1 TEXT NOT NULL,
            rikishi_id_2 INTEGER,
            side_2 TEXT NOT NULL,
            result_2 TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (basho_id, kimarite, fight_number,
                    rikishi_id_1, side_1, result_1,
                    rikishi_id_2, side_2, result_2)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS rikishis (
            rikishi_id INTEGER PRIMARY KEY,
            shikona_en TEXT,
            rank TEXT,
            updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS rikishi_bouts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            rikishi_id INTEGER NOT NULL,
            bout_hash TEXT NOT NULL,
            UNIQUE (rikishi_id, bout_hash)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_bouts_basho ON bouts(basho_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_rikishi_bouts_rikishi ON rikishi_bouts(rikishi_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// EVENTS
// ============================================================================

pub fn insert_event(conn: &Connection, event: &Event) -> Result<()> {
    conn.execute(
        "INSERT INTO events (event_id, timestamp, event_type, entity_type, entity_id, data)
         VALUES (:event_id, :timestamp, :event_type, :entity_type, :entity_id, :data)",
        rusqlite::named_params! {
            ":event_id": event.event_id,
            ":timestamp": event.timestamp.to_rfc3339(),
            ":event_type": event.event_type,
            ":entity_type": event.entity_type,
            ":entity_id": event.entity_id,
            ":data": serde_json::to_string(&event.data)?,
        },
    )?;

    Ok(())
}

/// Audit trail of one stored bout, oldest first
pub fn get_bout_events(conn: &Connection, bout_hash: &str) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, data
         FROM events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY id",
    )?;

    let rows = stmt
        .query_map(params![<Bout as Persistable>::ENTITY_TYPE, bout_hash], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(event_id, timestamp, event_type, entity_type, data)| {
            Ok(Event {
                timestamp: DateTime::parse_from_rfc3339(&timestamp)
                    .with_context(|| format!("Bad timestamp on event {}", event_id))?
                    .with_timezone(&Utc),
                data: serde_json::from_str(&data)
                    .with_context(|| format!("Bad payload on event {}", event_id))?,
                event_id,
                event_type,
                entity_type,
                entity_id: bout_hash.to_string(),
            })
        })
        .collect()
}

// ============================================================================
// QUERIES
// ============================================================================

const BOUT_COLUMNS: &str = "b.basho_id, b.kimarite, b.fight_number,
        b.rikishi_id_1, b.side_1, b.result_1,
        b.rikishi_id_2, b.side_2, b.result_2";

/// Raw stored bout columns before label decoding
struct StoredBout {
    basho_id: String,
    kimarite: String,
    fight_number: u32,
    rikishi_id_1: u32,
    side_1: String,
    result_1: String,
    rikishi_id_2: Option<u32>,
    side_2: String,
    result_2: String,
}

impl StoredBout {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(StoredBout {
            basho_id: row.get(0)?,
            kimarite: row.get(1)?,
            fight_number: row.get(2)?,
            rikishi_id_1: row.get(3)?,
            side_1: row.get(4)?,
            result_1: row.get(5)?,
            rikishi_id_2: row.get(6)?,
            side_2: row.get(7)?,
            result_2: row.get(8)?,
        })
    }

    fn into_bout(self) -> Result<Bout> {
        let participant_1 = decode_participant(self.rikishi_id_1, &self.side_1, &self.result_1)?;
        let participant_2 = match self.rikishi_id_2 {
            Some(id) => Some(decode_participant(id, &self.side_2, &self.result_2)?),
            None => None,
        };

        Ok(Bout {
            basho_id: self.basho_id,
            kimarite: self.kimarite,
            fight_number: self.fight_number,
            participant_1,
            participant_2,
        })
    }
}

fn decode_participant(rikishi_id: RikishiId, side: &str, result: &str) -> Result<Participant> {
    Ok(Participant {
        rikishi_id,
        side: Side::from_name(side).ok_or_else(|| anyhow!("Unknown side in store: {:?}", side))?,
        result: FightResult::from_label(result)
            .ok_or_else(|| anyhow!("Unknown result in store: {:?}", result))?,
    })
}

fn query_bouts<P: rusqlite::Params>(conn: &Connection, sql: &str, params: P) -> Result<Vec<Bout>> {
    let mut stmt = conn.prepare(sql)?;
    let stored = stmt
        .query_map(params, StoredBout::from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    stored.into_iter().map(StoredBout::into_bout).collect()
}

/// All stored bouts of one basho, in fight-number then insertion order
pub fn get_bouts_for_basho(conn: &Connection, basho_id: &str) -> Result<Vec<Bout>> {
    let sql = format!(
        "SELECT {} FROM bouts b WHERE b.basho_id = ?1 ORDER BY b.fight_number, b.id",
        BOUT_COLUMNS
    );
    query_bouts(conn, &sql, params![basho_id])
}

/// All stored bouts a rikishi took part in
pub fn get_bouts_for_rikishi(conn: &Connection, rikishi_id: RikishiId) -> Result<Vec<Bout>> {
    let sql = format!(
        "SELECT {} FROM bouts b
         JOIN rikishi_bouts rb ON rb.bout_hash = b.idempotency_hash
         WHERE rb.rikishi_id = ?1
         ORDER BY b.basho_id, b.fight_number, b.id",
        BOUT_COLUMNS
    );
    query_bouts(conn, &sql, params![rikishi_id])
}

/// Stored attributes of one rikishi, if any roster described them
pub fn get_rikishi(conn: &Connection, rikishi_id: RikishiId) -> Result<Option<RikishiRecord>> {
    let rikishi = conn
        .query_row(
            "SELECT rikishi_id, shikona_en, rank FROM rikishis WHERE rikishi_id = ?1",
            params![rikishi_id],
            |row| {
                Ok(RikishiRecord {
                    rikishi_id: row.get(0)?,
                    shikona_en: row.get(1)?,
                    rank: row.get(2)?,
                })
            },
        )
        .optional()?;

    Ok(rikishi)
}

pub fn count_bouts(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM bouts", [], |row| row.get(0))?;

    Ok(count)
}

/// Stored basho ids, oldest first
pub fn get_basho_ids(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT basho_id FROM bashos ORDER BY basho_id")?;
    let ids = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;

    Ok(ids)
}

/// Per-basho bout statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BashoStat {
    pub basho_id: String,
    pub bout_count: i64,
    pub matched_count: i64,
    pub unmatched_count: i64,
}

/// Get bout statistics grouped by basho
pub fn get_basho_stats(conn: &Connection) -> Result<Vec<BashoStat>> {
    let mut stmt = conn.prepare(
        "SELECT
            basho_id,
            COUNT(*) as count,
            SUM(CASE WHEN rikishi_id_2 IS NOT NULL THEN 1 ELSE 0 END) as matched,
            SUM(CASE WHEN rikishi_id_2 IS NULL THEN 1 ELSE 0 END) as unmatched
         FROM bouts
         GROUP BY basho_id
         ORDER BY basho_id",
    )?;

    let stats = stmt
        .query_map([], |row| {
            Ok(BashoStat {
                basho_id: row.get(0)?,
                bout_count: row.get(1)?,
                matched_count: row.get(2)?,
                unmatched_count: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(stats)
}
