// 💾 Bout Sink - Where reconstructed bouts are delivered
// Delivery is idempotent: the same bout delivered twice is stored once.

use crate::bout::Bout;
use crate::db::{self, BashoRecord, Event, PersistOutcome, RikishiBoutLink, RikishiRecord};
use anyhow::{Context, Result};
use rusqlite::Connection;
use std::path::Path;

/// Receives bouts one at a time
pub trait BoutSink {
    /// Store one bout. `AlreadyPresent` means an identical bout was stored before.
    fn deliver(&mut self, bout: &Bout) -> Result<PersistOutcome>;

    /// Called once per snapshot before its bouts. Default does nothing.
    fn begin_basho(&mut self, _basho_id: &str) -> Result<()> {
        Ok(())
    }

    /// Store or refresh a rikishi's display attributes. Default does nothing.
    fn record_rikishi(&mut self, _rikishi: &RikishiRecord) -> Result<()> {
        Ok(())
    }
}

// ============================================================================
// SQLITE SINK
// ============================================================================

pub struct SqliteBoutSink {
    conn: Connection,
}

impl SqliteBoutSink {
    /// Open (or create) the store at `path` and make sure the schema exists
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database {}", path.display()))?;
        Self::from_connection(conn)
    }

    pub fn from_connection(conn: Connection) -> Result<Self> {
        db::setup_database(&conn).context("Failed to set up database schema")?;
        Ok(SqliteBoutSink { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl BoutSink for SqliteBoutSink {
    fn begin_basho(&mut self, basho_id: &str) -> Result<()> {
        let basho = BashoRecord {
            basho_id: basho_id.to_string(),
        };
        db::persist_entity(&self.conn, &basho)?;
        Ok(())
    }

    fn record_rikishi(&mut self, rikishi: &RikishiRecord) -> Result<()> {
        db::persist_entity(&self.conn, rikishi)?;
        Ok(())
    }

    fn deliver(&mut self, bout: &Bout) -> Result<PersistOutcome> {
        let tx = self.conn.transaction()?;

        let outcome = db::persist_entity(&tx, bout)?;

        if outcome == PersistOutcome::Created {
            let bout_hash = bout.compute_idempotency_hash();

            for rikishi_id in bout.rikishi_ids() {
                let link = RikishiBoutLink {
                    rikishi_id,
                    bout_hash: bout_hash.clone(),
                };
                db::persist_entity(&tx, &link)?;
            }

            let event = Event::bout_created(bout)?;
            db::insert_event(&tx, &event)?;
        }

        tx.commit()?;
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flatten::BoutRow;
    use crate::snapshot::{FightResult, Side};

    fn create_test_bout() -> Bout {
        let row = |rikishi_id, side, result, opponent_id| BoutRow {
            rikishi_id,
            side,
            result,
            opponent_id,
            kimarite: "yorikiri".to_string(),
            fight_number: 3,
            basho_id: "202401".to_string(),
        };
        Bout::matched(
            &row(10, Side::East, FightResult::Win, 20),
            &row(20, Side::West, FightResult::Loss, 10),
        )
    }

    #[test]
    fn test_deliver_links_and_logs_once() {
        let mut sink = SqliteBoutSink::from_connection(Connection::open_in_memory().unwrap()).unwrap();
        let bout = create_test_bout();

        assert_eq!(sink.deliver(&bout).unwrap(), PersistOutcome::Created);
        assert_eq!(sink.deliver(&bout).unwrap(), PersistOutcome::AlreadyPresent);

        let conn = sink.connection();
        assert_eq!(db::count_bouts(conn).unwrap(), 1);
        assert_eq!(db::get_bouts_for_rikishi(conn, 20).unwrap().len(), 1);

        let events = db::get_bout_events(conn, &bout.compute_idempotency_hash()).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data["fightNumber"], 3);
    }

    #[test]
    fn test_begin_basho_records_basho() {
        let mut sink = SqliteBoutSink::from_connection(Connection::open_in_memory().unwrap()).unwrap();

        sink.begin_basho("202401").unwrap();
        sink.begin_basho("202401").unwrap();

        assert_eq!(db::get_basho_ids(sink.connection()).unwrap(), vec!["202401".to_string()]);
    }

    #[test]
    fn test_record_rikishi_stores_attributes() {
        let mut sink = SqliteBoutSink::from_connection(Connection::open_in_memory().unwrap()).unwrap();
        let rikishi = RikishiRecord {
            rikishi_id: 10,
            shikona_en: Some("Hoshoryu".to_string()),
            rank: Some("Ozeki 1 East".to_string()),
        };

        sink.record_rikishi(&rikishi).unwrap();
        sink.record_rikishi(&rikishi).unwrap();

        assert_eq!(db::get_rikishi(sink.connection(), 10).unwrap(), Some(rikishi));
    }
}
