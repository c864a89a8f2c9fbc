//! SQLite storage for StemsMixes and their track lists.
//!
//! Statement helpers take a `&Connection` so the same SQL runs either on the
//! bare connection or inside a `Transaction` (which derefs to `Connection`).

use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension, Transaction};

use crate::protocol::{StemsMixEntry, StemsMixId, StemsMixInfo, StemsMixKind, TrackId};

/// Position a row is parked at while `move_track` shifts its neighbours.
pub const MOVE_SENTINEL_POSITION: i64 = -1;

pub struct DbManager {
    conn: Connection,
}

impl DbManager {
    pub fn new(db_path: &Path) -> Result<Self, rusqlite::Error> {
        let conn = Connection::open(db_path)?;
        let db_manager = Self { conn };
        db_manager.initialize_schema()?;
        Ok(db_manager)
    }

    pub fn new_in_memory() -> Result<Self, rusqlite::Error> {
        let conn = Connection::open_in_memory()?;
        let db_manager = Self { conn };
        db_manager.initialize_schema()?;
        Ok(db_manager)
    }

    fn initialize_schema(&self) -> Result<(), rusqlite::Error> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS StemsMixs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT,
                position INTEGER,
                hidden INTEGER NOT NULL DEFAULT 0,
                locked INTEGER NOT NULL DEFAULT 0,
                date_created TEXT,
                date_modified TEXT
            );
            CREATE TABLE IF NOT EXISTS StemsMixTracks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                stemsmix_id INTEGER NOT NULL REFERENCES StemsMixs(id),
                track_id INTEGER NOT NULL,
                position INTEGER NOT NULL,
                pl_datetime_added TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_stemsmixtracks_stemsmix_position
                ON StemsMixTracks (stemsmix_id, position);
            CREATE INDEX IF NOT EXISTS idx_stemsmixtracks_track
                ON StemsMixTracks (track_id);",
        )
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn transaction(&mut self) -> Result<Transaction<'_>, rusqlite::Error> {
        self.conn.transaction()
    }

    // ---- StemsMixs ----------------------------------------------------

    pub fn max_stemsmix_position(conn: &Connection) -> Result<i64, rusqlite::Error> {
        let max: Option<i64> =
            conn.query_row("SELECT max(position) FROM StemsMixs", [], |row| row.get(0))?;
        Ok(max.unwrap_or(0))
    }

    pub fn insert_stemsmix(
        conn: &Connection,
        name: &str,
        position: i64,
        kind: StemsMixKind,
    ) -> Result<StemsMixId, rusqlite::Error> {
        conn.execute(
            "INSERT INTO StemsMixs (name, position, hidden, date_created, date_modified)
             VALUES (?1, ?2, ?3, CURRENT_TIMESTAMP, CURRENT_TIMESTAMP)",
            params![name, position, kind.to_db()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn stemsmix_id_from_name(
        conn: &Connection,
        name: &str,
    ) -> Result<Option<StemsMixId>, rusqlite::Error> {
        conn.query_row(
            "SELECT id FROM StemsMixs WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )
        .optional()
    }

    pub fn stemsmix_name(
        conn: &Connection,
        id: StemsMixId,
    ) -> Result<Option<String>, rusqlite::Error> {
        conn.query_row(
            "SELECT name FROM StemsMixs WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )
        .optional()
    }

    /// `None` when no such row exists.
    pub fn stemsmix_kind(
        conn: &Connection,
        id: StemsMixId,
    ) -> Result<Option<StemsMixKind>, rusqlite::Error> {
        let hidden: Option<i64> = conn
            .query_row(
                "SELECT hidden FROM StemsMixs WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(hidden.map(StemsMixKind::from_db))
    }

    pub fn stemsmix_locked(
        conn: &Connection,
        id: StemsMixId,
    ) -> Result<Option<bool>, rusqlite::Error> {
        let locked: Option<i64> = conn
            .query_row(
                "SELECT locked FROM StemsMixs WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(locked.map(|value| value == 1))
    }

    pub fn rename_stemsmix(
        conn: &Connection,
        id: StemsMixId,
        name: &str,
    ) -> Result<usize, rusqlite::Error> {
        conn.execute(
            "UPDATE StemsMixs SET name = ?1, date_modified = CURRENT_TIMESTAMP WHERE id = ?2",
            params![name, id],
        )
    }

    pub fn set_stemsmix_locked(
        conn: &Connection,
        id: StemsMixId,
        locked: bool,
    ) -> Result<usize, rusqlite::Error> {
        // SQLite has no boolean type.
        conn.execute(
            "UPDATE StemsMixs SET locked = ?1 WHERE id = ?2",
            params![if locked { 1 } else { 0 }, id],
        )
    }

    pub fn delete_stemsmix_row(conn: &Connection, id: StemsMixId) -> Result<usize, rusqlite::Error> {
        conn.execute("DELETE FROM StemsMixs WHERE id = ?1", params![id])
    }

    pub fn delete_stemsmix_tracks(
        conn: &Connection,
        id: StemsMixId,
    ) -> Result<usize, rusqlite::Error> {
        conn.execute(
            "DELETE FROM StemsMixTracks WHERE stemsmix_id = ?1",
            params![id],
        )
    }

    /// Unlocked collections of `kind` holding fewer than `min_tracks` entries.
    pub fn unlocked_stemsmix_ids_with_fewer_tracks(
        conn: &Connection,
        kind: StemsMixKind,
        min_tracks: i64,
    ) -> Result<Vec<StemsMixId>, rusqlite::Error> {
        let mut stmt = conn.prepare(
            "SELECT id FROM StemsMixs
             WHERE (SELECT count(*) FROM StemsMixTracks
                    WHERE StemsMixTracks.stemsmix_id = StemsMixs.id) < ?1
               AND StemsMixs.hidden = ?2
               AND StemsMixs.locked = 0
             ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![min_tracks, kind.to_db()], |row| row.get(0))?;
        rows.collect()
    }

    pub fn stemsmix_ids_of_kind(
        conn: &Connection,
        kind: StemsMixKind,
    ) -> Result<Vec<StemsMixId>, rusqlite::Error> {
        let mut stmt = conn.prepare("SELECT id FROM StemsMixs WHERE hidden = ?1")?;
        let rows = stmt.query_map(params![kind.to_db()], |row| row.get(0))?;
        rows.collect()
    }

    pub fn stemsmix_count(conn: &Connection) -> Result<usize, rusqlite::Error> {
        let count: i64 = conn.query_row("SELECT count(*) FROM StemsMixs", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Id at `index` in natural table order, not the `position` column.
    pub fn stemsmix_id_at_index(
        conn: &Connection,
        index: usize,
    ) -> Result<Option<StemsMixId>, rusqlite::Error> {
        conn.query_row(
            "SELECT id FROM StemsMixs ORDER BY rowid ASC LIMIT 1 OFFSET ?1",
            params![index as i64],
            |row| row.get(0),
        )
        .optional()
    }

    pub fn previous_stemsmix_id(
        conn: &Connection,
        current: StemsMixId,
        kind: StemsMixKind,
    ) -> Result<Option<StemsMixId>, rusqlite::Error> {
        conn.query_row(
            "SELECT max(id) FROM StemsMixs WHERE id < ?1 AND hidden = ?2",
            params![current, kind.to_db()],
            |row| row.get(0),
        )
    }

    pub fn list_stemsmixes(conn: &Connection) -> Result<Vec<StemsMixInfo>, rusqlite::Error> {
        let mut stmt = conn.prepare(
            "SELECT id, name, position, hidden, locked, date_created, date_modified
             FROM StemsMixs ORDER BY position ASC, id ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(StemsMixInfo {
                id: row.get(0)?,
                name: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                position: row.get::<_, Option<i64>>(2)?.unwrap_or_default(),
                kind: StemsMixKind::from_db(row.get(3)?),
                locked: row.get::<_, i64>(4)? == 1,
                date_created: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
                date_modified: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
            })
        })?;
        rows.collect()
    }

    // ---- StemsMixTracks -----------------------------------------------

    /// Highest track position in the collection, 0 when it is empty.
    pub fn max_track_position(conn: &Connection, id: StemsMixId) -> Result<i64, rusqlite::Error> {
        let max: Option<i64> = conn.query_row(
            "SELECT max(position) FROM StemsMixTracks WHERE stemsmix_id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        Ok(max.unwrap_or(0))
    }

    pub fn track_count(conn: &Connection, id: StemsMixId) -> Result<usize, rusqlite::Error> {
        let count: i64 = conn.query_row(
            "SELECT count(*) FROM StemsMixTracks WHERE stemsmix_id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    pub fn distinct_track_ids(
        conn: &Connection,
        id: StemsMixId,
    ) -> Result<Vec<TrackId>, rusqlite::Error> {
        let mut stmt = conn.prepare(
            "SELECT DISTINCT track_id FROM StemsMixTracks WHERE stemsmix_id = ?1 ORDER BY track_id",
        )?;
        let rows = stmt.query_map(params![id], |row| Ok(TrackId(row.get(0)?)))?;
        rows.collect()
    }

    pub fn ordered_track_ids(
        conn: &Connection,
        id: StemsMixId,
    ) -> Result<Vec<TrackId>, rusqlite::Error> {
        let mut stmt = conn.prepare(
            "SELECT track_id FROM StemsMixTracks WHERE stemsmix_id = ?1 ORDER BY position ASC",
        )?;
        let rows = stmt.query_map(params![id], |row| Ok(TrackId(row.get(0)?)))?;
        rows.collect()
    }

    pub fn entries(conn: &Connection, id: StemsMixId) -> Result<Vec<StemsMixEntry>, rusqlite::Error> {
        let mut stmt = conn.prepare(
            "SELECT track_id, position, pl_datetime_added FROM StemsMixTracks
             WHERE stemsmix_id = ?1 ORDER BY position ASC",
        )?;
        let rows = stmt.query_map(params![id], |row| {
            Ok(StemsMixEntry {
                track_id: TrackId(row.get(0)?),
                position: row.get(1)?,
                date_added: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
            })
        })?;
        rows.collect()
    }

    pub fn track_at_position(
        conn: &Connection,
        id: StemsMixId,
        position: i64,
    ) -> Result<Option<TrackId>, rusqlite::Error> {
        conn.query_row(
            "SELECT track_id FROM StemsMixTracks WHERE stemsmix_id = ?1 AND position = ?2",
            params![id, position],
            |row| Ok(TrackId(row.get(0)?)),
        )
        .optional()
    }

    pub fn positions_of_track(
        conn: &Connection,
        id: StemsMixId,
        track_id: TrackId,
    ) -> Result<Vec<i64>, rusqlite::Error> {
        let mut stmt = conn.prepare(
            "SELECT position FROM StemsMixTracks
             WHERE stemsmix_id = ?1 AND track_id = ?2 ORDER BY position DESC",
        )?;
        let rows = stmt.query_map(params![id, track_id.0], |row| row.get(0))?;
        rows.collect()
    }

    /// Entries at `from_position` and above, in position order.
    pub fn tracks_from_position(
        conn: &Connection,
        id: StemsMixId,
        from_position: i64,
    ) -> Result<Vec<(TrackId, i64)>, rusqlite::Error> {
        let mut stmt = conn.prepare(
            "SELECT track_id, position FROM StemsMixTracks
             WHERE stemsmix_id = ?1 AND position >= ?2 ORDER BY position ASC",
        )?;
        let rows = stmt.query_map(params![id, from_position], |row| {
            Ok((TrackId(row.get(0)?), row.get(1)?))
        })?;
        rows.collect()
    }

    pub fn insert_track(
        conn: &Connection,
        id: StemsMixId,
        track_id: TrackId,
        position: i64,
    ) -> Result<(), rusqlite::Error> {
        conn.execute(
            "INSERT INTO StemsMixTracks (stemsmix_id, track_id, position, pl_datetime_added)
             VALUES (?1, ?2, ?3, CURRENT_TIMESTAMP)",
            params![id, track_id.0, position],
        )?;
        Ok(())
    }

    pub fn delete_track_at(
        conn: &Connection,
        id: StemsMixId,
        position: i64,
    ) -> Result<usize, rusqlite::Error> {
        conn.execute(
            "DELETE FROM StemsMixTracks WHERE stemsmix_id = ?1 AND position = ?2",
            params![id, position],
        )
    }

    pub fn delete_tracks_from(
        conn: &Connection,
        id: StemsMixId,
        from_position: i64,
    ) -> Result<usize, rusqlite::Error> {
        conn.execute(
            "DELETE FROM StemsMixTracks WHERE stemsmix_id = ?1 AND position >= ?2",
            params![id, from_position],
        )
    }

    /// Adds `delta` to every position in `low..=high`.
    pub fn shift_positions(
        conn: &Connection,
        id: StemsMixId,
        low: i64,
        high: i64,
        delta: i64,
    ) -> Result<usize, rusqlite::Error> {
        conn.execute(
            "UPDATE StemsMixTracks SET position = position + ?1
             WHERE stemsmix_id = ?2 AND position >= ?3 AND position <= ?4",
            params![delta, id, low, high],
        )
    }

    pub fn set_track_position(
        conn: &Connection,
        id: StemsMixId,
        from_position: i64,
        to_position: i64,
    ) -> Result<usize, rusqlite::Error> {
        conn.execute(
            "UPDATE StemsMixTracks SET position = ?1 WHERE stemsmix_id = ?2 AND position = ?3",
            params![to_position, id, from_position],
        )
    }

    /// Copies every source entry into the target, offsetting positions and
    /// keeping the original date added.
    pub fn copy_tracks(
        conn: &Connection,
        source: StemsMixId,
        target: StemsMixId,
        position_offset: i64,
    ) -> Result<usize, rusqlite::Error> {
        conn.execute(
            "INSERT INTO StemsMixTracks (stemsmix_id, track_id, position, pl_datetime_added)
             SELECT ?1, track_id, position + ?2, pl_datetime_added FROM StemsMixTracks
             WHERE stemsmix_id = ?3 ORDER BY position ASC",
            params![target, position_offset, source],
        )
    }

    /// Every `(track, collection)` row of the membership table.
    pub fn membership_rows(conn: &Connection) -> Result<Vec<(TrackId, StemsMixId)>, rusqlite::Error> {
        let mut stmt = conn.prepare("SELECT track_id, stemsmix_id FROM StemsMixTracks")?;
        let rows = stmt.query_map([], |row| Ok((TrackId(row.get(0)?), row.get(1)?)))?;
        rows.collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_initialization_is_idempotent() {
        let db = DbManager::new_in_memory().expect("failed to create in-memory db");
        db.initialize_schema().expect("second schema init should succeed");
        assert_eq!(DbManager::stemsmix_count(db.connection()).unwrap(), 0);
    }

    #[test]
    fn test_max_positions_are_zero_when_empty() {
        let db = DbManager::new_in_memory().expect("failed to create in-memory db");
        let conn = db.connection();
        assert_eq!(DbManager::max_stemsmix_position(conn).unwrap(), 0);
        assert_eq!(DbManager::max_track_position(conn, 1).unwrap(), 0);
    }

    #[test]
    fn test_shift_positions_only_touches_requested_collection_and_range() {
        let db = DbManager::new_in_memory().expect("failed to create in-memory db");
        let conn = db.connection();
        let a = DbManager::insert_stemsmix(conn, "a", 1, StemsMixKind::Normal).unwrap();
        let b = DbManager::insert_stemsmix(conn, "b", 2, StemsMixKind::Normal).unwrap();
        for position in 1..=4 {
            DbManager::insert_track(conn, a, TrackId(position), position).unwrap();
            DbManager::insert_track(conn, b, TrackId(position), position).unwrap();
        }

        let shifted = DbManager::shift_positions(conn, a, 2, 3, 10).unwrap();
        assert_eq!(shifted, 2);

        let positions_a: Vec<i64> = DbManager::entries(conn, a)
            .unwrap()
            .into_iter()
            .map(|entry| entry.position)
            .collect();
        assert_eq!(positions_a, vec![1, 4, 12, 13]);
        let positions_b: Vec<i64> = DbManager::entries(conn, b)
            .unwrap()
            .into_iter()
            .map(|entry| entry.position)
            .collect();
        assert_eq!(positions_b, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_unlocked_ids_with_fewer_tracks_filters_kind_and_lock() {
        let db = DbManager::new_in_memory().expect("failed to create in-memory db");
        let conn = db.connection();
        let empty_log = DbManager::insert_stemsmix(conn, "log1", 1, StemsMixKind::SetLog).unwrap();
        let full_log = DbManager::insert_stemsmix(conn, "log2", 2, StemsMixKind::SetLog).unwrap();
        let locked_log = DbManager::insert_stemsmix(conn, "log3", 3, StemsMixKind::SetLog).unwrap();
        let _normal = DbManager::insert_stemsmix(conn, "plain", 4, StemsMixKind::Normal).unwrap();
        DbManager::insert_track(conn, full_log, TrackId(1), 1).unwrap();
        DbManager::insert_track(conn, full_log, TrackId(2), 2).unwrap();
        DbManager::set_stemsmix_locked(conn, locked_log, true).unwrap();

        let ids =
            DbManager::unlocked_stemsmix_ids_with_fewer_tracks(conn, StemsMixKind::SetLog, 2)
                .unwrap();
        assert_eq!(ids, vec![empty_log]);
    }

    #[test]
    fn test_previous_stemsmix_id_matches_kind() {
        let db = DbManager::new_in_memory().expect("failed to create in-memory db");
        let conn = db.connection();
        let log1 = DbManager::insert_stemsmix(conn, "log1", 1, StemsMixKind::SetLog).unwrap();
        let _plain = DbManager::insert_stemsmix(conn, "plain", 2, StemsMixKind::Normal).unwrap();
        let log2 = DbManager::insert_stemsmix(conn, "log2", 3, StemsMixKind::SetLog).unwrap();

        assert_eq!(
            DbManager::previous_stemsmix_id(conn, log2, StemsMixKind::SetLog).unwrap(),
            Some(log1)
        );
        assert_eq!(
            DbManager::previous_stemsmix_id(conn, log1, StemsMixKind::SetLog).unwrap(),
            None
        );
    }
}
