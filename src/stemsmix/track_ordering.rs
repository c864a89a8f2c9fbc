//! Track list editing with dense 1..N positions.
//!
//! Every mutation runs in one transaction and only touches the cache and the
//! bus after the commit went through. A dropped transaction rolls back.

use std::collections::BTreeSet;

use log::{debug, error, warn};
use rusqlite::Connection;

use super::{LogFailedQuery, StemsMixManager};
use crate::db_manager::{DbManager, MOVE_SENTINEL_POSITION};
use crate::error::Result;
use crate::protocol::{StemsMixEvent, StemsMixId, StemsMixKind, TrackId};
use crate::track_catalog::TrackCatalog;

/// Deletes the entry at `position` and closes the gap. `None` when the
/// position is empty.
pub(super) fn remove_position(
    conn: &Connection,
    id: StemsMixId,
    position: i64,
) -> Result<Option<TrackId>> {
    let Some(track_id) =
        DbManager::track_at_position(conn, id, position).log_failed("read track at position")?
    else {
        debug!(
            "StemsMix: no track exists at position {} in stemsmix {}",
            position, id
        );
        return Ok(None);
    };
    DbManager::delete_track_at(conn, id, position).log_failed("delete track")?;
    DbManager::shift_positions(conn, id, position, i64::MAX, -1)
        .log_failed("renumber following tracks")?;
    Ok(Some(track_id))
}

fn single(id: StemsMixId) -> BTreeSet<StemsMixId> {
    BTreeSet::from([id])
}

impl StemsMixManager {
    pub(super) fn record_addition(
        &mut self,
        id: StemsMixId,
        track_id: TrackId,
        position: i64,
        events: &mut Vec<StemsMixEvent>,
    ) {
        self.membership_index.insert(track_id, id);
        events.push(StemsMixEvent::TrackAdded {
            stemsmix_id: id,
            track_id,
            position,
        });
    }

    pub(super) fn record_removal(
        &mut self,
        id: StemsMixId,
        kind: StemsMixKind,
        track_id: TrackId,
        position: i64,
        events: &mut Vec<StemsMixEvent>,
    ) {
        self.membership_index.remove(track_id, id);
        events.push(StemsMixEvent::TrackRemoved {
            stemsmix_id: id,
            track_id,
            position,
        });
        if kind == StemsMixKind::SetLog {
            events.push(StemsMixEvent::TracksRemovedFromPlayedHistory(
                BTreeSet::from([track_id]),
            ));
        }
    }

    /// Appends after the last entry. Invalid ids and rows that fail to store
    /// are skipped without using up a position. Returns the number stored.
    pub fn append(&mut self, track_ids: &[TrackId], id: StemsMixId) -> Result<usize> {
        let tx = self.db_manager.transaction().log_failed("begin append")?;
        // An empty collection starts at 1.
        let mut position =
            DbManager::max_track_position(&tx, id).log_failed("read max track position")? + 1;

        let mut stored = Vec::with_capacity(track_ids.len());
        for track_id in track_ids.iter().copied() {
            if !track_id.is_valid() {
                warn!("StemsMix: skipping invalid track id {} on append", track_id);
                continue;
            }
            match DbManager::insert_track(&tx, id, track_id, position) {
                Ok(()) => {
                    stored.push((track_id, position));
                    position += 1;
                }
                Err(err) => {
                    error!(
                        "StemsMix: appending track {} to {} failed: {}",
                        track_id, id, err
                    );
                }
            }
        }
        tx.commit().log_failed("commit append")?;

        let mut events = Vec::with_capacity(stored.len() + 1);
        let count = stored.len();
        for (track_id, position) in stored {
            self.record_addition(id, track_id, position, &mut events);
        }
        events.push(StemsMixEvent::TracksChanged(single(id)));
        self.publish(events);
        Ok(count)
    }

    pub fn append_one(&mut self, track_id: TrackId, id: StemsMixId) -> Result<bool> {
        Ok(self.append(&[track_id], id)? == 1)
    }

    /// Clamps a requested insert position to `1..=max+1`; 0 means the end.
    fn clamp_insert_position(conn: &Connection, id: StemsMixId, position: i64) -> Result<i64> {
        let end = DbManager::max_track_position(conn, id).log_failed("read max track position")? + 1;
        Ok(if position == 0 || position > end {
            end
        } else {
            position
        })
    }

    /// Inserts at `position`, pushing the entries from there on down by one.
    /// Returns false on a negative id or position, or an invalid track.
    pub fn insert_at(&mut self, track_id: TrackId, id: StemsMixId, position: i64) -> Result<bool> {
        if id < 0 || !track_id.is_valid() || position < 0 {
            warn!(
                "StemsMix: rejected insert of track {} into {} at {}",
                track_id, id, position
            );
            return Ok(false);
        }

        let tx = self.db_manager.transaction().log_failed("begin insert")?;
        let position = Self::clamp_insert_position(&tx, id, position)?;
        DbManager::shift_positions(&tx, id, position, i64::MAX, 1)
            .log_failed("make room for inserted track")?;
        DbManager::insert_track(&tx, id, track_id, position).log_failed("insert track")?;
        tx.commit().log_failed("commit insert")?;

        let mut events = Vec::with_capacity(2);
        self.record_addition(id, track_id, position, &mut events);
        events.push(StemsMixEvent::TracksChanged(single(id)));
        self.publish(events);
        Ok(true)
    }

    /// Inserts the tracks one after another starting at `position`.
    /// Invalid or failing tracks do not advance the insert cursor.
    pub fn insert_many_at(
        &mut self,
        track_ids: &[TrackId],
        id: StemsMixId,
        position: i64,
    ) -> Result<usize> {
        if id < 0 || position < 0 {
            warn!(
                "StemsMix: rejected bulk insert into {} at {}",
                id, position
            );
            return Ok(0);
        }

        let mut tx = self.db_manager.transaction().log_failed("begin bulk insert")?;
        let mut cursor = Self::clamp_insert_position(&tx, id, position)?;

        let mut stored = Vec::with_capacity(track_ids.len());
        for track_id in track_ids.iter().copied() {
            if !track_id.is_valid() {
                warn!("StemsMix: skipping invalid track id {} on insert", track_id);
                continue;
            }
            // A savepoint per track keeps a failed insert from leaving a gap.
            let savepoint = tx.savepoint().log_failed("begin track savepoint")?;
            let inserted = DbManager::shift_positions(&savepoint, id, cursor, i64::MAX, 1)
                .and_then(|_| DbManager::insert_track(&savepoint, id, track_id, cursor))
                .and_then(|_| savepoint.commit());
            match inserted {
                Ok(()) => {
                    stored.push((track_id, cursor));
                    cursor += 1;
                }
                Err(err) => {
                    error!(
                        "StemsMix: inserting track {} into {} at {} failed: {}",
                        track_id, id, cursor, err
                    );
                }
            }
        }
        tx.commit().log_failed("commit bulk insert")?;

        let mut events = Vec::with_capacity(stored.len() + 1);
        let count = stored.len();
        for (track_id, position) in stored {
            self.record_addition(id, track_id, position, &mut events);
        }
        events.push(StemsMixEvent::TracksChanged(single(id)));
        self.publish(events);
        Ok(count)
    }

    /// Removes entries at the given positions, highest first, so earlier
    /// removals don't renumber positions still pending.
    fn remove_positions(&mut self, id: StemsMixId, mut positions: Vec<i64>) -> Result<usize> {
        positions.sort_unstable_by(|a, b| b.cmp(a));
        positions.dedup();

        let tx = self.db_manager.transaction().log_failed("begin remove")?;
        let kind = DbManager::stemsmix_kind(&tx, id)
            .log_failed("read stemsmix kind")?
            .unwrap_or(StemsMixKind::Unknown);
        let mut removed = Vec::with_capacity(positions.len());
        for position in positions {
            if let Some(track_id) = remove_position(&tx, id, position)? {
                removed.push((track_id, position));
            }
        }
        if removed.is_empty() {
            return Ok(0);
        }
        tx.commit().log_failed("commit remove")?;

        let mut events = Vec::with_capacity(removed.len() + 1);
        let count = removed.len();
        for (track_id, position) in removed {
            self.record_removal(id, kind, track_id, position, &mut events);
        }
        events.push(StemsMixEvent::TracksChanged(single(id)));
        self.publish(events);
        Ok(count)
    }

    /// An empty position is a silent no-op.
    pub fn remove_at(&mut self, id: StemsMixId, position: i64) -> Result<()> {
        self.remove_positions(id, vec![position]).map(|_| ())
    }

    pub fn remove_many(&mut self, id: StemsMixId, positions: &[i64]) -> Result<usize> {
        self.remove_positions(id, positions.to_vec())
    }

    /// Removes every occurrence of the track.
    pub fn remove_by_track(&mut self, id: StemsMixId, track_id: TrackId) -> Result<usize> {
        let positions = DbManager::positions_of_track(self.db_manager.connection(), id, track_id)
            .log_failed("read track positions")?;
        self.remove_positions(id, positions)
    }

    /// Drops every entry at `from_position` and above.
    pub fn remove_from_tail(&mut self, id: StemsMixId, from_position: i64) -> Result<bool> {
        let tx = self.db_manager.transaction().log_failed("begin truncate")?;
        let removed = DbManager::tracks_from_position(&tx, id, from_position)
            .log_failed("read tail tracks")?;
        DbManager::delete_tracks_from(&tx, id, from_position).log_failed("truncate stemsmix")?;
        tx.commit().log_failed("commit truncate")?;

        for (track_id, _) in removed {
            self.membership_index.remove(track_id, id);
        }
        self.publish([StemsMixEvent::TracksChanged(single(id))]);
        Ok(true)
    }

    /// Moves the entry at `old_position` to `new_position`, shifting the
    /// entries in between. Either all three steps are stored or none.
    pub fn move_track(&mut self, id: StemsMixId, old_position: i64, new_position: i64) -> Result<()> {
        if old_position == new_position {
            return Ok(());
        }

        let tx = self.db_manager.transaction().log_failed("begin move")?;
        let max_position =
            DbManager::max_track_position(&tx, id).log_failed("read max track position")?;
        let new_position = new_position.clamp(1, max_position.max(1));
        if old_position == new_position {
            return Ok(());
        }

        let parked = DbManager::set_track_position(&tx, id, old_position, MOVE_SENTINEL_POSITION)
            .log_failed("park moved track")?;
        if parked == 0 {
            debug!(
                "StemsMix: no track exists at position {} in stemsmix {}",
                old_position, id
            );
            return Ok(());
        }

        if new_position < old_position {
            DbManager::shift_positions(&tx, id, new_position, old_position - 1, 1)
                .log_failed("shift tracks down")?;
        } else {
            DbManager::shift_positions(&tx, id, old_position + 1, new_position, -1)
                .log_failed("shift tracks up")?;
        }
        DbManager::set_track_position(&tx, id, MOVE_SENTINEL_POSITION, new_position)
            .log_failed("place moved track")?;
        tx.commit().log_failed("commit move")?;

        self.publish([StemsMixEvent::TracksChanged(single(id))]);
        Ok(())
    }

    /// Appends the source's entries to the target in the same order, keeping
    /// their date added. The source is left untouched.
    pub fn copy_all(&mut self, source: StemsMixId, target: StemsMixId) -> Result<bool> {
        let tx = self.db_manager.transaction().log_failed("begin copy")?;
        let offset =
            DbManager::max_track_position(&tx, target).log_failed("read max track position")?;
        DbManager::copy_tracks(&tx, source, target, offset).log_failed("copy tracks")?;
        let copied = DbManager::tracks_from_position(&tx, target, offset + 1)
            .log_failed("read copied tracks")?;
        tx.commit().log_failed("commit copy")?;

        let mut events = Vec::with_capacity(copied.len() + 1);
        for (track_id, position) in copied {
            self.record_addition(target, track_id, position, &mut events);
        }
        events.push(StemsMixEvent::TracksChanged(single(target)));
        self.publish(events);
        Ok(true)
    }

    /// Removes entries whose track the catalog no longer knows.
    pub fn remove_hidden_tracks(
        &mut self,
        id: StemsMixId,
        catalog: &dyn TrackCatalog,
    ) -> Result<usize> {
        let positions: Vec<i64> = self
            .entries(id)?
            .into_iter()
            .filter(|entry| !catalog.is_available(entry.track_id))
            .map(|entry| entry.position)
            .collect();
        if positions.is_empty() {
            return Ok(0);
        }
        self.remove_positions(id, positions)
    }
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};

    use super::super::test_support::{changed, StemsMixHarness};
    use super::*;

    #[test]
    fn test_append_into_empty_collection_starts_at_one() {
        let mut harness = StemsMixHarness::new();
        let id = harness.create("A", StemsMixKind::Normal);
        harness.drain_events();

        let count = harness
            .manager
            .append(&[TrackId(11), TrackId(12), TrackId(13)], id)
            .unwrap();

        assert_eq!(count, 3);
        let entries = harness.manager.entries(id).unwrap();
        let placed: Vec<(i64, i64)> = entries
            .iter()
            .map(|entry| (entry.track_id.0, entry.position))
            .collect();
        assert_eq!(placed, vec![(11, 1), (12, 2), (13, 3)]);
        harness.assert_consistent(id);

        let events = harness.drain_events();
        assert_eq!(events.len(), 4);
        assert_eq!(
            events[2],
            StemsMixEvent::TrackAdded {
                stemsmix_id: id,
                track_id: TrackId(13),
                position: 3
            }
        );
        assert_eq!(events[3], changed(&[id]));
    }

    #[test]
    fn test_append_skips_invalid_ids_without_leaving_gaps() {
        let mut harness = StemsMixHarness::new();
        let id = harness.create_with_tracks("A", StemsMixKind::Normal, &[1]);

        let count = harness
            .manager
            .append(&[TrackId(2), TrackId::INVALID, TrackId(3)], id)
            .unwrap();

        assert_eq!(count, 2);
        assert_eq!(harness.track_order(id), vec![1, 2, 3]);
        harness.assert_consistent(id);
        let positions: Vec<i64> = harness
            .drain_events()
            .into_iter()
            .filter_map(|event| match event {
                StemsMixEvent::TrackAdded { position, .. } => Some(position),
                _ => None,
            })
            .collect();
        assert_eq!(positions, vec![2, 3]);
    }

    #[test]
    fn test_insert_at_zero_appends_at_end() {
        let mut harness = StemsMixHarness::new();
        let id = harness.create_with_tracks("A", StemsMixKind::Normal, &[1, 2, 3]);

        assert!(harness.manager.insert_at(TrackId(4), id, 0).unwrap());

        assert_eq!(harness.track_order(id), vec![1, 2, 3, 4]);
        harness.assert_consistent(id);
    }

    #[test]
    fn test_insert_at_shifts_following_and_clamps_past_end() {
        let mut harness = StemsMixHarness::new();
        let id = harness.create_with_tracks("A", StemsMixKind::Normal, &[1, 2, 3]);

        assert!(harness.manager.insert_at(TrackId(9), id, 2).unwrap());
        assert_eq!(harness.track_order(id), vec![1, 9, 2, 3]);
        assert!(harness.manager.insert_at(TrackId(8), id, 100).unwrap());
        assert_eq!(harness.track_order(id), vec![1, 9, 2, 3, 8]);
        harness.assert_consistent(id);

        let events = harness.drain_events();
        assert_eq!(
            events[0],
            StemsMixEvent::TrackAdded {
                stemsmix_id: id,
                track_id: TrackId(9),
                position: 2
            }
        );
        assert_eq!(
            events[2],
            StemsMixEvent::TrackAdded {
                stemsmix_id: id,
                track_id: TrackId(8),
                position: 5
            }
        );
    }

    #[test]
    fn test_insert_at_rejects_bad_arguments() {
        let mut harness = StemsMixHarness::new();
        let id = harness.create_with_tracks("A", StemsMixKind::Normal, &[1]);

        assert!(!harness.manager.insert_at(TrackId(2), -1, 1).unwrap());
        assert!(!harness.manager.insert_at(TrackId::INVALID, id, 1).unwrap());
        assert!(!harness.manager.insert_at(TrackId(2), id, -1).unwrap());

        assert_eq!(harness.track_order(id), vec![1]);
        assert!(harness.drain_events().is_empty());
    }

    #[test]
    fn test_insert_many_at_keeps_sequence_and_skips_invalid() {
        let mut harness = StemsMixHarness::new();
        let id = harness.create_with_tracks("A", StemsMixKind::Normal, &[1, 2, 3]);

        let inserted = harness
            .manager
            .insert_many_at(&[TrackId(7), TrackId::INVALID, TrackId(8)], id, 2)
            .unwrap();

        assert_eq!(inserted, 2);
        assert_eq!(harness.track_order(id), vec![1, 7, 8, 2, 3]);
        harness.assert_consistent(id);
        assert_eq!(harness.manager.insert_many_at(&[TrackId(5)], id, -2).unwrap(), 0);
    }

    #[test]
    fn test_remove_at_closes_gap_and_reports_former_position() {
        let mut harness = StemsMixHarness::new();
        let id = harness.create_with_tracks("A", StemsMixKind::Normal, &[10, 20, 30]);

        harness.manager.remove_at(id, 2).unwrap();

        assert_eq!(harness.track_order(id), vec![10, 30]);
        harness.assert_consistent(id);
        assert!(!harness.manager.contains_track(TrackId(20), id));
        assert_eq!(
            harness.drain_events(),
            vec![
                StemsMixEvent::TrackRemoved {
                    stemsmix_id: id,
                    track_id: TrackId(20),
                    position: 2
                },
                changed(&[id]),
            ]
        );
    }

    #[test]
    fn test_remove_at_empty_position_is_silent() {
        let mut harness = StemsMixHarness::new();
        let id = harness.create_with_tracks("A", StemsMixKind::Normal, &[10]);

        harness.manager.remove_at(id, 5).unwrap();

        assert_eq!(harness.track_order(id), vec![10]);
        assert!(harness.drain_events().is_empty());
    }

    #[test]
    fn test_remove_from_set_log_reports_history_removal() {
        let mut harness = StemsMixHarness::new();
        let id = harness.create_with_tracks("log", StemsMixKind::SetLog, &[10, 20]);

        harness.manager.remove_at(id, 1).unwrap();

        let events = harness.drain_events();
        assert!(events.contains(&StemsMixEvent::TracksRemovedFromPlayedHistory(
            BTreeSet::from([TrackId(10)])
        )));
    }

    #[test]
    fn test_remove_many_handles_unsorted_positions() {
        let mut harness = StemsMixHarness::new();
        let id = harness.create_with_tracks("A", StemsMixKind::Normal, &[1, 2, 3, 4, 5]);

        let removed = harness.manager.remove_many(id, &[2, 5, 4, 2]).unwrap();

        assert_eq!(removed, 3);
        assert_eq!(harness.track_order(id), vec![1, 3]);
        harness.assert_consistent(id);
        let events = harness.drain_events();
        assert_eq!(
            events.iter().filter(|event| matches!(event, StemsMixEvent::TracksChanged(_))).count(),
            1
        );
    }

    #[test]
    fn test_remove_by_track_removes_every_occurrence() {
        let mut harness = StemsMixHarness::new();
        let id = harness.create_with_tracks("A", StemsMixKind::Normal, &[4, 1, 4, 2, 4]);

        assert_eq!(harness.manager.remove_by_track(id, TrackId(4)).unwrap(), 3);

        assert_eq!(harness.track_order(id), vec![1, 2]);
        assert!(!harness.manager.contains_track(TrackId(4), id));
        harness.assert_consistent(id);
    }

    #[test]
    fn test_remove_from_tail_truncates() {
        let mut harness = StemsMixHarness::new();
        let id = harness.create_with_tracks("A", StemsMixKind::Normal, &[1, 2, 3, 4]);

        assert!(harness.manager.remove_from_tail(id, 2).unwrap());

        assert_eq!(harness.track_order(id), vec![1]);
        harness.assert_consistent(id);
        assert_eq!(harness.drain_events(), vec![changed(&[id])]);
    }

    #[test]
    fn test_move_forward_and_backward() {
        let mut harness = StemsMixHarness::new();
        let forward = harness.create_with_tracks("F", StemsMixKind::Normal, &[1, 2, 3]);
        let backward = harness.create_with_tracks("B", StemsMixKind::Normal, &[1, 2, 3]);

        harness.manager.move_track(forward, 1, 3).unwrap();
        harness.manager.move_track(backward, 3, 1).unwrap();

        assert_eq!(harness.track_order(forward), vec![2, 3, 1]);
        assert_eq!(harness.track_order(backward), vec![3, 1, 2]);
        harness.assert_consistent(forward);
        harness.assert_consistent(backward);
        assert_eq!(
            harness.drain_events(),
            vec![changed(&[forward]), changed(&[backward])]
        );
    }

    #[test]
    fn test_move_to_same_position_or_empty_source_is_noop() {
        let mut harness = StemsMixHarness::new();
        let id = harness.create_with_tracks("A", StemsMixKind::Normal, &[1, 2, 3]);

        harness.manager.move_track(id, 2, 2).unwrap();
        harness.manager.move_track(id, 7, 1).unwrap();

        assert_eq!(harness.track_order(id), vec![1, 2, 3]);
        assert!(harness.drain_events().is_empty());
    }

    #[test]
    fn test_move_past_end_is_clamped_to_last_position() {
        let mut harness = StemsMixHarness::new();
        let id = harness.create_with_tracks("A", StemsMixKind::Normal, &[1, 2, 3]);

        harness.manager.move_track(id, 1, 10).unwrap();

        assert_eq!(harness.track_order(id), vec![2, 3, 1]);
        harness.assert_consistent(id);
    }

    #[test]
    fn test_copy_all_appends_after_target_and_keeps_source() {
        let mut harness = StemsMixHarness::new();
        let source = harness.create_with_tracks("S", StemsMixKind::Normal, &[7, 8, 9]);
        let target = harness.create_with_tracks("T", StemsMixKind::Normal, &[1, 2]);
        let source_entries = harness.manager.entries(source).unwrap();

        assert!(harness.manager.copy_all(source, target).unwrap());

        assert_eq!(harness.track_order(target), vec![1, 2, 7, 8, 9]);
        assert_eq!(harness.manager.entries(source).unwrap(), source_entries);
        let copied = harness.manager.entries(target).unwrap();
        for (copy, original) in copied[2..].iter().zip(source_entries.iter()) {
            assert_eq!(copy.date_added, original.date_added);
        }
        assert!(harness.manager.contains_track(TrackId(8), target));
        harness.assert_consistent(target);

        let added: Vec<i64> = harness
            .drain_events()
            .into_iter()
            .filter_map(|event| match event {
                StemsMixEvent::TrackAdded { position, .. } => Some(position),
                _ => None,
            })
            .collect();
        assert_eq!(added, vec![3, 4, 5]);
    }

    struct KnownTracks(Vec<TrackId>);

    impl TrackCatalog for KnownTracks {
        fn track_location(&self, track_id: TrackId) -> Option<PathBuf> {
            self.0
                .contains(&track_id)
                .then(|| PathBuf::from(format!("/music/{}.flac", track_id)))
        }

        fn track_id_for_location(&self, _location: &Path) -> Option<TrackId> {
            None
        }
    }

    #[test]
    fn test_remove_hidden_tracks_drops_unknown_tracks() {
        let mut harness = StemsMixHarness::new();
        let id = harness.create_with_tracks("A", StemsMixKind::Normal, &[1, 2, 3, 2]);

        let removed = harness
            .manager
            .remove_hidden_tracks(id, &KnownTracks(vec![TrackId(1), TrackId(3)]))
            .unwrap();

        assert_eq!(removed, 2);
        assert_eq!(harness.track_order(id), vec![1, 3]);
        harness.assert_consistent(id);
    }

    #[test]
    fn test_density_holds_across_mixed_edits() {
        let mut harness = StemsMixHarness::new();
        let id = harness.create("A", StemsMixKind::Normal);

        harness
            .manager
            .append(&[TrackId(1), TrackId(2), TrackId(3)], id)
            .unwrap();
        harness.assert_consistent(id);
        harness.manager.insert_at(TrackId(4), id, 1).unwrap();
        harness.assert_consistent(id);
        harness.manager.remove_at(id, 3).unwrap();
        harness.assert_consistent(id);
        harness.manager.move_track(id, 3, 1).unwrap();
        harness.assert_consistent(id);
        harness
            .manager
            .insert_many_at(&[TrackId(5), TrackId(6)], id, 3)
            .unwrap();
        harness.assert_consistent(id);
        harness.manager.remove_many(id, &[1, 5]).unwrap();
        harness.assert_consistent(id);

        // [4,1,3] -> move -> [3,4,1] -> insert -> [3,4,5,6,1] -> remove 1 and 5
        assert_eq!(harness.track_order(id), vec![4, 5, 6]);
    }

    /// Makes storage reject every row holding track 666.
    fn reject_track_666(harness: &StemsMixHarness) {
        harness
            .manager
            .db_manager
            .connection()
            .execute_batch(
                "CREATE TRIGGER reject_track_666 BEFORE INSERT ON StemsMixTracks
                 WHEN NEW.track_id = 666
                 BEGIN SELECT RAISE(ABORT, 'track rejected'); END;",
            )
            .unwrap();
    }

    fn added_positions(events: &[StemsMixEvent]) -> Vec<(i64, i64)> {
        events
            .iter()
            .filter_map(|event| match event {
                StemsMixEvent::TrackAdded {
                    track_id, position, ..
                } => Some((track_id.0, *position)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_append_row_failure_does_not_use_up_a_position() {
        let mut harness = StemsMixHarness::new();
        let id = harness.create_with_tracks("A", StemsMixKind::Normal, &[1]);
        reject_track_666(&harness);

        let count = harness
            .manager
            .append(&[TrackId(2), TrackId(666), TrackId(3)], id)
            .unwrap();

        assert_eq!(count, 2);
        assert_eq!(harness.track_order(id), vec![1, 2, 3]);
        assert!(!harness.manager.contains_track(TrackId(666), id));
        harness.assert_consistent(id);
        let events = harness.drain_events();
        assert_eq!(added_positions(&events), vec![(2, 2), (3, 3)]);
        assert_eq!(events.last(), Some(&changed(&[id])));
    }

    #[test]
    fn test_insert_many_row_failure_rolls_back_its_shift() {
        let mut harness = StemsMixHarness::new();
        let id = harness.create_with_tracks("A", StemsMixKind::Normal, &[1, 2, 3]);
        reject_track_666(&harness);

        let count = harness
            .manager
            .insert_many_at(&[TrackId(7), TrackId(666), TrackId(8)], id, 1)
            .unwrap();

        assert_eq!(count, 2);
        assert_eq!(harness.track_order(id), vec![7, 8, 1, 2, 3]);
        harness.assert_consistent(id);
        assert_eq!(
            added_positions(&harness.drain_events()),
            vec![(7, 1), (8, 2)]
        );
    }

    #[test]
    fn test_move_failing_on_last_step_leaves_order_untouched() {
        let mut harness = StemsMixHarness::new();
        let id = harness.create_with_tracks("A", StemsMixKind::Normal, &[1, 2, 3]);
        // Only the final placement moves a row away from the parking spot.
        harness
            .manager
            .db_manager
            .connection()
            .execute_batch(&format!(
                "CREATE TRIGGER reject_placement BEFORE UPDATE OF position ON StemsMixTracks
                 WHEN OLD.position = {}
                 BEGIN SELECT RAISE(ABORT, 'placement rejected'); END;",
                MOVE_SENTINEL_POSITION
            ))
            .unwrap();

        assert!(harness.manager.move_track(id, 1, 3).is_err());

        assert_eq!(harness.track_order(id), vec![1, 2, 3]);
        harness.assert_consistent(id);
        assert!(harness.drain_events().is_empty());
    }
}
