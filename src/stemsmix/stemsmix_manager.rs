//! Registry of named StemsMixes.
//!
//! This component owns the storage backend and the reverse membership cache,
//! and publishes every committed change on the event bus.

use std::collections::{BTreeSet, HashSet};

use log::{debug, info, trace, warn};
use tokio::sync::broadcast::Sender;

use super::{LogFailedQuery, TrackMembershipIndex};
use crate::db_manager::DbManager;
use crate::error::{Result, StemsMixError};
use crate::protocol::{
    StemsMixEntry, StemsMixEvent, StemsMixId, StemsMixInfo, StemsMixKind, TrackId,
    AUTO_DJ_STEMSMIX_NAME,
};

/// Creates, renames, locks and deletes StemsMixes and edits their track lists.
pub struct StemsMixManager {
    pub(super) db_manager: DbManager,
    pub(super) membership_index: TrackMembershipIndex,
    pub(super) bus_producer: Sender<StemsMixEvent>,
    pub(super) auto_dj_next_track_loaded: bool,
}

impl StemsMixManager {
    /// Creates a manager bound to the bus and storage backend and fills the
    /// membership cache from storage.
    pub fn new(db_manager: DbManager, bus_producer: Sender<StemsMixEvent>) -> Result<Self> {
        let mut manager = Self {
            db_manager,
            membership_index: TrackMembershipIndex::new(),
            bus_producer,
            auto_dj_next_track_loaded: false,
        };
        manager.rebuild_membership_index()?;
        Ok(manager)
    }

    pub(super) fn publish<I>(&self, events: I)
    where
        I: IntoIterator<Item = StemsMixEvent>,
    {
        for event in events {
            trace!("StemsMix: publishing {:?}", event);
            // No subscribers is not an error.
            let _ = self.bus_producer.send(event);
        }
    }

    /// Discards the membership cache and reloads it from `StemsMixTracks`.
    pub fn rebuild_membership_index(&mut self) -> Result<()> {
        let rows = DbManager::membership_rows(self.db_manager.connection())
            .log_failed("load membership rows")?;
        debug!("StemsMix: rebuilding membership index from {} rows", rows.len());
        self.membership_index.rebuild(rows);
        Ok(())
    }

    /// Compares the incrementally maintained cache with a fresh rebuild.
    pub fn verify_membership_index(&self) -> Result<bool> {
        let rows = DbManager::membership_rows(self.db_manager.connection())
            .log_failed("load membership rows")?;
        let mut fresh = TrackMembershipIndex::new();
        fresh.rebuild(rows);
        Ok(fresh == self.membership_index)
    }

    // ---- Registry -----------------------------------------------------

    pub fn create(&mut self, name: &str, kind: StemsMixKind) -> Result<StemsMixId> {
        let tx = self.db_manager.transaction().log_failed("begin create")?;
        let position =
            DbManager::max_stemsmix_position(&tx).log_failed("read max stemsmix position")? + 1;
        let id = DbManager::insert_stemsmix(&tx, name, position, kind)
            .log_failed("insert stemsmix")?;
        tx.commit().log_failed("commit create")?;

        debug!("StemsMix: created '{}' ({:?}) as {} at {}", name, kind, id, position);
        self.publish([StemsMixEvent::Added(id)]);
        Ok(id)
    }

    /// Creates a collection, appending `(n)` to the name while it is taken.
    /// Returns the new id and the name it was stored under.
    pub fn create_unique(&mut self, name: &str, kind: StemsMixKind) -> Result<(StemsMixId, String)> {
        let mut unique_name = name.to_string();
        if self.id_from_name(name)?.is_some() {
            let mut suffix = 2;
            loop {
                let candidate = format!("{}({})", name, suffix);
                if self.id_from_name(&candidate)?.is_none() {
                    unique_name = candidate;
                    break;
                }
                suffix += 1;
            }
        }
        let id = self.create(&unique_name, kind)?;
        Ok((id, unique_name))
    }

    /// Copies `source` into a new normal collection named after `name`,
    /// numbered like `create_unique` when taken.
    pub fn duplicate(&mut self, source: StemsMixId, name: &str) -> Result<(StemsMixId, String)> {
        if self.name(source)?.is_none() {
            return Err(StemsMixError::NotFound(source));
        }
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(StemsMixError::InvalidName {
                name: name.to_string(),
                reason: "name is blank",
            });
        }
        let (id, final_name) = self.create_unique(trimmed, StemsMixKind::Normal)?;
        self.copy_all(source, id)?;
        info!("StemsMix: duplicated {} as '{}' ({})", source, final_name, id);
        Ok((id, final_name))
    }

    /// Checks a new name for `id` before `rename`. Blank names, names held
    /// by another collection and the Auto DJ name are refused, and the queue
    /// itself keeps its name. Returns the trimmed name.
    pub fn check_rename(&self, id: StemsMixId, new_name: &str) -> Result<String> {
        let kind = DbManager::stemsmix_kind(self.db_manager.connection(), id)
            .log_failed("read stemsmix kind")?
            .ok_or(StemsMixError::NotFound(id))?;
        let invalid = |reason| StemsMixError::InvalidName {
            name: new_name.to_string(),
            reason,
        };
        if kind == StemsMixKind::AutoDjQueue {
            return Err(invalid("the Auto DJ queue cannot be renamed"));
        }
        let trimmed = new_name.trim();
        if trimmed.is_empty() {
            return Err(invalid("name is blank"));
        }
        if trimmed == AUTO_DJ_STEMSMIX_NAME {
            return Err(invalid("name is reserved for the Auto DJ queue"));
        }
        match self.id_from_name(trimmed)? {
            Some(other) if other != id => Err(invalid("name is already taken")),
            _ => Ok(trimmed.to_string()),
        }
    }

    /// Renames without looking at the lock or the name; callers run
    /// `is_locked` and `check_rename` first.
    pub fn rename(&mut self, id: StemsMixId, new_name: &str) -> Result<()> {
        let conn = self.db_manager.connection();
        if DbManager::stemsmix_name(conn, id)
            .log_failed("read stemsmix name")?
            .is_some_and(|current| current == new_name)
        {
            debug!("StemsMix: {} is already named '{}'", id, new_name);
            return Ok(());
        }
        DbManager::rename_stemsmix(conn, id, new_name).log_failed("rename stemsmix")?;
        self.publish([StemsMixEvent::Renamed {
            id,
            name: new_name.to_string(),
        }]);
        Ok(())
    }

    /// Returns false when the update could not be stored.
    pub fn set_locked(&mut self, id: StemsMixId, locked: bool) -> bool {
        let result = DbManager::set_stemsmix_locked(self.db_manager.connection(), id, locked)
            .log_failed("update stemsmix lock");
        if result.is_err() {
            return false;
        }
        self.publish([StemsMixEvent::LockChanged(id)]);
        true
    }

    pub fn delete(&mut self, id: StemsMixId) -> Result<()> {
        let tx = self.db_manager.transaction().log_failed("begin delete")?;
        let Some(kind) = DbManager::stemsmix_kind(&tx, id).log_failed("read stemsmix kind")? else {
            debug!("StemsMix: delete of unknown stemsmix {} ignored", id);
            return Ok(());
        };

        let mut played_track_ids = Vec::new();
        let mut other_set_logs = HashSet::new();
        if kind == StemsMixKind::SetLog {
            played_track_ids =
                DbManager::distinct_track_ids(&tx, id).log_failed("read set log tracks")?;
            other_set_logs = DbManager::stemsmix_ids_of_kind(&tx, StemsMixKind::SetLog)
                .log_failed("read set logs")?
                .into_iter()
                .filter(|log_id| *log_id != id)
                .collect();
        }

        DbManager::delete_stemsmix_row(&tx, id).log_failed("delete stemsmix")?;
        DbManager::delete_stemsmix_tracks(&tx, id).log_failed("delete stemsmix tracks")?;
        tx.commit().log_failed("commit delete")?;

        self.membership_index.purge_collection(id);

        let mut events = vec![StemsMixEvent::Deleted(id)];
        let dropped = self.tracks_dropped_from_history(&played_track_ids, &other_set_logs);
        if !dropped.is_empty() {
            events.push(StemsMixEvent::TracksRemovedFromPlayedHistory(dropped));
        }
        self.publish(events);
        Ok(())
    }

    /// Tracks that no remaining set log contains anymore.
    fn tracks_dropped_from_history(
        &self,
        played_track_ids: &[TrackId],
        remaining_set_logs: &HashSet<StemsMixId>,
    ) -> BTreeSet<TrackId> {
        played_track_ids
            .iter()
            .copied()
            .filter(|track_id| {
                !self
                    .membership_index
                    .collections_containing(*track_id)
                    .iter()
                    .any(|stemsmix_id| remaining_set_logs.contains(stemsmix_id))
            })
            .collect()
    }

    /// Deletes every unlocked collection of `kind` with fewer than
    /// `min_tracks` entries and returns how many went away.
    pub fn delete_all_unlocked_below_threshold(
        &mut self,
        kind: StemsMixKind,
        min_tracks: i64,
    ) -> Result<usize> {
        if min_tracks <= 0 {
            warn!(
                "StemsMix: refusing bulk delete with non-positive threshold {}",
                min_tracks
            );
            return Ok(0);
        }

        let tx = self.db_manager.transaction().log_failed("begin bulk delete")?;
        let ids = DbManager::unlocked_stemsmix_ids_with_fewer_tracks(&tx, kind, min_tracks)
            .log_failed("find short stemsmixes")?;
        if ids.is_empty() {
            return Ok(0);
        }

        info!(
            "StemsMix: deleting {} stemsmixes of kind {:?} that contain fewer than {} tracks",
            ids.len(),
            kind,
            min_tracks
        );

        let mut played_track_ids = Vec::new();
        let mut remaining_set_logs = HashSet::new();
        if kind == StemsMixKind::SetLog {
            for id in &ids {
                played_track_ids.extend(
                    DbManager::distinct_track_ids(&tx, *id).log_failed("read set log tracks")?,
                );
            }
            remaining_set_logs = DbManager::stemsmix_ids_of_kind(&tx, StemsMixKind::SetLog)
                .log_failed("read set logs")?
                .into_iter()
                .filter(|log_id| !ids.contains(log_id))
                .collect();
        }

        for id in &ids {
            DbManager::delete_stemsmix_tracks(&tx, *id).log_failed("delete stemsmix tracks")?;
            DbManager::delete_stemsmix_row(&tx, *id).log_failed("delete stemsmix")?;
        }
        tx.commit().log_failed("commit bulk delete")?;

        let mut events = Vec::with_capacity(ids.len() + 1);
        for id in &ids {
            self.membership_index.purge_collection(*id);
            events.push(StemsMixEvent::Deleted(*id));
        }
        let dropped = self.tracks_dropped_from_history(&played_track_ids, &remaining_set_logs);
        if !dropped.is_empty() {
            events.push(StemsMixEvent::TracksRemovedFromPlayedHistory(dropped));
        }
        self.publish(events);
        Ok(ids.len())
    }

    /// Removes the tracks from every collection except set logs, which keep
    /// their history.
    pub fn purge_tracks(&mut self, track_ids: &[TrackId]) -> Result<()> {
        let set_logs: HashSet<StemsMixId> =
            DbManager::stemsmix_ids_of_kind(self.db_manager.connection(), StemsMixKind::SetLog)
                .log_failed("read set logs")?
                .into_iter()
                .collect();

        let mut targets = Vec::new();
        for track_id in track_ids {
            for stemsmix_id in self.membership_index.collections_containing(*track_id) {
                if !set_logs.contains(&stemsmix_id) {
                    targets.push((*track_id, stemsmix_id));
                }
            }
        }
        if targets.is_empty() {
            return Ok(());
        }

        let tx = self.db_manager.transaction().log_failed("begin purge")?;
        let mut removed = Vec::new();
        for (track_id, stemsmix_id) in &targets {
            for position in DbManager::positions_of_track(&tx, *stemsmix_id, *track_id)
                .log_failed("read track positions")?
            {
                if let Some(removed_track) =
                    super::track_ordering::remove_position(&tx, *stemsmix_id, position)?
                {
                    removed.push((*stemsmix_id, removed_track, position));
                }
            }
        }
        tx.commit().log_failed("commit purge")?;

        let mut events = Vec::new();
        let mut affected = BTreeSet::new();
        for (stemsmix_id, track_id, position) in removed {
            self.record_removal(stemsmix_id, StemsMixKind::Normal, track_id, position, &mut events);
            affected.insert(stemsmix_id);
        }
        events.push(StemsMixEvent::TracksChanged(affected));
        self.publish(events);
        Ok(())
    }

    // ---- Queries ------------------------------------------------------

    pub fn count(&self) -> Result<usize> {
        DbManager::stemsmix_count(self.db_manager.connection()).log_failed("count stemsmixes")
    }

    pub fn name(&self, id: StemsMixId) -> Result<Option<String>> {
        DbManager::stemsmix_name(self.db_manager.connection(), id).log_failed("read stemsmix name")
    }

    pub fn id_from_name(&self, name: &str) -> Result<Option<StemsMixId>> {
        DbManager::stemsmix_id_from_name(self.db_manager.connection(), name)
            .log_failed("find stemsmix by name")
    }

    /// Id at `index` in natural table order, not display order.
    pub fn id_at_index(&self, index: usize) -> Result<Option<StemsMixId>> {
        DbManager::stemsmix_id_at_index(self.db_manager.connection(), index)
            .log_failed("find stemsmix by index")
    }

    pub fn kind(&self, id: StemsMixId) -> Result<StemsMixKind> {
        let kind = DbManager::stemsmix_kind(self.db_manager.connection(), id)
            .log_failed("read stemsmix kind")?;
        if kind.is_none() {
            debug!("StemsMix: kind of unknown stemsmix {} requested", id);
        }
        Ok(kind.unwrap_or(StemsMixKind::Unknown))
    }

    pub fn is_hidden(&self, id: StemsMixId) -> Result<bool> {
        Ok(self.kind(id)? != StemsMixKind::Normal)
    }

    pub fn is_locked(&self, id: StemsMixId) -> Result<bool> {
        Ok(DbManager::stemsmix_locked(self.db_manager.connection(), id)
            .log_failed("read stemsmix lock")?
            .unwrap_or(false))
    }

    pub fn list(&self) -> Result<Vec<StemsMixInfo>> {
        DbManager::list_stemsmixes(self.db_manager.connection()).log_failed("list stemsmixes")
    }

    /// Distinct track ids of the collection.
    pub fn track_ids(&self, id: StemsMixId) -> Result<Vec<TrackId>> {
        DbManager::distinct_track_ids(self.db_manager.connection(), id)
            .log_failed("read stemsmix track ids")
    }

    pub fn ordered_track_ids(&self, id: StemsMixId) -> Result<Vec<TrackId>> {
        DbManager::ordered_track_ids(self.db_manager.connection(), id)
            .log_failed("read stemsmix track order")
    }

    pub fn entries(&self, id: StemsMixId) -> Result<Vec<StemsMixEntry>> {
        DbManager::entries(self.db_manager.connection(), id).log_failed("read stemsmix entries")
    }

    pub fn tracks_in(&self, id: StemsMixId) -> Result<usize> {
        DbManager::track_count(self.db_manager.connection(), id).log_failed("count stemsmix tracks")
    }

    pub fn max_position(&self, id: StemsMixId) -> Result<i64> {
        DbManager::max_track_position(self.db_manager.connection(), id)
            .log_failed("read max track position")
    }

    /// The closest collection of `kind` created before `current`.
    pub fn previous(&self, current: StemsMixId, kind: StemsMixKind) -> Result<Option<StemsMixId>> {
        DbManager::previous_stemsmix_id(self.db_manager.connection(), current, kind)
            .log_failed("find previous stemsmix")
    }

    pub fn contains_track(&self, track_id: TrackId, id: StemsMixId) -> bool {
        self.membership_index.contains(track_id, id)
    }

    pub fn collections_containing(&self, track_id: TrackId) -> BTreeSet<StemsMixId> {
        self.membership_index.collections_containing(track_id)
    }
}
