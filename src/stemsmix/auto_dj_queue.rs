//! Feeding tracks into the Auto DJ queue collection.

use log::{debug, warn};

use super::StemsMixManager;
use crate::error::{Result, StemsMixError};
use crate::protocol::{AutoDjSendLoc, StemsMixId, StemsMixKind, TrackId, AUTO_DJ_STEMSMIX_NAME};

impl StemsMixManager {
    /// Returns the queue collection, creating it on first use.
    pub fn ensure_auto_dj_queue(&mut self) -> Result<StemsMixId> {
        if let Some(id) = self.id_from_name(AUTO_DJ_STEMSMIX_NAME)? {
            return Ok(id);
        }
        self.create(AUTO_DJ_STEMSMIX_NAME, StemsMixKind::AutoDjQueue)
    }

    /// Whether the first queue entry is already loaded to a deck. While it
    /// is, queue edits keep that entry in place.
    pub fn set_auto_dj_next_track_loaded(&mut self, loaded: bool) {
        self.auto_dj_next_track_loaded = loaded;
    }

    fn auto_dj_edit_start(&self) -> i64 {
        if self.auto_dj_next_track_loaded {
            2
        } else {
            1
        }
    }

    /// Sends tracks to the queue. Returns how many were queued; 0 when no
    /// queue exists.
    pub fn add_tracks_to_auto_dj_queue(
        &mut self,
        track_ids: &[TrackId],
        loc: AutoDjSendLoc,
    ) -> Result<usize> {
        let Some(queue_id) = self.id_from_name(AUTO_DJ_STEMSMIX_NAME)? else {
            debug!("StemsMix: no Auto DJ queue, dropping {} tracks", track_ids.len());
            return Ok(0);
        };
        if self.is_locked(queue_id)? {
            warn!("StemsMix: Auto DJ queue {} is locked", queue_id);
            return Err(StemsMixError::Locked(queue_id));
        }

        let start = self.auto_dj_edit_start();
        match loc {
            AutoDjSendLoc::Top => self.insert_many_at(track_ids, queue_id, start),
            AutoDjSendLoc::Bottom => self.append(track_ids, queue_id),
            AutoDjSendLoc::Replace => {
                self.remove_from_tail(queue_id, start)?;
                self.append(track_ids, queue_id)
            }
        }
    }

    /// Sends a collection's tracks to the queue in their stored order.
    pub fn add_stemsmix_to_auto_dj_queue(
        &mut self,
        id: StemsMixId,
        loc: AutoDjSendLoc,
    ) -> Result<usize> {
        let track_ids = self.ordered_track_ids(id)?;
        self.add_tracks_to_auto_dj_queue(&track_ids, loc)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::StemsMixHarness;
    use super::*;

    fn tracks(ids: &[i64]) -> Vec<TrackId> {
        ids.iter().copied().map(TrackId).collect()
    }

    #[test]
    fn test_ensure_auto_dj_queue_is_idempotent() {
        let mut harness = StemsMixHarness::new();
        let first = harness.manager.ensure_auto_dj_queue().unwrap();
        let second = harness.manager.ensure_auto_dj_queue().unwrap();
        assert_eq!(first, second);
        assert_eq!(
            harness.manager.kind(first).unwrap(),
            StemsMixKind::AutoDjQueue
        );
    }

    #[test]
    fn test_without_queue_nothing_is_sent() {
        let mut harness = StemsMixHarness::new();
        assert_eq!(
            harness
                .manager
                .add_tracks_to_auto_dj_queue(&tracks(&[1]), AutoDjSendLoc::Bottom)
                .unwrap(),
            0
        );
    }

    #[test]
    fn test_top_inserts_below_loaded_track() {
        let mut harness = StemsMixHarness::new();
        let queue = harness.manager.ensure_auto_dj_queue().unwrap();
        harness.manager.append(&tracks(&[1, 2]), queue).unwrap();
        harness.manager.set_auto_dj_next_track_loaded(true);

        harness
            .manager
            .add_tracks_to_auto_dj_queue(&tracks(&[8, 9]), AutoDjSendLoc::Top)
            .unwrap();

        assert_eq!(harness.track_order(queue), vec![1, 8, 9, 2]);
        harness.assert_consistent(queue);
    }

    #[test]
    fn test_top_without_loaded_track_inserts_first() {
        let mut harness = StemsMixHarness::new();
        let queue = harness.manager.ensure_auto_dj_queue().unwrap();
        harness.manager.append(&tracks(&[1, 2]), queue).unwrap();

        harness
            .manager
            .add_tracks_to_auto_dj_queue(&tracks(&[8]), AutoDjSendLoc::Top)
            .unwrap();

        assert_eq!(harness.track_order(queue), vec![8, 1, 2]);
    }

    #[test]
    fn test_replace_keeps_loaded_track() {
        let mut harness = StemsMixHarness::new();
        let queue = harness.manager.ensure_auto_dj_queue().unwrap();
        harness.manager.append(&tracks(&[1, 2, 3]), queue).unwrap();
        harness.manager.set_auto_dj_next_track_loaded(true);

        harness
            .manager
            .add_tracks_to_auto_dj_queue(&tracks(&[7]), AutoDjSendLoc::Replace)
            .unwrap();

        assert_eq!(harness.track_order(queue), vec![1, 7]);
        harness.assert_consistent(queue);
    }

    #[test]
    fn test_stemsmix_goes_to_bottom_in_order() {
        let mut harness = StemsMixHarness::new();
        let queue = harness.manager.ensure_auto_dj_queue().unwrap();
        harness.manager.append(&tracks(&[1]), queue).unwrap();
        let set = harness.create_with_tracks("Set", StemsMixKind::Normal, &[5, 4, 6]);
        harness.manager.move_track(set, 3, 1).unwrap();

        harness
            .manager
            .add_stemsmix_to_auto_dj_queue(set, AutoDjSendLoc::Bottom)
            .unwrap();

        assert_eq!(harness.track_order(queue), vec![1, 6, 5, 4]);
    }

    #[test]
    fn test_locked_queue_is_refused() {
        let mut harness = StemsMixHarness::new();
        let queue = harness.manager.ensure_auto_dj_queue().unwrap();
        harness.manager.set_locked(queue, true);

        let result = harness
            .manager
            .add_tracks_to_auto_dj_queue(&tracks(&[1]), AutoDjSendLoc::Bottom);

        assert!(matches!(result, Err(StemsMixError::Locked(id)) if id == queue));
        assert_eq!(harness.manager.tracks_in(queue).unwrap(), 0);
    }
}
