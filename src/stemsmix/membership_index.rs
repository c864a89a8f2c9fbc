//! Reverse lookup from a track to the StemsMixes that contain it.

use std::collections::{BTreeSet, HashMap};

use crate::protocol::{StemsMixId, TrackId};

/// Cache of the `(track_id, stemsmix_id)` pairs stored in `StemsMixTracks`.
///
/// A track may sit at several positions of one collection, so each pair
/// carries the number of rows it stands for. The pair disappears when its
/// last row is removed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TrackMembershipIndex {
    entries: HashMap<TrackId, HashMap<StemsMixId, usize>>,
}

impl TrackMembershipIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole cache with the given membership rows.
    pub fn rebuild<I>(&mut self, rows: I)
    where
        I: IntoIterator<Item = (TrackId, StemsMixId)>,
    {
        self.entries.clear();
        for (track_id, stemsmix_id) in rows {
            self.insert(track_id, stemsmix_id);
        }
    }

    pub fn insert(&mut self, track_id: TrackId, stemsmix_id: StemsMixId) {
        *self
            .entries
            .entry(track_id)
            .or_default()
            .entry(stemsmix_id)
            .or_insert(0) += 1;
    }

    /// Drops one row of the pair. Returns false if the pair was not cached.
    pub fn remove(&mut self, track_id: TrackId, stemsmix_id: StemsMixId) -> bool {
        let Some(collections) = self.entries.get_mut(&track_id) else {
            return false;
        };
        let Some(count) = collections.get_mut(&stemsmix_id) else {
            return false;
        };
        *count -= 1;
        if *count == 0 {
            collections.remove(&stemsmix_id);
            if collections.is_empty() {
                self.entries.remove(&track_id);
            }
        }
        true
    }

    /// Drops every pair pointing at `stemsmix_id`.
    pub fn purge_collection(&mut self, stemsmix_id: StemsMixId) {
        self.entries.retain(|_, collections| {
            collections.remove(&stemsmix_id);
            !collections.is_empty()
        });
    }

    pub fn contains(&self, track_id: TrackId, stemsmix_id: StemsMixId) -> bool {
        self.entries
            .get(&track_id)
            .is_some_and(|collections| collections.contains_key(&stemsmix_id))
    }

    pub fn collections_containing(&self, track_id: TrackId) -> BTreeSet<StemsMixId> {
        self.entries
            .get(&track_id)
            .map(|collections| collections.keys().copied().collect())
            .unwrap_or_default()
    }
}
