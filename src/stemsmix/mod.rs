//! StemsMix registry, track ordering and reverse membership cache.

mod auto_dj_queue;
mod import_export;
mod membership_index;
mod stemsmix_manager;
mod track_ordering;

pub use membership_index::TrackMembershipIndex;
pub use stemsmix_manager::StemsMixManager;

use log::error;

use crate::error::{Result, StemsMixError};

/// Logs a failed statement with its context before handing the error on.
trait LogFailedQuery<T> {
    fn log_failed(self, context: &str) -> Result<T>;
}

impl<T> LogFailedQuery<T> for std::result::Result<T, rusqlite::Error> {
    fn log_failed(self, context: &str) -> Result<T> {
        self.map_err(|err| {
            error!("StemsMix: {} failed: {}", context, err);
            StemsMixError::Database(err)
        })
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::BTreeSet;

    use tokio::sync::broadcast::{self, error::TryRecvError, Receiver};

    use super::StemsMixManager;
    use crate::db_manager::DbManager;
    use crate::protocol::{StemsMixEvent, StemsMixId, StemsMixKind, TrackId};

    pub struct StemsMixHarness {
        pub manager: StemsMixManager,
        pub receiver: Receiver<StemsMixEvent>,
    }

    impl StemsMixHarness {
        pub fn new() -> Self {
            let (bus_sender, receiver) = broadcast::channel(4096);
            let db_manager = DbManager::new_in_memory().expect("failed to create in-memory db");
            let manager =
                StemsMixManager::new(db_manager, bus_sender).expect("failed to create manager");
            Self { manager, receiver }
        }

        pub fn create(&mut self, name: &str, kind: StemsMixKind) -> StemsMixId {
            self.manager
                .create(name, kind)
                .expect("failed to create stemsmix")
        }

        /// Creates a collection holding `track_ids` in order.
        pub fn create_with_tracks(
            &mut self,
            name: &str,
            kind: StemsMixKind,
            track_ids: &[i64],
        ) -> StemsMixId {
            let id = self.create(name, kind);
            let tracks: Vec<TrackId> = track_ids.iter().copied().map(TrackId).collect();
            self.manager
                .append(&tracks, id)
                .expect("failed to append tracks");
            self.drain_events();
            id
        }

        /// Track ids of the collection in position order.
        pub fn track_order(&self, id: StemsMixId) -> Vec<i64> {
            self.manager
                .ordered_track_ids(id)
                .expect("failed to load track order")
                .into_iter()
                .map(|track_id| track_id.0)
                .collect()
        }

        /// Checks the dense position invariant and the cache against storage.
        pub fn assert_consistent(&self, id: StemsMixId) {
            let positions: Vec<i64> = self
                .manager
                .entries(id)
                .expect("failed to load entries")
                .into_iter()
                .map(|entry| entry.position)
                .collect();
            let expected: Vec<i64> = (1..=positions.len() as i64).collect();
            assert_eq!(positions, expected, "positions of {} are not dense", id);
            assert!(
                self.manager
                    .verify_membership_index()
                    .expect("failed to verify membership index"),
                "membership index diverged from storage"
            );
        }

        pub fn drain_events(&mut self) -> Vec<StemsMixEvent> {
            let mut events = Vec::new();
            loop {
                match self.receiver.try_recv() {
                    Ok(event) => events.push(event),
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Lagged(_)) => continue,
                    Err(TryRecvError::Closed) => break,
                }
            }
            events
        }
    }

    pub fn changed(ids: &[StemsMixId]) -> StemsMixEvent {
        StemsMixEvent::TracksChanged(ids.iter().copied().collect::<BTreeSet<_>>())
    }
}
