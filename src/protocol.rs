//! Event-bus protocol shared by the store and its subscribers.
//!
//! This module defines the identifiers, collection kinds and notification
//! payloads published whenever a StemsMix or its track list changes.

use std::collections::BTreeSet;
use std::fmt;

/// Row id of a StemsMix in the `StemsMixs` table.
pub type StemsMixId = i64;

/// Name of the collection that backs the Auto DJ queue.
pub const AUTO_DJ_STEMSMIX_NAME: &str = "Auto DJ";

/// Identifier of a library track.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Deserialize, serde::Serialize,
)]
#[serde(transparent)]
pub struct TrackId(pub i64);

impl TrackId {
    pub const INVALID: TrackId = TrackId(-1);

    pub fn is_valid(self) -> bool {
        self.0 >= 0
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for TrackId {
    fn from(value: i64) -> Self {
        TrackId(value)
    }
}

/// Role of a StemsMix, persisted in the `hidden` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StemsMixKind {
    Normal,      // User-visible collection
    AutoDjQueue, // Backing list of the Auto DJ queue
    SetLog,      // Play history of a session
    Unknown,     // Missing row or unrecognized value
}

impl StemsMixKind {
    pub fn to_db(self) -> i64 {
        match self {
            StemsMixKind::Normal => 0,
            StemsMixKind::AutoDjQueue => 1,
            StemsMixKind::SetLog => 2,
            StemsMixKind::Unknown => -1,
        }
    }

    pub fn from_db(value: i64) -> Self {
        match value {
            0 => StemsMixKind::Normal,
            1 => StemsMixKind::AutoDjQueue,
            2 => StemsMixKind::SetLog,
            _ => StemsMixKind::Unknown,
        }
    }
}

/// Where tracks sent to the Auto DJ queue end up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoDjSendLoc {
    Top,
    Bottom,
    Replace,
}

/// Summary row of a StemsMix.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct StemsMixInfo {
    pub id: StemsMixId,
    pub name: String,
    pub position: i64,
    pub kind: StemsMixKind,
    pub locked: bool,
    pub date_created: String,
    pub date_modified: String,
}

/// One row of a StemsMix track list.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct StemsMixEntry {
    pub track_id: TrackId,
    pub position: i64,
    /// `pl_datetime_added` as stored by SQLite.
    pub date_added: String,
}

/// Notifications published by the store.
///
/// Delivery is synchronous: every event is on the bus before the publishing
/// call returns, in the order the mutations happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StemsMixEvent {
    Added(StemsMixId),
    Deleted(StemsMixId),
    Renamed {
        id: StemsMixId,
        name: String,
    },
    LockChanged(StemsMixId),
    TrackAdded {
        stemsmix_id: StemsMixId,
        track_id: TrackId,
        position: i64,
    },
    TrackRemoved {
        stemsmix_id: StemsMixId,
        track_id: TrackId,
        position: i64,
    },
    /// Tracks were added, removed or reordered in these collections.
    TracksChanged(BTreeSet<StemsMixId>),
    TracksRemovedFromPlayedHistory(BTreeSet<TrackId>),
}
