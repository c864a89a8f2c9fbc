//! Access to the track metadata store.
//!
//! The store itself lives outside this crate; the StemsMix code only needs to
//! map track ids to file locations and back.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use log::warn;

use crate::error::{Result, StemsMixError};
use crate::protocol::TrackId;

pub trait TrackCatalog {
    fn track_location(&self, track_id: TrackId) -> Option<PathBuf>;

    fn track_id_for_location(&self, location: &Path) -> Option<TrackId>;

    /// A track is available while the catalog can locate it.
    fn is_available(&self, track_id: TrackId) -> bool {
        self.track_location(track_id).is_some()
    }
}

/// Catalog read from a tab separated `track_id<TAB>location` file.
#[derive(Debug, Default, Clone)]
pub struct TsvTrackCatalog {
    locations: HashMap<TrackId, PathBuf>,
    track_ids: HashMap<PathBuf, TrackId>,
}

impl TsvTrackCatalog {
    pub fn from_tsv(text: &str) -> Self {
        let mut catalog = Self::default();
        for (line_number, line) in text.lines().enumerate() {
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((id, location)) = line.split_once('\t') else {
                warn!("Track catalog line {} has no tab separator", line_number + 1);
                continue;
            };
            let Ok(id) = id.trim().parse::<i64>() else {
                warn!("Track catalog line {} has a bad track id", line_number + 1);
                continue;
            };
            catalog.insert(TrackId(id), PathBuf::from(location.trim()));
        }
        catalog
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|err| StemsMixError::io(path, err))?;
        Ok(Self::from_tsv(&text))
    }

    pub fn insert(&mut self, track_id: TrackId, location: PathBuf) {
        self.track_ids.insert(location.clone(), track_id);
        self.locations.insert(track_id, location);
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }
}

impl TrackCatalog for TsvTrackCatalog {
    fn track_location(&self, track_id: TrackId) -> Option<PathBuf> {
        self.locations.get(&track_id).cloned()
    }

    fn track_id_for_location(&self, location: &Path) -> Option<TrackId> {
        self.track_ids.get(location).copied()
    }
}
