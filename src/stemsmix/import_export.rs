//! Writing StemsMixes to playlist files and creating them from files.

use std::path::{Path, PathBuf};

use log::{debug, info};

use super::StemsMixManager;
use crate::error::{Result, StemsMixError};
use crate::playlist_file;
use crate::protocol::{StemsMixId, StemsMixKind, TrackId};
use crate::track_catalog::TrackCatalog;

impl StemsMixManager {
    /// Writes the collection in position order. Tracks the catalog cannot
    /// locate are left out. Returns the number of written entries.
    pub fn export_stemsmix(
        &self,
        id: StemsMixId,
        path: &Path,
        catalog: &dyn TrackCatalog,
        use_relative_paths: bool,
    ) -> Result<usize> {
        if self.name(id)?.is_none() {
            return Err(StemsMixError::NotFound(id));
        }
        let locations: Vec<PathBuf> = self
            .ordered_track_ids(id)?
            .into_iter()
            .filter_map(|track_id| {
                let location = catalog.track_location(track_id);
                if location.is_none() {
                    debug!("StemsMix: track {} has no location, not exported", track_id);
                }
                location
            })
            .collect();
        playlist_file::write_playlist_file(path, &locations, use_relative_paths)?;
        info!(
            "StemsMix: exported {} tracks of {} to {}",
            locations.len(),
            id,
            path.display()
        );
        Ok(locations.len())
    }

    fn resolve_playlist_file(path: &Path, catalog: &dyn TrackCatalog) -> Result<Vec<TrackId>> {
        Ok(playlist_file::read_playlist_file(path)?
            .into_iter()
            .filter_map(|location| {
                let track_id = catalog.track_id_for_location(&location);
                if track_id.is_none() {
                    debug!(
                        "StemsMix: {} is not in the library, not imported",
                        location.display()
                    );
                }
                track_id
            })
            .collect())
    }

    /// Creates a collection named after the file and fills it with the
    /// tracks the catalog knows. Returns the new id and its final name.
    pub fn import_playlist_file(
        &mut self,
        path: &Path,
        catalog: &dyn TrackCatalog,
    ) -> Result<(StemsMixId, String)> {
        let track_ids = Self::resolve_playlist_file(path, catalog)?;
        let base_name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "Imported".to_string());
        let (id, name) = self.create_unique(&base_name, StemsMixKind::Normal)?;
        self.append(&track_ids, id)?;
        Ok((id, name))
    }

    /// Appends the tracks of a playlist file to an existing collection.
    pub fn import_into(
        &mut self,
        id: StemsMixId,
        path: &Path,
        catalog: &dyn TrackCatalog,
    ) -> Result<usize> {
        if self.name(id)?.is_none() {
            return Err(StemsMixError::NotFound(id));
        }
        if self.is_locked(id)? {
            return Err(StemsMixError::Locked(id));
        }
        let track_ids = Self::resolve_playlist_file(path, catalog)?;
        self.append(&track_ids, id)
    }
}
