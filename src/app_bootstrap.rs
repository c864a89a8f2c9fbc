//! Opening the store and running startup maintenance.

use log::{info, warn};
use tokio::sync::broadcast;

use crate::config::Config;
use crate::db_manager::DbManager;
use crate::error::{Result, StemsMixError};
use crate::protocol::{StemsMixEvent, StemsMixKind};
use crate::stemsmix::StemsMixManager;

const EVENT_BUS_CAPACITY: usize = 4096;

pub fn event_bus() -> broadcast::Sender<StemsMixEvent> {
    let (bus_sender, _) = broadcast::channel(EVENT_BUS_CAPACITY);
    bus_sender
}

/// Opens the configured database and prepares the manager: the membership
/// cache is filled, the Auto DJ queue exists if configured, and short
/// unlocked set logs are gone.
pub fn open_stemsmix_store(
    config: &Config,
    bus_sender: broadcast::Sender<StemsMixEvent>,
) -> Result<StemsMixManager> {
    let db_path = config.database_path()?;
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent).map_err(|err| StemsMixError::io(parent, err))?;
        }
    }
    info!("Opening StemsMix database {}", db_path.display());
    let db_manager = DbManager::new(&db_path)?;
    let mut manager = StemsMixManager::new(db_manager, bus_sender)?;
    run_startup_maintenance(&mut manager, config)?;
    Ok(manager)
}

pub fn run_startup_maintenance(manager: &mut StemsMixManager, config: &Config) -> Result<()> {
    if config.auto_dj.create_queue_on_startup {
        manager.ensure_auto_dj_queue()?;
    }
    if config.history.min_tracks_to_keep > 0 {
        let deleted = manager.delete_all_unlocked_below_threshold(
            StemsMixKind::SetLog,
            config.history.min_tracks_to_keep,
        )?;
        if deleted > 0 {
            info!("Removed {} short set logs", deleted);
        }
    } else {
        warn!("Set log cleanup disabled by history.min_tracks_to_keep");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{TrackId, AUTO_DJ_STEMSMIX_NAME};

    #[test]
    fn test_startup_maintenance_creates_queue_and_prunes_empty_logs() {
        let db_manager = DbManager::new_in_memory().expect("failed to create in-memory db");
        let mut manager = StemsMixManager::new(db_manager, event_bus()).unwrap();
        let empty_log = manager.create("empty", StemsMixKind::SetLog).unwrap();
        let played_log = manager.create("played", StemsMixKind::SetLog).unwrap();
        manager.append(&[TrackId(1)], played_log).unwrap();

        run_startup_maintenance(&mut manager, &Config::default()).unwrap();

        assert!(manager.id_from_name(AUTO_DJ_STEMSMIX_NAME).unwrap().is_some());
        assert_eq!(manager.name(empty_log).unwrap(), None);
        assert_eq!(manager.name(played_log).unwrap().as_deref(), Some("played"));
    }

    #[test]
    fn test_store_reopens_with_rebuilt_index() {
        let dir = std::env::temp_dir().join(format!("stemsmix-bootstrap-{}", std::process::id()));
        let mut config = Config::default();
        config.database.path = dir.join("library.db").display().to_string();

        let id = {
            let mut manager = open_stemsmix_store(&config, event_bus()).unwrap();
            let id = manager.create("Keep", StemsMixKind::Normal).unwrap();
            manager.append(&[TrackId(4), TrackId(5)], id).unwrap();
            id
        };

        let manager = open_stemsmix_store(&config, event_bus()).unwrap();
        assert!(manager.contains_track(TrackId(5), id));
        assert!(manager.verify_membership_index().unwrap());

        let _ = std::fs::remove_dir_all(&dir);
    }
}
