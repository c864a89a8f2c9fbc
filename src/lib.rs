//! Ordered track collections ("StemsMixes") stored in SQLite.
//!
//! [`StemsMixManager`] keeps positions dense, maintains a reverse
//! track-to-collection cache and publishes every committed change as a
//! [`StemsMixEvent`] on a broadcast bus.

pub mod app_bootstrap;
pub mod config;
pub mod db_manager;
pub mod error;
pub mod playlist_file;
pub mod protocol;
pub mod stemsmix;
pub mod track_catalog;

pub use error::{Result, StemsMixError};
pub use protocol::{
    AutoDjSendLoc, StemsMixEntry, StemsMixEvent, StemsMixId, StemsMixInfo, StemsMixKind, TrackId,
};
pub use stemsmix::{StemsMixManager, TrackMembershipIndex};
pub use track_catalog::{TrackCatalog, TsvTrackCatalog};
