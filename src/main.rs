use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use log::{debug, error, info, warn};

use stemsmix::app_bootstrap::{event_bus, open_stemsmix_store};
use stemsmix::config::{self, Config};
use stemsmix::{
    AutoDjSendLoc, StemsMixError, StemsMixId, StemsMixKind, StemsMixManager, TrackId,
    TsvTrackCatalog,
};

#[derive(Parser, Debug)]
#[command(name = "stemsmix")]
#[command(about = "Manage ordered track collections in a StemsMix library database")]
struct Args {
    /// Config file (defaults to the user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Database file, overrides the configured one
    #[arg(long)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum KindArg {
    Normal,
    AutoDj,
    SetLog,
}

impl From<KindArg> for StemsMixKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Normal => StemsMixKind::Normal,
            KindArg::AutoDj => StemsMixKind::AutoDjQueue,
            KindArg::SetLog => StemsMixKind::SetLog,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum SendLocArg {
    Top,
    Bottom,
    Replace,
}

impl From<SendLocArg> for AutoDjSendLoc {
    fn from(loc: SendLocArg) -> Self {
        match loc {
            SendLocArg::Top => AutoDjSendLoc::Top,
            SendLocArg::Bottom => AutoDjSendLoc::Bottom,
            SendLocArg::Replace => AutoDjSendLoc::Replace,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List all collections as JSON
    List,
    /// Create a collection, numbering the name if it is taken
    Create {
        name: String,
        #[arg(long, value_enum, default_value = "normal")]
        kind: KindArg,
    },
    /// Print the track list of a collection as JSON
    Show { id: StemsMixId },
    Append { id: StemsMixId, tracks: Vec<i64> },
    Insert {
        id: StemsMixId,
        position: i64,
        tracks: Vec<i64>,
    },
    Remove { id: StemsMixId, positions: Vec<i64> },
    Move {
        id: StemsMixId,
        from: i64,
        to: i64,
    },
    /// Append every track of SOURCE to TARGET
    Copy { source: StemsMixId, target: StemsMixId },
    /// Copy a collection into a new one called NAME
    Duplicate { source: StemsMixId, name: String },
    Rename { id: StemsMixId, name: String },
    Lock { id: StemsMixId },
    Unlock { id: StemsMixId },
    Delete { id: StemsMixId },
    /// Delete unlocked set logs with fewer than MIN_TRACKS tracks
    CleanupHistory { min_tracks: i64 },
    /// Send a collection to the Auto DJ queue
    Queue {
        id: StemsMixId,
        #[arg(long, value_enum, default_value = "bottom")]
        loc: SendLocArg,
    },
    /// Write a collection to a .pls or .m3u file
    Export {
        id: StemsMixId,
        file: PathBuf,
        /// TSV file mapping track ids to locations
        #[arg(long)]
        catalog: PathBuf,
    },
    /// Create a collection from a .pls or .m3u file
    Import {
        file: PathBuf,
        /// TSV file mapping track ids to locations
        #[arg(long)]
        catalog: PathBuf,
        /// Append to this collection instead of creating one
        #[arg(long)]
        into: Option<StemsMixId>,
    },
}

fn track_ids(values: &[i64]) -> Vec<TrackId> {
    values.iter().copied().map(TrackId).collect()
}

/// Commands that change membership or order respect the lock.
fn ensure_unlocked(manager: &StemsMixManager, id: StemsMixId) -> Result<(), StemsMixError> {
    if manager.is_locked(id)? {
        return Err(StemsMixError::Locked(id));
    }
    Ok(())
}

fn load_catalog(path: &Path) -> Result<TsvTrackCatalog, StemsMixError> {
    let catalog = TsvTrackCatalog::load(path)?;
    if catalog.is_empty() {
        warn!("Track catalog {} lists no tracks", path.display());
    } else {
        debug!("Loaded {} tracks from {}", catalog.len(), path.display());
    }
    Ok(catalog)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run(
    command: Command,
    manager: &mut StemsMixManager,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::List => print_json(&manager.list()?)?,
        Command::Create { name, kind } => {
            let (id, name) = manager.create_unique(&name, kind.into())?;
            println!("{}\t{}", id, name);
        }
        Command::Show { id } => print_json(&manager.entries(id)?)?,
        Command::Append { id, tracks } => {
            ensure_unlocked(manager, id)?;
            let count = manager.append(&track_ids(&tracks), id)?;
            println!("appended {}", count);
        }
        Command::Insert {
            id,
            position,
            tracks,
        } => {
            ensure_unlocked(manager, id)?;
            let count = manager.insert_many_at(&track_ids(&tracks), id, position)?;
            println!("inserted {}", count);
        }
        Command::Remove { id, positions } => {
            ensure_unlocked(manager, id)?;
            let count = manager.remove_many(id, &positions)?;
            println!("removed {}", count);
        }
        Command::Move { id, from, to } => {
            ensure_unlocked(manager, id)?;
            manager.move_track(id, from, to)?;
        }
        Command::Copy { source, target } => {
            ensure_unlocked(manager, target)?;
            manager.copy_all(source, target)?;
        }
        Command::Duplicate { source, name } => {
            let (id, name) = manager.duplicate(source, &name)?;
            println!("{}\t{}", id, name);
        }
        Command::Rename { id, name } => {
            ensure_unlocked(manager, id)?;
            let name = manager.check_rename(id, &name)?;
            manager.rename(id, &name)?;
        }
        Command::Lock { id } => {
            if !manager.set_locked(id, true) {
                return Err("failed to lock".into());
            }
        }
        Command::Unlock { id } => {
            if !manager.set_locked(id, false) {
                return Err("failed to unlock".into());
            }
        }
        Command::Delete { id } => {
            ensure_unlocked(manager, id)?;
            manager.delete(id)?;
        }
        Command::CleanupHistory { min_tracks } => {
            let count =
                manager.delete_all_unlocked_below_threshold(StemsMixKind::SetLog, min_tracks)?;
            println!("deleted {}", count);
        }
        Command::Queue { id, loc } => {
            let count = manager.add_stemsmix_to_auto_dj_queue(id, loc.into())?;
            println!("queued {}", count);
        }
        Command::Export { id, file, catalog } => {
            let catalog = load_catalog(&catalog)?;
            let count =
                manager.export_stemsmix(id, &file, &catalog, config.export.use_relative_paths)?;
            println!("exported {}", count);
        }
        Command::Import {
            file,
            catalog,
            into,
        } => {
            let catalog = load_catalog(&catalog)?;
            match into {
                Some(id) => {
                    let count = manager.import_into(id, &file, &catalog)?;
                    println!("imported {}", count);
                }
                None => {
                    let (id, name) = manager.import_playlist_file(&file, &catalog)?;
                    println!("{}\t{}", id, name);
                }
            }
        }
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Warnings from reading the config show up before its level applies.
    let mut clog = colog::default_builder();
    clog.filter(None, log::LevelFilter::Trace);
    clog.init();
    log::set_max_level(log::LevelFilter::Warn);

    let config_path = args.config.clone().or_else(config::default_config_path);
    let mut config = config_path
        .as_deref()
        .map(config::load_config)
        .unwrap_or_default();
    if let Some(database) = &args.database {
        config.database.path = database.display().to_string();
    }

    log::set_max_level(config.logging.level_filter());

    let bus_sender = event_bus();
    let mut manager = open_stemsmix_store(&config, bus_sender)?;
    info!("StemsMix library ready with {} collections", manager.count()?);

    if let Err(err) = run(args.command, &mut manager, &config) {
        error!("{}", err);
        return Err(err);
    }
    Ok(())
}
