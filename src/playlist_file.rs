//! PLS and M3U playlist files.

use std::fmt::Write as _;
use std::path::{Component, Path, PathBuf};

use crate::error::{Result, StemsMixError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaylistFormat {
    Pls,
    M3u,
}

impl PlaylistFormat {
    /// `.m3u` / `.m3u8` are M3U, everything else is written as PLS.
    pub fn from_path(path: &Path) -> Self {
        let is_m3u = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("m3u") || ext.eq_ignore_ascii_case("m3u8"))
            .unwrap_or(false);
        if is_m3u {
            PlaylistFormat::M3u
        } else {
            PlaylistFormat::Pls
        }
    }
}

/// Playlists exported on classic Mac OS use a lone `\r` as line break.
fn normalize_line_breaks(text: &str) -> String {
    if text.contains('\r') && !text.contains("\r\n") {
        text.replace('\r', "\n")
    } else {
        text.to_string()
    }
}

/// Locations in the order of their `FileN=` lines.
pub fn parse_pls(text: &str) -> Vec<String> {
    normalize_line_breaks(text)
        .lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| line.contains("File"))
        .filter_map(|line| line.split_once('='))
        .map(|(_, location)| location.trim().to_string())
        .filter(|location| !location.is_empty())
        .collect()
}

pub fn parse_m3u(text: &str) -> Vec<String> {
    normalize_line_breaks(text)
        .lines()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Relative to `base_dir` when both share a root, `../` steps included.
fn display_location(location: &Path, base_dir: Option<&Path>) -> String {
    base_dir
        .filter(|base| base.is_absolute() == location.is_absolute())
        .and_then(|base| pathdiff::diff_paths(location, base))
        .filter(|relative| !relative.is_absolute())
        .unwrap_or_else(|| location.to_path_buf())
        .display()
        .to_string()
}

/// Folds `.` and `..` components without touching the filesystem.
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if matches!(normalized.components().next_back(), Some(Component::Normal(_))) {
                    normalized.pop();
                } else if !normalized.has_root() {
                    normalized.push("..");
                }
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

/// Renders a PLS document. With `base_dir`, locations are written relative
/// to it.
pub fn render_pls(locations: &[PathBuf], base_dir: Option<&Path>) -> String {
    let mut out = String::new();
    out.push_str("[playlist]\n");
    let _ = writeln!(out, "NumberOfEntries={}", locations.len());
    for (index, location) in locations.iter().enumerate() {
        let _ = writeln!(out, "File{}={}", index, display_location(location, base_dir));
    }
    out
}

pub fn render_m3u(locations: &[PathBuf], base_dir: Option<&Path>) -> String {
    let mut out = String::from("#EXTM3U\n");
    for location in locations {
        out.push_str(&display_location(location, base_dir));
        out.push('\n');
    }
    out
}

pub fn write_playlist_file(
    path: &Path,
    locations: &[PathBuf],
    use_relative_paths: bool,
) -> Result<()> {
    let base_dir = if use_relative_paths {
        path.parent()
    } else {
        None
    };
    let contents = match PlaylistFormat::from_path(path) {
        PlaylistFormat::Pls => render_pls(locations, base_dir),
        PlaylistFormat::M3u => render_m3u(locations, base_dir),
    };
    std::fs::write(path, contents).map_err(|err| StemsMixError::io(path, err))
}

/// Reads the locations of a playlist file. Relative entries are resolved
/// against the file's directory.
pub fn read_playlist_file(path: &Path) -> Result<Vec<PathBuf>> {
    let bytes = std::fs::read(path).map_err(|err| StemsMixError::io(path, err))?;
    let text = String::from_utf8_lossy(&bytes);
    let raw = match PlaylistFormat::from_path(path) {
        PlaylistFormat::Pls => parse_pls(&text),
        PlaylistFormat::M3u => parse_m3u(&text),
    };
    let base_dir = path.parent().unwrap_or_else(|| Path::new(""));
    Ok(raw
        .into_iter()
        .map(|location| {
            let location = PathBuf::from(location);
            if location.is_absolute() {
                location
            } else {
                normalize_lexically(&base_dir.join(location))
            }
        })
        .collect())
}
