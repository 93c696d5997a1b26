use std::fs;
use std::path::{Path, PathBuf};

use lofty::prelude::*;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::LibrarySettings;

use super::model::{Track, ticks_from_duration};
use super::{Catalog, CatalogError};

/// A catalog backed by a music folder.
///
/// Album ids are directories relative to the root (`""` is the root itself),
/// playlist ids are `.m3u` files relative to the root.
pub struct LocalCatalog {
    root: PathBuf,
    settings: LibrarySettings,
}

impl LocalCatalog {
    pub fn new(root: impl Into<PathBuf>, settings: LibrarySettings) -> Self {
        Self {
            root: root.into(),
            settings,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, id: &str) -> Result<PathBuf, CatalogError> {
        let path = if id.is_empty() {
            self.root.clone()
        } else {
            self.root.join(id)
        };
        if !path.exists() {
            return Err(CatalogError::NotFound(path));
        }
        Ok(path)
    }

    fn track_id(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .to_string_lossy()
            .into_owned()
    }
}

impl Catalog for LocalCatalog {
    fn album_items(&self, album_id: &str) -> Result<Vec<Track>, CatalogError> {
        let dir = self.resolve(album_id)?;
        if !dir.is_dir() {
            return Err(CatalogError::NotFound(dir));
        }
        let tracks: Vec<Track> = scan(&dir, &self.settings)
            .into_iter()
            .map(|path| read_track(&path, self.track_id(&path)))
            .collect();
        debug!(album = album_id, count = tracks.len(), "scanned album");
        Ok(tracks)
    }

    fn playlist_items(&self, playlist_id: &str) -> Result<Vec<Track>, CatalogError> {
        let file = self.resolve(playlist_id)?;
        let content = fs::read_to_string(&file)?;
        let base = file.parent().unwrap_or(&self.root).to_path_buf();

        let mut tracks = Vec::new();
        for entry in parse_m3u(&content) {
            if is_remote(entry) {
                tracks.push(remote_track(entry));
                continue;
            }
            let path = base.join(entry.trim_start_matches("file://"));
            if path.is_file() {
                let id = self.track_id(&path);
                tracks.push(read_track(&path, id));
            } else {
                warn!(playlist = playlist_id, entry, "playlist entry not found, skipping");
            }
        }
        Ok(tracks)
    }
}

/// Non-comment, non-empty lines of an `.m3u` playlist.
pub(crate) fn parse_m3u(content: &str) -> impl Iterator<Item = &str> {
    content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
}

pub(crate) fn is_remote(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

fn remote_track(url: &str) -> Track {
    let name = url
        .rsplit('/')
        .find(|s| !s.is_empty())
        .unwrap_or(url)
        .to_string();
    Track {
        id: url.to_string(),
        duration_ticks: 0,
        stream_url: url.to_string(),
        name,
        album: None,
        artist: None,
    }
}

fn is_audio_file(path: &Path, settings: &LibrarySettings) -> bool {
    let exts: Vec<String> = settings
        .extensions
        .iter()
        .map(|e| e.trim().trim_start_matches('.').to_ascii_lowercase())
        .filter(|e| !e.is_empty())
        .collect();

    path.extension()
        .and_then(|s| s.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            exts.iter().any(|e| e == &ext)
        })
        .unwrap_or(false)
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|s| s.to_str())
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}

/// Audio files under `dir`, sorted case-insensitively by path.
pub(crate) fn scan(dir: &Path, settings: &LibrarySettings) -> Vec<PathBuf> {
    let mut walker = WalkDir::new(dir).follow_links(settings.follow_links);

    // Non-recursive = only the root directory.
    let depth_cap = if settings.recursive {
        settings.max_depth
    } else {
        Some(1)
    };
    if let Some(d) = depth_cap {
        walker = walker.max_depth(d);
    }

    let mut files: Vec<PathBuf> = walker
        .into_iter()
        .filter_entry(|e| settings.include_hidden || e.depth() == 0 || !is_hidden(e.path()))
        .filter_map(Result::ok)
        .map(|e| e.into_path())
        .filter(|p| p.is_file() && is_audio_file(p, settings))
        .collect();

    files.sort_by_key(|p| p.to_string_lossy().to_lowercase());
    files
}

/// Build a `Track` from tags, falling back to the file stem when untagged.
fn read_track(path: &Path, id: String) -> Track {
    let mut name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("UNKNOWN")
        .to_string();
    let mut artist = None;
    let mut album = None;
    let mut duration_ticks = 0;

    match lofty::read_from_path(path) {
        Ok(tagged) => {
            duration_ticks = ticks_from_duration(tagged.properties().duration());

            if let Some(tag) = tagged.primary_tag().or_else(|| tagged.first_tag()) {
                if let Some(v) = tag.title().filter(|v| !v.trim().is_empty()) {
                    name = v.to_string();
                }
                artist = tag
                    .artist()
                    .map(|v| v.trim().to_string())
                    .filter(|v| !v.is_empty());
                album = tag
                    .album()
                    .map(|v| v.trim().to_string())
                    .filter(|v| !v.is_empty());
            }
        }
        Err(e) => debug!(path = %path.display(), "no readable tags: {e}"),
    }

    Track {
        id,
        duration_ticks,
        stream_url: path.to_string_lossy().into_owned(),
        name,
        album,
        artist,
    }
}
