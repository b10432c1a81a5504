//! Resolves the numeric ids used on the wire to files in the data folder.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::LibraryError;

pub const MANIFEST_FILE: &str = "media.json";
pub const MEDIA_DIR: &str = "media";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MediaId(pub u32);

impl fmt::Display for MediaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
    Unsupported(String),
}

impl MediaKind {
    /// Maps a media type or file extension (`png`, `.MP4`, `video`, ...) to a kind.
    pub fn from_type(media_type: &str) -> Self {
        let normalized = media_type.trim_start_matches('.').to_lowercase();
        match normalized.as_str() {
            "image" | "png" | "jpg" | "jpeg" => MediaKind::Image,
            "video" | "mp4" | "webm" | "mov" => MediaKind::Video,
            _ => MediaKind::Unsupported(normalized),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaEntry {
    pub id: MediaId,
    pub file_name: String,
    pub kind: MediaKind,
}

pub trait MediaResolver {
    /// `None` means the id is unknown to this kiosk.
    fn resolve(&self, id: MediaId) -> Option<MediaEntry>;
}

#[derive(Debug, Deserialize)]
struct ManifestEntry {
    id: MediaId,
    file: String,
    #[serde(rename = "type")]
    media_type: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct MediaLibrary {
    entries: BTreeMap<MediaId, MediaEntry>,
}

impl MediaLibrary {
    pub fn new(entries: impl IntoIterator<Item = MediaEntry>) -> Self {
        Self {
            entries: entries.into_iter().map(|entry| (entry.id, entry)).collect(),
        }
    }

    /// Loads `media.json` from the data folder, or scans `media/` when there
    /// is no manifest.
    pub fn load(data_folder: &Path) -> Result<Self, LibraryError> {
        let manifest = data_folder.join(MANIFEST_FILE);
        let library = if manifest.exists() {
            Self::from_manifest(&manifest)?
        } else {
            debug!(path = %manifest.display(), "no media manifest, scanning media folder");
            Self::scan(&data_folder.join(MEDIA_DIR))?
        };

        info!(count = library.len(), "media library loaded");
        Ok(library)
    }

    pub fn from_manifest(path: &Path) -> Result<Self, LibraryError> {
        let raw = std::fs::read_to_string(path).map_err(|source| LibraryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let listed: Vec<ManifestEntry> =
            serde_json::from_str(&raw).map_err(|source| LibraryError::Manifest {
                path: path.to_path_buf(),
                source,
            })?;

        let mut entries = BTreeMap::new();
        for item in listed {
            let media_type = item
                .media_type
                .or_else(|| extension_of(Path::new(&item.file)))
                .unwrap_or_default();
            let entry = MediaEntry {
                id: item.id,
                kind: MediaKind::from_type(&media_type),
                file_name: item.file,
            };
            if entries.insert(entry.id, entry).is_some() {
                return Err(LibraryError::DuplicateId(item.id));
            }
        }

        Ok(Self { entries })
    }

    /// Picks up files whose name starts with their id: `3.mp4`, `12_lobby.png`.
    pub fn scan(media_dir: &Path) -> Result<Self, LibraryError> {
        let read_dir = std::fs::read_dir(media_dir).map_err(|source| LibraryError::Io {
            path: media_dir.to_path_buf(),
            source,
        })?;

        let mut entries = BTreeMap::new();
        for dir_entry in read_dir.flatten() {
            let path = dir_entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(file_name) = path.file_name().map(|name| name.to_string_lossy().to_string())
            else {
                continue;
            };
            let Some(id) = leading_id(&file_name) else {
                debug!(file = %file_name, "skipping media file without numeric id");
                continue;
            };

            let entry = MediaEntry {
                id,
                kind: MediaKind::from_type(&extension_of(&path).unwrap_or_default()),
                file_name,
            };
            if let Some(previous) = entries.insert(id, entry) {
                warn!(%id, replaced = %previous.file_name, "media id found twice, keeping the later file");
            }
        }

        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl MediaResolver for MediaLibrary {
    fn resolve(&self, id: MediaId) -> Option<MediaEntry> {
        self.entries.get(&id).cloned()
    }
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension().map(|ext| ext.to_string_lossy().to_lowercase())
}

fn leading_id(file_name: &str) -> Option<MediaId> {
    let digits: String = file_name.chars().take_while(char::is_ascii_digit).collect();
    let rest = &file_name[digits.len()..];
    if !(rest.starts_with('.') || rest.starts_with('_') || rest.starts_with('-')) {
        return None;
    }
    digits.parse().ok().map(MediaId)
}

/// Absolute path of a library file inside the data folder.
pub fn media_path(data_folder: &Path, file_name: &str) -> PathBuf {
    data_folder.join(MEDIA_DIR).join(file_name)
}
