use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::tiles::TileCoord;

/// Run an eviction pass after this many saved tiles
const EVICT_EVERY: u64 = 100;

/// Platform-specific cache directory for this crate
pub fn platform_cache_dir() -> Option<PathBuf> {
    #[cfg(target_os = "android")]
    {
        // The app must set CACHE_DIR to its cache directory
        std::env::var("CACHE_DIR")
            .ok()
            .map(|p| PathBuf::from(p).join("makepad-map-page"))
    }

    #[cfg(any(target_os = "ios", target_os = "macos"))]
    {
        std::env::var("HOME")
            .ok()
            .map(|h| PathBuf::from(h).join("Library/Caches/makepad-map-page"))
    }

    #[cfg(target_os = "linux")]
    {
        std::env::var("XDG_CACHE_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| std::env::var("HOME").ok().map(|h| PathBuf::from(h).join(".cache")))
            .map(|p| p.join("makepad-map-page"))
    }

    #[cfg(target_os = "windows")]
    {
        std::env::var("LOCALAPPDATA")
            .ok()
            .map(|p| PathBuf::from(p).join("makepad-map-page").join("cache"))
    }

    #[cfg(not(any(
        target_os = "android",
        target_os = "ios",
        target_os = "macos",
        target_os = "linux",
        target_os = "windows"
    )))]
    {
        None
    }
}

/// Size-capped on-disk tile store laid out as
/// `{root}/{namespace}/{z}/{x}/{y}.png`.
///
/// Every tile source writes under its own namespace so switching styles never
/// serves tiles of another style. A cache without a root stores nothing.
#[derive(Debug)]
pub struct TileDiskCache {
    root: Option<PathBuf>,
    max_bytes: u64,
    saves: u64,
}

impl TileDiskCache {
    pub fn new(root: Option<PathBuf>, max_bytes: u64) -> Self {
        Self { root, max_bytes, saves: 0 }
    }

    pub fn disabled() -> Self {
        Self::new(None, 0)
    }

    pub fn tile_path(&self, namespace: &str, coord: &TileCoord) -> Option<PathBuf> {
        self.root.as_ref().map(|base| {
            base.join(namespace)
                .join(coord.z.to_string())
                .join(coord.x.to_string())
                .join(format!("{}.png", coord.y))
        })
    }

    /// Stores tile PNG data, running an eviction pass now and then.
    pub fn save(&mut self, namespace: &str, coord: &TileCoord, data: &[u8]) -> io::Result<()> {
        let Some(path) = self.tile_path(namespace, coord) else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, data)?;

        self.saves += 1;
        if self.saves % EVICT_EVERY == 0 {
            let removed = self.evict_if_needed();
            if removed > 0 {
                tracing::debug!(removed, "evicted cached tiles");
            }
        }
        Ok(())
    }

    pub fn load(&self, namespace: &str, coord: &TileCoord) -> Option<Vec<u8>> {
        fs::read(self.tile_path(namespace, coord)?).ok()
    }

    /// Total size of cached tiles in bytes
    pub fn size(&self) -> u64 {
        match &self.root {
            Some(root) if root.exists() => dir_size(root),
            _ => 0,
        }
    }

    /// Deletes the oldest tiles until the cache fits its cap. Returns the
    /// number of bytes removed.
    pub fn evict_if_needed(&self) -> u64 {
        let Some(root) = &self.root else {
            return 0;
        };
        let current = self.size();
        if current <= self.max_bytes {
            return 0;
        }

        let mut files: Vec<(PathBuf, SystemTime, u64)> = Vec::new();
        collect_files(root, &mut files);
        files.sort_by(|a, b| a.1.cmp(&b.1));

        let mut size = current;
        for (path, _, len) in files {
            if size <= self.max_bytes {
                break;
            }
            if fs::remove_file(&path).is_ok() {
                size = size.saturating_sub(len);
            }
        }

        remove_empty_dirs(root);
        current - size
    }

    /// Removes every cached tile
    pub fn clear(&self) {
        if let Some(root) = &self.root {
            if root.exists() {
                if let Err(err) = fs::remove_dir_all(root) {
                    tracing::warn!(%err, path = %root.display(), "failed to clear tile cache");
                }
            }
        }
    }
}

fn dir_size(path: &Path) -> u64 {
    fs::read_dir(path).into_iter().flatten().flatten().fold(0, |acc, entry| {
        let p = entry.path();
        acc + if p.is_dir() { dir_size(&p) } else { entry.metadata().map(|m| m.len()).unwrap_or(0) }
    })
}

fn collect_files(dir: &Path, files: &mut Vec<(PathBuf, SystemTime, u64)>) {
    for entry in fs::read_dir(dir).into_iter().flatten().flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_files(&path, files);
        } else if let Ok(metadata) = entry.metadata() {
            if let Ok(modified) = metadata.modified() {
                files.push((path, modified, metadata.len()));
            }
        }
    }
}

fn remove_empty_dirs(dir: &Path) {
    for entry in fs::read_dir(dir).into_iter().flatten().flatten() {
        let path = entry.path();
        if path.is_dir() {
            remove_empty_dirs(&path);
            // Fails while the directory still has tiles
            let _ = fs::remove_dir(&path);
        }
    }
}
