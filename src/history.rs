// src/history.rs

//! Output location history.
//!
//! Every location a module switches to is pushed here. The tracker decides
//! when older locations can be deleted; the materializer itself never
//! removes anything.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::fs::FileSystem;

/// Records output locations for later cleanup or rollback.
pub trait HistoryTracker: Send {
    /// Record `location` as the newest active location.
    ///
    /// An error means the agent can no longer reason about old configuration
    /// state; the calling module stops.
    fn push(&mut self, location: &Path) -> Result<()>;
}

/// Keeps the newest `keep` locations and deletes older ones from disk.
#[derive(Debug)]
pub struct DirectoryHistory {
    keep: usize,
    entries: VecDeque<PathBuf>,
    fs: Arc<dyn FileSystem>,
}

impl DirectoryHistory {
    /// `keep = 0` disables pruning.
    pub fn new(keep: usize, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            keep,
            entries: VecDeque::new(),
            fs,
        }
    }

    /// Track the location directories already under `root`, left behind by
    /// earlier runs, and prune them down to `keep`.
    ///
    /// Only directories named by a location id are adopted. Returns how many
    /// were found. A missing `root` is not an error.
    pub fn adopt_existing(&mut self, root: &Path) -> Result<usize> {
        if !self.fs.exists(root) {
            return Ok(0);
        }

        let mut found: Vec<PathBuf> = self
            .fs
            .read_dir(root)
            .with_context(|| format!("listing previous locations in {:?}", root))?
            .into_iter()
            .filter(|path| !self.fs.is_file(path) && is_location_dir(path))
            .filter(|path| !self.entries.contains(path))
            .collect();
        // Location ids are UUIDv7, so name order is creation order.
        found.sort();

        let count = found.len();
        for location in found {
            self.entries.push_back(location);
        }
        debug!(root = ?root, adopted = count, "adopted previous configuration locations");
        self.prune();
        Ok(count)
    }

    /// Tracked locations, oldest first.
    pub fn entries(&self) -> impl Iterator<Item = &Path> {
        self.entries.iter().map(PathBuf::as_path)
    }

    fn prune(&mut self) {
        if self.keep == 0 {
            return;
        }
        while self.entries.len() > self.keep {
            let Some(oldest) = self.entries.pop_front() else {
                break;
            };
            match self.fs.remove_dir_all(&oldest) {
                Ok(()) => info!(location = ?oldest, "removed old configuration location"),
                Err(e) => warn!(location = ?oldest, error = %e, "failed to remove old configuration location"),
            }
        }
    }
}

fn is_location_dir(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| Uuid::parse_str(name).is_ok())
}

impl HistoryTracker for DirectoryHistory {
    fn push(&mut self, location: &Path) -> Result<()> {
        if !self.fs.exists(location) {
            bail!("location {:?} does not exist", location);
        }
        if self.entries.iter().any(|e| e == location) {
            bail!("location {:?} was already recorded", location);
        }

        self.entries.push_back(location.to_path_buf());
        debug!(location = ?location, tracked = self.entries.len(), "recorded configuration location");
        self.prune();
        Ok(())
    }
}
