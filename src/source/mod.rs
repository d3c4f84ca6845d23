// src/source/mod.rs

//! Local fragment source.
//!
//! Stands in for the management-protocol client: reads a module's fragment
//! directory into a [`RawConfigSet`] and pushes it to the module whenever
//! the directory changes.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

use crate::fs::FileSystem;
use crate::types::RawConfigSet;

pub mod patterns;
pub mod watcher;

pub use patterns::FragmentFilter;
pub use watcher::{FragmentWatcherHandle, spawn_fragment_watcher};

/// Read every file in `dir` accepted by `filter`, keyed by file name.
///
/// Any unreadable file fails the whole collection; a partial fragment set is
/// never returned.
pub fn collect_fragments(
    fs: &dyn FileSystem,
    dir: &Path,
    filter: &FragmentFilter,
) -> Result<RawConfigSet> {
    let entries = fs
        .read_dir(dir)
        .with_context(|| format!("listing fragment directory {:?}", dir))?;

    let mut fragments = RawConfigSet::new();
    for path in entries {
        if !fs.is_file(&path) || !filter.matches(&path) {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            debug!(path = ?path, "skipping fragment with non UTF-8 name");
            continue;
        };
        let content = fs
            .read(&path)
            .with_context(|| format!("reading fragment {:?}", path))?;
        fragments.insert(name.to_string(), content);
    }

    debug!(dir = ?dir, fragments = fragments.len(), "collected fragments");
    Ok(fragments)
}
