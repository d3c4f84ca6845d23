// src/source/watcher.rs

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::agent::ModuleEvent;
use crate::fs::FileSystem;
use crate::source::collect_fragments;
use crate::source::patterns::FragmentFilter;

/// Editors tend to emit several events per save; wait this long and fold
/// everything that arrived into one push.
const SETTLE_DELAY: Duration = Duration::from_millis(100);

/// Keeps the `notify` watcher alive. Dropping it stops the watch and ends
/// the forwarding task.
pub struct FragmentWatcherHandle {
    _inner: RecommendedWatcher,
    dir: PathBuf,
}

impl std::fmt::Debug for FragmentWatcherHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FragmentWatcherHandle")
            .field("dir", &self.dir)
            .finish()
    }
}

impl FragmentWatcherHandle {
    pub fn dir(&self) -> &std::path::Path {
        &self.dir
    }
}

/// Watch `dir` and send `ModuleEvent::ConfigPushed` to `module_tx` once at
/// startup and after every relevant change.
///
/// The directory is created if it does not exist yet.
pub fn spawn_fragment_watcher(
    dir: impl Into<PathBuf>,
    filter: FragmentFilter,
    fs: Arc<dyn FileSystem>,
    module_tx: mpsc::Sender<ModuleEvent>,
) -> Result<FragmentWatcherHandle> {
    let dir = dir.into();
    fs.create_dir_all(&dir)
        .with_context(|| format!("creating fragment directory {:?}", dir))?;

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<Event>();

    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if let Err(err) = event_tx.send(event) {
                    eprintln!("fleetvisor: failed to forward notify event: {err}");
                }
            }
            Err(err) => {
                eprintln!("fleetvisor: fragment watch error: {err}");
            }
        },
        Config::default(),
    )?;

    watcher
        .watch(&dir, RecursiveMode::NonRecursive)
        .with_context(|| format!("watching fragment directory {:?}", dir))?;

    info!(dir = ?dir, patterns = ?filter.patterns(), "fragment watcher started");

    let task_dir = dir.clone();
    tokio::spawn(async move {
        if !push_fragments(fs.as_ref(), &task_dir, &filter, &module_tx).await {
            return;
        }

        while let Some(event) = event_rx.recv().await {
            let mut relevant = touches_fragment(&event, &filter);

            tokio::time::sleep(SETTLE_DELAY).await;
            while let Ok(more) = event_rx.try_recv() {
                relevant |= touches_fragment(&more, &filter);
            }

            if !relevant {
                debug!(dir = ?task_dir, "ignoring change to non-fragment files");
                continue;
            }
            if !push_fragments(fs.as_ref(), &task_dir, &filter, &module_tx).await {
                return;
            }
        }
        debug!(dir = ?task_dir, "fragment watcher loop finished");
    });

    Ok(FragmentWatcherHandle {
        _inner: watcher,
        dir,
    })
}

fn touches_fragment(event: &Event, filter: &FragmentFilter) -> bool {
    event.paths.iter().any(|p| filter.matches(p))
}

/// Returns false once the module has gone away.
async fn push_fragments(
    fs: &dyn FileSystem,
    dir: &std::path::Path,
    filter: &FragmentFilter,
    module_tx: &mpsc::Sender<ModuleEvent>,
) -> bool {
    let fragments = match collect_fragments(fs, dir, filter) {
        Ok(fragments) => fragments,
        Err(err) => {
            warn!(dir = ?dir, error = %format!("{err:#}"), "skipping fragment push");
            return true;
        }
    };

    module_tx
        .send(ModuleEvent::ConfigPushed { fragments })
        .await
        .is_ok()
}
