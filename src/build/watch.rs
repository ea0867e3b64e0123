use std::collections::HashSet;
use std::hash::Hash;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{Receiver, RecvTimeoutError, SyncSender};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use notify::event::{EventKind, ModifyKind};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};

use super::exclude::excluded;
use crate::config::Config;
use crate::utils::normalize_path;

/// Capacity of the queues between watcher, debouncer and rebuild loop.
pub const QUEUE_DEPTH: usize = 1024;

/// Groups items into batches. The first item after a quiet period opens a
/// window of `interval`; every item received before the window closes joins
/// the batch, duplicates dropped, arrival order kept. Returns once either
/// side of the pipeline hangs up.
pub fn debounce<T>(events: Receiver<T>, batches: SyncSender<Vec<T>>, interval: Duration)
where
    T: Eq + Hash + Clone,
{
    while let Ok(first) = events.recv() {
        let deadline = Instant::now() + interval;
        let mut seen = HashSet::new();
        let mut batch = Vec::new();
        if seen.insert(first.clone()) {
            batch.push(first);
        }

        let mut disconnected = false;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match events.recv_timeout(remaining) {
                Ok(item) => {
                    if seen.insert(item.clone()) {
                        batch.push(item);
                    }
                }
                Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) => {
                    disconnected = true;
                    break;
                }
            }
        }

        if batches.send(batch).is_err() || disconnected {
            return;
        }
    }
}

/// Starts a recursive watcher on `root` that forwards the paths of content
/// events. Access and metadata-only events are dropped.
pub fn watch_tree(root: &Path, events: SyncSender<PathBuf>) -> Result<RecommendedWatcher> {
    let mut watcher = notify::recommended_watcher(move |event: notify::Result<Event>| match event {
        Ok(event) => {
            if !is_content_event(&event.kind) {
                return;
            }
            for path in event.paths {
                if events.send(path).is_err() {
                    return;
                }
            }
        }
        Err(err) => {
            eprintln!("[jkl::watch] watcher error: {err}");
        }
    })
    .context("failed to create filesystem watcher")?;

    watcher
        .watch(root, RecursiveMode::Recursive)
        .with_context(|| format!("failed to watch {}", root.display()))?;
    Ok(watcher)
}

fn is_content_event(kind: &EventKind) -> bool {
    !matches!(
        kind,
        EventKind::Access(_) | EventKind::Modify(ModifyKind::Metadata(_))
    )
}

/// Turns a batch of absolute event paths into sorted, unique site-relative
/// paths. Output and excluded paths are dropped; the configuration file is
/// always kept.
pub fn relativize(root: &Path, config: &Config, paths: &[PathBuf]) -> Vec<String> {
    let destination = config.destination_dir(root);
    let mut relative: Vec<String> = paths
        .iter()
        .filter(|path| !path.starts_with(&destination))
        .filter_map(|path| path.strip_prefix(root).ok())
        .map(normalize_path)
        .filter(|path| !path.is_empty())
        .filter(|path| config.is_config_path(path) || !excluded(config, path))
        .collect();
    relative.sort();
    relative.dedup();
    relative
}
