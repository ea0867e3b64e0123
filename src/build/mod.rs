mod exclude;
mod watch;


use std::fmt::Write as _;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::{Receiver, Sender, sync_channel};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use arc_swap::ArcSwap;
use rayon::prelude::*;
use thiserror::Error;
use walkdir::WalkDir;

use crate::cache::ContentCache;
use crate::config::{CONFIG_FILE, Config};
use crate::content::{Document, Site};
use crate::render::Pipeline;
use crate::utils::{log_status, normalize_path};

pub use exclude::{excluded, requires_full_reload};
pub use watch::{QUEUE_DEPTH, debounce, relativize, watch_tree};

/// Quiet period that closes a batch of filesystem events in watch mode.
pub const DEBOUNCE_INTERVAL: Duration = Duration::from_secs(1);

/// Command-line settings that win over `_config.yml`. Re-applied on every
/// full reload.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub destination: Option<PathBuf>,
    pub incremental: bool,
    pub drafts: bool,
}

impl Overrides {
    pub fn apply(&self, config: &mut Config) {
        if let Some(destination) = &self.destination {
            config.destination = destination.clone();
        }
        if self.incremental {
            config.incremental = true;
        }
        if self.drafts {
            config.show_drafts = true;
        }
    }
}

/// A site generation together with the pipeline that renders it.
pub struct Snapshot {
    pub site: Site,
    pub pipeline: Pipeline,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WriteStats {
    pub rendered: usize,
    pub copied: usize,
    pub removed: usize,
}

impl WriteStats {
    pub fn files(&self) -> usize {
        self.rendered + self.copied
    }
}

#[derive(Debug)]
pub struct WriteFailure {
    pub url: String,
    pub error: anyhow::Error,
}

/// Every output that could not be produced during one write phase.
#[derive(Debug, Error)]
#[error("{} of {total} outputs failed:{}", .failures.len(), summarize(.failures))]
pub struct BuildFailures {
    pub total: usize,
    pub failures: Vec<WriteFailure>,
}

fn summarize(failures: &[WriteFailure]) -> String {
    let mut summary = String::new();
    for failure in failures {
        let _ = write!(summary, "\n  {}: {:#}", failure.url, failure.error);
    }
    summary
}

enum Written {
    Rendered,
    Copied,
}

/// Owns the current snapshot and every side effect on the destination.
pub struct Engine {
    root: PathBuf,
    overrides: Overrides,
    cache: ContentCache,
    verbose: bool,
    current: ArcSwap<Snapshot>,
}

impl Engine {
    pub fn load(
        root: &Path,
        overrides: Overrides,
        cache: ContentCache,
        verbose: bool,
    ) -> Result<Self> {
        let snapshot = full_snapshot(root, &overrides, &cache, verbose)?;
        Ok(Self {
            root: root.to_path_buf(),
            overrides,
            cache,
            verbose,
            current: ArcSwap::from_pointee(snapshot),
        })
    }

    /// The latest complete snapshot. Callers keep using the value they got
    /// even if a rebuild replaces it meanwhile.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.current.load_full()
    }

    /// Removes everything under the destination that `keep_files` does not
    /// protect, then the directories left empty.
    pub fn clean(&self) -> Result<usize> {
        let snapshot = self.snapshot();
        let config = &snapshot.site.config;
        clean_destination(
            &config.destination_dir(&self.root),
            &config.keep_files,
            self.verbose,
        )
    }

    /// Cleans the destination and writes every routed document of the
    /// current snapshot.
    pub fn write(&self) -> Result<WriteStats> {
        let snapshot = self.snapshot();
        write_snapshot(&self.root, &snapshot, self.verbose)
    }

    /// Brings the destination up to date with `changed` site-relative paths,
    /// patching the current snapshot when the classifier allows it.
    pub fn rebuild(&self, changed: &[String]) -> Result<WriteStats> {
        let current = self.snapshot();
        let full = requires_full_reload(&current.site.config, changed);

        let next = if full {
            log_status(self.verbose, "MODE", "full reload");
            full_snapshot(&self.root, &self.overrides, &self.cache, self.verbose)?
        } else {
            match current.site.patched(changed)? {
                Some(site) => {
                    log_status(self.verbose, "MODE", "incremental");
                    let pipeline = Pipeline::new(&site, self.cache.clone())?;
                    Snapshot { site, pipeline }
                }
                None => {
                    log_status(
                        self.verbose,
                        "MODE",
                        "full reload (documents added, removed or moved)",
                    );
                    full_snapshot(&self.root, &self.overrides, &self.cache, self.verbose)?
                }
            }
        };

        let stats = write_snapshot(&self.root, &next, self.verbose)?;
        self.current.store(Arc::new(next));
        Ok(stats)
    }

    /// Rebuilds on every batch of source changes until the watcher goes
    /// away. One status line per cycle is sent to `status`.
    pub fn watch(&self, status: Sender<String>) -> Result<()> {
        let (event_tx, event_rx) = sync_channel(QUEUE_DEPTH);
        let (batch_tx, batch_rx) = sync_channel(QUEUE_DEPTH);
        let _watcher = watch_tree(&self.root, event_tx)?;
        thread::spawn(move || debounce(event_rx, batch_tx, DEBOUNCE_INTERVAL));

        let _ = status.send(format!("watching {} for changes", self.root.display()));
        self.process_batches(batch_rx, &status);
        Ok(())
    }

    /// Runs one rebuild per batch of absolute event paths, announcing each
    /// cycle and its outcome on `status`. Stops when `batches` hangs up or
    /// nobody listens to `status` any more.
    fn process_batches(&self, batches: Receiver<Vec<PathBuf>>, status: &Sender<String>) {
        for batch in batches {
            let config = self.snapshot().site.config.clone();
            let changed = relativize(&self.root, &config, &batch);
            if changed.is_empty() {
                continue;
            }
            log_status(self.verbose, "WATCH", changed.join(", "));
            if status
                .send(format!("regenerating: {}", changed.join(", ")))
                .is_err()
            {
                break;
            }

            let started = Instant::now();
            let message = match self.rebuild(&changed) {
                Ok(stats) => format!(
                    "rebuilt {} file(s) in {:.2?}",
                    stats.files(),
                    started.elapsed()
                ),
                Err(err) => format!("rebuild failed: {err:#}"),
            };
            if status.send(message).is_err() {
                break;
            }
        }
    }
}

fn full_snapshot(
    root: &Path,
    overrides: &Overrides,
    cache: &ContentCache,
    verbose: bool,
) -> Result<Snapshot> {
    let config_path = root.join(CONFIG_FILE);
    let mut config = Config::load(&config_path)?;
    overrides.apply(&mut config);
    config.validate(&config_path)?;

    let site = Site::load(root, config)
        .with_context(|| format!("failed to read site at {}", root.display()))?;
    for warning in &site.warnings {
        log_status(verbose, "WARN", warning);
    }
    log_status(
        verbose,
        "STEP",
        format!(
            "read {} documents, {} routes",
            site.documents.len(),
            site.routes.len()
        ),
    );

    let pipeline = Pipeline::new(&site, cache.clone())?;
    Ok(Snapshot { site, pipeline })
}

fn write_snapshot(root: &Path, snapshot: &Snapshot, verbose: bool) -> Result<WriteStats> {
    let config = &snapshot.site.config;
    let destination = config.destination_dir(root);
    let removed = clean_destination(&destination, &config.keep_files, verbose)?;

    let documents: Vec<&Arc<Document>> = snapshot.site.routes.values().collect();
    let results: Vec<(String, Result<Written>)> = documents
        .par_iter()
        .map(|document| {
            let outcome = write_document(&snapshot.pipeline, document, &destination, verbose)
                .with_context(|| format!("failed to write {}", document.relative_path));
            (document.permalink.clone(), outcome)
        })
        .collect();

    let mut stats = WriteStats {
        removed,
        ..WriteStats::default()
    };
    let mut failures = Vec::new();
    for (url, outcome) in results {
        match outcome {
            Ok(Written::Rendered) => stats.rendered += 1,
            Ok(Written::Copied) => stats.copied += 1,
            Err(error) => failures.push(WriteFailure { url, error }),
        }
    }

    if !failures.is_empty() {
        return Err(BuildFailures {
            total: documents.len(),
            failures,
        }
        .into());
    }
    Ok(stats)
}

fn write_document(
    pipeline: &Pipeline,
    document: &Document,
    destination: &Path,
    verbose: bool,
) -> Result<Written> {
    let target = document.output_path(destination);
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }

    if document.is_static() {
        remove_file_if_exists(&target)?;
        if fs::hard_link(&document.source_path, &target).is_err() {
            fs::copy(&document.source_path, &target).with_context(|| {
                format!(
                    "failed to copy {} to {}",
                    document.source_path.display(),
                    target.display()
                )
            })?;
        }
        log_status(verbose, "COPY", &document.permalink);
        return Ok(Written::Copied);
    }

    let output = pipeline.render(document)?;
    let mut file = File::create(&target)
        .with_context(|| format!("failed to create {}", target.display()))?;
    file.write_all(output.as_bytes())
        .with_context(|| format!("failed to write {}", target.display()))?;
    log_status(verbose, "WRITE", &document.permalink);
    Ok(Written::Rendered)
}

fn clean_destination(destination: &Path, keep_files: &[String], verbose: bool) -> Result<usize> {
    if !destination.is_dir() {
        return Ok(0);
    }

    let kept = |relative: &str| {
        keep_files.iter().any(|keep| {
            let keep = keep.trim_matches('/');
            !keep.is_empty()
                && relative
                    .strip_prefix(keep)
                    .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
        })
    };

    let mut removed = 0;
    for entry in WalkDir::new(destination).min_depth(1).contents_first(true) {
        let entry = entry.with_context(|| format!("failed to walk {}", destination.display()))?;
        let Ok(relative) = entry.path().strip_prefix(destination) else {
            continue;
        };
        if kept(&normalize_path(relative)) {
            continue;
        }
        if entry.file_type().is_dir() {
            remove_dir_if_empty(entry.path())?;
        } else {
            remove_file_if_exists(entry.path())?;
            removed += 1;
        }
    }

    log_status(
        verbose,
        "CLEAN",
        format!("removed {removed} file(s) from {}", destination.display()),
    );
    Ok(removed)
}

fn remove_file_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(_) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err).with_context(|| format!("failed to remove {}", path.display())),
    }
}

fn remove_dir_if_empty(path: &Path) -> Result<()> {
    match fs::remove_dir(path) {
        Ok(_) => Ok(()),
        Err(err)
            if err.kind() == ErrorKind::NotFound || err.kind() == ErrorKind::DirectoryNotEmpty =>
        {
            Ok(())
        }
        Err(err) => {
            Err(err).with_context(|| format!("failed to remove directory {}", path.display()))
        }
    }
}
