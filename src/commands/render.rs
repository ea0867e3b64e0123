use std::fs;
use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{Context, Result};

use super::open_engine;
use crate::cli::RenderArgs;
use crate::content::{Document, Site};

pub fn run_render_command(args: RenderArgs) -> Result<()> {
    let engine = open_engine(&args.site, false)?;
    let snapshot = engine.snapshot();
    let document = find_document(&snapshot.site, &args.target).with_context(|| {
        format!(
            "'{}' is neither a source path nor an output URL of this site",
            args.target
        )
    })?;

    let bytes = if document.is_static() {
        fs::read(&document.source_path)
            .with_context(|| format!("failed to read {}", document.source_path.display()))?
    } else {
        snapshot.pipeline.render(document)?.as_bytes().to_vec()
    };

    let mut stdout = io::stdout().lock();
    stdout
        .write_all(&bytes)
        .context("failed to write to stdout")?;
    stdout.flush().context("failed to write to stdout")
}

/// Looks `target` up as an output URL first, then as a source path.
fn find_document<'s>(site: &'s Site, target: &str) -> Option<&'s Arc<Document>> {
    let target = target.trim();
    if target.starts_with('/') {
        if let Some(document) = site.routes.get(target) {
            return Some(document);
        }
        if let Some(directory) = target.strip_suffix("index.html")
            && let Some(document) = site.routes.get(directory)
        {
            return Some(document);
        }
        if !target.ends_with('/')
            && let Some(document) = site.routes.get(&format!("{target}/"))
        {
            return Some(document);
        }
    }
    site.document(target.trim_start_matches("./"))
}
