use anyhow::Result;

use super::open_engine;
use crate::cli::SiteArgs;

pub fn run_routes_command(args: SiteArgs) -> Result<()> {
    let engine = open_engine(&args, false)?;
    let snapshot = engine.snapshot();

    let width = snapshot
        .site
        .routes
        .keys()
        .map(|url| url.len())
        .max()
        .unwrap_or(0);
    for (url, document) in &snapshot.site.routes {
        let kind = if document.is_static() { "static" } else { "page" };
        println!("{url:<width$}  {}  ({kind})", document.relative_path);
    }
    Ok(())
}
