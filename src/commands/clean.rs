use anyhow::Result;

use super::open_engine;
use crate::cli::SiteArgs;

pub fn run_clean_command(args: SiteArgs) -> Result<()> {
    let engine = open_engine(&args, false)?;
    let removed = engine.clean()?;
    let destination = engine.snapshot().site.destination();

    match removed {
        0 => println!("Nothing to remove in {}.", destination.display()),
        count => println!("Removed {count} file(s) from {}.", destination.display()),
    }
    Ok(())
}
