use std::sync::mpsc;
use std::thread;
use std::time::Instant;

use anyhow::Result;

use super::open_engine;
use crate::cli::BuildArgs;

pub fn run_build_command(args: BuildArgs) -> Result<()> {
    let started = Instant::now();
    let engine = open_engine(&args.site, args.incremental)?;
    let stats = engine.write()?;

    let snapshot = engine.snapshot();
    let destination = snapshot.site.destination();
    println!(
        "Wrote {} file(s) to {} in {:.2?}",
        stats.files(),
        destination.display(),
        started.elapsed()
    );

    if !args.watch {
        return Ok(());
    }

    let (status_tx, status_rx) = mpsc::channel::<String>();
    thread::spawn(move || {
        for line in status_rx {
            println!("[jkl] {line}");
        }
    });
    engine.watch(status_tx)
}
