mod build;
mod cache;
mod cli;
mod commands;
mod config;
mod content;
mod html;
mod markdown;
mod permalink;
mod render;
mod template;
mod utils;

fn main() {
    let app = cli::Cli::build();
    let outcome = commands::run(app.command);

    if let Err(problem) = outcome {
        eprintln!("{problem:#}");
        std::process::exit(1);
    }
}
