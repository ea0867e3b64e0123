use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "jkl", version)]
#[command(
    about = "Build Jekyll-style sites into static files",
    long_about = "jkl reads a Jekyll-style source tree (front matter, collections, layouts, \n\
includes, Markdown and Sass) and writes a static site into the destination directory.\n\
Use watch mode to rebuild as sources change."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn build() -> Self {
        <Self as Parser>::parse()
    }
}

#[derive(Subcommand, Clone, Debug)]
pub enum Command {
    #[command(
        about = "Render the site into the destination directory",
        long_about = "Read every document, render it through templates, Markdown and layouts, and write\n\
the result to the destination directory. Stale files in the destination are removed first;\n\
entries listed under keep_files survive."
    )]
    Build(BuildArgs),
    #[command(
        about = "Remove generated files from the destination directory",
        long_about = "Delete everything under the destination directory except keep_files entries,\n\
then remove the directories left empty."
    )]
    Clean(SiteArgs),
    #[command(
        about = "Print one rendered document",
        long_about = "Render a single document and print it to stdout. The target may be a source path\n\
relative to the site root (about.md) or an output URL (/about.html)."
    )]
    Render(RenderArgs),
    #[command(
        about = "List every output URL and its source file",
        long_about = "Print the routing table of the site: one line per output URL with the source\n\
path it is produced from. Warnings about conflicting URLs are printed to stderr."
    )]
    Routes(SiteArgs),
}

#[derive(Args, Clone, Debug, Default)]
pub struct SiteArgs {
    #[arg(
        long,
        short = 's',
        help = "Site source directory (defaults to the nearest directory with _config.yml)",
        long_help = "Directory holding the site sources. When omitted, jkl walks upwards from the\n\
current directory to the first one containing _config.yml, falling back to the current directory."
    )]
    pub source: Option<PathBuf>,
    #[arg(
        long,
        short = 'd',
        help = "Destination directory (overrides _config.yml)",
        long_help = "Directory the generated site is written to. Relative paths are resolved against\n\
the source directory. Overrides the destination key of _config.yml."
    )]
    pub destination: Option<PathBuf>,
    #[arg(
        long,
        help = "Include posts from _drafts",
        long_help = "Read documents from _drafts into the posts collection, dated by their\n\
modification time."
    )]
    pub drafts: bool,
    #[arg(
        long,
        short = 'v',
        help = "Print progress for every step",
        long_help = "Print each processing step, written file and warning as it happens."
    )]
    pub verbose: bool,
}

#[derive(Args, Clone, Debug)]
pub struct BuildArgs {
    #[command(flatten)]
    pub site: SiteArgs,
    #[arg(
        long,
        short = 'I',
        help = "Patch the current site on changes instead of reloading it",
        long_help = "Enable incremental rebuilds in watch mode: edits to existing documents re-read only\n\
those documents. Changes to configuration, data, includes, layouts or Sass partials still reload\n\
the whole site."
    )]
    pub incremental: bool,
    #[arg(
        long,
        short = 'w',
        help = "Keep running and rebuild when sources change",
        long_help = "After the initial build, watch the source directory and rebuild after each burst of\n\
changes. Stop with Ctrl-C."
    )]
    pub watch: bool,
}

#[derive(Args, Clone, Debug)]
pub struct RenderArgs {
    #[command(flatten)]
    pub site: SiteArgs,
    #[arg(
        help = "Source path or output URL of the document to render",
        long_help = "Either a path relative to the site root (about.md, _posts/2024-01-01-hello.md)\n\
or an output URL (/about.html, /2024/01/01/hello.html)."
    )]
    pub target: String,
}
