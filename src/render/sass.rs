use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use blake3::Hasher;
use grass::{InputSyntax, Options, OutputStyle};
use walkdir::WalkDir;

use crate::cache::ContentCache;
use crate::config::extension_of;

/// Compiles `.scss`/`.sass` documents against the partial directories.
pub(super) struct SassCompiler {
    load_paths: Vec<PathBuf>,
    /// Digest of every partial and the load path list. Part of each cache key,
    /// so editing a partial invalidates all compiled sheets.
    digest: String,
}

impl SassCompiler {
    pub fn new(load_paths: Vec<PathBuf>) -> Result<Self> {
        let mut hasher = Hasher::new();
        for dir in &load_paths {
            hasher.update(dir.to_string_lossy().as_bytes());
            hasher.update(b"\0");
            if !dir.is_dir() {
                continue;
            }
            for entry in WalkDir::new(dir).sort_by_file_name() {
                let entry = entry.with_context(|| format!("failed to walk {}", dir.display()))?;
                if !entry.file_type().is_file() {
                    continue;
                }
                let bytes = fs::read(entry.path())
                    .with_context(|| format!("failed to read {}", entry.path().display()))?;
                hasher.update(entry.path().to_string_lossy().as_bytes());
                hasher.update(&bytes);
            }
        }
        Ok(Self {
            load_paths,
            digest: hasher.finalize().to_hex().to_string(),
        })
    }

    pub fn compile(&self, cache: &ContentCache, relative: &str, source: &str) -> Result<String> {
        let (syntax, label) = match extension_of(relative) {
            Some(ext) if ext.eq_ignore_ascii_case("sass") => (InputSyntax::Sass, "sass"),
            _ => (InputSyntax::Scss, "scss"),
        };
        let header = format!("{label}:{}", self.digest);

        let css = cache.with_cache(&header, source.as_bytes(), || {
            let options = Options::default()
                .style(OutputStyle::Expanded)
                .input_syntax(syntax)
                .load_paths(&self.load_paths)
                .quiet(true);
            grass::from_string(source.to_string(), &options)
                .map(String::into_bytes)
                .map_err(|err| anyhow!("{relative}: sass: {err}"))
        })?;

        String::from_utf8(css).with_context(|| format!("{relative}: compiled CSS is not UTF-8"))
    }
}
