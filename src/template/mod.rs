mod filters;

use std::error::Error as StdError;
use std::fmt::Write;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use minijinja::value::Value;
use minijinja::{AutoEscape, Environment, Error as TemplateError};
use walkdir::WalkDir;

use crate::config::Config;
use crate::utils::normalize_path;

use filters::FilterContext;

/// Template environment with includes registered by their path relative to
/// the includes directory. Earlier directories take priority.
pub fn environment(config: &Config, includes_dirs: &[PathBuf]) -> Result<Environment<'static>> {
    let mut env = Environment::new();
    env.set_auto_escape_callback(|_| AutoEscape::None);
    env.set_keep_trailing_newline(true);

    for dir in includes_dirs.iter().rev() {
        load_includes(dir, &mut env)?;
    }

    filters::register(
        &mut env,
        FilterContext {
            url: config.url.trim_end_matches('/').to_string(),
            baseurl: config.baseurl.clone(),
            offset: config.offset()?,
        },
    );
    Ok(env)
}

fn load_includes(dir: &Path, env: &mut Environment<'static>) -> Result<()> {
    if !dir.is_dir() {
        return Ok(());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir) {
        let entry = entry.with_context(|| format!("failed to walk {}", dir.display()))?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    files.sort();

    for path in files {
        let body = fs::read_to_string(&path)
            .with_context(|| format!("failed to read include {}", path.display()))?;
        let relative = path
            .strip_prefix(dir)
            .with_context(|| format!("{} is outside {}", path.display(), dir.display()))?;
        let name = normalize_path(relative);
        env.add_template_owned(name.clone(), body)
            .map_err(|err| describe_template_error("include", &name, err, 0))?;
    }
    Ok(())
}

/// Evaluates `source` as a template named `name`. `first_line` is the line
/// of the source file the template text starts on.
pub fn render_source(
    env: &Environment<'static>,
    name: &str,
    source: &str,
    context: &Value,
    first_line: usize,
) -> Result<String> {
    env.render_named_str(name, source, context)
        .map_err(|err| describe_template_error("render", name, err, first_line.saturating_sub(1)))
}

pub fn describe_template_error(
    scope: &str,
    template_name: &str,
    err: TemplateError,
    line_offset: usize,
) -> anyhow::Error {
    let actual_template = err.name().unwrap_or(template_name).to_string();
    let kind = err.kind();
    let detail = err.detail().map(str::to_string);
    let summary = err.to_string();
    let nested = StdError::source(&err).map(|source| source.to_string());

    let mut message = String::new();
    let _ = write!(&mut message, "{}: template '{}'", scope, actual_template);

    if actual_template != template_name {
        let _ = write!(&mut message, " (included from '{}')", template_name);
    }

    if let Some(line_no) = err.line() {
        let line = if actual_template == template_name {
            line_no + line_offset
        } else {
            line_no
        };
        let _ = write!(&mut message, " at line {}", line);
    }

    let _ = write!(&mut message, "\nkind: {:?}", kind);
    let payload = detail.unwrap_or(summary);
    let _ = write!(&mut message, "\nmessage: {}", payload);

    if let Some(source) = nested {
        let _ = write!(&mut message, "\ncaused by: {}", source);
    }

    anyhow!(message)
}
