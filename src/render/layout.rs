use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use minijinja::{Environment, Value, context};
use serde_json::{Map as JsonMap, Value as JsonValue};
use thiserror::Error;

use crate::content::parse_front_matter;
use crate::template::render_source;
use crate::utils::normalize_path;

/// Longest layout chain followed before giving up.
pub const MAX_LAYOUT_DEPTH: usize = 32;

const EXTENSIONS: [&str; 3] = ["html", "htm", "xml"];

#[derive(Debug, Error, PartialEq)]
pub enum LayoutError {
    #[error("layout '{name}' not found in {searched}")]
    Missing { name: String, searched: String },
    #[error("layout chain from '{start}' reached '{name}' again or exceeded {limit} steps; check for a cycle")]
    CycleSuspected {
        start: String,
        name: String,
        limit: usize,
    },
}

struct Layout {
    template_name: String,
    front_matter: JsonMap<String, JsonValue>,
    body: String,
    body_line: usize,
}

/// Layout lookup over the site and theme layout directories. Files are read
/// on every use.
pub(super) struct Layouts {
    root: PathBuf,
    dirs: Vec<PathBuf>,
}

impl Layouts {
    pub fn new(root: &Path, dirs: Vec<PathBuf>) -> Self {
        Self {
            root: root.to_path_buf(),
            dirs,
        }
    }

    fn locate(&self, name: &str) -> Option<PathBuf> {
        let has_extension = Path::new(name).extension().is_some();
        for dir in &self.dirs {
            if has_extension {
                let exact = dir.join(name);
                if exact.is_file() {
                    return Some(exact);
                }
            }
            for ext in EXTENSIONS {
                let candidate = dir.join(format!("{name}.{ext}"));
                if candidate.is_file() {
                    return Some(candidate);
                }
            }
        }
        None
    }

    fn load(&self, name: &str) -> Result<Layout> {
        let Some(path) = self.locate(name) else {
            let searched = self
                .dirs
                .iter()
                .map(|dir| dir.display().to_string())
                .collect::<Vec<_>>()
                .join(", ");
            return Err(LayoutError::Missing {
                name: name.to_string(),
                searched,
            }
            .into());
        };

        let raw = fs::read_to_string(&path)
            .with_context(|| format!("failed to read layout {}", path.display()))?;
        let template_name = path
            .strip_prefix(&self.root)
            .map(normalize_path)
            .unwrap_or_else(|_| path.display().to_string());

        let layout = match parse_front_matter(&raw)
            .with_context(|| format!("{}: invalid front matter", path.display()))?
        {
            Some(front) => Layout {
                template_name,
                front_matter: front.values,
                body: front.body.to_string(),
                body_line: front.body_line,
            },
            None => Layout {
                template_name,
                front_matter: JsonMap::new(),
                body: raw,
                body_line: 1,
            },
        };
        Ok(layout)
    }

    /// Wraps `content` in `start` and every layout it names in turn.
    pub fn apply(
        &self,
        env: &Environment<'static>,
        start: &str,
        mut content: String,
        page: &Value,
        site: &Value,
    ) -> Result<String> {
        let mut visited = HashSet::new();
        let mut next = Some(start.to_string());

        while let Some(name) = next.take() {
            if is_none(&name) {
                break;
            }
            if visited.len() >= MAX_LAYOUT_DEPTH || !visited.insert(name.clone()) {
                return Err(LayoutError::CycleSuspected {
                    start: start.to_string(),
                    name,
                    limit: MAX_LAYOUT_DEPTH,
                }
                .into());
            }

            let layout = self.load(&name)?;
            let bindings = context! {
                page => page,
                site => site,
                content => content,
                layout => Value::from_serialize(&layout.front_matter),
            };
            content = render_source(
                env,
                &layout.template_name,
                &layout.body,
                &bindings,
                layout.body_line,
            )?;
            next = layout
                .front_matter
                .get("layout")
                .and_then(JsonValue::as_str)
                .map(str::to_string);
        }

        Ok(content)
    }
}

/// `layout: none` and an empty name turn layouts off.
pub(super) fn is_none(name: &str) -> bool {
    let name = name.trim();
    name.is_empty() || name == "none" || name == "null"
}
