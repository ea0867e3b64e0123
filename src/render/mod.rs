mod layout;
mod sass;

#[cfg(test)]
mod tests;

use std::ops::RangeInclusive;

use anyhow::{Context, Result, bail};
use minijinja::{Environment, Value, context};

use crate::cache::ContentCache;
use crate::config::Config;
use crate::content::{Document, DocumentKind, DynamicContent, Site};
use crate::html::toc;
use crate::markdown::render_markdown;
use crate::template::{self, render_source};

use layout::Layouts;
use sass::SassCompiler;

pub use layout::{LayoutError, MAX_LAYOUT_DEPTH};

/// Everything needed to turn one snapshot's documents into output bytes.
/// Built once per snapshot; site bindings are frozen at construction.
pub struct Pipeline {
    config: Config,
    env: Environment<'static>,
    site: Value,
    cache: ContentCache,
    sass: SassCompiler,
    layouts: Layouts,
    toc_levels: RangeInclusive<u8>,
}

impl Pipeline {
    pub fn new(site: &Site, cache: ContentCache) -> Result<Self> {
        let config = site.config.clone();
        let env = template::environment(&config, &config.includes_dirs(&site.root))?;
        let sass = SassCompiler::new(config.sass_dirs(&site.root))?;
        let layouts = Layouts::new(&site.root, config.layouts_dirs(&site.root));
        let toc_levels = config.toc.min_level..=config.toc.max_level;

        Ok(Self {
            env,
            site: Value::from_serialize(site.bindings()),
            cache,
            sass,
            layouts,
            toc_levels,
            config,
        })
    }

    /// Output for a dynamic document. Computed at most once per snapshot;
    /// failures are not remembered.
    pub fn render<'d>(&self, document: &'d Document) -> Result<&'d str> {
        let DocumentKind::Dynamic(content) = &document.kind else {
            bail!(
                "{} has no front matter; it is copied, not rendered",
                document.relative_path
            );
        };
        if let Some(rendered) = content.rendered() {
            return Ok(rendered);
        }

        let output = self
            .materialize(document, content)
            .with_context(|| format!("failed to render {}", document.relative_path))?;
        Ok(content.remember(output))
    }

    fn materialize(&self, document: &Document, content: &DynamicContent) -> Result<String> {
        if document.is_sass() {
            return self
                .sass
                .compile(&self.cache, &document.relative_path, &content.body);
        }

        let page = Value::from_serialize(document.to_binding());
        let bindings = context! {
            page => &page,
            site => &self.site,
        };
        let mut output = render_source(
            &self.env,
            &document.relative_path,
            &content.body,
            &bindings,
            content.body_line,
        )?;

        if self.config.is_markdown(&document.relative_path) {
            let html = render_markdown(&output)?;
            output = toc::process(&html, self.toc_levels.clone())?;
        }

        match document.front_matter_str("layout") {
            Some(name) if !layout::is_none(name) => {
                self.layouts
                    .apply(&self.env, name, output, &page, &self.site)
            }
            _ => Ok(output),
        }
    }
}
