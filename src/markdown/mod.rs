mod attributes;

use anyhow::Result;
use comrak::{Options, markdown_to_html};

/// Converts Markdown to HTML, then expands any raw HTML element that asks
/// for its own content to be treated as Markdown.
pub fn render_markdown(markdown: &str) -> Result<String> {
    render_at_depth(markdown, 0)
}

fn render_at_depth(markdown: &str, depth: usize) -> Result<String> {
    let html = markdown_to_html(markdown, &options());
    attributes::process(&html, depth)
}

fn strip_paragraph(html: &str) -> String {
    let trimmed = html.trim_end_matches('\n');
    match trimmed
        .strip_prefix("<p>")
        .and_then(|inner| inner.strip_suffix("</p>"))
    {
        Some(inner) if !inner.contains("<p>") => inner.to_string(),
        _ => html.to_string(),
    }
}

fn options() -> Options<'static> {
    let mut options = Options::default();
    options.extension.table = true;
    options.extension.autolink = true;
    options.extension.tasklist = true;
    options.extension.strikethrough = true;
    options.extension.footnotes = true;
    options.extension.header_ids = Some(String::new());
    options.parse.smart = true;
    options.render.hardbreaks = false;
    options.render.github_pre_lang = true;
    options.render.r#unsafe = true;
    options.render.width = 0;
    options
}
