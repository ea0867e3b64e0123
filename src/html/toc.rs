//! `{:toc}` expansion over rendered HTML.
//!
//! The marker is honoured only as the sole content of an item in an
//! unordered list; there the whole list is swapped for a nested index of the
//! document's headings. Everywhere else (code, ordered lists, paragraphs,
//! list items with other content) it stays literal text.

use std::fmt::Write as _;
use std::ops::RangeInclusive;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use kuchikikiki::NodeRef;
use kuchikikiki::traits::TendrilSink;
use regex::Regex;

use super::escape_text;

static MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{:\s*toc\s*\}").expect("toc marker regex"));
static NO_TOC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\{:\s*\.no_toc\s*\}$").expect("no_toc marker regex"));

const PLACEHOLDER: &str = "\u{E000}markdown-toc\u{E000}";

enum Placement {
    Code,
    SoleListItem(NodeRef),
    OrderedList,
    NotSole,
    Standalone,
}

struct Heading {
    level: u8,
    id: Option<String>,
    text: String,
    children: Vec<usize>,
}

pub fn process(html: &str, levels: RangeInclusive<u8>) -> Result<String> {
    if !MARKER.is_match(html) {
        return Ok(html.to_string());
    }

    let document = kuchikikiki::parse_html().one(html);
    let mut lists: Vec<NodeRef> = Vec::new();
    for node in document.descendants() {
        let is_marker = node
            .as_text()
            .is_some_and(|text| is_lone_marker(&text.borrow()));
        if !is_marker {
            continue;
        }
        if let Placement::SoleListItem(list) = classify(&node)
            && !lists.contains(&list)
        {
            lists.push(list);
        }
    }
    if lists.is_empty() {
        return Ok(html.to_string());
    }

    let (headings, roots) = collect_headings(&document, &levels);
    let mut markup = String::new();
    render_list(&headings, &roots, true, &mut markup);

    for list in &lists {
        list.insert_before(NodeRef::new_text(PLACEHOLDER));
        list.detach();
    }

    let mut out = Vec::with_capacity(html.len() + markup.len());
    write_unwrapped(&document, &mut out).context("failed to serialize table of contents")?;
    let serialized =
        String::from_utf8(out).context("table of contents produced invalid UTF-8")?;
    Ok(serialized.replace(PLACEHOLDER, &markup))
}

/// Text holding the marker and nothing but whitespace around it.
fn is_lone_marker(text: &str) -> bool {
    MARKER.is_match(text) && MARKER.replace_all(text, "").trim().is_empty()
}

fn classify(text: &NodeRef) -> Placement {
    let in_code = text.ancestors().any(|ancestor| {
        ancestor
            .as_element()
            .is_some_and(|element| matches!(&*element.name.local, "pre" | "code"))
    });
    if in_code {
        return Placement::Code;
    }

    let mut sole = true;
    let mut current = text.clone();
    for ancestor in text.ancestors() {
        sole &= ancestor
            .children()
            .filter(|sibling| *sibling != current)
            .all(|sibling| sibling.text_contents().trim().is_empty());

        let is_item = ancestor
            .as_element()
            .is_some_and(|element| &*element.name.local == "li");
        if is_item {
            let Some(list) = ancestor.parent() else {
                return Placement::Standalone;
            };
            let kind = list
                .as_element()
                .map(|element| element.name.local.to_string());
            return match kind.as_deref() {
                Some("ul") if sole => Placement::SoleListItem(list),
                Some("ul") => Placement::NotSole,
                Some("ol") => Placement::OrderedList,
                _ => Placement::Standalone,
            };
        }
        current = ancestor;
    }
    Placement::Standalone
}

fn collect_headings(
    document: &NodeRef,
    levels: &RangeInclusive<u8>,
) -> (Vec<Heading>, Vec<usize>) {
    let mut headings: Vec<Heading> = Vec::new();
    let mut roots = Vec::new();
    let mut stack: Vec<usize> = Vec::new();

    for node in document.descendants() {
        let Some(level) = heading_level(&node) else {
            continue;
        };
        if !levels.contains(&level) || is_excluded(&node) {
            continue;
        }

        let index = headings.len();
        headings.push(Heading {
            level,
            id: heading_id(&node),
            text: node.text_contents().trim().to_string(),
            children: Vec::new(),
        });

        while stack.last().is_some_and(|&top| headings[top].level >= level) {
            stack.pop();
        }
        match stack.last() {
            Some(&parent) => headings[parent].children.push(index),
            None => roots.push(index),
        }
        stack.push(index);
    }

    (headings, roots)
}

fn heading_level(node: &NodeRef) -> Option<u8> {
    let element = node.as_element()?;
    match &*element.name.local {
        "h1" => Some(1),
        "h2" => Some(2),
        "h3" => Some(3),
        "h4" => Some(4),
        "h5" => Some(5),
        "h6" => Some(6),
        _ => None,
    }
}

/// A heading is left out when the next element is a paragraph holding only `{:.no_toc}`.
fn is_excluded(heading: &NodeRef) -> bool {
    let mut sibling = heading.next_sibling();
    while let Some(node) = sibling {
        if let Some(element) = node.as_element() {
            return &*element.name.local == "p"
                && NO_TOC.is_match(node.text_contents().trim());
        }
        if !node.text_contents().trim().is_empty() {
            return false;
        }
        sibling = node.next_sibling();
    }
    false
}

fn heading_id(heading: &NodeRef) -> Option<String> {
    heading.inclusive_descendants().find_map(|node| {
        let element = node.as_element()?;
        let attributes = element.attributes.borrow();
        let id = attributes.get("id")?;
        (!id.is_empty()).then(|| id.to_string())
    })
}

fn render_list(headings: &[Heading], indices: &[usize], top: bool, out: &mut String) {
    out.push_str(if top {
        "<ul id=\"markdown-toc\">\n"
    } else {
        "<ul>\n"
    });
    for &index in indices {
        let heading = &headings[index];
        let text = escape_text(&heading.text);
        out.push_str("<li>");
        match &heading.id {
            Some(id) => {
                let id = escape_text(id);
                let _ = write!(out, "<a href=\"#{id}\" id=\"markdown-toc-{id}\">{text}</a>");
            }
            None => out.push_str(&text),
        }
        if !heading.children.is_empty() {
            out.push('\n');
            render_list(headings, &heading.children, false, out);
            out.push('\n');
        }
        out.push_str("</li>\n");
    }
    out.push_str("</ul>");
}

/// Serializes the parsed fragment without the `html`/`head`/`body` wrappers
/// the parser synthesised around it.
fn write_unwrapped(node: &NodeRef, out: &mut Vec<u8>) -> std::io::Result<()> {
    for child in node.children() {
        let wrapper = child
            .as_element()
            .is_some_and(|element| matches!(&*element.name.local, "html" | "head" | "body"));
        if wrapper {
            write_unwrapped(&child, out)?;
        } else {
            child.serialize(out)?;
        }
    }
    Ok(())
}
