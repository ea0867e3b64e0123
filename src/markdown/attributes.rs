use anyhow::Result;
use thiserror::Error;

use super::{render_at_depth, strip_paragraph};
use crate::html::{TokenKind, Tokenizer, is_element_name};

const MARKER: &str = "markdown";
const MAX_DEPTH: usize = 32;

#[derive(Debug, Error, PartialEq)]
pub enum MarkdownAttributeError {
    #[error(
        "<{element} markdown> at byte {offset} is never closed; look for an element whose end tag \
         is missing (optional end tags such as </p> or </li> must be written out) or for \
         mismatched open and close tags"
    )]
    Unterminated { element: String, offset: usize },
    #[error("markdown attributes are nested more than {limit} levels deep")]
    TooDeep { limit: usize },
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Mode {
    Block,
    Span,
    Off,
}

impl Mode {
    fn from_value(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some("0") => Mode::Off,
            Some(value) if value.eq_ignore_ascii_case("span") => Mode::Span,
            _ => Mode::Block,
        }
    }
}

/// Finds elements carrying a `markdown` attribute, strips the attribute, and
/// replaces their content with its rendered form (unless the value is `0`).
pub(super) fn process(html: &str, depth: usize) -> Result<String> {
    if !html.contains(MARKER) {
        return Ok(html.to_string());
    }
    if depth >= MAX_DEPTH {
        return Err(MarkdownAttributeError::TooDeep { limit: MAX_DEPTH }.into());
    }

    let mut out = String::with_capacity(html.len());
    let mut tokens = Tokenizer::new(html);

    while let Some(token) = tokens.next() {
        let TokenKind::StartTag(tag) = &token.kind else {
            out.push_str(token.raw);
            continue;
        };
        let Some(marker) = tag.attribute(MARKER) else {
            out.push_str(token.raw);
            continue;
        };

        let mode = Mode::from_value(marker.value);
        out.push_str(&token.raw[..marker.span.start]);
        out.push_str(&token.raw[marker.span.end..]);
        if !tag.is_countable() {
            continue;
        }

        let inner_start = token.end();
        let mut nesting = 1usize;
        let mut closing = None;
        for inner in tokens.by_ref() {
            match &inner.kind {
                TokenKind::StartTag(child) if child.is_countable() => nesting += 1,
                TokenKind::EndTag(name) if is_element_name(name) => {
                    nesting -= 1;
                    if nesting == 0 {
                        closing = Some(inner);
                        break;
                    }
                }
                _ => {}
            }
        }
        let Some(closing) = closing else {
            return Err(MarkdownAttributeError::Unterminated {
                element: tag.name.clone(),
                offset: token.start,
            }
            .into());
        };

        let inner = &html[inner_start..closing.start];
        match mode {
            Mode::Off => out.push_str(inner),
            Mode::Block => out.push_str(&render_at_depth(inner, depth + 1)?),
            Mode::Span => out.push_str(&strip_paragraph(&render_at_depth(inner, depth + 1)?)),
        }
        out.push_str(closing.raw);
    }

    Ok(out)
}
