//! A byte-offset HTML tokenizer that never rewrites its input.
//!
//! Every token carries the exact slice it was read from, so a caller can
//! copy untouched markup through verbatim and only rebuild the tags it
//! actually changes.

use std::ops::Range;

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style", "textarea", "title"];

#[derive(Debug, Clone, PartialEq)]
pub struct Attribute<'a> {
    pub name: &'a str,
    pub value: Option<&'a str>,
    /// Byte range inside the tag's raw text, leading whitespace included.
    pub span: Range<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tag<'a> {
    pub name: String,
    pub attributes: Vec<Attribute<'a>>,
    pub self_closing: bool,
}

impl<'a> Tag<'a> {
    pub fn attribute(&self, name: &str) -> Option<&Attribute<'a>> {
        self.attributes
            .iter()
            .find(|attr| attr.name.eq_ignore_ascii_case(name))
    }

    pub fn is_void(&self) -> bool {
        VOID_ELEMENTS.contains(&self.name.as_str())
    }

    /// Whether the tag opens an element that needs a matching end tag.
    /// Autolinks such as `<user@example.com>` or `<https://…>` are not elements.
    pub fn is_countable(&self) -> bool {
        !self.self_closing && !self.is_void() && is_element_name(&self.name)
    }
}

pub fn is_element_name(name: &str) -> bool {
    !name.contains('@') && !name.contains(':')
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind<'a> {
    Text,
    StartTag(Tag<'a>),
    EndTag(String),
    Comment,
    Doctype,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token<'a> {
    pub kind: TokenKind<'a>,
    pub raw: &'a str,
    pub start: usize,
}

impl Token<'_> {
    pub fn end(&self) -> usize {
        self.start + self.raw.len()
    }
}

pub struct Tokenizer<'a> {
    src: &'a str,
    pos: usize,
    raw_text: Option<String>,
}

impl<'a> Tokenizer<'a> {
    pub fn new(src: &'a str) -> Self {
        Self {
            src,
            pos: 0,
            raw_text: None,
        }
    }

    fn token(&mut self, kind: TokenKind<'a>, end: usize) -> Token<'a> {
        let start = self.pos;
        self.pos = end;
        Token {
            kind,
            raw: &self.src[start..end],
            start,
        }
    }

    fn raw_text_token(&mut self, element: String) -> Option<Token<'a>> {
        let rest = &self.src[self.pos..];
        let closing = format!("</{element}");
        let end = find_ascii_case_insensitive(rest, &closing)
            .map(|offset| self.pos + offset)
            .unwrap_or(self.src.len());
        if end == self.pos {
            return None;
        }
        Some(self.token(TokenKind::Text, end))
    }

    fn text_token(&mut self) -> Token<'a> {
        let bytes = self.src.as_bytes();
        let mut end = self.pos + 1;
        while end < bytes.len() {
            if bytes[end] == b'<' && starts_markup(&bytes[end..]) {
                break;
            }
            end += 1;
        }
        self.token(TokenKind::Text, end)
    }

    fn markup_token(&mut self) -> Token<'a> {
        let rest = &self.src[self.pos..];
        if rest.starts_with("<!--") {
            let end = rest[4..]
                .find("-->")
                .map(|offset| self.pos + 4 + offset + 3)
                .unwrap_or(self.src.len());
            return self.token(TokenKind::Comment, end);
        }
        if rest.starts_with("<!") || rest.starts_with("<?") {
            let end = rest
                .find('>')
                .map(|offset| self.pos + offset + 1)
                .unwrap_or(self.src.len());
            return self.token(TokenKind::Doctype, end);
        }
        if let Some(after) = rest.strip_prefix("</") {
            let name_len = name_length(after);
            let name = after[..name_len].to_ascii_lowercase();
            let end = rest
                .find('>')
                .map(|offset| self.pos + offset + 1)
                .unwrap_or(self.src.len());
            return self.token(TokenKind::EndTag(name), end);
        }

        match parse_start_tag(rest) {
            Some((tag, len)) => {
                if !tag.self_closing && RAW_TEXT_ELEMENTS.contains(&tag.name.as_str()) {
                    self.raw_text = Some(tag.name.clone());
                }
                let end = self.pos + len;
                self.token(TokenKind::StartTag(tag), end)
            }
            // An unterminated tag is plain text up to the end of input.
            None => {
                let end = self.src.len();
                self.token(TokenKind::Text, end)
            }
        }
    }
}

impl<'a> Iterator for Tokenizer<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Token<'a>> {
        if let Some(element) = self.raw_text.take()
            && let Some(token) = self.raw_text_token(element)
        {
            return Some(token);
        }
        if self.pos >= self.src.len() {
            return None;
        }
        let bytes = &self.src.as_bytes()[self.pos..];
        if bytes[0] == b'<' && starts_markup(bytes) {
            Some(self.markup_token())
        } else {
            Some(self.text_token())
        }
    }
}

fn starts_markup(bytes: &[u8]) -> bool {
    match bytes.get(1) {
        Some(b'!') | Some(b'?') => true,
        Some(b'/') => bytes.get(2).is_some_and(u8::is_ascii_alphabetic),
        Some(next) => next.is_ascii_alphabetic(),
        None => false,
    }
}

fn name_length(input: &str) -> usize {
    input
        .find(|ch: char| ch.is_ascii_whitespace() || ch == '/' || ch == '>')
        .unwrap_or(input.len())
}

/// Parses `<name attr="v" ...>` at the start of `input`, returning the tag
/// and the number of bytes it spans.
fn parse_start_tag(input: &str) -> Option<(Tag<'_>, usize)> {
    let bytes = input.as_bytes();
    let name_len = name_length(&input[1..]);
    let name = input[1..1 + name_len].to_ascii_lowercase();
    let mut pos = 1 + name_len;
    let mut attributes = Vec::new();

    loop {
        let attr_start = pos;
        while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
            pos += 1;
        }
        match bytes.get(pos)? {
            b'>' => {
                return Some((
                    Tag {
                        name,
                        attributes,
                        self_closing: false,
                    },
                    pos + 1,
                ));
            }
            b'/' if bytes.get(pos + 1) == Some(&b'>') => {
                return Some((
                    Tag {
                        name,
                        attributes,
                        self_closing: true,
                    },
                    pos + 2,
                ));
            }
            b'/' => {
                pos += 1;
                continue;
            }
            _ => {}
        }

        let name_start = pos;
        while pos < bytes.len()
            && !bytes[pos].is_ascii_whitespace()
            && !matches!(bytes[pos], b'=' | b'>' | b'/')
        {
            pos += 1;
        }
        let attr_name = &input[name_start..pos];

        let mut lookahead = pos;
        while lookahead < bytes.len() && bytes[lookahead].is_ascii_whitespace() {
            lookahead += 1;
        }
        let mut value = None;
        if bytes.get(lookahead) == Some(&b'=') {
            pos = lookahead + 1;
            while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
                pos += 1;
            }
            match bytes.get(pos)? {
                quote @ (b'"' | b'\'') => {
                    let close = input[pos + 1..].find(*quote as char)?;
                    value = Some(&input[pos + 1..pos + 1 + close]);
                    pos += close + 2;
                }
                _ => {
                    let value_start = pos;
                    while pos < bytes.len()
                        && !bytes[pos].is_ascii_whitespace()
                        && bytes[pos] != b'>'
                    {
                        pos += 1;
                    }
                    value = Some(&input[value_start..pos]);
                }
            }
        }

        attributes.push(Attribute {
            name: attr_name,
            value,
            span: attr_start..pos,
        });
    }
}

fn find_ascii_case_insensitive(haystack: &str, needle: &str) -> Option<usize> {
    let needle = needle.as_bytes();
    haystack
        .as_bytes()
        .windows(needle.len())
        .position(|window| window.eq_ignore_ascii_case(needle))
}
