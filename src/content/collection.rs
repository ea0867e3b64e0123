use std::cmp::Ordering;
use std::sync::Arc;

use serde_json::Value as JsonValue;
use time::{Date, UtcOffset};
use time::macros::format_description;

use super::{Document, DocumentKind};
use crate::config::{Config, POSTS};

/// Per-collection behaviour, chosen once from the collection name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionKind {
    Default,
    Posts,
}

#[derive(Debug)]
pub struct Collection {
    pub name: String,
    pub output: bool,
    pub kind: CollectionKind,
    pub documents: Vec<Arc<Document>>,
}

pub(crate) struct PostName<'a> {
    pub date: Date,
    pub title: &'a str,
}

impl CollectionKind {
    pub fn for_name(name: &str) -> Self {
        if name == POSTS {
            CollectionKind::Posts
        } else {
            CollectionKind::Default
        }
    }

    pub fn default_permalink(self, config: &Config) -> String {
        match self {
            CollectionKind::Posts => config.permalink.clone(),
            CollectionKind::Default => "/:collection/:path:output_ext".to_string(),
        }
    }

    /// Splits `2024-03-05-hello-world` into its date and title. Only posts
    /// carry a date in their file name.
    pub(crate) fn parse_file_stem<'a>(self, stem: &'a str) -> Option<PostName<'a>> {
        if self != CollectionKind::Posts {
            return None;
        }
        let date_part = stem.get(..10)?;
        let title = stem.get(10..)?.strip_prefix('-')?;
        if title.is_empty() {
            return None;
        }
        let date = Date::parse(date_part, format_description!("[year]-[month]-[day]")).ok()?;
        Some(PostName { date, title })
    }

    /// Posts: newest first. Everything else keeps the order it was read in.
    pub(crate) fn sort(self, documents: &mut [Document]) {
        if self == CollectionKind::Posts {
            documents.sort_by(|left, right| match right.date.cmp(&left.date) {
                Ordering::Equal => right.relative_path.cmp(&left.relative_path),
                other => other,
            });
        }
    }

    /// Stores `previous` (older) and `next` (newer) summaries on each post.
    pub(crate) fn thread(self, documents: &mut [Document]) {
        if self != CollectionKind::Posts {
            return;
        }
        let summaries: Vec<JsonValue> = documents.iter().map(Document::summary).collect();
        for (index, document) in documents.iter_mut().enumerate() {
            let DocumentKind::Dynamic(content) = &mut document.kind else {
                continue;
            };
            let newer = index
                .checked_sub(1)
                .and_then(|newer| summaries.get(newer))
                .cloned()
                .unwrap_or(JsonValue::Null);
            let older = summaries.get(index + 1).cloned().unwrap_or(JsonValue::Null);
            content.front_matter.insert("next".into(), newer);
            content.front_matter.insert("previous".into(), older);
        }
    }
}

impl Collection {
    pub fn bindings(&self) -> Vec<JsonValue> {
        self.documents
            .iter()
            .filter(|document| !document.is_static())
            .map(|document| document.to_binding())
            .collect()
    }
}

/// Post titles default to the file name words, capitalised.
pub(crate) fn title_from_slug(slug: &str) -> String {
    slug.split(['-', '_'])
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub(crate) fn post_date(name: &PostName<'_>, offset: UtcOffset) -> time::OffsetDateTime {
    name.date.midnight().assume_offset(offset)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn posts_parse_dated_file_names() {
        let name = CollectionKind::Posts
            .parse_file_stem("2024-03-05-hello-world")
            .unwrap();
        assert_eq!(name.title, "hello-world");
        assert_eq!(name.date.to_string(), "2024-03-05");
    }

    #[test]
    fn undated_or_other_collections_have_no_date() {
        assert!(CollectionKind::Posts.parse_file_stem("hello-world").is_none());
        assert!(CollectionKind::Posts.parse_file_stem("2024-13-05-bad").is_none());
        assert!(CollectionKind::Posts.parse_file_stem("2024-03-05").is_none());
        assert!(
            CollectionKind::Default
                .parse_file_stem("2024-03-05-x")
                .is_none()
        );
    }

    #[test]
    fn titles_from_slugs() {
        assert_eq!(title_from_slug("hello-world"), "Hello World");
        assert_eq!(title_from_slug("rust_and-more"), "Rust And More");
    }
}
