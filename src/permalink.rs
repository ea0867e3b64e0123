use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use thiserror::Error;
use time::OffsetDateTime;

use crate::utils::{clean_url_path, slugify};

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r":([A-Za-z_][A-Za-z0-9_]*)").expect("placeholder regex"));

#[derive(Debug, Error, PartialEq)]
pub enum PermalinkError {
    #[error("unknown variable ':{name}' in permalink pattern '{pattern}'")]
    UnknownVariable { name: String, pattern: String },
}

/// Expands a named style to its pattern; anything else is already a pattern.
pub fn style_pattern(style: &str) -> &str {
    match style {
        "date" => "/:categories/:year/:month/:day/:title:output_ext",
        "pretty" => "/:categories/:year/:month/:day/:title/",
        "ordinal" => "/:categories/:year/:y_day/:title:output_ext",
        "weekdate" => "/:categories/:year/W:week/:short_day/:title:output_ext",
        "none" => "/:categories/:title:output_ext",
        other => other,
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PermalinkVariables(BTreeMap<String, String>);

impl PermalinkVariables {
    pub fn insert(&mut self, name: &str, value: impl Into<String>) {
        self.0.insert(name.to_string(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }
}

/// Per-document inputs to the placeholder table.
pub struct PermalinkSource<'a> {
    /// Path below the site root (pages) or collection directory, without extension.
    pub path: &'a str,
    /// File name without extension and without a posts date prefix.
    pub name: &'a str,
    pub slug: Option<&'a str>,
    pub collection: &'a str,
    pub categories: &'a [String],
    pub output_ext: &'a str,
    pub date: OffsetDateTime,
}

impl PermalinkSource<'_> {
    pub fn variables(&self) -> PermalinkVariables {
        let mut vars = PermalinkVariables::default();
        let name_slug = slugify(self.name);
        let slug = self
            .slug
            .map(slugify)
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| name_slug.clone());

        let mut categories: Vec<String> = self
            .categories
            .iter()
            .map(|category| slugify(category))
            .filter(|category| !category.is_empty())
            .collect();
        categories.sort();
        categories.dedup();

        vars.insert("path", self.path.trim_start_matches('/'));
        vars.insert("name", name_slug);
        vars.insert("title", slug.clone());
        vars.insert("slug", slug);
        vars.insert("collection", self.collection);
        vars.insert("categories", categories.join("/"));
        vars.insert("output_ext", self.output_ext);

        let date = self.date;
        vars.insert("year", format!("{:04}", date.year()));
        vars.insert("short_year", format!("{:02}", date.year().rem_euclid(100)));
        vars.insert("month", format!("{:02}", u8::from(date.month())));
        vars.insert("i_month", u8::from(date.month()).to_string());
        vars.insert("day", format!("{:02}", date.day()));
        vars.insert("i_day", date.day().to_string());
        vars.insert("hour", format!("{:02}", date.hour()));
        vars.insert("minute", format!("{:02}", date.minute()));
        vars.insert("second", format!("{:02}", date.second()));
        vars.insert("y_day", format!("{:03}", date.ordinal()));
        vars.insert("week", format!("{:02}", date.iso_week()));
        vars.insert(
            "short_day",
            date.weekday().to_string().chars().take(3).collect::<String>(),
        );
        vars
    }
}

/// Substitutes every `:name` placeholder and normalises the result.
pub fn resolve(pattern: &str, vars: &PermalinkVariables) -> Result<String, PermalinkError> {
    let pattern = style_pattern(pattern);
    let mut missing = None;
    let expanded = PLACEHOLDER.replace_all(pattern, |caps: &Captures<'_>| {
        let name = &caps[1];
        match vars.get(name) {
            Some(value) => value.to_string(),
            None => {
                missing.get_or_insert_with(|| name.to_string());
                String::new()
            }
        }
    });

    if let Some(name) = missing {
        return Err(PermalinkError::UnknownVariable {
            name,
            pattern: pattern.to_string(),
        });
    }

    Ok(clean_url_path(&expanded))
}
