mod collection;
mod site;

use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result, bail};
use serde_json::{Map as JsonMap, Value as JsonValue};
use serde_yaml::Mapping;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime, UtcOffset};

use crate::config::{Config, extension_of, parse_timezone};

pub use collection::{Collection, CollectionKind};
pub use site::Site;

#[derive(Debug)]
pub struct Document {
    /// Forward-slash path below the site root.
    pub relative_path: String,
    pub source_path: PathBuf,
    pub collection: Option<String>,
    pub date: OffsetDateTime,
    pub output_ext: String,
    pub permalink: String,
    pub kind: DocumentKind,
}

#[derive(Debug)]
pub enum DocumentKind {
    Static,
    Dynamic(DynamicContent),
}

#[derive(Debug)]
pub struct DynamicContent {
    pub front_matter: JsonMap<String, JsonValue>,
    pub body: String,
    /// Line of the source file the body starts on.
    pub body_line: usize,
    rendered: OnceLock<String>,
}

impl DynamicContent {
    pub fn new(front_matter: JsonMap<String, JsonValue>, body: String, body_line: usize) -> Self {
        Self {
            front_matter,
            body,
            body_line,
            rendered: OnceLock::new(),
        }
    }

    pub fn rendered(&self) -> Option<&str> {
        self.rendered.get().map(String::as_str)
    }

    pub fn remember(&self, output: String) -> &str {
        self.rendered.get_or_init(|| output)
    }
}

impl Document {
    pub fn is_static(&self) -> bool {
        matches!(self.kind, DocumentKind::Static)
    }

    pub fn front_matter(&self) -> Option<&JsonMap<String, JsonValue>> {
        match &self.kind {
            DocumentKind::Dynamic(content) => Some(&content.front_matter),
            DocumentKind::Static => None,
        }
    }

    pub fn front_matter_str(&self, key: &str) -> Option<&str> {
        self.front_matter()?.get(key)?.as_str()
    }

    /// Copy of the document with an empty render memo.
    pub fn fresh(&self) -> Document {
        let kind = match &self.kind {
            DocumentKind::Static => DocumentKind::Static,
            DocumentKind::Dynamic(content) => DocumentKind::Dynamic(DynamicContent::new(
                content.front_matter.clone(),
                content.body.clone(),
                content.body_line,
            )),
        };
        Document {
            relative_path: self.relative_path.clone(),
            source_path: self.source_path.clone(),
            collection: self.collection.clone(),
            date: self.date,
            output_ext: self.output_ext.clone(),
            permalink: self.permalink.clone(),
            kind,
        }
    }

    /// Destination file for the permalink; directory URLs become `index.html`.
    pub fn output_path(&self, destination: &Path) -> PathBuf {
        let mut path = destination.to_path_buf();
        for segment in self.permalink.split('/').filter(|segment| !segment.is_empty()) {
            path.push(segment);
        }
        if self.permalink.ends_with('/') {
            path.push("index.html");
        }
        path
    }

    pub fn is_sass(&self) -> bool {
        matches!(extension_of(&self.relative_path), Some("scss" | "sass"))
    }

    pub fn categories(&self) -> Vec<String> {
        let Some(front) = self.front_matter() else {
            return Vec::new();
        };
        let mut categories = string_or_list(front.get("categories"));
        categories.extend(string_or_list(front.get("category")));
        categories
    }

    pub fn tags(&self) -> Vec<String> {
        self.front_matter()
            .map(|front| string_or_list(front.get("tags")))
            .unwrap_or_default()
    }

    pub fn title(&self) -> String {
        self.front_matter_str("title")
            .map(str::to_string)
            .unwrap_or_else(|| file_stem(&self.relative_path).to_string())
    }

    /// The `page` value templates see.
    pub fn to_binding(&self) -> JsonValue {
        let mut map = self.front_matter().cloned().unwrap_or_default();
        map.insert("url".into(), JsonValue::String(self.permalink.clone()));
        map.insert("path".into(), JsonValue::String(self.relative_path.clone()));
        map.insert(
            "name".into(),
            JsonValue::String(file_name(&self.relative_path).to_string()),
        );
        map.insert(
            "date".into(),
            self.date
                .format(&Rfc3339)
                .map(JsonValue::String)
                .unwrap_or(JsonValue::Null),
        );
        map.insert("categories".into(), string_array(self.categories()));
        map.insert("tags".into(), string_array(self.tags()));
        map.insert(
            "collection".into(),
            self.collection
                .clone()
                .map(JsonValue::String)
                .unwrap_or(JsonValue::Null),
        );
        JsonValue::Object(map)
    }

    /// Short form used for `previous`/`next` links.
    pub fn summary(&self) -> JsonValue {
        let mut map = JsonMap::new();
        map.insert("url".into(), JsonValue::String(self.permalink.clone()));
        map.insert("title".into(), JsonValue::String(self.title()));
        map.insert("path".into(), JsonValue::String(self.relative_path.clone()));
        if let Ok(date) = self.date.format(&Rfc3339) {
            map.insert("date".into(), JsonValue::String(date));
        }
        JsonValue::Object(map)
    }
}

pub(crate) struct FrontMatter<'a> {
    pub values: JsonMap<String, JsonValue>,
    pub body: &'a str,
    pub body_line: usize,
}

/// Whether the file opens with a `---` line.
pub(crate) fn has_front_matter(path: &Path) -> Result<bool> {
    let mut head = [0u8; 5];
    let mut file =
        File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut filled = 0;
    while filled < head.len() {
        let read = file
            .read(&mut head[filled..])
            .with_context(|| format!("failed to read {}", path.display()))?;
        if read == 0 {
            break;
        }
        filled += read;
    }
    let head = &head[..filled];
    Ok(head.starts_with(b"---\n") || head.starts_with(b"---\r\n"))
}

/// Splits a leading `---` block off `raw`. Returns `None` when there is none;
/// the body keeps its bytes exactly.
pub(crate) fn parse_front_matter(raw: &str) -> Result<Option<FrontMatter<'_>>> {
    let mut lines = raw.split_inclusive('\n');
    match lines.next() {
        Some(first) if first.trim_end() == "---" => {}
        _ => return Ok(None),
    }

    let yaml_start = raw.find('\n').map(|index| index + 1).unwrap_or(raw.len());
    let mut offset = yaml_start;
    let mut line_no = 1;
    for line in lines {
        line_no += 1;
        if matches!(line.trim_end(), "---" | "...") {
            let yaml = &raw[yaml_start..offset];
            let values = parse_yaml_mapping(yaml)?;
            return Ok(Some(FrontMatter {
                values,
                body: &raw[offset + line.len()..],
                body_line: line_no + 1,
            }));
        }
        offset += line.len();
    }

    bail!("front matter not terminated with ---")
}

fn parse_yaml_mapping(yaml: &str) -> Result<JsonMap<String, JsonValue>> {
    if yaml.trim().is_empty() {
        return Ok(JsonMap::new());
    }
    match serde_yaml::from_str::<serde_yaml::Value>(yaml)? {
        serde_yaml::Value::Null => Ok(JsonMap::new()),
        serde_yaml::Value::Mapping(mapping) => mapping_to_json_map(&mapping),
        _ => bail!("front matter must be a mapping of keys to values"),
    }
}

fn mapping_to_json_map(mapping: &Mapping) -> Result<JsonMap<String, JsonValue>> {
    let mut map = JsonMap::new();
    for (key, value) in mapping {
        let key = key
            .as_str()
            .with_context(|| format!("front matter key {key:?} is not a string"))?;
        let json = serde_json::to_value(value)
            .with_context(|| format!("failed to convert front matter value for '{key}'"))?;
        map.insert(key.to_string(), json);
    }
    Ok(map)
}

/// Parses front-matter and file-name dates. Values without an offset are
/// taken to be in the site timezone.
pub(crate) fn parse_date(value: &str, offset: UtcOffset) -> Result<OffsetDateTime> {
    let value = value.trim();
    if let Ok(datetime) = OffsetDateTime::parse(value, &Rfc3339) {
        return Ok(datetime);
    }

    let naive = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    if let Ok(datetime) = PrimitiveDateTime::parse(value, naive) {
        return Ok(datetime.assume_offset(offset));
    }

    if let Some((main, offset_part)) = value.rsplit_once(' ')
        && let Ok(datetime) = PrimitiveDateTime::parse(main, naive)
        && let Ok(explicit) = parse_timezone(offset_part)
    {
        return Ok(datetime.assume_offset(explicit));
    }

    let short = format_description!("[year]-[month]-[day] [hour]:[minute]");
    if let Ok(datetime) = PrimitiveDateTime::parse(value, short) {
        return Ok(datetime.assume_offset(offset));
    }

    if let Ok(date) = Date::parse(value, format_description!("[year]-[month]-[day]")) {
        return Ok(date.midnight().assume_offset(offset));
    }

    bail!(
        "date '{}' must be RFC3339, 'YYYY-MM-DD', 'YYYY-MM-DD HH:MM:SS', or 'YYYY-MM-DD HH:MM:SS ±HHMM'",
        value
    )
}

pub(crate) fn modified_time(path: &Path, offset: UtcOffset) -> Result<OffsetDateTime> {
    let modified = fs::metadata(path)
        .and_then(|metadata| metadata.modified())
        .with_context(|| format!("failed to read modification time of {}", path.display()))?;
    Ok(OffsetDateTime::from(modified).to_offset(offset))
}

pub(crate) fn output_ext(config: &Config, relative: &str) -> String {
    if config.is_markdown(relative) {
        return ".html".to_string();
    }
    match extension_of(relative) {
        Some(ext) if ext.eq_ignore_ascii_case("scss") || ext.eq_ignore_ascii_case("sass") => {
            ".css".to_string()
        }
        Some(ext) => format!(".{ext}"),
        None => String::new(),
    }
}

pub(crate) fn file_name(relative: &str) -> &str {
    relative.rsplit('/').next().unwrap_or(relative)
}

pub(crate) fn file_stem(relative: &str) -> &str {
    let name = file_name(relative);
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => name,
    }
}

/// Path without its extension: `notes/intro.md` becomes `notes/intro`.
pub(crate) fn strip_extension(relative: &str) -> &str {
    match extension_of(relative) {
        Some(ext) => &relative[..relative.len() - ext.len() - 1],
        None => relative,
    }
}

/// Front-matter lists may be written as a YAML list or a space-separated string.
pub(crate) fn string_or_list(value: Option<&JsonValue>) -> Vec<String> {
    match value {
        Some(JsonValue::String(text)) => text.split_whitespace().map(str::to_string).collect(),
        Some(JsonValue::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                JsonValue::String(text) => Some(text.trim().to_string()),
                JsonValue::Number(number) => Some(number.to_string()),
                _ => None,
            })
            .filter(|item| !item.is_empty())
            .collect(),
        Some(JsonValue::Number(number)) => vec![number.to_string()],
        _ => Vec::new(),
    }
}

fn string_array(items: Vec<String>) -> JsonValue {
    JsonValue::Array(items.into_iter().map(JsonValue::String).collect())
}

#[cfg(test)]
mod tests;
