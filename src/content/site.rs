use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::{Map as JsonMap, Value as JsonValue};
use time::format_description::well_known::Rfc3339;
use time::{OffsetDateTime, UtcOffset};
use walkdir::{DirEntry, WalkDir};

use super::collection::{post_date, title_from_slug};
use super::{
    Collection, CollectionKind, Document, DocumentKind, DynamicContent, file_stem,
    has_front_matter, modified_time, output_ext, parse_date, parse_front_matter, strip_extension,
};
use crate::build::excluded;
use crate::config::{CollectionConfig, Config, DRAFTS_DIR, POSTS};
use crate::permalink::{PermalinkSource, resolve};
use crate::utils::normalize_path;

/// One generation of the site: every document, its collections, and the
/// URL routing table. Snapshots are never mutated after construction.
#[derive(Debug)]
pub struct Site {
    pub root: PathBuf,
    pub config: Config,
    pub documents: Vec<Arc<Document>>,
    pub collections: Vec<Collection>,
    pub routes: BTreeMap<String, Arc<Document>>,
    pub data: JsonValue,
    pub time: OffsetDateTime,
    pub warnings: Vec<String>,
}

struct RawCollection {
    name: String,
    output: bool,
    kind: CollectionKind,
    documents: Vec<Document>,
}

#[derive(Clone, Copy)]
enum Origin<'a> {
    Page,
    Collection {
        name: &'a str,
        kind: CollectionKind,
        permalink: Option<&'a str>,
        draft: bool,
    },
}

impl Site {
    pub fn load(root: &Path, config: Config) -> Result<Self> {
        let reader = Reader::new(root, &config)?;
        let mut warnings = Vec::new();

        let pages = reader.read_pages(&mut warnings)?;
        let mut collections = Vec::new();
        for (name, collection) in config.collection_configs() {
            let documents = reader.read_collection(&name, &collection, &mut warnings)?;
            collections.push(RawCollection {
                kind: CollectionKind::for_name(&name),
                output: collection.output,
                name,
                documents,
            });
        }
        let data = load_data(root, &config)?;
        let time = reader.now;

        Ok(Self::assemble(
            root.to_path_buf(),
            config,
            pages,
            collections,
            data,
            time,
            warnings,
        ))
    }

    /// Next snapshot after `changed` documents were edited in place. Returns
    /// `None` when the change cannot be applied incrementally: an unknown
    /// path, a document that disappeared or became hidden, or a moved URL.
    pub fn patched(&self, changed: &[String]) -> Result<Option<Site>> {
        let changed: HashSet<&str> = changed.iter().map(String::as_str).collect();
        let known = |path: &str| {
            self.documents
                .iter()
                .any(|document| document.relative_path == path)
        };
        if !changed.iter().all(|path| known(*path)) {
            return Ok(None);
        }

        let reader = Reader::new(&self.root, &self.config)?;
        let mut warnings = Vec::new();
        let collection_configs = self.config.collection_configs();

        let refresh = |document: &Document, warnings: &mut Vec<String>| -> Result<Option<Document>> {
            if !changed.contains(document.relative_path.as_str()) {
                return Ok(Some(document.fresh()));
            }
            if !document.source_path.exists() {
                return Ok(None);
            }
            let origin = match &document.collection {
                None => Origin::Page,
                Some(name) => Origin::Collection {
                    name,
                    kind: CollectionKind::for_name(name),
                    permalink: collection_configs
                        .get(name)
                        .and_then(|config| config.permalink.as_deref()),
                    draft: document.relative_path.starts_with(&format!("{DRAFTS_DIR}/")),
                },
            };
            let reread = reader.read_document(&document.relative_path, origin, warnings)?;
            Ok(reread.filter(|fresh| fresh.permalink == document.permalink))
        };

        let mut pages = Vec::new();
        for document in self.documents.iter().filter(|doc| doc.collection.is_none()) {
            match refresh(document, &mut warnings)? {
                Some(fresh) => pages.push(fresh),
                None => return Ok(None),
            }
        }

        let mut collections = Vec::new();
        for collection in &self.collections {
            let mut documents = Vec::with_capacity(collection.documents.len());
            for document in &collection.documents {
                match refresh(document, &mut warnings)? {
                    Some(fresh) => documents.push(fresh),
                    None => return Ok(None),
                }
            }
            collections.push(RawCollection {
                name: collection.name.clone(),
                output: collection.output,
                kind: collection.kind,
                documents,
            });
        }

        Ok(Some(Self::assemble(
            self.root.clone(),
            self.config.clone(),
            pages,
            collections,
            self.data.clone(),
            reader.now,
            warnings,
        )))
    }

    fn assemble(
        root: PathBuf,
        config: Config,
        pages: Vec<Document>,
        raw_collections: Vec<RawCollection>,
        data: JsonValue,
        time: OffsetDateTime,
        mut warnings: Vec<String>,
    ) -> Self {
        let mut documents: Vec<Arc<Document>> = pages.into_iter().map(Arc::new).collect();
        let mut routed: Vec<Arc<Document>> = documents.clone();

        let mut collections = Vec::with_capacity(raw_collections.len());
        for mut raw in raw_collections {
            raw.kind.sort(&mut raw.documents);
            raw.kind.thread(&mut raw.documents);
            let members: Vec<Arc<Document>> = raw.documents.into_iter().map(Arc::new).collect();
            documents.extend(members.iter().cloned());
            if raw.output {
                routed.extend(members.iter().cloned());
            }
            collections.push(Collection {
                name: raw.name,
                output: raw.output,
                kind: raw.kind,
                documents: members,
            });
        }

        let mut routes: BTreeMap<String, Arc<Document>> = BTreeMap::new();
        for document in routed {
            match routes.get(&document.permalink) {
                Some(existing) => warnings.push(format!(
                    "{} and {} both resolve to {}; keeping {}",
                    existing.relative_path,
                    document.relative_path,
                    document.permalink,
                    existing.relative_path
                )),
                None => {
                    routes.insert(document.permalink.clone(), document);
                }
            }
        }

        Self {
            root,
            config,
            documents,
            collections,
            routes,
            data,
            time,
            warnings,
        }
    }

    pub fn collection(&self, name: &str) -> Option<&Collection> {
        self.collections
            .iter()
            .find(|collection| collection.name == name)
    }

    pub fn document(&self, relative_path: &str) -> Option<&Arc<Document>> {
        self.documents
            .iter()
            .find(|document| document.relative_path == relative_path)
    }

    pub fn destination(&self) -> PathBuf {
        self.config.destination_dir(&self.root)
    }

    /// The `site` value templates see.
    pub fn bindings(&self) -> JsonValue {
        let mut site = self.config.extra.clone();
        site.insert("url".into(), JsonValue::String(self.config.url.clone()));
        site.insert(
            "baseurl".into(),
            JsonValue::String(self.config.baseurl.clone()),
        );
        site.insert(
            "time".into(),
            self.time
                .format(&Rfc3339)
                .map(JsonValue::String)
                .unwrap_or(JsonValue::Null),
        );
        site.insert("data".into(), self.data.clone());

        let pages = self
            .documents
            .iter()
            .filter(|document| document.collection.is_none() && !document.is_static())
            .map(|document| document.to_binding())
            .collect();
        site.insert("pages".into(), JsonValue::Array(pages));

        let static_files = self
            .documents
            .iter()
            .filter(|document| document.is_static())
            .map(|document| {
                let mut file = JsonMap::new();
                file.insert(
                    "path".into(),
                    JsonValue::String(format!("/{}", document.relative_path)),
                );
                file.insert("url".into(), JsonValue::String(document.permalink.clone()));
                file.insert(
                    "extname".into(),
                    JsonValue::String(document.output_ext.clone()),
                );
                JsonValue::Object(file)
            })
            .collect();
        site.insert("static_files".into(), JsonValue::Array(static_files));

        let mut described = Vec::new();
        for collection in &self.collections {
            let members = collection.bindings();
            let mut entry = JsonMap::new();
            entry.insert("label".into(), JsonValue::String(collection.name.clone()));
            entry.insert("output".into(), JsonValue::Bool(collection.output));
            entry.insert("docs".into(), JsonValue::Array(members.clone()));
            described.push(JsonValue::Object(entry));
            site.insert(collection.name.clone(), JsonValue::Array(members));
        }
        site.insert("collections".into(), JsonValue::Array(described));

        let mut categories: BTreeMap<String, Vec<JsonValue>> = BTreeMap::new();
        let mut tags: BTreeMap<String, Vec<JsonValue>> = BTreeMap::new();
        if let Some(posts) = self.collection(POSTS) {
            for post in posts.documents.iter().filter(|post| !post.is_static()) {
                let binding = post.to_binding();
                for category in post.categories() {
                    categories.entry(category).or_default().push(binding.clone());
                }
                for tag in post.tags() {
                    tags.entry(tag).or_default().push(binding.clone());
                }
            }
        }
        site.insert("categories".into(), grouped(categories));
        site.insert("tags".into(), grouped(tags));

        JsonValue::Object(site)
    }
}

fn grouped(groups: BTreeMap<String, Vec<JsonValue>>) -> JsonValue {
    JsonValue::Object(
        groups
            .into_iter()
            .map(|(key, items)| (key, JsonValue::Array(items)))
            .collect(),
    )
}

struct Reader<'a> {
    root: &'a Path,
    config: &'a Config,
    offset: UtcOffset,
    now: OffsetDateTime,
    skipped_dirs: Vec<PathBuf>,
}

impl<'a> Reader<'a> {
    fn new(root: &'a Path, config: &'a Config) -> Result<Self> {
        let offset = config.offset()?;
        let mut skipped_dirs = vec![config.destination_dir(root)];
        if let Some(theme) = &config.theme_dir {
            skipped_dirs.push(if theme.is_absolute() {
                theme.clone()
            } else {
                root.join(theme)
            });
        }
        Ok(Self {
            root,
            config,
            offset,
            now: OffsetDateTime::now_utc().to_offset(offset),
            skipped_dirs,
        })
    }

    fn relative(&self, path: &Path) -> Option<String> {
        path.strip_prefix(self.root).ok().map(normalize_path)
    }

    /// Sorted walk below `dir`. Pages skip the top-level `_` directories,
    /// which hold collections and site furniture.
    fn walk(
        &self,
        dir: &Path,
        pages: bool,
    ) -> impl Iterator<Item = walkdir::Result<DirEntry>> + '_ {
        WalkDir::new(dir)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(move |entry| {
                let underscored = entry.file_name().to_string_lossy().starts_with('_');
                !(pages && entry.depth() == 1 && underscored) && self.keep(entry)
            })
    }

    fn keep(&self, entry: &DirEntry) -> bool {
        if self
            .skipped_dirs
            .iter()
            .any(|skipped| entry.path().starts_with(skipped))
        {
            return false;
        }
        match self.relative(entry.path()) {
            Some(relative) => !excluded(self.config, &relative),
            None => false,
        }
    }

    /// Everything outside the `_`-prefixed top-level directories.
    fn read_pages(&self, warnings: &mut Vec<String>) -> Result<Vec<Document>> {
        let mut documents = Vec::new();
        for entry in self.walk(self.root, true) {
            let entry =
                entry.with_context(|| format!("failed to walk {}", self.root.display()))?;
            let Some(relative) = self.relative(entry.path()) else {
                continue;
            };
            if !entry.file_type().is_file() {
                continue;
            }
            if let Some(document) = self.read_document(&relative, Origin::Page, warnings)? {
                documents.push(document);
            }
        }
        Ok(documents)
    }

    fn read_collection(
        &self,
        name: &str,
        collection: &CollectionConfig,
        warnings: &mut Vec<String>,
    ) -> Result<Vec<Document>> {
        let kind = CollectionKind::for_name(name);
        let mut dirs = vec![(format!("_{name}"), false)];
        if kind == CollectionKind::Posts && self.config.show_drafts {
            dirs.push((DRAFTS_DIR.to_string(), true));
        }

        let mut documents = Vec::new();
        for (dir_name, draft) in dirs {
            let dir = self.root.join(&dir_name);
            if !dir.is_dir() {
                continue;
            }
            let origin = Origin::Collection {
                name,
                kind,
                permalink: collection.permalink.as_deref(),
                draft,
            };
            for entry in self.walk(&dir, false) {
                let entry = entry.with_context(|| format!("failed to walk {}", dir.display()))?;
                if !entry.file_type().is_file() {
                    continue;
                }
                let Some(relative) = self.relative(entry.path()) else {
                    continue;
                };
                if let Some(document) = self.read_document(&relative, origin, warnings)? {
                    documents.push(document);
                }
            }
        }
        Ok(documents)
    }

    fn read_document(
        &self,
        relative: &str,
        origin: Origin<'_>,
        warnings: &mut Vec<String>,
    ) -> Result<Option<Document>> {
        let source_path = self.root.join(relative);
        let (collection, inner) = match origin {
            Origin::Page => (None, relative),
            Origin::Collection { name, .. } => {
                let inner = relative
                    .split_once('/')
                    .map(|(_, inner)| inner)
                    .unwrap_or(relative);
                (Some(name), inner)
            }
        };

        let ext = output_ext(self.config, relative);

        if !has_front_matter(&source_path)? {
            let permalink = match collection {
                None => format!("/{relative}"),
                Some(name) => format!("/{name}/{inner}"),
            };
            return Ok(Some(Document {
                relative_path: relative.to_string(),
                source_path: source_path.clone(),
                collection: collection.map(str::to_string),
                date: modified_time(&source_path, self.offset)?,
                output_ext: ext,
                permalink,
                kind: DocumentKind::Static,
            }));
        }

        let stem = file_stem(relative);
        let post_name = match origin {
            Origin::Collection {
                kind: CollectionKind::Posts,
                draft: false,
                ..
            } => match CollectionKind::Posts.parse_file_stem(stem) {
                Some(name) => Some(name),
                None => {
                    warnings.push(format!(
                        "skipping {relative}: post file names must start with YYYY-MM-DD-"
                    ));
                    return Ok(None);
                }
            },
            _ => None,
        };

        let raw = fs::read_to_string(&source_path)
            .with_context(|| format!("failed to read {}", source_path.display()))?;
        let front = parse_front_matter(&raw)
            .with_context(|| format!("{}: invalid front matter", source_path.display()))?
            .with_context(|| format!("{}: missing front matter", source_path.display()))?;

        let scope_type = match origin {
            Origin::Page => "pages",
            Origin::Collection { name, .. } => name,
        };
        let mut values = apply_defaults(self.config, relative, scope_type, front.values);

        if values.get("published") == Some(&JsonValue::Bool(false)) && !self.config.unpublished {
            return Ok(None);
        }

        let date = match values.get("date").and_then(JsonValue::as_str) {
            Some(text) => parse_date(text, self.offset)
                .with_context(|| format!("{}: invalid date", source_path.display()))?,
            None => match &post_name {
                Some(name) => post_date(name, self.offset),
                None => modified_time(&source_path, self.offset)?,
            },
        };

        if matches!(origin, Origin::Collection { kind: CollectionKind::Posts, .. })
            && date > self.now
            && !self.config.future
        {
            return Ok(None);
        }

        let name = post_name.as_ref().map(|name| name.title).unwrap_or(stem);
        if let Origin::Collection {
            kind: CollectionKind::Posts,
            ..
        } = origin
        {
            values
                .entry("title")
                .or_insert_with(|| JsonValue::String(title_from_slug(name)));
        }

        let (pattern, is_default) = match values.get("permalink").and_then(JsonValue::as_str) {
            Some(explicit) => (explicit.to_string(), false),
            None => match origin {
                Origin::Page => ("/:path:output_ext".to_string(), true),
                Origin::Collection {
                    kind, permalink, ..
                } => (
                    permalink
                        .map(str::to_string)
                        .unwrap_or_else(|| kind.default_permalink(self.config)),
                    true,
                ),
            },
        };

        let dynamic = DynamicContent::new(values, front.body.to_string(), front.body_line);
        let mut document = Document {
            relative_path: relative.to_string(),
            source_path: source_path.clone(),
            collection: collection.map(str::to_string),
            date,
            output_ext: ext,
            permalink: String::new(),
            kind: DocumentKind::Dynamic(dynamic),
        };

        let categories = document.categories();
        let source = PermalinkSource {
            path: strip_extension(inner),
            name,
            slug: document.front_matter_str("slug"),
            collection: collection.unwrap_or_default(),
            categories: &categories,
            output_ext: &document.output_ext,
            date,
        };
        let mut permalink = resolve(&pattern, &source.variables())
            .with_context(|| format!("{}: cannot resolve permalink", source_path.display()))?;
        if is_default && matches!(origin, Origin::Page) && permalink.ends_with("/index.html") {
            permalink.truncate(permalink.len() - "index.html".len());
        }
        document.permalink = permalink;

        Ok(Some(document))
    }
}

/// Merges matching `defaults:` entries under the document's own front
/// matter. Longer scope paths override shorter ones.
fn apply_defaults(
    config: &Config,
    relative: &str,
    scope_type: &str,
    front_matter: JsonMap<String, JsonValue>,
) -> JsonMap<String, JsonValue> {
    let mut matching: Vec<_> = config
        .defaults
        .iter()
        .filter(|default| {
            let path = default.scope.path.trim_matches('/');
            let path_matches = path.is_empty()
                || relative == path
                || relative
                    .strip_prefix(path)
                    .is_some_and(|rest| rest.starts_with('/'));
            let type_matches = default
                .scope
                .kind
                .as_deref()
                .is_none_or(|kind| kind == scope_type);
            path_matches && type_matches
        })
        .collect();
    matching.sort_by_key(|default| default.scope.path.trim_matches('/').len());

    let mut merged = JsonMap::new();
    for default in matching {
        for (key, value) in &default.values {
            merged.insert(key.clone(), value.clone());
        }
    }
    merged.extend(front_matter);
    merged
}

/// `_data/**/*.{yml,yaml,json}` keyed by sub-directory and file stem.
fn load_data(root: &Path, config: &Config) -> Result<JsonValue> {
    let dir = root.join(&config.data_dir);
    let mut data = JsonMap::new();
    if !dir.is_dir() {
        return Ok(JsonValue::Object(data));
    }

    for entry in WalkDir::new(&dir).sort_by_file_name() {
        let entry = entry.with_context(|| format!("failed to walk {}", dir.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let Some(ext) = path.extension().and_then(|ext| ext.to_str()) else {
            continue;
        };
        let ext = ext.to_ascii_lowercase();
        if !matches!(ext.as_str(), "yml" | "yaml" | "json") {
            continue;
        }

        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read data file {}", path.display()))?;
        let value: JsonValue = if ext == "json" {
            serde_json::from_str(&raw)
                .with_context(|| format!("{}: invalid JSON", path.display()))?
        } else if raw.trim().is_empty() {
            JsonValue::Null
        } else {
            serde_yaml::from_str(&raw)
                .with_context(|| format!("{}: invalid YAML", path.display()))?
        };

        let Ok(relative) = path.strip_prefix(&dir) else {
            continue;
        };
        let relative = normalize_path(relative);
        let mut keys: Vec<String> = relative.split('/').map(str::to_string).collect();
        if let Some(last) = keys.last_mut() {
            *last = file_stem(last).to_string();
        }
        insert_nested(&mut data, &keys, value);
    }
    Ok(JsonValue::Object(data))
}

fn insert_nested(map: &mut JsonMap<String, JsonValue>, keys: &[String], value: JsonValue) {
    match keys {
        [] => {}
        [last] => {
            map.insert(last.clone(), value);
        }
        [first, rest @ ..] => {
            let slot = map
                .entry(first.clone())
                .or_insert_with(|| JsonValue::Object(JsonMap::new()));
            if let JsonValue::Object(child) = slot {
                insert_nested(child, rest, value);
            } else {
                let mut child = JsonMap::new();
                insert_nested(&mut child, rest, value);
                *slot = JsonValue::Object(child);
            }
        }
    }
}
