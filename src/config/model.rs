use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use time::UtcOffset;
use url::Url;

use super::timezone::parse_timezone;

pub const CONFIG_FILE: &str = "_config.yml";
pub const POSTS: &str = "posts";
pub const DRAFTS_DIR: &str = "_drafts";

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub destination: PathBuf,
    pub layouts_dir: String,
    pub includes_dir: String,
    pub data_dir: String,
    pub sass: SassConfig,
    pub theme_dir: Option<PathBuf>,
    pub collections: BTreeMap<String, CollectionConfig>,
    pub permalink: String,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub keep_files: Vec<String>,
    pub incremental: bool,
    pub show_drafts: bool,
    pub future: bool,
    pub unpublished: bool,
    pub markdown_ext: String,
    pub timezone: String,
    pub url: String,
    pub baseurl: String,
    pub defaults: Vec<FrontMatterDefault>,
    pub toc: TocConfig,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, JsonValue>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct SassConfig {
    pub sass_dir: String,
}

impl Default for SassConfig {
    fn default() -> Self {
        Self {
            sass_dir: "_sass".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct CollectionConfig {
    pub output: bool,
    pub permalink: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct FrontMatterDefault {
    pub scope: DefaultScope,
    pub values: serde_json::Map<String, JsonValue>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct DefaultScope {
    pub path: String,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

/// Heading levels indexed by the `{:toc}` marker.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TocConfig {
    pub min_level: u8,
    pub max_level: u8,
}

impl Default for TocConfig {
    fn default() -> Self {
        Self {
            min_level: 2,
            max_level: 6,
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Config =
            serde_yaml::from_str(&raw).with_context(|| invalid_yaml_message(path))?;
        config.validate(path)?;
        Ok(config)
    }

    pub fn validate(&self, origin: &Path) -> Result<()> {
        validate_url(&self.url, origin)?;
        validate_timezone(&self.timezone, origin)?;
        validate_toc(&self.toc, origin)?;
        if self.destination.as_os_str().is_empty() || self.destination == Path::new(".") {
            bail!(
                "{}: destination must not be the source directory",
                origin.display()
            );
        }
        for name in self.collections.keys() {
            if name.is_empty() || name.contains('/') {
                bail!(
                    "{}: collection name '{}' must be a single path segment",
                    origin.display(),
                    name
                );
            }
        }
        Ok(())
    }

    pub fn offset(&self) -> Result<UtcOffset> {
        parse_timezone(&self.timezone)
    }

    pub fn markdown_extensions(&self) -> Vec<String> {
        self.markdown_ext
            .split(',')
            .map(|ext| ext.trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect()
    }

    pub fn is_markdown(&self, relative: &str) -> bool {
        match extension_of(relative) {
            Some(ext) => self
                .markdown_extensions()
                .iter()
                .any(|candidate| candidate.eq_ignore_ascii_case(ext)),
            None => false,
        }
    }

    pub fn is_config_path(&self, relative: &str) -> bool {
        relative == CONFIG_FILE
    }

    pub fn destination_dir(&self, root: &Path) -> PathBuf {
        if self.destination.is_absolute() {
            self.destination.clone()
        } else {
            root.join(&self.destination)
        }
    }

    pub fn sass_dir(&self) -> &str {
        &self.sass.sass_dir
    }

    /// Site directory first, theme fallback second.
    pub fn layouts_dirs(&self, root: &Path) -> Vec<PathBuf> {
        self.search_dirs(root, &self.layouts_dir)
    }

    pub fn includes_dirs(&self, root: &Path) -> Vec<PathBuf> {
        self.search_dirs(root, &self.includes_dir)
    }

    pub fn sass_dirs(&self, root: &Path) -> Vec<PathBuf> {
        self.search_dirs(root, &self.sass.sass_dir)
    }

    fn search_dirs(&self, root: &Path, name: &str) -> Vec<PathBuf> {
        let mut dirs = vec![root.join(name)];
        if let Some(theme) = &self.theme_dir {
            let theme_root = if theme.is_absolute() {
                theme.clone()
            } else {
                root.join(theme)
            };
            dirs.push(theme_root.join(name));
        }
        dirs
    }

    /// Configured collections plus the implicit posts collection.
    pub fn collection_configs(&self) -> BTreeMap<String, CollectionConfig> {
        let mut collections = self.collections.clone();
        collections
            .entry(POSTS.to_string())
            .or_insert_with(|| CollectionConfig {
                output: true,
                permalink: None,
            });
        collections
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            destination: PathBuf::from("_site"),
            layouts_dir: "_layouts".to_string(),
            includes_dir: "_includes".to_string(),
            data_dir: "_data".to_string(),
            sass: SassConfig::default(),
            theme_dir: None,
            collections: BTreeMap::new(),
            permalink: "date".to_string(),
            include: vec![".htaccess".to_string()],
            exclude: vec![
                "Gemfile".to_string(),
                "Gemfile.lock".to_string(),
                "node_modules".to_string(),
                "vendor".to_string(),
            ],
            keep_files: vec![".git".to_string(), ".svn".to_string()],
            incremental: false,
            show_drafts: false,
            future: false,
            unpublished: false,
            markdown_ext: "markdown,mkdown,mkdn,mkd,md".to_string(),
            timezone: "+00:00".to_string(),
            url: String::new(),
            baseurl: String::new(),
            defaults: Vec::new(),
            toc: TocConfig::default(),
            extra: serde_json::Map::new(),
        }
    }
}

pub(crate) fn extension_of(relative: &str) -> Option<&str> {
    let name = relative.rsplit('/').next().unwrap_or(relative);
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => Some(ext),
        _ => None,
    }
}

fn invalid_yaml_message(path: &Path) -> String {
    format!("{}: invalid YAML", path.display())
}

fn validate_url(value: &str, origin: &Path) -> Result<()> {
    if value.trim().is_empty() {
        return Ok(());
    }
    let url = Url::parse(value)
        .with_context(|| format!("{}: url must be an absolute URL", origin.display()))?;
    if !matches!(url.scheme(), "http" | "https") {
        bail!("{}: url must use http or https", origin.display());
    }
    Ok(())
}

fn validate_timezone(value: &str, origin: &Path) -> Result<()> {
    parse_timezone(value).with_context(|| {
        format!(
            "{}: timezone '{}' is invalid (expected offset like +00:00)",
            origin.display(),
            value
        )
    })?;
    Ok(())
}

fn validate_toc(toc: &TocConfig, origin: &Path) -> Result<()> {
    let valid = (1..=6).contains(&toc.min_level)
        && (1..=6).contains(&toc.max_level)
        && toc.min_level <= toc.max_level;
    if !valid {
        bail!(
            "{}: toc levels must satisfy 1 <= min_level <= max_level <= 6",
            origin.display()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_when_file_missing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        let config = Config::load(&path).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn load_valid_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(
            &path,
            r#"title: "Notebook"
url: "https://example.com"
baseurl: "/blog"
permalink: pretty
incremental: true
timezone: "+05:30"
collections:
  recipes:
    output: true
toc:
  min_level: 1
  max_level: 3
"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(
            config.extra.get("title"),
            Some(&JsonValue::String("Notebook".into()))
        );
        assert_eq!(config.baseurl, "/blog");
        assert_eq!(config.permalink, "pretty");
        assert!(config.incremental);
        assert_eq!(config.offset().unwrap().whole_minutes(), 330);
        assert!(config.collections["recipes"].output);
        assert_eq!(config.toc.min_level, 1);
        assert_eq!(config.layouts_dir, "_layouts");
    }

    #[test]
    fn empty_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "\n").unwrap();
        assert_eq!(Config::load(&path).unwrap(), Config::default());
    }

    #[test]
    fn reject_invalid_url() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "url: \"ftp://example.com\"\n").unwrap();

        let error = Config::load(&path).unwrap_err();
        assert!(format!("{error}").contains("url must use http or https"));
    }

    #[test]
    fn reject_invalid_timezone() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "timezone: \"Mars/Station\"\n").unwrap();

        let error = Config::load(&path).unwrap_err();
        assert!(format!("{error}").contains("timezone"));
    }

    #[test]
    fn reject_inverted_toc_levels() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "toc:\n  min_level: 4\n  max_level: 2\n").unwrap();

        let error = Config::load(&path).unwrap_err();
        assert!(format!("{error}").contains("toc levels"));
    }

    #[test]
    fn reject_destination_equal_to_source() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "destination: .\n").unwrap();

        let error = Config::load(&path).unwrap_err();
        assert!(format!("{error}").contains("destination"));
    }

    #[test]
    fn markdown_extension_matching() {
        let config = Config::default();
        assert!(config.is_markdown("_posts/2024-01-01-a.md"));
        assert!(config.is_markdown("notes/readme.MARKDOWN"));
        assert!(!config.is_markdown("index.html"));
        assert!(!config.is_markdown(".md"));
    }

    #[test]
    fn posts_collection_is_implicit() {
        let config = Config::default();
        let collections = config.collection_configs();
        assert!(collections[POSTS].output);
    }

    #[test]
    fn theme_dirs_follow_site_dirs() {
        let config = Config {
            theme_dir: Some(PathBuf::from("vendor/theme")),
            ..Default::default()
        };
        let dirs = config.layouts_dirs(Path::new("/site"));
        assert_eq!(
            dirs,
            vec![
                PathBuf::from("/site/_layouts"),
                PathBuf::from("/site/vendor/theme/_layouts")
            ]
        );
    }
}
