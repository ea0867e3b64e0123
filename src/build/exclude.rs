use crate::config::Config;

/// Whether `relative` (forward-slash, below the site root) stays out of the
/// site. Each ancestor is checked from the full path upwards; at every level
/// `include` beats `exclude`, which beats the naming rules. Underscored
/// names are allowed at the top level and anywhere below the data,
/// includes, layouts and Sass directories, where partials live.
pub fn excluded(config: &Config, relative: &str) -> bool {
    let relative = relative.trim_matches('/');
    if relative.is_empty() {
        return false;
    }
    let in_support_dir = support_dirs(config)
        .iter()
        .any(|dir| is_under(relative, dir));

    let mut level = relative;
    loop {
        let (parent, segment) = match level.rsplit_once('/') {
            Some((parent, segment)) => (Some(parent), segment),
            None => (None, level),
        };

        if matches_any(&config.include, level, segment) {
            return false;
        }
        if matches_any(&config.exclude, level, segment) {
            return true;
        }
        if parent.is_some() && segment.starts_with('_') && !in_support_dir {
            return true;
        }
        if is_hidden_or_backup(segment) {
            return true;
        }

        match parent {
            Some(parent) => level = parent,
            None => return false,
        }
    }
}

/// Whether a batch of changed paths has to be answered with a fresh
/// snapshot instead of patching the current one.
pub fn requires_full_reload<S: AsRef<str>>(config: &Config, paths: &[S]) -> bool {
    let support = support_dirs(config);

    for path in paths {
        let path = path.as_ref();
        if config.is_config_path(path) {
            return true;
        }
        if excluded(config, path) {
            continue;
        }
        if !config.incremental {
            return true;
        }
        if support.iter().any(|dir| is_under(path, dir)) {
            return true;
        }
    }
    false
}

/// Data, includes, layouts and Sass directories, for the site and for a
/// theme that lives inside the site root.
fn support_dirs(config: &Config) -> Vec<String> {
    let names = [
        config.data_dir.as_str(),
        config.includes_dir.as_str(),
        config.layouts_dir.as_str(),
        config.sass_dir(),
    ];
    let mut dirs: Vec<String> = names.iter().map(|name| name.to_string()).collect();
    if let Some(theme) = &config.theme_dir
        && !theme.is_absolute()
        && let Some(theme) = theme.to_str()
    {
        let theme = theme.trim_matches('/');
        dirs.extend(names.iter().map(|name| format!("{theme}/{name}")));
    }
    dirs
}

fn is_under(path: &str, dir: &str) -> bool {
    let dir = dir.trim_matches('/');
    !dir.is_empty()
        && path
            .strip_prefix(dir)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

fn is_hidden_or_backup(segment: &str) -> bool {
    segment.starts_with('.')
        || segment.starts_with('#')
        || segment.starts_with('~')
        || segment.ends_with('~')
}

/// Patterns without a `/` also match a bare file or directory name at any
/// depth; `*` and `?` are wildcards that never cross a `/`.
fn matches_any(patterns: &[String], level: &str, segment: &str) -> bool {
    patterns.iter().any(|pattern| {
        let pattern = pattern.trim_matches('/');
        if pattern.is_empty() {
            return false;
        }
        wildcard(pattern.as_bytes(), level.as_bytes())
            || (!pattern.contains('/') && wildcard(pattern.as_bytes(), segment.as_bytes()))
    })
}

fn wildcard(pattern: &[u8], text: &[u8]) -> bool {
    match (pattern.split_first(), text.split_first()) {
        (None, None) => true,
        (None, Some(_)) => false,
        (Some((b'*', rest)), _) => {
            wildcard(rest, text)
                || matches!(text.split_first(), Some((&ch, tail)) if ch != b'/' && wildcard(pattern, tail))
        }
        (Some((b'?', rest)), Some((&ch, tail))) => ch != b'/' && wildcard(rest, tail),
        (Some((&expected, rest)), Some((&ch, tail))) => expected == ch && wildcard(rest, tail),
        (Some(_), None) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn top_level_underscore_directories_are_part_of_the_site() {
        let config = Config::default();
        assert!(!excluded(&config, "_posts/file.md"));
        assert!(!excluded(&config, "_layouts/default.html"));
        assert!(excluded(&config, "_posts/_draft.md"));
        assert!(excluded(&config, "assets/_private/logo.png"));
        assert!(!excluded(&config, "_sass/_base.scss"));
        assert!(!excluded(&config, "_includes/_partials/nav.html"));
    }

    #[test]
    fn hidden_and_backup_files() {
        let config = Config::default();
        assert!(excluded(&config, ".git/config"));
        assert!(excluded(&config, "notes/#scratch.md#"));
        assert!(excluded(&config, "index.md~"));
        assert!(excluded(&config, "~lock"));
        assert!(!excluded(&config, "css/site.css"));
    }

    #[test]
    fn include_beats_exclude() {
        let config = Config {
            include: vec![".well-known".into(), "vendor/keep.js".into()],
            exclude: vec!["vendor".into(), "*.log".into(), "drafts/".into()],
            ..Config::default()
        };
        assert!(!excluded(&config, ".well-known/security.txt"));
        assert!(!excluded(&config, "vendor/keep.js"));
        assert!(excluded(&config, "vendor/other.js"));
        assert!(excluded(&config, "logs/build.log"));
        assert!(excluded(&config, "drafts/a.md"));
        assert!(!excluded(&config, "docs/drafts.md"));
    }

    #[test]
    fn default_include_and_exclude_lists() {
        let config = Config::default();
        assert!(!excluded(&config, ".htaccess"));
        assert!(excluded(&config, "Gemfile"));
        assert!(excluded(&config, "node_modules/pkg/index.js"));
    }

    #[test]
    fn wildcards_stay_within_a_segment() {
        assert!(wildcard(b"*.md", b"a.md"));
        assert!(!wildcard(b"*.md", b"dir/a.md"));
        assert!(wildcard(b"dir/*.md", b"dir/a.md"));
        assert!(wildcard(b"?.txt", b"a.txt"));
        assert!(!wildcard(b"?.txt", b"ab.txt"));
    }

    #[test]
    fn configuration_changes_always_reload() {
        let config = Config {
            incremental: true,
            ..Config::default()
        };
        assert!(requires_full_reload(&config, &["_config.yml"]));
        assert!(requires_full_reload(&Config::default(), &["_config.yml"]));
    }

    #[test]
    fn special_directories_force_reload_in_incremental_mode() {
        let config = Config {
            incremental: true,
            ..Config::default()
        };
        assert!(requires_full_reload(&config, &["_data/authors.yml"]));
        assert!(requires_full_reload(&config, &["_includes/nav.html"]));
        assert!(requires_full_reload(&config, &["_layouts/default.html"]));
        assert!(requires_full_reload(&config, &["_sass/_base.scss"]));
        assert!(requires_full_reload(&config, &["about.md", "_data/nav.yml"]));
        assert!(!requires_full_reload(&config, &["about.md", "_posts/2024-01-01-a.md"]));
        assert!(!requires_full_reload(&config, &["_database.md"]));
    }

    #[test]
    fn excluded_paths_are_ignored() {
        let config = Config {
            incremental: true,
            ..Config::default()
        };
        assert!(!requires_full_reload(&config, &[".git/index", "Gemfile"]));
        assert!(requires_full_reload(&Config::default(), &["about.md"]));
        assert!(!requires_full_reload(&Config::default(), &[".git/index"]));
        let empty: [&str; 0] = [];
        assert!(!requires_full_reload(&config, &empty));
    }

    #[test]
    fn theme_directory_forces_reload() {
        let config = Config {
            incremental: true,
            theme_dir: Some("theme".into()),
            ..Config::default()
        };
        assert!(requires_full_reload(&config, &["theme/_layouts/base.html"]));
    }
}
