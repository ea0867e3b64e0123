use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

use super::model::CONFIG_FILE;

/// Walks upwards from `start` to the first directory holding `_config.yml`.
pub fn find_project_root(start: impl AsRef<Path>) -> Result<PathBuf> {
    let mut current = start.as_ref().to_path_buf();

    loop {
        let candidate = current.join(CONFIG_FILE);
        if candidate.exists() {
            return Ok(current);
        }

        if !current.pop() {
            bail!(
                "could not locate {} starting from {}",
                CONFIG_FILE,
                start.as_ref().display()
            );
        }
    }
}

/// Site root for a command run from `cwd`: an explicit `source` (relative
/// to `cwd`), else the nearest ancestor holding `_config.yml`, else `cwd`
/// itself so a site without configuration still builds with defaults.
pub fn resolve_site_root(source: Option<&Path>, cwd: &Path) -> Result<PathBuf> {
    if let Some(source) = source {
        let source = cwd.join(source);
        return source
            .canonicalize()
            .with_context(|| format!("source directory {} not found", source.display()));
    }
    Ok(find_project_root(cwd).unwrap_or_else(|_| cwd.to_path_buf()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn find_project_root_walks_upwards() {
        let dir = TempDir::new().unwrap();
        let project = dir.path();
        let nested = project.join("_posts/drafts");
        fs::create_dir_all(&nested).unwrap();
        fs::write(project.join(CONFIG_FILE), "title: test\n").unwrap();

        let discovered = find_project_root(&nested).unwrap();
        assert_eq!(discovered, project);
    }

    #[test]
    fn find_project_root_errors_when_missing() {
        let dir = TempDir::new().unwrap();
        let error = find_project_root(dir.path()).unwrap_err();
        assert!(error.to_string().contains("could not locate _config.yml"));
    }

    #[test]
    fn explicit_source_is_resolved_against_cwd() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("site")).unwrap();

        let root = resolve_site_root(Some(Path::new("site")), dir.path()).unwrap();
        assert_eq!(root, dir.path().join("site").canonicalize().unwrap());

        let error = resolve_site_root(Some(Path::new("missing")), dir.path()).unwrap_err();
        assert!(error.to_string().contains("source directory"), "{error}");
    }

    #[test]
    fn site_without_configuration_uses_cwd() {
        let dir = TempDir::new().unwrap();
        let root = resolve_site_root(None, dir.path()).unwrap();
        assert_eq!(root, dir.path());
    }

    #[test]
    fn configured_ancestor_wins_over_cwd() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("_posts");
        fs::create_dir_all(&nested).unwrap();
        fs::write(dir.path().join(CONFIG_FILE), "").unwrap();

        assert_eq!(resolve_site_root(None, &nested).unwrap(), dir.path());
    }
}
