use std::fs;
use std::path::Path;

use tempfile::TempDir;

use super::*;

fn write_files(root: &Path, files: &[(&str, &str)]) {
    for (relative, body) in files {
        let path = root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, body).unwrap();
    }
}

fn setup(files: &[(&str, &str)], config: Config) -> (TempDir, Site, Pipeline) {
    let dir = TempDir::new().unwrap();
    write_files(dir.path(), files);
    let site = Site::load(dir.path(), config).unwrap();
    let cache = ContentCache::new(dir.path().join(".cache")).disabled();
    let pipeline = Pipeline::new(&site, cache).unwrap();
    (dir, site, pipeline)
}

fn render(site: &Site, pipeline: &Pipeline, relative: &str) -> Result<String> {
    let document = site.document(relative).unwrap();
    pipeline.render(document).map(str::to_string)
}

#[test]
fn markdown_is_templated_converted_and_wrapped_in_layouts() {
    let (_dir, site, pipeline) = setup(
        &[
            ("_layouts/default.html", "<html>{{ content }}</html>"),
            (
                "_layouts/post.html",
                "---\nlayout: default\nclass: wide\n---\n<article class=\"{{ layout.class }}\">{{ content }}</article>\n",
            ),
            ("about.md", "---\nlayout: post\ntitle: About\n---\nHello {{ page.title }}\n"),
        ],
        Config::default(),
    );

    assert_eq!(
        render(&site, &pipeline, "about.md").unwrap(),
        "<html><article class=\"wide\"><p>Hello About</p>\n</article>\n</html>"
    );
}

#[test]
fn templates_see_site_and_page_bindings() {
    let mut config = Config::default();
    config
        .extra
        .insert("title".into(), serde_json::json!("Notebook"));
    let (_dir, site, pipeline) = setup(
        &[
            (
                "index.html",
                "---\n---\n{{ site.title }}|{{ site.posts | length }}|{{ page.url }}|{% for post in site.posts %}{{ post.title }}{% endfor %}",
            ),
            ("_posts/2024-05-01-first-post.md", "---\n---\nx\n"),
        ],
        config,
    );

    assert_eq!(
        render(&site, &pipeline, "index.html").unwrap(),
        "Notebook|1|/|First Post"
    );
}

#[test]
fn html_pages_are_not_run_through_markdown() {
    let (_dir, site, pipeline) = setup(
        &[("raw.html", "---\n---\n*not emphasis*\n")],
        Config::default(),
    );
    assert_eq!(
        render(&site, &pipeline, "raw.html").unwrap(),
        "*not emphasis*\n"
    );
}

#[test]
fn table_of_contents_is_expanded() {
    let (_dir, site, pipeline) = setup(
        &[(
            "guide.md",
            "---\n---\n* {:toc}\n\n## One\n\n## Two\n",
        )],
        Config::default(),
    );
    let html = render(&site, &pipeline, "guide.md").unwrap();
    assert!(html.contains("<ul id=\"markdown-toc\">"), "{html}");
    assert!(html.contains("href=\"#one\""), "{html}");
    assert!(html.contains("href=\"#two\""), "{html}");
    assert!(!html.contains("{:toc}"), "{html}");
}

#[test]
fn output_is_memoized_per_snapshot() {
    let (dir, site, pipeline) = setup(&[("a.md", "---\n---\nfirst\n")], Config::default());
    let document = site.document("a.md").unwrap();

    let first = pipeline.render(document).unwrap();
    fs::write(dir.path().join("a.md"), "---\n---\nsecond\n").unwrap();
    let second = pipeline.render(document).unwrap();

    assert!(std::ptr::eq(first, second));
    assert_eq!(second, "<p>first</p>\n");
}

#[test]
fn static_documents_are_not_rendered() {
    let (_dir, site, pipeline) = setup(&[("logo.svg", "<svg/>")], Config::default());
    let error = render(&site, &pipeline, "logo.svg").unwrap_err();
    assert!(error.to_string().contains("copied, not rendered"));
}

#[test]
fn missing_layout_is_reported() {
    let (_dir, site, pipeline) = setup(
        &[("a.md", "---\nlayout: nope\n---\nx\n")],
        Config::default(),
    );
    let error = render(&site, &pipeline, "a.md").unwrap_err();
    assert!(matches!(
        error.downcast_ref::<LayoutError>(),
        Some(LayoutError::Missing { name, .. }) if name == "nope"
    ));
    assert!(format!("{error:#}").contains("failed to render a.md"));
}

#[test]
fn layout_cycles_are_detected() {
    let (_dir, site, pipeline) = setup(
        &[
            ("_layouts/a.html", "---\nlayout: b\n---\n{{ content }}"),
            ("_layouts/b.html", "---\nlayout: a\n---\n{{ content }}"),
            ("page.md", "---\nlayout: a\n---\nx\n"),
        ],
        Config::default(),
    );
    let error = render(&site, &pipeline, "page.md").unwrap_err();
    assert!(matches!(
        error.downcast_ref::<LayoutError>(),
        Some(LayoutError::CycleSuspected { name, .. }) if name == "a"
    ));
}

#[test]
fn overlong_layout_chains_are_cut_off() {
    let mut files: Vec<(String, String)> = (0..MAX_LAYOUT_DEPTH + 5)
        .map(|index| {
            (
                format!("_layouts/l{index}.html"),
                format!("---\nlayout: l{}\n---\n{{{{ content }}}}", index + 1),
            )
        })
        .collect();
    files.push(("page.md".into(), "---\nlayout: l0\n---\nx\n".into()));
    let borrowed: Vec<(&str, &str)> = files
        .iter()
        .map(|(path, body)| (path.as_str(), body.as_str()))
        .collect();

    let (_dir, site, pipeline) = setup(&borrowed, Config::default());
    let error = render(&site, &pipeline, "page.md").unwrap_err();
    assert!(matches!(
        error.downcast_ref::<LayoutError>(),
        Some(LayoutError::CycleSuspected { limit, .. }) if *limit == MAX_LAYOUT_DEPTH
    ));
}

#[test]
fn theme_layouts_are_a_fallback() {
    let config = Config {
        theme_dir: Some("theme".into()),
        ..Config::default()
    };
    let (_dir, site, pipeline) = setup(
        &[
            ("theme/_layouts/base.html", "theme[{{ content }}]"),
            ("theme/_layouts/page.html", "---\nlayout: base\n---\ntheme-page({{ content }})"),
            ("_layouts/page.html", "---\nlayout: base\n---\nsite-page({{ content }})"),
            ("a.html", "---\nlayout: page\n---\nx"),
        ],
        config,
    );
    assert_eq!(
        render(&site, &pipeline, "a.html").unwrap(),
        "theme[site-page(x)]"
    );
}

#[test]
fn template_errors_name_the_file_and_line() {
    let (_dir, site, pipeline) = setup(
        &[("broken.md", "---\ntitle: x\n---\n\n{{ 1 + }}\n")],
        Config::default(),
    );
    let error = render(&site, &pipeline, "broken.md").unwrap_err();
    let message = format!("{error:#}");
    assert!(message.contains("template 'broken.md' at line 5"), "{message}");
}

#[test]
fn sass_is_compiled_with_partials() {
    let (_dir, site, pipeline) = setup(
        &[
            ("_sass/_vars.scss", "$accent: blue;\n"),
            (
                "css/site.scss",
                "---\n---\n@import \"vars\";\na { color: $accent; }\n",
            ),
        ],
        Config::default(),
    );
    assert!(site.routes.contains_key("/css/site.css"));
    let css = render(&site, &pipeline, "css/site.scss").unwrap();
    assert!(css.contains("color: blue"), "{css}");
}

#[test]
fn sass_output_is_cached_on_disk() {
    let dir = TempDir::new().unwrap();
    write_files(
        dir.path(),
        &[("style.scss", "---\n---\np { margin: 1px + 2px; }\n")],
    );
    let cache_dir = dir.path().join(".cache");
    let site = Site::load(dir.path(), Config::default()).unwrap();
    let pipeline = Pipeline::new(&site, ContentCache::new(&cache_dir)).unwrap();

    let css = render(&site, &pipeline, "style.scss").unwrap();
    assert!(css.contains("margin: 3px"), "{css}");
    let entries = walkdir::WalkDir::new(&cache_dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .count();
    assert_eq!(entries, 1);
}

#[test]
fn sass_errors_are_reported() {
    let (_dir, site, pipeline) = setup(
        &[("bad.scss", "---\n---\na { color: $missing; }\n")],
        Config::default(),
    );
    let error = render(&site, &pipeline, "bad.scss").unwrap_err();
    assert!(format!("{error:#}").contains("bad.scss"));
}
