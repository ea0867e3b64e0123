use super::*;
use crate::config::{CollectionConfig, DefaultScope, FrontMatterDefault, POSTS};
use serde_json::json;
use tempfile::TempDir;

fn write_files(root: &Path, files: &[(&str, &str)]) {
    for (relative, body) in files {
        let path = root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, body).unwrap();
    }
}

fn load(files: &[(&str, &str)], config: Config) -> (TempDir, Site) {
    let dir = TempDir::new().unwrap();
    write_files(dir.path(), files);
    let site = Site::load(dir.path(), config).unwrap();
    (dir, site)
}

fn routes(site: &Site) -> Vec<&str> {
    site.routes.keys().map(String::as_str).collect()
}

#[test]
fn front_matter_splits_body_and_tracks_line() {
    let raw = "---\ntitle: Hello\ntags: [a, b]\n---\nBody\n";
    let front = parse_front_matter(raw).unwrap().unwrap();
    assert_eq!(front.values["title"], json!("Hello"));
    assert_eq!(front.values["tags"], json!(["a", "b"]));
    assert_eq!(front.body, "Body\n");
    assert_eq!(front.body_line, 5);
}

#[test]
fn front_matter_accepts_dots_terminator_and_empty_block() {
    let front = parse_front_matter("---\nx: 1\n...\nrest").unwrap().unwrap();
    assert_eq!(front.values["x"], json!(1));
    assert_eq!(front.body, "rest");

    let empty = parse_front_matter("---\n---\n").unwrap().unwrap();
    assert!(empty.values.is_empty());
    assert_eq!(empty.body, "");
}

#[test]
fn front_matter_absent_or_broken() {
    assert!(parse_front_matter("# Title\n").unwrap().is_none());
    let error = parse_front_matter("---\ntitle: x\n").err().unwrap();
    assert!(error.to_string().contains("not terminated"));
    assert!(parse_front_matter("---\n- a\n- b\n---\n").is_err());
}

#[test]
fn dates_accept_common_shapes() {
    let offset = UtcOffset::from_hms(2, 0, 0).unwrap();
    let date = parse_date("2024-03-05", offset).unwrap();
    assert_eq!(date.offset(), offset);
    assert_eq!(date.day(), 5);

    let explicit = parse_date("2024-03-05 10:30:00 -0500", offset).unwrap();
    assert_eq!(explicit.offset().whole_hours(), -5);
    assert_eq!(explicit.hour(), 10);

    assert!(parse_date("yesterday", offset).is_err());
}

#[test]
fn list_values_from_strings_or_sequences() {
    assert_eq!(string_or_list(Some(&json!("a b"))), vec!["a", "b"]);
    assert_eq!(string_or_list(Some(&json!(["x", 2]))), vec!["x", "2"]);
    assert!(string_or_list(None).is_empty());
}

#[test]
fn pages_posts_and_static_files_are_routed() {
    let (_dir, site) = load(
        &[
            ("index.html", "---\ntitle: Home\n---\n<h1>{{ page.title }}</h1>\n"),
            ("about.md", "---\n---\n# About\n"),
            ("docs/index.md", "---\n---\nDocs\n"),
            ("css/site.css", "body {}\n"),
            (
                "_posts/2024-03-05-hello-world.md",
                "---\ncategories: [Rust]\n---\nHi\n",
            ),
            ("_layouts/default.html", "{{ content }}"),
        ],
        Config::default(),
    );

    assert_eq!(
        routes(&site),
        vec![
            "/",
            "/about.html",
            "/css/site.css",
            "/docs/",
            "/rust/2024/03/05/hello-world.html",
        ]
    );
    assert!(site.warnings.is_empty());
    assert!(site.document("css/site.css").unwrap().is_static());

    let post = site.document("_posts/2024-03-05-hello-world.md").unwrap();
    assert_eq!(post.collection.as_deref(), Some("posts"));
    assert_eq!(post.title(), "Hello World");
    assert_eq!(
        post.output_path(Path::new("/out")),
        Path::new("/out/rust/2024/03/05/hello-world.html")
    );

    let docs = site.document("docs/index.md").unwrap();
    assert_eq!(
        docs.output_path(Path::new("/out")),
        Path::new("/out/docs/index.html")
    );
}

#[test]
fn excluded_paths_are_not_read() {
    let (_dir, site) = load(
        &[
            ("Gemfile", "source 'x'\n"),
            (".hidden", "x"),
            ("notes.md~", "x"),
            ("assets/_partial.css", "x"),
            ("_posts/_draft.md", "---\n---\nx\n"),
            ("_posts/2024-01-01-kept.md", "---\n---\nx\n"),
            (".htaccess", "Deny from all\n"),
        ],
        Config::default(),
    );

    assert_eq!(routes(&site), vec!["/.htaccess", "/2024/01/01/kept.html"]);
}

#[test]
fn destination_is_never_read_back() {
    let (_dir, site) = load(
        &[("_site/old.html", "stale"), ("page.html", "fresh")],
        Config::default(),
    );
    assert_eq!(routes(&site), vec!["/page.html"]);
}

#[test]
fn drafts_future_and_unpublished_posts() {
    let files = [
        ("_posts/2024-01-01-past.md", "---\n---\nx\n"),
        ("_posts/2999-01-01-later.md", "---\n---\nx\n"),
        ("_posts/2024-01-02-hidden.md", "---\npublished: false\n---\nx\n"),
        ("_drafts/idea.md", "---\n---\nx\n"),
    ];

    let (_dir, site) = load(&files, Config::default());
    assert_eq!(routes(&site), vec!["/2024/01/01/past.html"]);

    let config = Config {
        show_drafts: true,
        future: true,
        unpublished: true,
        ..Config::default()
    };
    let (_dir, site) = load(&files, config);
    let posts = site.collection(POSTS).unwrap();
    assert_eq!(posts.documents.len(), 4);
    assert!(site.document("_drafts/idea.md").is_some());
    assert_eq!(
        posts.documents[0].relative_path,
        "_posts/2999-01-01-later.md"
    );
}

#[test]
fn undated_posts_are_skipped_with_warning() {
    let (_dir, site) = load(&[("_posts/no-date.md", "---\n---\nx\n")], Config::default());
    assert!(site.routes.is_empty());
    assert_eq!(site.warnings.len(), 1);
    assert!(site.warnings[0].contains("_posts/no-date.md"));
}

#[test]
fn posts_are_sorted_and_threaded() {
    let (_dir, site) = load(
        &[
            ("_posts/2024-01-01-first.md", "---\n---\nx\n"),
            ("_posts/2024-02-01-second.md", "---\n---\nx\n"),
            ("_posts/2024-03-01-third.md", "---\n---\nx\n"),
        ],
        Config::default(),
    );
    let posts = &site.collection(POSTS).unwrap().documents;
    let order: Vec<_> = posts.iter().map(|post| post.title()).collect();
    assert_eq!(order, vec!["Third", "Second", "First"]);

    let second = posts[1].front_matter().unwrap();
    assert_eq!(second["next"]["title"], json!("Third"));
    assert_eq!(second["previous"]["title"], json!("First"));
    assert_eq!(posts[0].front_matter().unwrap()["next"], JsonValue::Null);
}

#[test]
fn custom_collections_follow_output_flag() {
    let mut config = Config::default();
    config.collections.insert(
        "recipes".into(),
        CollectionConfig {
            output: true,
            permalink: Some("/cook/:path/".into()),
        },
    );
    config
        .collections
        .insert("notes".into(), CollectionConfig::default());

    let (_dir, site) = load(
        &[
            ("_recipes/soup/tomato.md", "---\n---\nx\n"),
            ("_recipes/photo.jpg", "jpg"),
            ("_notes/private.md", "---\n---\nx\n"),
        ],
        config,
    );

    assert_eq!(routes(&site), vec!["/cook/soup/tomato/", "/recipes/photo.jpg"]);
    assert_eq!(site.collection("notes").unwrap().documents.len(), 1);
}

#[test]
fn front_matter_defaults_apply_by_scope() {
    let mut config = Config::default();
    config.defaults = vec![
        FrontMatterDefault {
            scope: Default::default(),
            values: json!({ "layout": "default", "author": "site" })
                .as_object()
                .cloned()
                .unwrap(),
        },
        FrontMatterDefault {
            scope: DefaultScope {
                path: "guides".into(),
                kind: Some("pages".into()),
            },
            values: json!({ "layout": "guide" }).as_object().cloned().unwrap(),
        },
    ];

    let (_dir, site) = load(
        &[
            ("guides/start.md", "---\nauthor: me\n---\nx\n"),
            ("other.md", "---\n---\nx\n"),
        ],
        config,
    );

    let guide = site.document("guides/start.md").unwrap();
    assert_eq!(guide.front_matter_str("layout"), Some("guide"));
    assert_eq!(guide.front_matter_str("author"), Some("me"));
    let other = site.document("other.md").unwrap();
    assert_eq!(other.front_matter_str("layout"), Some("default"));
}

#[test]
fn conflicting_routes_keep_the_first_document() {
    let (_dir, site) = load(
        &[
            ("a.md", "---\npermalink: /same/\n---\nA\n"),
            ("b.md", "---\npermalink: /same/\n---\nB\n"),
        ],
        Config::default(),
    );
    assert_eq!(site.routes["/same/"].relative_path, "a.md");
    assert_eq!(site.warnings.len(), 1);
}

#[test]
fn invalid_permalink_variables_fail_the_load() {
    let dir = TempDir::new().unwrap();
    write_files(dir.path(), &[("a.md", "---\npermalink: /:nope/\n---\n")]);
    let error = Site::load(dir.path(), Config::default()).unwrap_err();
    assert!(format!("{error:#}").contains(":nope"));
}

#[test]
fn data_files_nest_by_directory() {
    let (_dir, site) = load(
        &[
            ("_data/authors.yml", "- name: Ada\n"),
            ("_data/nav/main.json", "{\"home\": \"/\"}"),
            ("_data/notes.txt", "ignored"),
        ],
        Config::default(),
    );
    assert_eq!(site.data["authors"][0]["name"], json!("Ada"));
    assert_eq!(site.data["nav"]["main"]["home"], json!("/"));
    assert!(site.data.get("notes").is_none());
}

#[test]
fn site_bindings_expose_collections_and_categories() {
    let mut config = Config::default();
    config.extra.insert("title".into(), json!("Notebook"));
    let (_dir, site) = load(
        &[
            ("_posts/2024-01-01-a.md", "---\ncategory: news\ntags: x y\n---\n"),
            ("about.md", "---\n---\n"),
            ("logo.png", "png"),
        ],
        config,
    );

    let bindings = site.bindings();
    assert_eq!(bindings["title"], json!("Notebook"));
    assert_eq!(bindings["posts"].as_array().unwrap().len(), 1);
    assert_eq!(bindings["pages"][0]["url"], json!("/about.html"));
    assert_eq!(bindings["static_files"][0]["path"], json!("/logo.png"));
    assert_eq!(bindings["categories"]["news"][0]["title"], json!("A"));
    assert_eq!(bindings["tags"]["y"].as_array().unwrap().len(), 1);
    assert_eq!(bindings["collections"][0]["label"], json!("posts"));
}

#[test]
fn patching_reuses_unchanged_documents() {
    let (dir, site) = load(
        &[
            ("a.md", "---\ntitle: A\n---\nold\n"),
            ("b.md", "---\ntitle: B\n---\nb\n"),
        ],
        Config::default(),
    );
    fs::write(dir.path().join("a.md"), "---\ntitle: A2\n---\nnew\n").unwrap();

    let patched = site.patched(&["a.md".to_string()]).unwrap().unwrap();
    assert_eq!(routes(&patched), routes(&site));
    let a = patched.document("a.md").unwrap();
    assert_eq!(a.front_matter_str("title"), Some("A2"));
    match &a.kind {
        DocumentKind::Dynamic(content) => assert_eq!(content.body, "new\n"),
        DocumentKind::Static => panic!("expected dynamic document"),
    }
}

#[test]
fn patching_escalates_on_structural_change() {
    let (dir, site) = load(&[("a.md", "---\n---\nx\n")], Config::default());

    assert!(site.patched(&["new.md".to_string()]).unwrap().is_none());

    fs::write(dir.path().join("a.md"), "---\npermalink: /moved/\n---\nx\n").unwrap();
    assert!(site.patched(&["a.md".to_string()]).unwrap().is_none());

    fs::write(dir.path().join("a.md"), "---\npublished: false\n---\nx\n").unwrap();
    assert!(site.patched(&["a.md".to_string()]).unwrap().is_none());
}

#[test]
fn fresh_copies_drop_the_render_memo() {
    let document = Document {
        relative_path: "a.md".into(),
        source_path: PathBuf::from("a.md"),
        collection: None,
        date: OffsetDateTime::UNIX_EPOCH,
        output_ext: ".html".into(),
        permalink: "/a.html".into(),
        kind: DocumentKind::Dynamic(DynamicContent::new(JsonMap::new(), "x".into(), 1)),
    };
    if let DocumentKind::Dynamic(content) = &document.kind {
        assert_eq!(content.remember("once".into()), "once");
        assert_eq!(content.remember("twice".into()), "once");
    }
    match document.fresh().kind {
        DocumentKind::Dynamic(content) => assert!(content.rendered().is_none()),
        DocumentKind::Static => panic!("expected dynamic document"),
    }
}
