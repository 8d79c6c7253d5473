// tests/registry_file.rs
use repo_sentinel::registry::NEWS_FEED_TARGET;
use repo_sentinel::{FileRegistry, SourceKind, SubscriptionRegistry};
use std::fs;

#[test]
fn missing_file_reads_as_empty() {
    let dir = tempfile::tempdir().unwrap();
    let reg = FileRegistry::new(dir.path().join("nope.json"));
    assert!(reg.list_by_source(SourceKind::Repository).is_empty());
    assert!(reg.list_by_source(SourceKind::NewsFeed).is_empty());
}

#[test]
fn corrupt_file_reads_as_empty() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("subscriptions.json");
    fs::write(&path, "{\"github\": [oops").unwrap();
    let reg = FileRegistry::new(&path);
    assert!(reg.list_by_source(SourceKind::Repository).is_empty());
}

#[test]
fn mutations_refuse_to_overwrite_a_corrupt_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("subscriptions.json");
    let garbage = "{\"github\": [\"keep/me\", oops";
    fs::write(&path, garbage).unwrap();
    let reg = FileRegistry::new(&path);

    assert!(reg.add_repository("octocat/Hello-World").is_err());
    assert!(reg.remove_repository("keep/me").is_err());
    assert!(reg.set_news(true, vec!["rust".into()]).is_err());

    assert_eq!(fs::read_to_string(&path).unwrap(), garbage);
    assert!(!path.with_extension("json.tmp").exists());
}

#[test]
fn mutations_are_visible_on_the_next_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("subscriptions.json");
    let reg = FileRegistry::new(&path);

    assert!(reg.add_repository("octocat/Hello-World").unwrap());
    assert!(reg.add_repository(" rust-lang/rust ").unwrap());
    assert!(!reg.add_repository("octocat/Hello-World").unwrap());

    let targets: Vec<String> = reg
        .list_by_source(SourceKind::Repository)
        .into_iter()
        .map(|s| s.target)
        .collect();
    assert_eq!(targets, vec!["octocat/Hello-World", "rust-lang/rust"]);

    assert!(reg.remove_repository("octocat/Hello-World").unwrap());
    assert!(!reg.remove_repository("octocat/Hello-World").unwrap());
    assert_eq!(reg.list_by_source(SourceKind::Repository).len(), 1);

    // no temp file left behind
    assert!(!path.with_extension("json.tmp").exists());
}

#[test]
fn news_entry_yields_one_subscription_when_enabled() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("subscriptions.json");
    fs::write(
        &path,
        r#"{"github": [], "hacker_news": {"enabled": true, "keywords": ["rust", " ", "rust", "llm"]}}"#,
    )
    .unwrap();
    let reg = FileRegistry::new(&path);
    let news = reg.list_by_source(SourceKind::NewsFeed);
    assert_eq!(news.len(), 1);
    assert_eq!(news[0].target, NEWS_FEED_TARGET);
    assert_eq!(news[0].keywords, vec!["rust", "llm"]);

    reg.set_news(false, vec!["rust".into()]).unwrap();
    assert!(reg.list_by_source(SourceKind::NewsFeed).is_empty());
    assert_eq!(reg.load().news_keywords(), vec!["rust"]);
    assert_eq!(reg.source_enabled(SourceKind::NewsFeed), Some(false));
}
