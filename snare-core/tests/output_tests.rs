// Tests for run directories and visited-page persistence

use snare_core::output::{
    RunDir, create_run_dir, load_summary, load_visited_page, load_visited_pages, url_to_filepath,
    write_summary, write_visited_page,
};
use snare_scanner::{CallingContext, CrawlSummary, VisitRecord, VisitedPage};
use std::fs;
use tempfile::TempDir;

fn visited(url: &str) -> VisitedPage {
    let record = VisitRecord::started(url, None)
        .with_context(CallingContext::OpenUrl { url: url.to_string() });
    VisitedPage::new(url.to_string(), record)
}

#[test]
fn test_url_to_filepath_flattens_url() {
    let name = url_to_filepath("https://example.com/a/b?token=1");
    assert!(name.starts_with("https___example.com_a_b"));
    assert!(!name.contains('?'));
    assert!(!name.contains("token"));
}

#[test]
fn test_url_to_filepath_is_unique() {
    let url = "https://example.com/";
    assert_ne!(url_to_filepath(url), url_to_filepath(url));
}

#[test]
fn test_url_to_filepath_truncates_long_urls() {
    let url = format!("https://example.com/{}", "a".repeat(300));
    let name = url_to_filepath(&url);
    // 100 characters of URL plus a hyphenated UUID
    assert_eq!(name.chars().count(), 100 + 36);
}

#[test]
fn test_create_run_dir_layout() {
    let root = TempDir::new().unwrap();
    let run = create_run_dir(root.path(), &["https://example.com/".to_string()]).unwrap();

    assert!(run.spider.is_dir());
    assert!(run.images.is_dir());
    assert_eq!(run.spider, run.root.join("spider"));
    assert_eq!(run.images, run.spider.join("images"));

    let dirname = run.root.file_name().unwrap().to_string_lossy().to_string();
    let (seconds, name) = dirname.split_once("___").unwrap();
    assert!(seconds.parse::<i64>().is_ok());
    assert!(name.starts_with("https___example.com_"));
    assert!(name.chars().count() <= 100);
}

#[test]
fn test_visited_pages_round_trip_through_directory() {
    let root = TempDir::new().unwrap();
    let run = create_run_dir(root.path(), &["https://b.test/".to_string()]).unwrap();

    let first = write_visited_page(&run.spider, &visited("https://b.test/")).unwrap();
    write_visited_page(&run.spider, &visited("https://a.test/login")).unwrap();
    fs::write(run.spider.join("notes.txt"), "not a page").unwrap();
    fs::write(run.spider.join("broken.json"), "{").unwrap();

    assert_eq!(first.extension().and_then(|e| e.to_str()), Some("json"));
    assert_eq!(load_visited_page(&first).unwrap().url, "https://b.test/");

    let pages = load_visited_pages(&run.spider).unwrap();
    let urls: Vec<_> = pages.iter().map(|p| p.url.as_str()).collect();
    assert_eq!(urls, vec!["https://a.test/login", "https://b.test/"]);
    assert_eq!(
        pages[1].open_visit.calling_context,
        Some(CallingContext::OpenUrl {
            url: "https://b.test/".to_string()
        })
    );
}

#[test]
fn test_load_visited_pages_missing_directory() {
    let root = TempDir::new().unwrap();
    assert!(load_visited_pages(&root.path().join("nope")).is_err());
}

#[test]
fn test_summary_round_trip() {
    let root = TempDir::new().unwrap();
    let run = RunDir::at(root.path());
    assert_eq!(load_summary(&run).unwrap(), None);

    let summary = CrawlSummary {
        visited: vec!["https://a.test/".to_string()],
        enqueued_count: 1,
        ..Default::default()
    };
    write_summary(&run, &summary).unwrap();
    assert_eq!(load_summary(&run).unwrap(), Some(summary));
}
