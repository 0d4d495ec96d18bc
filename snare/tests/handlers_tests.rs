use snare::commands::command_argument_builder;
use snare::handlers::*;
use snare_core::output::{create_run_dir, write_summary, write_visited_page};
use snare_scanner::{CallingContext, CrawlSummary, ScreenshotMode, VisitRecord, VisitedPage};
use std::io::Write;
use std::path::PathBuf;
use tempfile::{NamedTempFile, TempDir};
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[test]
fn test_parse_url_line_with_scheme() {
    let result = parse_url_line("https://example.com");
    assert_eq!(result, Some("https://example.com".to_string()));
}

#[test]
fn test_parse_url_line_without_scheme() {
    assert_eq!(
        parse_url_line("example.com"),
        Some("http://example.com".to_string())
    );
    assert_eq!(
        parse_url_line("localhost:8080/login"),
        Some("http://localhost:8080/login".to_string())
    );
}

#[test]
fn test_parse_url_line_invalid() {
    assert_eq!(parse_url_line("not a valid url!!!"), None);
}

#[test]
fn test_load_urls_from_file() -> Result<(), Box<dyn std::error::Error>> {
    let mut temp_file = NamedTempFile::new()?;
    writeln!(temp_file, "https://example.com")?;
    writeln!(temp_file, "# reported 2024-03-01")?;
    writeln!(temp_file, "paypa1-login.test")?;
    writeln!(temp_file)?; // Empty line
    writeln!(temp_file, "https://secure.example.com/verify")?;

    let path = PathBuf::from(temp_file.path());
    let urls = load_urls_from_file(&path)?;

    assert_eq!(
        urls,
        vec![
            "https://example.com",
            "http://paypa1-login.test",
            "https://secure.example.com/verify"
        ]
    );
    Ok(())
}

#[test]
fn test_load_urls_from_file_empty() {
    let mut temp_file = NamedTempFile::new().unwrap();
    writeln!(temp_file).unwrap();
    writeln!(temp_file, "   ").unwrap();

    let path = PathBuf::from(temp_file.path());
    let err = load_urls_from_file(&path).unwrap_err();
    assert!(err.to_string().contains("No valid URLs"));
}

#[test]
fn test_load_urls_from_source_single_url() {
    let url = Url::parse("https://example.com").unwrap();
    let result = load_urls_from_source(Some(&url), None).unwrap();
    assert_eq!(result, vec!["https://example.com/"]);
}

#[test]
fn test_load_urls_from_source_no_input() {
    let err = load_urls_from_source(None, None).unwrap_err();
    assert!(
        err.to_string()
            .contains("Either --url or --hosts-file must be provided")
    );
}

fn crawl_matches(args: &[&str]) -> clap::ArgMatches {
    let mut argv = vec!["snare", "crawl"];
    argv.extend_from_slice(args);
    command_argument_builder()
        .try_get_matches_from(argv)
        .unwrap()
        .subcommand_matches("crawl")
        .unwrap()
        .clone()
}

#[test]
fn test_crawl_options_defaults() {
    let matches = crawl_matches(&["-u", "https://example.com/"]);
    let options = crawl_options_from_args(&matches, false).unwrap();

    assert_eq!(options.urls, vec!["https://example.com/"]);
    assert_eq!(options.scope_pattern, None);
    assert!(options.exclude_patterns.is_empty());
    assert_eq!(options.frontier.max_url_count, 1000);
    assert_eq!(options.frontier.max_urls_per_base_url, 3);
    assert!(options.explorer.is_none());
    assert!(options.submit_forms);
    assert_eq!(options.screenshot_mode, ScreenshotMode::None);
    assert!(options.show_progress_bars);
}

#[test]
fn test_crawl_options_from_flags() {
    let matches = crawl_matches(&[
        "-u",
        "https://example.com/",
        "--scope",
        r"(.*\.)?example\.com",
        "--exclude",
        ".*/logout.*",
        "--exclude",
        ".*\\.pdf",
        "--explore",
        "--max-sequence-length",
        "2",
        "--explore-workers",
        "8",
        "--no-forms",
        "--screenshot",
        "full",
        "--max-urls",
        "50",
        "-o",
        "/tmp/runs",
    ]);
    let options = crawl_options_from_args(&matches, true).unwrap();

    assert_eq!(options.scope_pattern.as_deref(), Some(r"(.*\.)?example\.com"));
    assert_eq!(options.exclude_patterns, vec![".*/logout.*", ".*\\.pdf"]);
    let explorer = options.explorer.unwrap();
    assert_eq!(explorer.max_sequence_length, 2);
    assert_eq!(explorer.workers, 8);
    assert!(!options.submit_forms);
    assert_eq!(options.screenshot_mode, ScreenshotMode::FullPage);
    assert_eq!(options.frontier.max_url_count, 50);
    assert_eq!(options.output_root, PathBuf::from("/tmp/runs"));
    assert!(!options.show_progress_bars);
}

#[test]
fn test_crawl_rejects_invalid_pattern() {
    let result = command_argument_builder().try_get_matches_from([
        "snare",
        "crawl",
        "-u",
        "https://example.com/",
        "--scope",
        "(",
    ]);
    assert!(result.is_err());
}

#[test]
fn test_crawl_url_conflicts_with_hosts_file() {
    let result = command_argument_builder().try_get_matches_from([
        "snare",
        "crawl",
        "-u",
        "https://example.com/",
        "-H",
        "hosts.txt",
    ]);
    assert!(result.is_err());
}

#[test]
fn test_report_for_run() {
    let root = TempDir::new().unwrap();
    let run = create_run_dir(root.path(), &["https://example.com/".to_string()]).unwrap();
    let mut page = VisitedPage::new(
        "https://example.com/api/data".to_string(),
        VisitRecord::started("https://example.com/api/data", None),
    );
    page.urls_on_page = vec!["https://example.com/about".to_string()];
    write_visited_page(&run.spider, &page).unwrap();
    write_summary(
        &run,
        &CrawlSummary {
            visited: vec![page.url.clone()],
            failed: vec!["https://example.com/broken".to_string()],
            enqueued_count: 2,
            ..Default::default()
        },
    )
    .unwrap();

    let report = report_for_run(&run.root).unwrap();

    assert!(report.contains("Pages visited: 1"));
    assert!(report.contains("Total links found: 1"));
    assert!(report.contains("example.com"));
    assert!(report.contains("/api/data"));
    assert!(report.contains("https://example.com/broken"));
}

#[test]
fn test_report_for_missing_run() {
    let root = TempDir::new().unwrap();
    assert!(report_for_run(&root.path().join("missing")).is_err());
}

#[tokio::test]
async fn test_replay_visited_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/login"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html")
                .set_body_string("<html><body><h1>Sign in</h1></body></html>"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let url = format!("{}/login", server.uri());
    let record =
        VisitRecord::started(&url, None).with_context(CallingContext::OpenUrl { url: url.clone() });
    let root = TempDir::new().unwrap();
    let file = write_visited_page(root.path(), &VisitedPage::new(url.clone(), record)).unwrap();

    let json = replay_visited_page(&file, 0, 5).await.unwrap();
    let replayed: VisitRecord = serde_json::from_str(&json).unwrap();

    assert_eq!(replayed.ending_status(), Some(200));
    assert_eq!(
        replayed.calling_context,
        Some(CallingContext::OpenUrl { url })
    );
}

#[tokio::test]
async fn test_replay_index_out_of_range() {
    let url = "http://127.0.0.1:9/".to_string();
    let record =
        VisitRecord::started(&url, None).with_context(CallingContext::OpenUrl { url: url.clone() });
    let root = TempDir::new().unwrap();
    let file = write_visited_page(root.path(), &VisitedPage::new(url, record)).unwrap();

    let err = replay_visited_page(&file, 3, 5).await.unwrap_err();
    assert!(err.to_string().contains("no record 3"));
}
