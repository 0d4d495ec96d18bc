use crate::output::{RunDir, create_run_dir, write_summary, write_visited_page};
use anyhow::{Context, Result, bail};
use indicatif::{ProgressBar, ProgressStyle};
use snare_scanner::{
    CrawlSummary, Crawler, Explorer, ExplorerConfig, FrontierConfig, ScopeFilter, ScreenshotMode,
    VisitedPage,
};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::warn;
use url::Url;

/// Options for configuring a crawl operation
pub struct CrawlOptions {
    pub urls: Vec<String>,
    /// Host regex; `None` scopes the crawl to the seed hosts and their subdomains.
    pub scope_pattern: Option<String>,
    pub include_url_pattern: Option<String>,
    pub exclude_patterns: Vec<String>,
    pub frontier: FrontierConfig,
    /// Explore each page's buttons and inputs when set.
    pub explorer: Option<ExplorerConfig>,
    pub submit_forms: bool,
    pub screenshot_mode: ScreenshotMode,
    pub output_root: PathBuf,
    pub max_body_length: Option<usize>,
    pub timeout_secs: u64,
    pub show_progress_bars: bool,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            urls: Vec::new(),
            scope_pattern: None,
            include_url_pattern: None,
            exclude_patterns: Vec::new(),
            frontier: FrontierConfig::default(),
            explorer: None,
            submit_forms: true,
            screenshot_mode: ScreenshotMode::None,
            output_root: PathBuf::from("."),
            max_body_length: Some(10_000),
            timeout_secs: 30,
            show_progress_bars: true,
        }
    }
}

/// Outcome of one crawl run.
#[derive(Debug)]
pub struct CrawlRun {
    pub run_dir: RunDir,
    pub summary: CrawlSummary,
    pub pages_written: usize,
}

/// Callback for reporting crawl progress
pub type CrawlProgressCallback = Arc<dyn Fn(String) + Send + Sync>;

/// Extract the path component from a URL
pub fn extract_url_path(url: &str) -> String {
    Url::parse(url)
        .ok()
        .map(|u| {
            let path = u.path().to_string();
            if path.is_empty() || path == "/" {
                "/".to_string()
            } else {
                path
            }
        })
        .unwrap_or_else(|| url.to_string())
}

pub fn build_scope(options: &CrawlOptions) -> Result<ScopeFilter> {
    let scope = match options.scope_pattern {
        Some(ref pattern) => ScopeFilter::new(
            pattern,
            options.include_url_pattern.as_deref(),
            &options.exclude_patterns,
        ),
        None if options.include_url_pattern.is_none() && options.exclude_patterns.is_empty() => {
            ScopeFilter::for_seed_hosts(&options.urls)
        }
        None => {
            let hosts = ScopeFilter::seed_host_pattern(&options.urls)?;
            ScopeFilter::new(
                &hosts,
                options.include_url_pattern.as_deref(),
                &options.exclude_patterns,
            )
        }
    };
    scope.context("Invalid crawl scope")
}

/// Execute a crawl with the given options, persisting every visited page
/// under a fresh run directory.
pub async fn execute_crawl(
    options: CrawlOptions,
    progress_callback: Option<CrawlProgressCallback>,
) -> Result<CrawlRun> {
    if options.urls.is_empty() {
        bail!("No URLs to crawl");
    }
    let scope = build_scope(&options)?;
    let run_dir = create_run_dir(&options.output_root, &options.urls)?;

    let progress_bar = if options.show_progress_bars {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .context("Invalid progress template")?,
        );
        pb.set_message("Starting crawl...");
        Some(Arc::new(pb))
    } else {
        None
    };

    let pages_written = Arc::new(AtomicUsize::new(0));

    let mut crawler = Crawler::with_http(scope, options.timeout_secs)?
        .with_frontier_config(options.frontier.clone())
        .with_submit_forms(options.submit_forms)
        .with_screenshot_mode(options.screenshot_mode)
        .with_image_dir(run_dir.images.clone())
        .with_max_body_length(options.max_body_length);

    if let Some(ref pb) = progress_bar {
        let pb = pb.clone();
        crawler = crawler.with_progress_callback(Arc::new(move |visited: usize, url: String| {
            pb.set_message(format!("Crawling {} ({} pages visited)", url, visited));
            pb.tick();
        }));
    }

    let spider_dir = run_dir.spider.clone();
    let written = pages_written.clone();
    let callback = progress_callback.clone();
    crawler = crawler.with_result_callback(Arc::new(move |page: &VisitedPage| {
        match write_visited_page(&spider_dir, page) {
            Ok(path) => {
                written.fetch_add(1, Ordering::Relaxed);
                if let Some(ref cb) = callback {
                    cb(format!("Saved {} to {}", page.url, path.display()));
                }
            }
            Err(e) => warn!("Failed to save {}: {:#}", page.url, e),
        }
    }));

    if let Some(config) = options.explorer.clone() {
        crawler = crawler.with_explorer(Explorer::new(config).context("Invalid explorer config")?);
    }

    if let Some(ref cb) = progress_callback {
        cb(format!(
            "Crawling {} seed URL(s) into {}",
            options.urls.len(),
            run_dir.root.display()
        ));
    }

    let result = crawler.crawl(&options.urls).await;

    if let Some(ref pb) = progress_bar {
        let total = pages_written.load(Ordering::Relaxed);
        pb.finish_with_message(format!("Crawl complete! {} pages saved", total));
    }

    let summary = result.context("Crawl aborted")?;
    write_summary(&run_dir, &summary)?;

    Ok(CrawlRun {
        run_dir,
        summary,
        pages_written: pages_written.load(Ordering::Relaxed),
    })
}

fn colored_status(status: Option<u16>) -> String {
    match status {
        Some(code @ 100..=199) => format!("\x1b[37m{}\x1b[0m", code), // White
        Some(code @ 200..=299) => format!("\x1b[32m{}\x1b[0m", code), // Green
        Some(code @ 300..=399) => format!("\x1b[36m{}\x1b[0m", code), // Cyan
        Some(code @ 400..=499) => format!("\x1b[33m{}\x1b[0m", code), // Orange/Yellow
        Some(code @ 500..=599) => format!("\x1b[31m{}\x1b[0m", code), // Red
        Some(code) => format!("{}", code),
        None => "\x1b[31mERR\x1b[0m".to_string(),
    }
}

fn content_type(page: &VisitedPage) -> Option<&str> {
    page.open_visit
        .response_log
        .last()
        .and_then(|r| r.headers.get("content-type"))
        .map(String::as_str)
}

/// Generate a crawl report from persisted pages and, when available, the run summary
pub fn generate_crawl_report(pages: &[VisitedPage], summary: Option<&CrawlSummary>) -> String {
    let mut report = String::new();
    report.push_str("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n\n");
    report.push_str("# Summary:\n");
    report.push_str(&format!("  Pages visited: {}\n", pages.len()));

    let total_links: usize = pages.iter().map(|p| p.urls_on_page.len()).sum();
    report.push_str(&format!("  Total links found: {}\n", total_links));

    let total_forms: usize = pages.iter().map(|p| p.forms.len()).sum();
    report.push_str(&format!("  Forms submitted: {}\n", total_forms));

    let total_dynamic: usize = pages.iter().map(|p| p.dynamic_visits.len()).sum();
    report.push_str(&format!("  Action sequences explored: {}\n", total_dynamic));

    let screenshots = pages
        .iter()
        .filter(|p| p.screenshot.as_ref().is_some_and(|s| s.path.is_some()))
        .count();
    report.push_str(&format!("  Screenshots: {}\n", screenshots));

    if let Some(summary) = summary {
        report.push_str(&format!("  URLs enqueued: {}\n", summary.enqueued_count));
        report.push_str(&format!("  Skipped (out of scope): {}\n", summary.skipped.len()));
        report.push_str(&format!("  Assets: {}\n", summary.assets.len()));
        report.push_str(&format!("  Failed: {}\n", summary.failed.len()));
    }

    report.push_str("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n\n");

    // Group pages by host
    let mut by_host: BTreeMap<String, Vec<&VisitedPage>> = BTreeMap::new();
    for page in pages {
        if let Ok(url) = Url::parse(&page.url)
            && let Some(host) = url.host_str()
        {
            by_host.entry(host.to_string()).or_default().push(page);
        }
    }

    for (host, host_pages) in by_host.iter() {
        report.push_str(&format!("## {}\n", host));
        report.push_str(&format!("  {} pages visited\n\n", host_pages.len()));

        for page in host_pages {
            let path = extract_url_path(&page.url);
            let mut line = format!(
                "  {} {}",
                colored_status(page.open_visit.ending_status()),
                path
            );

            if let Some(content_type) = content_type(page)
                && !content_type.starts_with("text/html")
            {
                line.push_str(&format!(" \x1b[90m{}\x1b[0m", content_type));
            }
            if let Some(ref error) = page.open_visit.error {
                line.push_str(&format!(" \x1b[90m{}\x1b[0m", error));
            }

            let mut extras = vec![format!("{} links", page.urls_on_page.len())];
            if !page.forms.is_empty() {
                extras.push(format!("{} forms", page.forms.len()));
            }
            if !page.dynamic_visits.is_empty() {
                extras.push(format!("{} sequences", page.dynamic_visits.len()));
            }
            line.push_str(&format!(" ({})", extras.join(", ")));

            report.push_str(&line);
            report.push('\n');
        }
        report.push('\n');
    }

    if let Some(summary) = summary
        && !summary.failed.is_empty()
    {
        report.push_str("## Failed\n");
        for url in &summary.failed {
            report.push_str(&format!("  {}\n", url));
        }
        report.push('\n');
    }

    report
}
