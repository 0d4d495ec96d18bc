use crate::driver::{CallTimeouts, HttpPage, PageDriver, ScreenshotMode, TimedPage};
use crate::error::{Result, ScanError};
use crate::explorer::Explorer;
use crate::forms::submit_form;
use crate::frontier::{EnqueueOutcome, Frontier, FrontierConfig, canonicalize_url};
use crate::harvest::harvest_links;
use crate::record::{CallingContext, VisitRecord};
use crate::result::{CrawlSummary, ScreenshotRecord, VisitedPage, content_hash};
use crate::scope::{ScopeFilter, is_asset};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Called before each visit with the number of pages visited so far and the URL.
pub type ProgressCallback = Arc<dyn Fn(usize, String) + Send + Sync>;
/// Called with every visited page, in visit order.
pub type ResultCallback = Arc<dyn Fn(&VisitedPage) + Send + Sync>;

pub struct Crawler {
    page: Box<dyn PageDriver>,
    scope: ScopeFilter,
    frontier_config: FrontierConfig,
    explorer: Option<Explorer>,
    submit_forms: bool,
    screenshot_mode: ScreenshotMode,
    image_dir: Option<PathBuf>,
    max_body_length: Option<usize>,
    timeouts: CallTimeouts,
    progress_callback: Option<ProgressCallback>,
    result_callback: Option<ResultCallback>,
}

impl Crawler {
    /// Every visit runs on a clone of `page`; the page itself is never navigated.
    pub fn new(page: Box<dyn PageDriver>, scope: ScopeFilter) -> Self {
        Self {
            page,
            scope,
            frontier_config: FrontierConfig::default(),
            explorer: None,
            submit_forms: true,
            screenshot_mode: ScreenshotMode::None,
            image_dir: None,
            max_body_length: Some(10_000),
            timeouts: CallTimeouts::default(),
            progress_callback: None,
            result_callback: None,
        }
    }

    pub fn with_http(scope: ScopeFilter, timeout_secs: u64) -> Result<Self> {
        Ok(Self::new(Box::new(HttpPage::with_timeout(timeout_secs)?), scope))
    }

    pub fn with_frontier_config(mut self, config: FrontierConfig) -> Self {
        self.frontier_config = config;
        self
    }

    pub fn with_explorer(mut self, explorer: Explorer) -> Self {
        self.explorer = Some(explorer);
        self
    }

    pub fn with_submit_forms(mut self, submit_forms: bool) -> Self {
        self.submit_forms = submit_forms;
        self
    }

    pub fn with_screenshot_mode(mut self, mode: ScreenshotMode) -> Self {
        self.screenshot_mode = mode;
        self
    }

    pub fn with_image_dir(mut self, dir: PathBuf) -> Self {
        self.image_dir = Some(dir);
        self
    }

    pub fn with_max_body_length(mut self, max_body_length: Option<usize>) -> Self {
        self.max_body_length = max_body_length;
        self
    }

    pub fn with_timeouts(mut self, timeouts: CallTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    pub fn with_result_callback(mut self, callback: ResultCallback) -> Self {
        self.result_callback = Some(callback);
        self
    }

    /// Crawls outward from `seeds` until the frontier empties or the URL cap is hit.
    ///
    /// Per-page failures never stop the run; only a frontier invariant violation does.
    pub async fn crawl(&self, seeds: &[String]) -> Result<CrawlSummary> {
        info!("Starting crawl from {} seed URLs", seeds.len());

        let mut frontier = Frontier::new(self.frontier_config.clone());
        let mut failed = Vec::new();
        for seed in seeds {
            self.enqueue(&mut frontier, seed);
        }

        while !frontier.is_exhausted() {
            let Some(url) = frontier.pop_next() else {
                break;
            };
            if frontier.was_visited(&url) {
                return Err(ScanError::InvariantViolation(format!(
                    "{} popped after it was visited",
                    url
                )));
            }

            if let Some(ref callback) = self.progress_callback {
                callback(frontier.visited().len(), url.clone());
            }

            match self.visit(&url).await {
                Ok((page, offsite)) => {
                    if let Some(destination) = offsite {
                        info!("{} redirected out of scope to {}", url, destination);
                        frontier.mark_skipped(&destination);
                    }
                    for link in &page.urls_on_page {
                        self.enqueue(&mut frontier, link);
                    }
                    frontier.mark_visited(&url)?;
                    if let Some(ref callback) = self.result_callback {
                        callback(&page);
                    }
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!("Dropping {}: {}", url, e);
                    failed.push(url);
                }
            }
        }

        let sorted = |set: &std::collections::HashSet<String>| {
            let mut urls: Vec<String> = set.iter().cloned().collect();
            urls.sort();
            urls
        };
        let summary = CrawlSummary {
            visited: sorted(frontier.visited()),
            skipped: sorted(frontier.skipped()),
            assets: sorted(frontier.assets()),
            failed,
            enqueued_count: frontier.enqueued_count(),
        };
        info!(
            "Crawl complete. Visited {} pages, skipped {}, {} assets, {} failed",
            summary.visited.len(),
            summary.skipped.len(),
            summary.assets.len(),
            summary.failed.len()
        );
        Ok(summary)
    }

    /// Filters a harvested link and offers it to the frontier.
    fn enqueue(&self, frontier: &mut Frontier, url: &str) -> bool {
        if !url.starts_with("http") {
            debug!("Skipping non-http URL {}", url);
            frontier.mark_skipped(url);
            return false;
        }
        let canonical = match canonicalize_url(url) {
            Ok(canonical) => canonical,
            Err(e) => {
                debug!("Skipping {}: {}", url, e);
                return false;
            }
        };
        if !self.scope.in_scope(&canonical) {
            debug!("Skipping out of scope {}", canonical);
            frontier.mark_skipped(&canonical);
            return false;
        }
        if is_asset(&canonical) {
            debug!("Recording asset {}", canonical);
            frontier.mark_asset(&canonical);
            return false;
        }
        match frontier.offer(&canonical) {
            EnqueueOutcome::Queued(_) => true,
            outcome => {
                debug!("Not queued: {:?}", outcome);
                false
            }
        }
    }

    async fn visit(&self, url: &str) -> Result<(VisitedPage, Option<String>)> {
        let mut page = TimedPage::new(self.page.clone_context().await?, self.timeouts);
        let result = self.visit_on(&mut page, url).await;
        if let Err(e) = page.close().await {
            debug!("Failed to close page for {}: {}", url, e);
        }
        result
    }

    /// Returns the visited page and, when the load ended off scope, where it went.
    async fn visit_on(
        &self,
        page: &mut TimedPage,
        url: &str,
    ) -> Result<(VisitedPage, Option<String>)> {
        let context = CallingContext::OpenUrl {
            url: url.to_string(),
        };
        let open_visit = match page.open(url).await {
            Ok(record) => record.with_context(context),
            Err(e) => {
                warn!("Failed to load {}: {}", url, e);
                let record = VisitRecord::failed(url, e.to_string()).with_context(context);
                return Ok((VisitedPage::new(url.to_string(), record), None));
            }
        };
        info!("Visited {} ({:?})", url, open_visit.ending_status());

        let ending_url = page.current_url();
        if ending_url != url && !self.scope.in_scope(&ending_url) {
            let mut visited = VisitedPage::new(url.to_string(), open_visit);
            self.trim(&mut visited);
            return Ok((visited, Some(ending_url)));
        }

        let mut visited = VisitedPage::new(url.to_string(), open_visit);
        visited.screenshot = self.capture_screenshot(page).await;

        let mut links = harvest_links(page).await?;

        if let Some(explorer) = &self.explorer {
            match explorer.explore_page(&*page, url).await {
                Ok(report) => {
                    links.extend(report.links);
                    visited.dynamic_visits = report.visits;
                }
                Err(e) => warn!("Exploration of {} aborted: {}", url, e),
            }
        }

        if self.submit_forms {
            match submit_form(&*page, url, self.timeouts).await {
                Ok(Some(form)) => visited.forms.push(form),
                Ok(None) => {}
                Err(e) => warn!("Form submission on {} failed: {}", url, e),
            }
        }

        let mut seen = std::collections::HashSet::new();
        links.retain(|link| seen.insert(link.clone()));
        visited.urls_on_page = links;
        self.trim(&mut visited);
        Ok((visited, None))
    }

    fn trim(&self, visited: &mut VisitedPage) {
        if let Some(max) = self.max_body_length {
            visited.truncate_response_bodies(max);
        }
    }

    async fn capture_screenshot(&self, page: &mut TimedPage) -> Option<ScreenshotRecord> {
        let full_page = match self.screenshot_mode {
            ScreenshotMode::None => return None,
            ScreenshotMode::Viewport => false,
            ScreenshotMode::FullPage => true,
        };
        let Some(dir) = &self.image_dir else {
            return Some(ScreenshotRecord::failed(
                "no image directory configured".to_string(),
            ));
        };

        let record = match page.screenshot(full_page).await {
            Ok(bytes) => {
                let path = dir.join(format!("{}.png", content_hash(&bytes)));
                match tokio::fs::write(&path, &bytes).await {
                    Ok(()) => ScreenshotRecord::saved(path.display().to_string()),
                    Err(e) => ScreenshotRecord::failed(e.to_string()),
                }
            }
            Err(e) => ScreenshotRecord::failed(e.to_string()),
        };
        if let Some(error) = &record.error {
            warn!("Screenshot of {} failed: {}", page.current_url(), error);
        }
        Some(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::fake::{Effect, FakeDoc, FakeElement, FakeSite};
    use crate::explorer::ExplorerConfig;
    use std::sync::Mutex;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{method, path},
    };

    const ROOT: &str = "http://site.test/";

    fn scope() -> ScopeFilter {
        ScopeFilter::new("site\\.test", None, &[]).unwrap()
    }

    fn collect(crawler: Crawler) -> (Crawler, Arc<Mutex<Vec<VisitedPage>>>) {
        let pages = Arc::new(Mutex::new(Vec::new()));
        let sink = pages.clone();
        let crawler = crawler.with_result_callback(Arc::new(move |page: &VisitedPage| {
            sink.lock().unwrap().push(page.clone());
        }));
        (crawler, pages)
    }

    fn login_site() -> FakeSite {
        let root = FakeDoc::new(vec![
            FakeElement::link("l1", "Login", "http://site.test/login"),
            FakeElement::link("l2", "About", "http://site.test/about"),
            FakeElement::link("l3", "Login 1", "http://site.test/login?ref=1"),
            FakeElement::link("l4", "Login 2", "http://site.test/login?ref=2"),
            FakeElement::link("l5", "Login 3", "http://site.test/login?ref=3"),
            FakeElement::link("l6", "Login 4", "http://site.test/login?ref=4"),
        ]);
        let mut site = FakeSite::new().page(ROOT, root);
        for url in [
            "http://site.test/login",
            "http://site.test/about",
            "http://site.test/login?ref=1",
            "http://site.test/login?ref=2",
            "http://site.test/login?ref=3",
            "http://site.test/login?ref=4",
        ] {
            site = site.page(url, FakeDoc::default());
        }
        site
    }

    #[tokio::test]
    async fn test_base_url_fan_out_is_capped() {
        let crawler = Crawler::new(Box::new(login_site().into_page()), scope());

        let summary = crawler.crawl(&[ROOT.to_string()]).await.unwrap();

        assert_eq!(summary.visited.len(), 5);
        let logins = summary
            .visited
            .iter()
            .filter(|u| u.starts_with("http://site.test/login"))
            .count();
        assert_eq!(logins, 3);
        assert!(summary.visited.contains(&"http://site.test/about".to_string()));
        assert!(summary.failed.is_empty());
    }

    #[tokio::test]
    async fn test_pages_reported_with_open_context() {
        let (crawler, pages) = collect(Crawler::new(Box::new(login_site().into_page()), scope()));
        crawler.crawl(&[ROOT.to_string()]).await.unwrap();

        let pages = pages.lock().unwrap();
        assert_eq!(pages.len(), 5);
        assert_eq!(pages[0].url, ROOT);
        assert_eq!(pages[0].urls_on_page.len(), 6);
        for page in pages.iter() {
            assert_eq!(
                page.open_visit.calling_context,
                Some(CallingContext::OpenUrl {
                    url: page.url.clone()
                })
            );
        }
    }

    #[tokio::test]
    async fn test_scope_and_assets_are_recorded_not_visited() {
        let root = FakeDoc::new(vec![
            FakeElement::link("ext", "Elsewhere", "http://evil.test/"),
            FakeElement::link("pdf", "Terms", "http://site.test/terms.pdf"),
            FakeElement::image("logo", "http://site.test/logo.png?v=2"),
            FakeElement::link("mail", "Mail", "mailto:a@site.test"),
        ]);
        let crawler = Crawler::new(Box::new(FakeSite::new().page(ROOT, root).into_page()), scope());

        let summary = crawler.crawl(&[ROOT.to_string()]).await.unwrap();

        assert_eq!(summary.visited, vec![ROOT.to_string()]);
        assert_eq!(summary.skipped, vec!["http://evil.test/".to_string()]);
        assert_eq!(
            summary.assets,
            vec![
                "http://site.test/logo.png?v=2".to_string(),
                "http://site.test/terms.pdf".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_load_failure_still_counts_as_visited() {
        let root = FakeDoc::new(vec![FakeElement::link("dead", "Dead", "http://site.test/dead")]);
        let (crawler, pages) = collect(Crawler::new(
            Box::new(FakeSite::new().page(ROOT, root).into_page()),
            scope(),
        ));

        let summary = crawler.crawl(&[ROOT.to_string()]).await.unwrap();

        assert_eq!(summary.visited.len(), 2);
        let pages = pages.lock().unwrap();
        let dead = pages.iter().find(|p| p.url == "http://site.test/dead").unwrap();
        assert!(dead.open_visit.error.is_some());
        assert!(!dead.open_visit.is_success());
    }

    #[tokio::test]
    async fn test_offsite_redirect_marks_destination_skipped() {
        let site = FakeSite::new()
            .page(
                ROOT,
                FakeDoc::new(vec![FakeElement::link("out", "Out", "http://site.test/out")]),
            )
            .redirect("http://site.test/out", "http://evil.test/landing")
            .page(
                "http://evil.test/landing",
                FakeDoc::new(vec![FakeElement::link("x", "X", "http://site.test/never")]),
            );
        let crawler = Crawler::new(Box::new(site.into_page()), scope());

        let summary = crawler.crawl(&[ROOT.to_string()]).await.unwrap();

        assert!(summary.visited.contains(&"http://site.test/out".to_string()));
        assert!(summary.skipped.contains(&"http://evil.test/landing".to_string()));
        assert!(!summary.visited.contains(&"http://site.test/never".to_string()));
    }

    #[tokio::test]
    async fn test_url_cap_stops_crawl() {
        let crawler = Crawler::new(Box::new(login_site().into_page()), scope())
            .with_frontier_config(FrontierConfig {
                max_urls_per_base_url: 3,
                max_url_count: 2,
            });
        let summary = crawler.crawl(&[ROOT.to_string()]).await.unwrap();
        assert_eq!(summary.visited.len(), 1);
        assert!(summary.enqueued_count >= 2);
    }

    #[tokio::test]
    async fn test_explorer_links_and_visits_are_collected() {
        let root = FakeDoc::new(vec![FakeElement::button("menu", "Menu")]).on(
            "menu",
            Effect::Reveal(vec![FakeElement::link(
                "hidden-link",
                "Secret",
                "http://site.test/secret",
            )]),
        );
        let site = FakeSite::new()
            .page(ROOT, root)
            .page("http://site.test/secret", FakeDoc::default());
        let explorer = Explorer::new(ExplorerConfig {
            min_elements: 1,
            num_reloads: 1,
            ..Default::default()
        })
        .unwrap();
        let (crawler, pages) = collect(
            Crawler::new(Box::new(site.into_page()), scope())
                .with_explorer(explorer)
                .with_submit_forms(false),
        );

        let summary = crawler.crawl(&[ROOT.to_string()]).await.unwrap();

        assert!(summary.visited.contains(&"http://site.test/secret".to_string()));
        let pages = pages.lock().unwrap();
        assert_eq!(pages[0].dynamic_visits.len(), 1);
    }

    #[tokio::test]
    async fn test_forms_and_screenshots() {
        let images = tempfile::tempdir().unwrap();
        let root = FakeDoc::new(vec![FakeElement::input("email")]);
        let (crawler, pages) = collect(
            Crawler::new(Box::new(FakeSite::new().page(ROOT, root).into_page()), scope())
                .with_screenshot_mode(ScreenshotMode::FullPage)
                .with_image_dir(images.path().to_path_buf()),
        );

        crawler.crawl(&[ROOT.to_string()]).await.unwrap();

        let pages = pages.lock().unwrap();
        assert_eq!(pages[0].forms.len(), 1);
        assert!(pages[0].forms[0].field_values.contains_key("email"));
        let shot = pages[0].screenshot.as_ref().unwrap();
        assert!(shot.error.is_none());
        assert!(std::path::Path::new(shot.path.as_ref().unwrap()).exists());
    }

    #[tokio::test]
    async fn test_crawl_over_http() {
        let mock_server = MockServer::start().await;
        let root_html = format!(
            r#"<html><body>
                <a href="{0}/page1">Page 1</a>
                <a href="/page2">Page 2</a>
                <img src="/logo.png">
                <a href="https://elsewhere.test/">Elsewhere</a>
            </body></html>"#,
            mock_server.uri()
        );
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html")
                    .set_body_string(root_html),
            )
            .mount(&mock_server)
            .await;
        for page in ["/page1", "/page2"] {
            Mock::given(method("GET"))
                .and(path(page))
                .respond_with(
                    ResponseTemplate::new(200)
                        .insert_header("content-type", "text/html")
                        .set_body_string("<html><body>leaf</body></html>"),
                )
                .expect(1)
                .mount(&mock_server)
                .await;
        }

        let seed = format!("{}/", mock_server.uri());
        let scope = ScopeFilter::for_seed_hosts(std::slice::from_ref(&seed)).unwrap();
        let crawler = Crawler::with_http(scope, 5)
            .unwrap()
            .with_submit_forms(false);

        let summary = crawler.crawl(&[seed]).await.unwrap();

        assert_eq!(summary.visited.len(), 3);
        assert_eq!(summary.assets.len(), 1);
        assert_eq!(summary.skipped, vec!["https://elsewhere.test/".to_string()]);
    }
}
