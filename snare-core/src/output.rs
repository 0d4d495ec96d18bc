// Run-scoped output directories and per-page JSON persistence.

use anyhow::{Context, Result};
use snare_scanner::result::content_hash;
use snare_scanner::{CrawlSummary, VisitedPage};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

const SPIDER_DIR: &str = "spider";
const IMAGES_DIR: &str = "images";
const SUMMARY_FILE: &str = "summary.json";
const MAX_NAME_LENGTH: usize = 100;

/// Directories of one crawl run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunDir {
    pub root: PathBuf,
    /// One JSON file per visited page.
    pub spider: PathBuf,
    pub images: PathBuf,
}

impl RunDir {
    /// Layout of an existing run rooted at `root`.
    pub fn at(root: &Path) -> Self {
        let spider = root.join(SPIDER_DIR);
        Self {
            root: root.to_path_buf(),
            images: spider.join(IMAGES_DIR),
            spider,
        }
    }
}

/// Text before the query, with `/` and `:` flattened to `_`, cut to 100
/// characters and suffixed with a fresh UUID.
pub fn url_to_filepath(url: &str) -> String {
    let path = url.split('?').next().unwrap_or_default();
    let flattened: String = path
        .replace(['/', ':'], "_")
        .chars()
        .take(MAX_NAME_LENGTH)
        .collect();
    format!("{}{}", flattened, Uuid::new_v4())
}

/// Creates `<root>/<unix-seconds>___<seed names>/spider/images/`.
pub fn create_run_dir(root: &Path, seeds: &[String]) -> Result<RunDir> {
    let joined = seeds
        .iter()
        .map(|s| url_to_filepath(s))
        .collect::<Vec<_>>()
        .join("-");
    let name: String = joined.chars().take(MAX_NAME_LENGTH).collect();
    let dirname = format!("{}___{}", chrono::Utc::now().timestamp(), name);

    let run = RunDir::at(&root.join(dirname));
    fs::create_dir_all(&run.images)
        .with_context(|| format!("Failed to create run directory {}", run.root.display()))?;
    debug!("Created run directory {}", run.root.display());
    Ok(run)
}

/// Writes `page` as pretty JSON named after its URL and content.
pub fn write_visited_page(dir: &Path, page: &VisitedPage) -> Result<PathBuf> {
    let json = serde_json::to_string_pretty(page).context("Failed to serialize visited page")?;
    let filename = format!(
        "{}-{}.json",
        url_to_filepath(&page.url),
        content_hash(json.as_bytes())
    );
    let path = dir.join(filename);
    fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

/// Reads one persisted visited page.
pub fn load_visited_page(path: &Path) -> Result<VisitedPage> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("{} is not a visited page", path.display()))
}

/// Every visited page persisted in `dir`, ordered by URL. Non-JSON files
/// are ignored; unreadable JSON files are logged and skipped.
pub fn load_visited_pages(dir: &Path) -> Result<Vec<VisitedPage>> {
    let entries =
        fs::read_dir(dir).with_context(|| format!("Failed to read directory {}", dir.display()))?;

    let mut pages = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        match load_visited_page(&path) {
            Ok(page) => pages.push(page),
            Err(e) => warn!("Skipping {}: {:#}", path.display(), e),
        }
    }
    pages.sort_by(|a, b| a.url.cmp(&b.url));
    Ok(pages)
}

pub fn write_summary(run: &RunDir, summary: &CrawlSummary) -> Result<PathBuf> {
    let path = run.root.join(SUMMARY_FILE);
    let json = serde_json::to_string_pretty(summary).context("Failed to serialize summary")?;
    fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

/// The summary of a finished run, if it got far enough to write one.
pub fn load_summary(run: &RunDir) -> Result<Option<CrawlSummary>> {
    let path = run.root.join(SUMMARY_FILE);
    if !path.exists() {
        return Ok(None);
    }
    let content =
        fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(Some(serde_json::from_str(&content).with_context(|| {
        format!("{} is not a crawl summary", path.display())
    })?))
}
