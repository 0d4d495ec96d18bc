use anyhow::{Context, Result, anyhow, bail};
use clap::ArgMatches;
use colored::Colorize;
use snare_core::output::{RunDir, load_summary, load_visited_page, load_visited_pages};
use snare_scanner::{
    CallTimeouts, ExplorerConfig, FrontierConfig, HttpPage, ScreenshotMode, replay,
};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{Level, info};
use url::Url;

// Re-export crawl types and functions from snare-core
pub use snare_core::crawl::{
    CrawlOptions, CrawlProgressCallback, execute_crawl, extract_url_path, generate_crawl_report,
};

// Helper functions for crawl handler

/// Load URLs from either a file or a single URL argument
pub fn load_urls_from_source(url: Option<&Url>, hosts_file: Option<&PathBuf>) -> Result<Vec<String>> {
    if let Some(hosts_file_path) = hosts_file {
        load_urls_from_file(hosts_file_path)
    } else if let Some(url) = url {
        Ok(vec![url.as_str().to_string()])
    } else {
        bail!("Either --url or --hosts-file must be provided")
    }
}

/// Load and parse URLs from a file. Lines starting with `#` are comments.
pub fn load_urls_from_file(path: &PathBuf) -> Result<Vec<String>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read hosts file {}", path.display()))?;

    let urls: Vec<String> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(parse_url_line)
        .collect();

    if urls.is_empty() {
        bail!("No valid URLs found in {}", path.display());
    }

    Ok(urls)
}

/// Parse a single line as a URL, trying to add http:// if needed
pub fn parse_url_line(line: &str) -> Option<String> {
    // Only web URLs are crawlable
    if let Ok(url) = Url::parse(line)
        && matches!(url.scheme(), "http" | "https")
        && url.has_host()
    {
        return Some(line.to_string());
    }

    let with_scheme = format!("http://{}", line);
    if let Ok(url) = Url::parse(&with_scheme)
        && url.host_str().is_some_and(|h| !h.contains(' '))
    {
        return Some(with_scheme);
    }

    eprintln!("{}  Skipping invalid URL '{}'", "⚠️".yellow(), line);
    None
}

/// Installs the fmt subscriber; a second call is a no-op.
pub fn init_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .try_init();
}

fn screenshot_mode(args: &ArgMatches) -> Result<ScreenshotMode> {
    let mode = args
        .get_one::<String>("screenshot")
        .map(String::as_str)
        .unwrap_or("none");
    mode.parse::<ScreenshotMode>()
        .with_context(|| format!("Unknown screenshot mode '{}'", mode))
}

/// Translate `snare crawl` arguments into crawl options.
pub fn crawl_options_from_args(args: &ArgMatches, quiet: bool) -> Result<CrawlOptions> {
    let urls = load_urls_from_source(
        args.get_one::<Url>("url"),
        args.get_one::<PathBuf>("hosts-file"),
    )?;

    let defaults = CrawlOptions::default();
    let frontier = FrontierConfig {
        max_urls_per_base_url: args
            .get_one::<usize>("max-per-base")
            .copied()
            .unwrap_or(defaults.frontier.max_urls_per_base_url),
        max_url_count: args
            .get_one::<usize>("max-urls")
            .copied()
            .unwrap_or(defaults.frontier.max_url_count),
    };

    let explorer = args.get_flag("explore").then(|| {
        let default = ExplorerConfig::default();
        ExplorerConfig {
            max_sequence_length: args
                .get_one::<usize>("max-sequence-length")
                .copied()
                .unwrap_or(default.max_sequence_length),
            workers: args
                .get_one::<usize>("explore-workers")
                .copied()
                .unwrap_or(default.workers),
            ..default
        }
    });

    let output = args
        .get_one::<String>("output")
        .map(String::as_str)
        .unwrap_or(crate::commands::DEFAULT_OUTPUT_ROOT);

    Ok(CrawlOptions {
        urls,
        scope_pattern: args.get_one::<String>("scope").cloned(),
        include_url_pattern: args.get_one::<String>("include-url").cloned(),
        exclude_patterns: args
            .get_many::<String>("exclude")
            .map(|values| values.cloned().collect())
            .unwrap_or_default(),
        frontier,
        explorer,
        submit_forms: !args.get_flag("no-forms"),
        screenshot_mode: screenshot_mode(args)?,
        output_root: PathBuf::from(shellexpand::tilde(output).to_string()),
        timeout_secs: args
            .get_one::<u64>("timeout")
            .copied()
            .unwrap_or(defaults.timeout_secs),
        show_progress_bars: !quiet,
        ..defaults
    })
}

fn print_divider() {
    println!("{}", "═".repeat(60).bright_blue().bold());
}

pub async fn handle_crawl(sub_matches: &ArgMatches, quiet: bool) {
    init_logging(sub_matches.get_flag("verbose"));

    let options = match crawl_options_from_args(sub_matches, quiet) {
        Ok(options) => options,
        Err(e) => {
            eprintln!("{} {:#}", "✗".red().bold(), e);
            std::process::exit(1);
        }
    };

    if !quiet {
        print_divider();
        println!("🕷️  Crawling {} URL(s)", options.urls.len());
        println!(
            "Scope: {}",
            options
                .scope_pattern
                .as_deref()
                .unwrap_or("seed hosts and their subdomains")
        );
        println!(
            "URL limit: {} ({} per base URL)",
            options.frontier.max_url_count, options.frontier.max_urls_per_base_url
        );
        match options.explorer {
            Some(ref explorer) => println!(
                "Explorer: sequences up to {} actions, {} workers",
                explorer.max_sequence_length, explorer.workers
            ),
            None => println!("Explorer: disabled"),
        }
        println!(
            "Forms: {}",
            if options.submit_forms { "submit" } else { "skip" }
        );
        print_divider();
        println!();
    }

    let progress_callback: CrawlProgressCallback = Arc::new(|msg: String| {
        info!("{}", msg);
    });

    let run = match execute_crawl(options, Some(progress_callback)).await {
        Ok(run) => run,
        Err(e) => {
            eprintln!("{} Crawl failed: {:#}", "✗".red().bold(), e);
            std::process::exit(1);
        }
    };

    println!("\n{} Crawl complete!\n", "✓".green().bold());

    match load_visited_pages(&run.run_dir.spider) {
        Ok(pages) => print!("{}", generate_crawl_report(&pages, Some(&run.summary))),
        Err(e) => eprintln!("{} {:#}", "✗".red().bold(), e),
    }
    println!(
        "Results saved to {}",
        run.run_dir.root.display().to_string().bright_cyan()
    );
}

/// Replays the selected record of a persisted page and returns the new record as JSON.
pub async fn replay_visited_page(file: &PathBuf, index: usize, timeout_secs: u64) -> Result<String> {
    let page = load_visited_page(file)?;
    let records = page.visit_records();
    let record = records.get(index).ok_or_else(|| {
        anyhow!(
            "{} holds {} records, no record {}",
            file.display(),
            records.len(),
            index
        )
    })?;

    let base = HttpPage::with_timeout(timeout_secs)?;
    let replayed = replay(&base, record, CallTimeouts::default())
        .await
        .context("Replay failed")?;
    serde_json::to_string_pretty(&replayed).context("Failed to serialize replayed record")
}

pub async fn handle_replay(sub_matches: &ArgMatches) {
    init_logging(false);

    let Some(file) = sub_matches.get_one::<PathBuf>("FILE") else {
        eprintln!("{} A visited-page file is required", "✗".red().bold());
        std::process::exit(1);
    };
    let index = sub_matches.get_one::<usize>("index").copied().unwrap_or(0);
    let timeout = sub_matches.get_one::<u64>("timeout").copied().unwrap_or(30);

    match replay_visited_page(file, index, timeout).await {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("{} {:#}", "✗".red().bold(), e);
            std::process::exit(1);
        }
    }
}

/// Report of a persisted run; the summary section is omitted for runs that never finished.
pub fn report_for_run(run_dir: &PathBuf) -> Result<String> {
    let run = RunDir::at(run_dir);
    let pages = load_visited_pages(&run.spider)?;
    let summary = load_summary(&run)?;
    Ok(generate_crawl_report(&pages, summary.as_ref()))
}

pub fn handle_report(sub_matches: &ArgMatches) {
    let Some(run_dir) = sub_matches.get_one::<PathBuf>("RUN_DIR") else {
        eprintln!("{} A run directory is required", "✗".red().bold());
        std::process::exit(1);
    };

    match report_for_run(run_dir) {
        Ok(report) => print!("{}", report),
        Err(e) => {
            eprintln!("{} {:#}", "✗".red().bold(), e);
            std::process::exit(1);
        }
    }
}
