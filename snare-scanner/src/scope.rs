// Scope filtering: decides which harvested URLs belong to the crawl

use crate::error::{Result, ScanError};
use regex::Regex;
use std::sync::LazyLock;
use url::Url;

static ASSET_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^http(.*)\.(js|css|png|jpg|jpeg|woff2|svg|pdf)(\?.*|)$")
        .expect("asset pattern is valid")
});

/// Compiled allow/deny rules for one crawl.
///
/// Every pattern must match the whole subject (host or URL), not a substring.
#[derive(Debug, Clone)]
pub struct ScopeFilter {
    include_host: Regex,
    include_url: Option<Regex>,
    exclude: Vec<Regex>,
}

impl ScopeFilter {
    pub fn new(
        include_host_pattern: &str,
        include_url_pattern: Option<&str>,
        exclude_patterns: &[String],
    ) -> Result<Self> {
        Ok(Self {
            include_host: full_match(include_host_pattern)?,
            include_url: include_url_pattern.map(full_match).transpose()?,
            exclude: exclude_patterns
                .iter()
                .map(|p| full_match(p))
                .collect::<Result<Vec<_>>>()?,
        })
    }

    /// Scope that admits the hosts of the given seeds and any of their subdomains.
    pub fn for_seed_hosts(seeds: &[String]) -> Result<Self> {
        Self::new(&Self::seed_host_pattern(seeds)?, None, &[])
    }

    /// Host pattern admitting each seed's host and its subdomains.
    pub fn seed_host_pattern(seeds: &[String]) -> Result<String> {
        let mut hosts = Vec::new();
        for seed in seeds {
            let parsed =
                Url::parse(seed).map_err(|e| ScanError::InvalidUrl(format!("{}: {}", seed, e)))?;
            let host = parsed
                .host_str()
                .ok_or_else(|| ScanError::InvalidUrl(format!("{} has no host", seed)))?;
            let escaped = format!("(.*\\.)?{}", regex::escape(&host.to_lowercase()));
            if !hosts.contains(&escaped) {
                hosts.push(escaped);
            }
        }
        if hosts.is_empty() {
            return Err(ScanError::InvalidUrl("no seed URLs".to_string()));
        }
        Ok(hosts.join("|"))
    }

    pub fn in_scope(&self, url: &str) -> bool {
        let Some(host) = normalized_host(url) else {
            return false;
        };
        if !self.include_host.is_match(&host) {
            return false;
        }
        if let Some(ref include_url) = self.include_url
            && !include_url.is_match(url)
        {
            return false;
        }
        !self.exclude.iter().any(|p| p.is_match(url))
    }
}

/// One-shot form of [`ScopeFilter::in_scope`].
pub fn in_scope(
    url: &str,
    include_host_pattern: &str,
    include_url_pattern: Option<&str>,
    exclude_patterns: &[String],
) -> Result<bool> {
    Ok(ScopeFilter::new(include_host_pattern, include_url_pattern, exclude_patterns)?.in_scope(url))
}

/// Static resources are never queued, whatever the scope says.
pub fn is_asset(url: &str) -> bool {
    ASSET_URL.is_match(url)
}

fn normalized_host(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    parsed.host_str().map(|h| h.trim_end_matches('.').to_lowercase())
}

fn full_match(pattern: &str) -> Result<Regex> {
    Ok(Regex::new(&format!("^(?:{})$", pattern))?)
}
