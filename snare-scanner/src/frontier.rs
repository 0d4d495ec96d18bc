// Visit frontier: at-most-once URL queue with breadth-first ordering across site sections

use crate::error::{Result, ScanError};
use std::collections::{HashMap, HashSet};
use tracing::debug;
use url::Url;

/// Normalize a URL so that two spellings of the same page compare equal.
///
/// Lowercases scheme and host, drops default ports, sorts query arguments and drops an
/// empty query. The fragment is kept: single-page apps route on it (`/#/register`).
pub fn canonicalize_url(url: &str) -> Result<String> {
    let mut parsed =
        Url::parse(url.trim()).map_err(|e| ScanError::InvalidUrl(format!("{}: {}", url, e)))?;

    let mut pairs: Vec<(String, String)> = parsed
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    // `page#` is the same page as `page`; a non-empty fragment is a route
    if parsed.fragment() == Some("") {
        parsed.set_fragment(None);
    }
    if pairs.is_empty() {
        parsed.set_query(None);
    } else {
        pairs.sort();
        parsed.query_pairs_mut().clear().extend_pairs(pairs);
    }

    Ok(parsed.to_string())
}

/// The URL with its query string removed; parameterized variants share one base.
pub fn base_url(url: &str) -> &str {
    url.split('?').next().unwrap_or(url)
}

#[derive(Debug, Default)]
struct TrieNode {
    children: HashMap<u8, usize>,
    terminal: bool,
}

/// Byte trie over prefixes of already-popped URLs.
#[derive(Debug)]
pub(crate) struct PrefixTrie {
    nodes: Vec<TrieNode>,
}

impl Default for PrefixTrie {
    fn default() -> Self {
        Self {
            nodes: vec![TrieNode::default()],
        }
    }
}

impl PrefixTrie {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: &str) {
        let mut node = 0;
        for byte in key.bytes() {
            node = match self.nodes[node].children.get(&byte) {
                Some(&next) => next,
                None => {
                    self.nodes.push(TrieNode::default());
                    let next = self.nodes.len() - 1;
                    self.nodes[node].children.insert(byte, next);
                    next
                }
            };
        }
        self.nodes[node].terminal = true;
    }

    /// Insert every prefix of `value`, from the empty one up to `value` itself.
    /// Prefixes end on char boundaries.
    pub fn insert_prefixes(&mut self, value: &str) {
        let ends = value
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(value.len()));
        for end in ends {
            self.insert(&value[..end]);
        }
    }

    /// Length of the longest stored key that is a prefix of `value`, 0 if none.
    pub fn longest_prefix_len(&self, value: &str) -> usize {
        let mut node = 0;
        let mut longest = 0;
        for (depth, byte) in value.bytes().enumerate() {
            match self.nodes[node].children.get(&byte) {
                Some(&next) => {
                    node = next;
                    if self.nodes[node].terminal {
                        longest = depth + 1;
                    }
                }
                None => break,
            }
        }
        longest
    }
}

#[derive(Debug, Clone)]
pub struct FrontierConfig {
    /// Largest number of parameterized variants queued per base URL.
    pub max_urls_per_base_url: usize,
    /// Crawl stops once this many distinct URLs have ever been queued.
    pub max_url_count: usize,
}

impl Default for FrontierConfig {
    fn default() -> Self {
        Self {
            max_urls_per_base_url: 3,
            max_url_count: 1000,
        }
    }
}

/// Why an [`Frontier::offer`] call did or did not queue its URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Queued(String),
    AlreadySeen(String),
    BaseUrlSaturated(String),
    Invalid(String),
}

impl EnqueueOutcome {
    pub fn is_queued(&self) -> bool {
        matches!(self, EnqueueOutcome::Queued(_))
    }
}

/// Pending, visited and skipped URL sets for one crawl run.
///
/// A URL moves `unseen -> queued -> visited` once; offering it again is a no-op.
#[derive(Debug)]
pub struct Frontier {
    config: FrontierConfig,
    pending: HashSet<String>,
    ever_enqueued: HashSet<String>,
    visited: HashSet<String>,
    skipped: HashSet<String>,
    assets: HashSet<String>,
    base_groups: HashMap<String, HashSet<String>>,
    popped_prefixes: PrefixTrie,
}

impl Default for Frontier {
    fn default() -> Self {
        Self::new(FrontierConfig::default())
    }
}

impl Frontier {
    pub fn new(config: FrontierConfig) -> Self {
        Self {
            config,
            pending: HashSet::new(),
            ever_enqueued: HashSet::new(),
            visited: HashSet::new(),
            skipped: HashSet::new(),
            assets: HashSet::new(),
            base_groups: HashMap::new(),
            popped_prefixes: PrefixTrie::new(),
        }
    }

    pub fn enqueue(&mut self, url: &str) -> bool {
        self.offer(url).is_queued()
    }

    pub fn offer(&mut self, url: &str) -> EnqueueOutcome {
        let canonical = match canonicalize_url(url) {
            Ok(canonical) => canonical,
            Err(e) => {
                debug!("Rejecting {}: {}", url, e);
                return EnqueueOutcome::Invalid(url.to_string());
            }
        };

        if self.ever_enqueued.contains(&canonical) {
            debug!("Skipping {}: already enqueued", canonical);
            return EnqueueOutcome::AlreadySeen(canonical);
        }

        let base = base_url(&canonical).to_string();
        let group = self.base_groups.entry(base).or_default();
        if group.len() >= self.config.max_urls_per_base_url {
            debug!(
                "Skipping {}: base URL already has {} variants queued",
                canonical, self.config.max_urls_per_base_url
            );
            return EnqueueOutcome::BaseUrlSaturated(canonical);
        }

        group.insert(canonical.clone());
        self.ever_enqueued.insert(canonical.clone());
        self.pending.insert(canonical.clone());
        debug!("Enqueued {}", canonical);
        EnqueueOutcome::Queued(canonical)
    }

    /// Pop the pending URL sharing the shortest prefix with anything popped so far.
    ///
    /// Ties go to the lexicographically smallest URL so runs are reproducible.
    pub fn pop_next(&mut self) -> Option<String> {
        let next = self
            .pending
            .iter()
            .min_by(|a, b| {
                let score_a = self.popped_prefixes.longest_prefix_len(a);
                let score_b = self.popped_prefixes.longest_prefix_len(b);
                score_a.cmp(&score_b).then_with(|| a.cmp(b))
            })
            .cloned()?;
        self.pending.remove(&next);
        self.popped_prefixes.insert_prefixes(&next);
        Some(next)
    }

    pub fn mark_visited(&mut self, url: &str) -> Result<()> {
        if !self.visited.insert(url.to_string()) {
            return Err(ScanError::InvariantViolation(format!(
                "{} has already been visited",
                url
            )));
        }
        Ok(())
    }

    pub fn was_visited(&self, url: &str) -> bool {
        self.visited.contains(url)
    }

    pub fn mark_skipped(&mut self, url: &str) {
        self.skipped.insert(url.to_string());
    }

    pub fn mark_asset(&mut self, url: &str) {
        self.assets.insert(url.to_string());
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// True once nothing is pending or the run has queued its maximum URL count.
    pub fn is_exhausted(&self) -> bool {
        self.is_empty() || self.ever_enqueued.len() >= self.config.max_url_count
    }

    pub fn pending(&self) -> &HashSet<String> {
        &self.pending
    }

    pub fn enqueued_count(&self) -> usize {
        self.ever_enqueued.len()
    }

    pub fn visited(&self) -> &HashSet<String> {
        &self.visited
    }

    pub fn skipped(&self) -> &HashSet<String> {
        &self.skipped
    }

    pub fn assets(&self) -> &HashSet<String> {
        &self.assets
    }
}
