//! Bounded tree search over a page's interactive surface.
//!
//! Each node of the tree is a [`SignatureSequence`]. A node is explored on its own
//! cloned page: load, reload until the UI has rendered, replay the sequence, then
//! turn every element that appeared as a side effect into a child sequence.
//! Pending nodes sit in a worklist drained by a bounded number of concurrent
//! branches.

use crate::driver::{CallTimeouts, PageDriver, TimedPage};
use crate::error::{Result, ScanError};
use crate::fingerprint::{
    PageSignatures, fill_text_inputs, find_elements_for_signature, page_signatures,
    session_signatures,
};
use crate::harvest::harvest_links;
use crate::record::{CallingContext, VisitRecord};
use crate::signature::{
    ActionKind, SessionSignature, SignatureHandle, SignatureSequence, StableSignature,
};
use futures::stream::{FuturesUnordered, StreamExt};
use regex::Regex;
use std::collections::{BTreeSet, HashSet, VecDeque};
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct ExplorerConfig {
    /// Sequences this long are replayed but never expanded.
    pub max_sequence_length: usize,
    /// Branches explored at once, each on its own cloned page.
    pub workers: usize,
    pub num_reloads: usize,
    /// Distinct control signatures a page needs before it counts as rendered.
    pub min_elements: usize,
    /// Children of the root that get explored.
    pub max_starting_sequences: Option<usize>,
    /// Non-root sequences scheduled over the whole run.
    pub max_total_sequences: Option<usize>,
    /// Signatures every loaded page must show before replay.
    pub required_signatures: BTreeSet<StableSignature>,
    /// At least one signature must match this, anchored at the start.
    pub required_signature_pattern: Option<String>,
    pub inject_random_text: bool,
    pub timeouts: CallTimeouts,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            max_sequence_length: 3,
            workers: 4,
            num_reloads: 10,
            min_elements: 3,
            max_starting_sequences: Some(10),
            max_total_sequences: Some(20),
            required_signatures: BTreeSet::new(),
            required_signature_pattern: None,
            inject_random_text: true,
            timeouts: CallTimeouts::default(),
        }
    }
}

/// What one branch produced.
#[derive(Debug, Clone, Default)]
pub struct ExplorationResult {
    pub discovered: Vec<SignatureSequence>,
    pub links: Vec<String>,
    /// Record of the last action replayed; `None` for the empty sequence.
    pub visit: Option<VisitRecord>,
}

#[derive(Debug)]
pub enum BranchOutcome {
    Explored(ExplorationResult),
    Failed(ScanError),
}

impl From<Result<ExplorationResult>> for BranchOutcome {
    fn from(result: Result<ExplorationResult>) -> Self {
        match result {
            Ok(explored) => BranchOutcome::Explored(explored),
            Err(e) => BranchOutcome::Failed(e),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BranchFailure {
    pub sequence: SignatureSequence,
    pub error: String,
}

/// Everything one exploration run found on a page.
#[derive(Debug, Clone, Default)]
pub struct ExplorationReport {
    pub visits: Vec<VisitRecord>,
    pub links: Vec<String>,
    pub explored: Vec<SignatureSequence>,
    pub failed: Vec<BranchFailure>,
}

impl ExplorationReport {
    fn add_links(&mut self, links: Vec<String>) {
        for link in links {
            if !self.links.contains(&link) {
                self.links.push(link);
            }
        }
    }
}

/// Replays `sequence` on an already loaded page.
///
/// Before each action the page's session signatures join the exclusion set, so
/// an action always targets an element that appeared after the previous one.
/// Returns the last action's record and the accumulated exclusion set.
pub async fn replay_sequence(
    page: &mut dyn PageDriver,
    sequence: &SignatureSequence,
    action_timeout: Duration,
) -> Result<(Option<VisitRecord>, HashSet<SessionSignature>)> {
    let mut excluded = HashSet::new();
    let mut visit = None;

    for handle in &sequence.handles {
        let before = session_signatures(page).await?;
        if handle.inject_random_text {
            fill_text_inputs(page).await?;
        }

        let candidates = find_elements_for_signature(page, &handle.signature, &excluded).await?;
        // Signatures collide; the first match in document order wins
        let Some(target) = candidates.first() else {
            return Err(ScanError::ElementNotFound {
                signature: handle.signature.to_string(),
            });
        };
        if candidates.len() > 1 {
            debug!(
                "{} elements match {}, acting on the first",
                candidates.len(),
                handle.signature
            );
        }

        debug!("{} {}", handle.kind, handle.signature);
        let record = match handle.kind {
            ActionKind::Click => page.click(target, action_timeout).await?,
            ActionKind::Submit => page.press_enter(target, action_timeout).await?,
        };
        excluded.extend(before);
        visit = Some(record);
    }

    Ok((visit, excluded))
}

pub struct Explorer {
    config: ExplorerConfig,
    required_pattern: Option<Regex>,
}

impl Explorer {
    pub fn new(config: ExplorerConfig) -> Result<Self> {
        let required_pattern = config
            .required_signature_pattern
            .as_deref()
            .map(|p| Regex::new(&format!("^(?:{})", p)))
            .transpose()?;
        Ok(Self {
            config,
            required_pattern,
        })
    }

    pub fn config(&self) -> &ExplorerConfig {
        &self.config
    }

    fn calling_context(&self, url: &str, sequence: &SignatureSequence) -> CallingContext {
        CallingContext::ClickSignatureSequence {
            url: url.to_string(),
            signature_sequence: sequence.clone(),
            min_elements: self.config.min_elements,
            num_reloads: self.config.num_reloads,
        }
    }

    /// Reloads until enough controls (and every required one) have rendered.
    ///
    /// Missing required signatures after the last reload abort the run; falling
    /// short of `min_elements` only logs and continues.
    pub async fn reload_until_ready(
        &self,
        page: &mut dyn PageDriver,
        required: &BTreeSet<StableSignature>,
    ) -> Result<PageSignatures> {
        let no_exclusions = HashSet::new();
        let mut attempt = 0;
        loop {
            let signatures = page_signatures(page, &no_exclusions, false).await?;
            let present = signatures.all();

            let missing: Vec<&StableSignature> = required.difference(&present).collect();
            let pattern_unmatched = self
                .required_pattern
                .as_ref()
                .is_some_and(|re| !present.iter().any(|s| re.is_match(&s.0)));
            let too_few = present.len() < self.config.min_elements;

            if !too_few && missing.is_empty() && !pattern_unmatched {
                debug!(
                    "{} signatures ready on {} after {} reloads",
                    present.len(),
                    page.current_url(),
                    attempt
                );
                return Ok(signatures);
            }

            if attempt >= self.config.num_reloads {
                if !missing.is_empty() || pattern_unmatched {
                    let mut missing: Vec<String> = missing.iter().map(|s| s.to_string()).collect();
                    if pattern_unmatched
                        && let Some(pattern) = &self.config.required_signature_pattern
                    {
                        missing.push(format!("/{}/", pattern));
                    }
                    return Err(ScanError::RequiredSignaturesMissing {
                        attempts: attempt,
                        missing: missing.join(", "),
                    });
                }
                warn!(
                    "Only {} of {} signatures on {} after {} reloads, continuing",
                    present.len(),
                    self.config.min_elements,
                    page.current_url(),
                    attempt
                );
                return Ok(signatures);
            }

            attempt += 1;
            debug!(
                "Reloading {} ({}/{}): {} signatures, {} required missing",
                page.current_url(),
                attempt,
                self.config.num_reloads,
                present.len(),
                missing.len()
            );
            page.reload().await?;
        }
    }

    async fn run_branch(
        &self,
        page: &mut dyn PageDriver,
        url: &str,
        sequence: &SignatureSequence,
    ) -> Result<ExplorationResult> {
        page.open(url).await?;
        let required: BTreeSet<StableSignature> = self
            .config
            .required_signatures
            .union(&sequence.required_signatures)
            .cloned()
            .collect();
        self.reload_until_ready(page, &required).await?;

        let starting_url = page.current_url();
        let (visit, excluded) =
            replay_sequence(page, sequence, self.config.timeouts.action).await?;
        let visit = visit.map(|v| v.with_context(self.calling_context(url, sequence)));

        let mut links = harvest_links(page).await?;
        if let Some(record) = &visit {
            links.extend(record.ending_url.iter().cloned());
            links.push(page.current_url());
        }

        let mut result = ExplorationResult {
            discovered: Vec::new(),
            links,
            visit,
        };

        if page.current_url() != starting_url {
            debug!(
                "{} navigated {} -> {}, not expanding",
                sequence,
                starting_url,
                page.current_url()
            );
            return Ok(result);
        }
        if sequence.len() >= self.config.max_sequence_length {
            debug!("{} reached the maximum sequence length", sequence);
            return Ok(result);
        }

        let new = page_signatures(page, &excluded, true).await?;
        let inject = self.config.inject_random_text;
        let handles = new
            .interactable
            .into_iter()
            .map(|s| (s, ActionKind::Click))
            .chain(new.fillable.into_iter().map(|s| (s, ActionKind::Submit)));
        for (signature, kind) in handles {
            let mut handle = SignatureHandle::new(signature, kind);
            if !inject {
                handle = handle.without_text_injection();
            }
            result.discovered.push(sequence.child(handle));
        }
        debug!(
            "{} revealed {} new sequences",
            sequence,
            result.discovered.len()
        );
        Ok(result)
    }

    /// Explores one sequence on a fresh clone of `base`, closing the clone after.
    pub async fn explore_sequence(
        &self,
        base: &dyn PageDriver,
        url: &str,
        sequence: &SignatureSequence,
    ) -> Result<ExplorationResult> {
        let mut page = TimedPage::new(base.clone_context().await?, self.config.timeouts);
        let result = self.run_branch(&mut page, url, sequence).await;
        if let Err(e) = page.close().await {
            debug!("Failed to close branch page: {}", e);
        }
        result
    }

    async fn explore_tracked(
        &self,
        base: &dyn PageDriver,
        url: &str,
        sequence: SignatureSequence,
    ) -> (SignatureSequence, BranchOutcome) {
        let outcome = self.explore_sequence(base, url, &sequence).await.into();
        (sequence, outcome)
    }

    /// Explores `url` starting from the empty sequence.
    ///
    /// Branch failures are collected in the report. Unsatisfiable required
    /// signatures abort the whole run once in-flight branches finish.
    pub async fn explore_page(&self, base: &dyn PageDriver, url: &str) -> Result<ExplorationReport> {
        info!("Exploring {} with {} workers", url, self.config.workers);

        let mut report = ExplorationReport::default();
        // Requirements ride on every sequence so persisted contexts replay with them
        let root = SignatureSequence::with_required(self.config.required_signatures.clone());
        let mut pending = VecDeque::from([root]);
        let mut in_flight = FuturesUnordered::new();
        let mut scheduled = 0usize;
        let mut abort: Option<ScanError> = None;
        let workers = self.config.workers.max(1);

        loop {
            while abort.is_none() && in_flight.len() < workers {
                let Some(sequence) = pending.pop_front() else {
                    break;
                };
                in_flight.push(self.explore_tracked(base, url, sequence));
            }

            let Some((sequence, outcome)) = in_flight.next().await else {
                break;
            };

            match outcome {
                BranchOutcome::Explored(result) => {
                    report.add_links(result.links);
                    if let Some(visit) = result.visit {
                        report.visits.push(visit);
                    }

                    let limit = if sequence.is_empty() {
                        self.config.max_starting_sequences.unwrap_or(usize::MAX)
                    } else {
                        usize::MAX
                    };
                    for child in result.discovered.into_iter().take(limit) {
                        if self
                            .config
                            .max_total_sequences
                            .is_some_and(|max| scheduled >= max)
                        {
                            debug!("Sequence budget spent, dropping {}", child);
                            continue;
                        }
                        scheduled += 1;
                        pending.push_back(child);
                    }
                    report.explored.push(sequence);
                }
                BranchOutcome::Failed(e @ ScanError::RequiredSignaturesMissing { .. }) => {
                    warn!("Aborting exploration of {}: {}", url, e);
                    abort.get_or_insert(e);
                }
                BranchOutcome::Failed(e) => {
                    warn!("Branch {} on {} failed: {}", sequence, url, e);
                    report.failed.push(BranchFailure {
                        sequence,
                        error: e.to_string(),
                    });
                }
            }
        }

        if let Some(e) = abort {
            return Err(e);
        }

        info!(
            "Explored {} sequences on {} ({} failed, {} links)",
            report.explored.len(),
            url,
            report.failed.len(),
            report.links.len()
        );
        Ok(report)
    }
}
