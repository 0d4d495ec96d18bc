//! Stable and session signatures for page elements.
//!
//! Every query here walks the page's elements one at a time. A live page is not
//! safe to probe concurrently, so none of these functions fan out.

use crate::driver::{ElementDescription, ElementRef, ElementTraits, PageDriver, Probe};
use crate::error::Result;
use crate::signature::{SessionSignature, StableSignature};
use std::collections::{BTreeSet, HashSet};
use tracing::debug;
use uuid::Uuid;

const INTERACTABLE_TAGS: &[&str] = &["a", "button", "select", "textarea", "input"];

const INTERACTABLE_ROLES: &[&str] = &[
    "button",
    "tooltip",
    "dialog",
    "navigation",
    "link",
    "menuitem",
    "menuitemcheckbox",
    "menuitemradio",
    "option",
    "radio",
    "switch",
    "tab",
];

const NON_TEXT_INPUTS: &[&str] = &[
    "hidden", "submit", "image", "button", "reset", "checkbox", "radio", "file",
];

/// `tag=[T]_role=[R]_text=[Text]_src=[Src]_image=[ImgSrcs]`
pub fn format_stable_signature(description: &ElementDescription) -> StableSignature {
    StableSignature(format!(
        "tag=[{}]_role=[{}]_text=[{}]_src=[{}]_image=[{}]",
        description.tag,
        description.role.as_deref().unwrap_or_default(),
        description.text,
        description.src.as_deref().unwrap_or_default(),
        description.images.join(",")
    ))
}

/// Both signatures plus the element's traits, captured in one observation.
#[derive(Debug, Clone)]
pub struct Fingerprint {
    pub element: ElementRef,
    pub stable: StableSignature,
    pub session: SessionSignature,
    pub traits: ElementTraits,
}

impl Fingerprint {
    pub fn is_interactable(&self) -> bool {
        let tag = self.traits.tag.to_lowercase();
        let role = self.traits.role.as_deref().map(str::to_lowercase);
        let candidate = INTERACTABLE_TAGS.contains(&tag.as_str())
            || role
                .as_deref()
                .map(|r| INTERACTABLE_ROLES.contains(&r))
                .unwrap_or(false);
        candidate && self.traits.visible && !self.traits.navigable
    }

    pub fn is_fillable(&self) -> bool {
        match self.traits.tag.to_lowercase().as_str() {
            "textarea" => self.traits.visible && !self.traits.disabled,
            "input" => {
                self.traits.visible
                    && !self.traits.disabled
                    && !self
                        .traits
                        .input_type
                        .as_deref()
                        .map(|t| NON_TEXT_INPUTS.contains(&t))
                        .unwrap_or(false)
            }
            _ => false,
        }
    }
}

pub async fn stable_signature(
    page: &mut dyn PageDriver,
    element: &ElementRef,
) -> Result<StableSignature> {
    let value = page.evaluate(element, &Probe::Fingerprint).await?;
    let description: ElementDescription = serde_json::from_value(value)?;
    Ok(format_stable_signature(&description))
}

pub async fn session_signature(
    page: &mut dyn PageDriver,
    element: &ElementRef,
) -> Result<SessionSignature> {
    let value = page.evaluate(element, &Probe::OuterHtml).await?;
    Ok(SessionSignature(
        value.as_str().map(str::to_string).unwrap_or_default(),
    ))
}

/// Fingerprints every element on the page, in document order.
pub async fn fingerprint_all(page: &mut dyn PageDriver) -> Result<Vec<Fingerprint>> {
    let elements = page.query_all_elements().await?;
    let mut fingerprints = Vec::with_capacity(elements.len());
    for element in elements {
        let stable = stable_signature(page, &element).await?;
        let session = session_signature(page, &element).await?;
        let traits: ElementTraits =
            serde_json::from_value(page.evaluate(&element, &Probe::Traits).await?)?;
        fingerprints.push(Fingerprint {
            element,
            stable,
            session,
            traits,
        });
    }
    Ok(fingerprints)
}

/// Snapshot of the session signatures currently on the page.
pub async fn session_signatures(page: &mut dyn PageDriver) -> Result<HashSet<SessionSignature>> {
    let elements = page.query_all_elements().await?;
    let mut signatures = HashSet::with_capacity(elements.len());
    for element in elements {
        signatures.insert(session_signature(page, &element).await?);
    }
    Ok(signatures)
}

/// Every element whose stable signature matches and whose session signature is
/// not excluded, in document order.
pub async fn find_elements_for_signature(
    page: &mut dyn PageDriver,
    signature: &StableSignature,
    exclude: &HashSet<SessionSignature>,
) -> Result<Vec<ElementRef>> {
    let elements = page.query_all_elements().await?;
    let mut found = Vec::new();
    for element in elements {
        if stable_signature(page, &element).await? != *signature {
            continue;
        }
        if exclude.contains(&session_signature(page, &element).await?) {
            continue;
        }
        found.push(element);
    }
    Ok(found)
}

/// Visible, non-navigating controls, deduplicated by markup.
pub async fn interactable_elements(page: &mut dyn PageDriver) -> Result<Vec<Fingerprint>> {
    let mut seen = HashSet::new();
    Ok(fingerprint_all(page)
        .await?
        .into_iter()
        .filter(Fingerprint::is_interactable)
        .filter(|f| seen.insert(f.session.clone()))
        .collect())
}

pub async fn fillable_elements(page: &mut dyn PageDriver) -> Result<Vec<Fingerprint>> {
    Ok(fingerprint_all(page)
        .await?
        .into_iter()
        .filter(Fingerprint::is_fillable)
        .collect())
}

/// Types a random value into every text field. Fields that refuse input are
/// skipped; returns how many were filled.
pub async fn fill_text_inputs(page: &mut dyn PageDriver) -> Result<usize> {
    let fields = fillable_elements(page).await?;
    let mut filled = 0;
    for field in &fields {
        match page
            .fill(&field.element, &Uuid::new_v4().to_string())
            .await
        {
            Ok(()) => filled += 1,
            Err(e) => debug!("Could not fill {}: {}", field.stable, e),
        }
    }
    Ok(filled)
}

/// Stable signatures of the page's controls, split by whether their session
/// signature was excluded.
#[derive(Debug, Clone, Default)]
pub struct PageSignatures {
    /// Clickable controls not excluded, first-seen order.
    pub interactable: Vec<StableSignature>,
    /// Text fields not excluded, first-seen order.
    pub fillable: Vec<StableSignature>,
    pub excluded: BTreeSet<StableSignature>,
}

impl PageSignatures {
    pub fn all(&self) -> BTreeSet<StableSignature> {
        self.interactable
            .iter()
            .chain(self.fillable.iter())
            .cloned()
            .collect()
    }
}

fn push_unique(list: &mut Vec<StableSignature>, signature: &StableSignature) {
    if !list.contains(signature) {
        list.push(signature.clone());
    }
}

pub async fn page_signatures(
    page: &mut dyn PageDriver,
    exclude: &HashSet<SessionSignature>,
    fill_text: bool,
) -> Result<PageSignatures> {
    let fingerprints = fingerprint_all(page).await?;
    let mut signatures = PageSignatures::default();
    let mut seen_markup = HashSet::new();

    for fingerprint in &fingerprints {
        let excluded = exclude.contains(&fingerprint.session);

        if fingerprint.is_fillable() {
            let usable = !fill_text
                || page
                    .fill(&fingerprint.element, &Uuid::new_v4().to_string())
                    .await
                    .is_ok();
            if usable {
                if excluded {
                    signatures.excluded.insert(fingerprint.stable.clone());
                } else {
                    push_unique(&mut signatures.fillable, &fingerprint.stable);
                }
            }
        }

        if fingerprint.is_interactable() && seen_markup.insert(fingerprint.session.clone()) {
            if excluded {
                signatures.excluded.insert(fingerprint.stable.clone());
            } else {
                push_unique(&mut signatures.interactable, &fingerprint.stable);
            }
        }
    }

    debug!(
        "{} interactable, {} fillable, {} excluded signatures on {}",
        signatures.interactable.len(),
        signatures.fillable.len(),
        signatures.excluded.len(),
        page.current_url()
    );
    Ok(signatures)
}
