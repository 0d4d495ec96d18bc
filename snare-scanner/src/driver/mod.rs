//! Boundary to the browser that actually loads pages.
//!
//! The engine never touches the network itself; everything it knows about a page
//! comes through [`PageDriver`].

pub mod http;
pub mod timeout;

#[cfg(test)]
pub(crate) mod fake;

use crate::error::{Result, ScanError};
use crate::record::VisitRecord;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

pub use http::HttpPage;
pub use timeout::{CallTimeouts, TimedPage};

/// Opaque handle to one element of one page instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementRef(pub u64);

const FINGERPRINT_SCRIPT: &str = r#"(element) => ({
  tag: element.tagName,
  role: element.getAttribute('role'),
  text: element.innerText ?? '',
  src: element.getAttribute('src') ? element.src : null,
  images: Array.from(element.querySelectorAll('img')).map(img => img.src),
})"#;

const OUTER_HTML_SCRIPT: &str = "(element) => element.outerHTML";

const TRAITS_SCRIPT: &str = r#"(element) => {
  let navigable = false;
  for (let e = element; e; e = e.parentElement) {
    if (e.tagName.toLowerCase() === 'a' || e.hasAttribute('href')) { navigable = true; break; }
  }
  const style = window.getComputedStyle(element);
  return {
    tag: element.tagName.toLowerCase(),
    role: element.getAttribute('role'),
    visible: element.offsetWidth > 0 && element.offsetHeight > 0 && style.visibility !== 'hidden',
    navigable,
    disabled: !!element.disabled,
    input_type: element.tagName.toLowerCase() === 'input' ? (element.getAttribute('type') || 'text').toLowerCase() : null,
  };
}"#;

/// A DOM inspection the engine can ask a driver to perform on one element.
///
/// Rendering drivers run [`Probe::script`] in the page; drivers without a
/// JavaScript engine answer natively with the same JSON shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    /// `{tag, role, text, src, images}` as [`ElementDescription`].
    Fingerprint,
    /// The element's `outerHTML` as a JSON string.
    OuterHtml,
    /// `{tag, role, visible, navigable, disabled, input_type}` as [`ElementTraits`].
    Traits,
    /// An attribute value as a JSON string, or null.
    Attribute(String),
}

impl Probe {
    pub fn script(&self) -> String {
        match self {
            Probe::Fingerprint => FINGERPRINT_SCRIPT.to_string(),
            Probe::OuterHtml => OUTER_HTML_SCRIPT.to_string(),
            Probe::Traits => TRAITS_SCRIPT.to_string(),
            Probe::Attribute(name) => format!(
                "(element) => element.getAttribute({})",
                serde_json::Value::String(name.clone())
            ),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ElementDescription {
    pub tag: String,
    pub role: Option<String>,
    #[serde(default)]
    pub text: String,
    pub src: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ElementTraits {
    pub tag: String,
    pub role: Option<String>,
    pub visible: bool,
    pub navigable: bool,
    #[serde(default)]
    pub disabled: bool,
    pub input_type: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScreenshotMode {
    #[default]
    None,
    Viewport,
    FullPage,
}

impl FromStr for ScreenshotMode {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "none" | "no" => Ok(ScreenshotMode::None),
            "viewport" => Ok(ScreenshotMode::Viewport),
            "full" | "full_page" | "full-page" => Ok(ScreenshotMode::FullPage),
            other => Err(ScanError::Driver(format!("unknown screenshot mode '{}'", other))),
        }
    }
}

/// One live page. Calls take `&mut self`: a page must never be queried
/// concurrently, element handles do not survive it.
#[async_trait]
pub trait PageDriver: Send + Sync {
    fn current_url(&self) -> String;

    async fn open(&mut self, url: &str) -> Result<VisitRecord>;

    async fn reload(&mut self) -> Result<VisitRecord>;

    async fn content(&mut self) -> Result<String>;

    /// Every element of the current document, in document order.
    async fn query_all_elements(&mut self) -> Result<Vec<ElementRef>>;

    async fn evaluate(&mut self, element: &ElementRef, probe: &Probe) -> Result<serde_json::Value>;

    async fn click(&mut self, element: &ElementRef, timeout: Duration) -> Result<VisitRecord>;

    /// Focus the element and press Enter.
    async fn press_enter(&mut self, element: &ElementRef, timeout: Duration)
    -> Result<VisitRecord>;

    async fn fill(&mut self, element: &ElementRef, text: &str) -> Result<()>;

    async fn screenshot(&mut self, full_page: bool) -> Result<Vec<u8>>;

    /// A new, independent page sharing this page's cookies and storage.
    async fn clone_context(&self) -> Result<Box<dyn PageDriver>>;

    async fn close(&mut self) -> Result<()>;
}
