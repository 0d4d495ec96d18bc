// Scriptable in-memory pages for exercising the engine without a browser.

use super::{ElementRef, PageDriver, Probe};
use crate::error::{Result, ScanError};
use crate::record::{ResponseRecord, VisitRecord};
use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct FakeElement {
    pub key: String,
    pub tag: String,
    pub role: Option<String>,
    pub text: String,
    pub href: Option<String>,
    pub src: Option<String>,
    pub name: Option<String>,
    pub input_type: Option<String>,
    pub visible: bool,
}

impl FakeElement {
    pub fn new(key: &str, tag: &str, text: &str) -> Self {
        Self {
            key: key.to_string(),
            tag: tag.to_string(),
            role: None,
            text: text.to_string(),
            href: None,
            src: None,
            name: None,
            input_type: (tag == "input").then(|| "text".to_string()),
            visible: true,
        }
    }

    pub fn button(key: &str, text: &str) -> Self {
        Self::new(key, "button", text)
    }

    pub fn link(key: &str, text: &str, href: &str) -> Self {
        Self {
            href: Some(href.to_string()),
            ..Self::new(key, "a", text)
        }
    }

    pub fn input(key: &str) -> Self {
        Self {
            name: Some(key.to_string()),
            ..Self::new(key, "input", "")
        }
    }

    pub fn image(key: &str, src: &str) -> Self {
        Self {
            src: Some(src.to_string()),
            ..Self::new(key, "img", "")
        }
    }

    pub fn with_role(mut self, role: &str) -> Self {
        self.role = Some(role.to_string());
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    fn outer_html(&self) -> String {
        let mut attrs = format!(r#" data-key="{}""#, self.key);
        if let Some(href) = &self.href {
            attrs.push_str(&format!(r#" href="{}""#, href));
        }
        if let Some(src) = &self.src {
            attrs.push_str(&format!(r#" src="{}""#, src));
        }
        format!("<{tag}{attrs}>{text}</{tag}>", tag = self.tag, text = self.text)
    }
}

#[derive(Debug, Clone)]
pub(crate) enum Effect {
    /// Adds elements to the live document.
    Reveal(Vec<FakeElement>),
    Navigate(String),
    Fail,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct FakeDoc {
    elements: Vec<FakeElement>,
    effects: HashMap<String, Effect>,
}

impl FakeDoc {
    pub fn new(elements: Vec<FakeElement>) -> Self {
        Self {
            elements,
            effects: HashMap::new(),
        }
    }

    pub fn on(mut self, key: &str, effect: Effect) -> Self {
        self.effects.insert(key.to_string(), effect);
        self
    }
}

/// A set of fake pages plus counters that tests assert on.
#[derive(Default)]
pub(crate) struct FakeSite {
    pages: HashMap<String, FakeDoc>,
    redirects: HashMap<String, String>,
    blank_loads: usize,
    action_delay: Option<Duration>,
    pub opens: AtomicUsize,
    pub reloads: AtomicUsize,
    pub clones: AtomicUsize,
    pub open_pages: AtomicUsize,
    pub max_open_pages: AtomicUsize,
    pub actions: Mutex<Vec<String>>,
    pub fills: Mutex<Vec<(String, String)>>,
}

impl FakeSite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, url: &str, doc: FakeDoc) -> Self {
        self.pages.insert(url.to_string(), doc);
        self
    }

    pub fn redirect(mut self, from: &str, to: &str) -> Self {
        self.redirects.insert(from.to_string(), to.to_string());
        self
    }

    /// Every page instance renders nothing for its first `loads` loads.
    pub fn blank_for(mut self, loads: usize) -> Self {
        self.blank_loads = loads;
        self
    }

    pub fn with_action_delay(mut self, delay: Duration) -> Self {
        self.action_delay = Some(delay);
        self
    }

    pub fn into_page(self) -> FakePage {
        FakePage::new(Arc::new(self))
    }

    pub fn actions(&self) -> Vec<String> {
        self.actions.lock().unwrap().clone()
    }

    fn page_opened(&self) {
        let open = self.open_pages.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_open_pages.fetch_max(open, Ordering::SeqCst);
    }
}

pub(crate) struct FakePage {
    site: Arc<FakeSite>,
    url: String,
    doc: Option<FakeDoc>,
    elements: Vec<FakeElement>,
    loads: usize,
}

impl FakePage {
    pub fn new(site: Arc<FakeSite>) -> Self {
        site.page_opened();
        Self {
            site,
            url: "about:blank".to_string(),
            doc: None,
            elements: Vec::new(),
            loads: 0,
        }
    }

    pub fn site(&self) -> Arc<FakeSite> {
        self.site.clone()
    }

    fn html(&self) -> String {
        let body: String = self.elements.iter().map(|e| e.outer_html()).collect();
        format!("<html><body>{}</body></html>", body)
    }

    fn snapshot(&self) -> VisitRecord {
        VisitRecord::started(&self.url, self.doc.as_ref().map(|_| self.html()))
    }

    fn finish(&self, mut record: VisitRecord) -> VisitRecord {
        record.ending_url = Some(self.url.clone());
        record.ending_html = Some(self.html());
        record
    }

    fn load(&mut self, url: &str) -> Result<VisitRecord> {
        let mut record = self.snapshot();
        let target = self
            .site
            .redirects
            .get(url)
            .cloned()
            .unwrap_or_else(|| url.to_string());
        let doc = self
            .site
            .pages
            .get(&target)
            .cloned()
            .ok_or_else(|| ScanError::Driver(format!("net::ERR_NAME_NOT_RESOLVED at {}", url)))?;

        if self.doc.is_none() {
            record.starting_url = Some(url.to_string());
        }
        self.loads = if target == self.url { self.loads + 1 } else { 1 };
        self.url = target.clone();
        self.elements = if self.loads > self.site.blank_loads {
            doc.elements.clone()
        } else {
            Vec::new()
        };
        self.doc = Some(doc);

        record.response_log.push(ResponseRecord {
            url: target,
            method: "GET".to_string(),
            status: 200,
            body: Some(self.html()),
            ..Default::default()
        });
        Ok(self.finish(record))
    }

    fn element(&self, element: &ElementRef) -> Result<&FakeElement> {
        self.elements
            .get(element.0 as usize)
            .ok_or_else(|| ScanError::Driver(format!("stale element handle {}", element.0)))
    }

    async fn act(&mut self, element: &ElementRef, verb: &str) -> Result<VisitRecord> {
        if let Some(delay) = self.site.action_delay {
            tokio::time::sleep(delay).await;
        }
        let target = self.element(element)?.clone();
        self.site
            .actions
            .lock()
            .unwrap()
            .push(format!("{}:{}", verb, target.key));

        let effect = self
            .doc
            .as_ref()
            .and_then(|d| d.effects.get(&target.key).cloned());
        let record = self.snapshot();
        match effect {
            Some(Effect::Fail) => Err(ScanError::Driver(format!("{} on {} failed", verb, target.key))),
            Some(Effect::Navigate(url)) => self.load(&url),
            Some(Effect::Reveal(new_elements)) => {
                for element in new_elements {
                    if !self.elements.iter().any(|e| e.key == element.key) {
                        self.elements.push(element);
                    }
                }
                Ok(self.finish(record))
            }
            None => match target.href {
                Some(href) if verb == "click" => self.load(&href),
                _ => Ok(self.finish(record)),
            },
        }
    }
}

#[async_trait]
impl PageDriver for FakePage {
    fn current_url(&self) -> String {
        self.url.clone()
    }

    async fn open(&mut self, url: &str) -> Result<VisitRecord> {
        self.site.opens.fetch_add(1, Ordering::SeqCst);
        self.load(url)
    }

    async fn reload(&mut self) -> Result<VisitRecord> {
        self.site.reloads.fetch_add(1, Ordering::SeqCst);
        let url = self.url.clone();
        self.load(&url)
    }

    async fn content(&mut self) -> Result<String> {
        Ok(self.html())
    }

    async fn query_all_elements(&mut self) -> Result<Vec<ElementRef>> {
        Ok((0..self.elements.len() as u64).map(ElementRef).collect())
    }

    async fn evaluate(&mut self, element: &ElementRef, probe: &Probe) -> Result<serde_json::Value> {
        let el = self.element(element)?;
        Ok(match probe {
            Probe::Fingerprint => json!({
                "tag": el.tag.to_uppercase(),
                "role": el.role,
                "text": el.text,
                "src": el.src,
                "images": Vec::<String>::new(),
            }),
            Probe::OuterHtml => json!(el.outer_html()),
            Probe::Traits => json!({
                "tag": el.tag,
                "role": el.role,
                "visible": el.visible,
                "navigable": el.href.is_some() || el.tag == "a",
                "disabled": false,
                "input_type": el.input_type,
            }),
            Probe::Attribute(name) => match name.as_str() {
                "href" => json!(el.href),
                "src" => json!(el.src),
                "name" | "id" => json!(el.name),
                _ => serde_json::Value::Null,
            },
        })
    }

    async fn click(&mut self, element: &ElementRef, _timeout: Duration) -> Result<VisitRecord> {
        self.act(element, "click").await
    }

    async fn press_enter(
        &mut self,
        element: &ElementRef,
        _timeout: Duration,
    ) -> Result<VisitRecord> {
        self.act(element, "submit").await
    }

    async fn fill(&mut self, element: &ElementRef, text: &str) -> Result<()> {
        let key = self.element(element)?.key.clone();
        self.site.fills.lock().unwrap().push((key, text.to_string()));
        Ok(())
    }

    async fn screenshot(&mut self, _full_page: bool) -> Result<Vec<u8>> {
        Ok(format!("PNG:{}", self.url).into_bytes())
    }

    async fn clone_context(&self) -> Result<Box<dyn PageDriver>> {
        self.site.clones.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakePage::new(self.site.clone())))
    }

    async fn close(&mut self) -> Result<()> {
        self.site.open_pages.fetch_sub(1, Ordering::SeqCst);
        self.doc = None;
        self.elements.clear();
        Ok(())
    }
}
