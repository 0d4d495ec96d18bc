// Static page driver: fetches documents over HTTP and answers element probes from the
// parsed markup. No JavaScript runs, so only links and plain forms react to actions.

use super::{ElementRef, PageDriver, Probe};
use crate::error::{Result, ScanError};
use crate::record::{ResponseRecord, VisitRecord};
use async_trait::async_trait;
use reqwest::{Client, Method};
use scraper::{ElementRef as DomElement, Html, Selector};
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tracing::debug;
use url::Url;

const INVISIBLE_TAGS: &[&str] = &[
    "head", "script", "style", "meta", "title", "link", "noscript", "template", "base",
];

#[derive(Debug, Clone)]
struct StaticElement {
    tag: String,
    attrs: Vec<(String, String)>,
    text: String,
    outer_html: String,
    images: Vec<String>,
    link: Option<String>,
    hidden: bool,
    form: Option<usize>,
}

impl StaticElement {
    fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    fn input_type(&self) -> Option<String> {
        (self.tag == "input").then(|| {
            self.attr("type")
                .unwrap_or("text")
                .to_lowercase()
        })
    }

    fn is_submit_control(&self) -> bool {
        match self.tag.as_str() {
            "button" => self
                .attr("type")
                .map(|t| t.eq_ignore_ascii_case("submit"))
                .unwrap_or(true),
            "input" => matches!(self.input_type().as_deref(), Some("submit") | Some("image")),
            _ => false,
        }
    }

    fn is_fillable(&self) -> bool {
        match self.tag.as_str() {
            "textarea" => true,
            "input" => !matches!(
                self.input_type().as_deref(),
                Some("hidden" | "submit" | "image" | "button" | "reset" | "checkbox" | "radio" | "file")
            ),
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
struct StaticForm {
    action: Url,
    method: Method,
    fields: Vec<usize>,
}

#[derive(Debug, Clone)]
struct Document {
    html: String,
    elements: Vec<StaticElement>,
    forms: Vec<StaticForm>,
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn resolve(base: &Url, reference: &str) -> Option<Url> {
    let resolved = base.join(reference.trim()).ok()?;
    matches!(resolved.scheme(), "http" | "https").then_some(resolved)
}

fn is_hidden_node(element: &DomElement) -> bool {
    let value = element.value();
    if INVISIBLE_TAGS.contains(&value.name()) || value.attr("hidden").is_some() {
        return true;
    }
    if value.name() == "input"
        && value
            .attr("type")
            .map(|t| t.eq_ignore_ascii_case("hidden"))
            .unwrap_or(false)
    {
        return true;
    }
    value
        .attr("style")
        .map(|s| {
            let style: String = s.chars().filter(|c| !c.is_whitespace()).collect();
            let style = style.to_lowercase();
            style.contains("display:none") || style.contains("visibility:hidden")
        })
        .unwrap_or(false)
}

fn parse_document(base: &Url, html: &str) -> Document {
    let parsed = Html::parse_document(html);
    let all = Selector::parse("*").expect("universal selector is valid");
    let img = Selector::parse("img[src]").expect("img selector is valid");
    let form_tag = Selector::parse("form").expect("form selector is valid");

    let form_ids: HashMap<_, usize> = parsed
        .select(&form_tag)
        .enumerate()
        .map(|(i, f)| (f.id(), i))
        .collect();
    let mut forms: Vec<StaticForm> = parsed
        .select(&form_tag)
        .map(|f| StaticForm {
            action: f
                .value()
                .attr("action")
                .filter(|a| !a.trim().is_empty())
                .and_then(|a| resolve(base, a))
                .unwrap_or_else(|| base.clone()),
            method: match f.value().attr("method") {
                Some(m) if m.eq_ignore_ascii_case("post") => Method::POST,
                _ => Method::GET,
            },
            fields: Vec::new(),
        })
        .collect();

    let mut elements = Vec::new();
    for (index, element) in parsed.select(&all).enumerate() {
        let lineage: Vec<DomElement> = std::iter::once(element)
            .chain(element.ancestors().filter_map(DomElement::wrap))
            .collect();

        let link = lineage
            .iter()
            .find_map(|e| e.value().attr("href"))
            .and_then(|href| resolve(base, href))
            .map(|u| u.to_string());
        let form = lineage
            .iter()
            .skip(1)
            .find_map(|e| form_ids.get(&e.id()).copied());

        let tag = element.value().name().to_lowercase();
        let static_element = StaticElement {
            attrs: element
                .value()
                .attrs()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            text: collapse_whitespace(&element.text().collect::<Vec<_>>().join(" ")),
            outer_html: element.html(),
            images: element
                .select(&img)
                .filter_map(|i| i.value().attr("src"))
                .filter_map(|src| resolve(base, src))
                .map(|u| u.to_string())
                .collect(),
            hidden: lineage.iter().any(is_hidden_node),
            link,
            form,
            tag,
        };

        if let Some(form) = static_element.form
            && static_element.attr("name").is_some()
            && matches!(static_element.tag.as_str(), "input" | "select" | "textarea")
        {
            forms[form].fields.push(index);
        }
        elements.push(static_element);
    }

    Document {
        html: html.to_string(),
        elements,
        forms,
    }
}

/// A page backed by plain HTTP requests.
pub struct HttpPage {
    client: Client,
    current_url: String,
    document: Option<Document>,
    values: HashMap<usize, String>,
}

impl HttpPage {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            current_url: "about:blank".to_string(),
            document: None,
            values: HashMap::new(),
        }
    }

    pub fn with_timeout(timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .user_agent("Snare/0.1")
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(timeout_secs.div_ceil(2)))
            .cookie_store(true)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;
        Ok(Self::new(client))
    }

    fn document(&self) -> Result<&Document> {
        self.document
            .as_ref()
            .ok_or_else(|| ScanError::Driver("no document loaded".to_string()))
    }

    fn element(&self, element: &ElementRef) -> Result<&StaticElement> {
        self.document()?
            .elements
            .get(element.0 as usize)
            .ok_or_else(|| ScanError::Driver(format!("stale element handle {}", element.0)))
    }

    fn unchanged_record(&self) -> VisitRecord {
        let html = self.document.as_ref().map(|d| d.html.clone());
        let mut record = VisitRecord::started(&self.current_url, html.clone());
        record.ending_url = Some(self.current_url.clone());
        record.ending_html = html;
        record
    }

    async fn navigate(
        &mut self,
        method: Method,
        url: &str,
        form: Option<Vec<(String, String)>>,
    ) -> Result<VisitRecord> {
        let target = Url::parse(url).map_err(|e| ScanError::InvalidUrl(format!("{}: {}", url, e)))?;
        let mut record = VisitRecord::started(
            &self.current_url,
            self.document.as_ref().map(|d| d.html.clone()),
        );
        if self.document.is_none() {
            record.starting_url = Some(target.to_string());
        }

        debug!("{} {}", method, target);
        let mut request = self.client.request(method.clone(), target.clone());
        if let Some(pairs) = form {
            if method == Method::GET {
                let mut with_query = target.clone();
                with_query.query_pairs_mut().clear().extend_pairs(pairs);
                request = self.client.request(Method::GET, with_query);
            } else {
                request = request.form(&pairs);
            }
        }

        let response = request.send().await?;
        let final_url = response.url().clone();
        let status = response.status();
        let headers: BTreeMap<String, String> = response
            .headers()
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or_default().to_string()))
            .collect();
        let body = response.text().await?;

        record.response_log.push(ResponseRecord {
            url: final_url.to_string(),
            method: method.to_string(),
            status: status.as_u16(),
            status_text: status.canonical_reason().map(str::to_string),
            headers,
            body_length: Some(body.len()),
            body: Some(body.clone()),
        });

        self.document = Some(parse_document(&final_url, &body));
        self.values.clear();
        self.current_url = final_url.to_string();
        record.ending_url = Some(self.current_url.clone());
        record.ending_html = Some(body);
        Ok(record)
    }

    async fn submit_form(&mut self, form: usize) -> Result<VisitRecord> {
        let document = self.document()?;
        let form = document.forms[form].clone();
        let mut pairs = Vec::new();
        for &index in &form.fields {
            let field = &document.elements[index];
            let Some(name) = field.attr("name") else {
                continue;
            };
            let value = match self.values.get(&index) {
                Some(value) => value.clone(),
                None => match field.input_type().as_deref() {
                    Some("checkbox" | "radio") if field.attr("checked").is_none() => continue,
                    Some("submit" | "image" | "button" | "reset" | "file") => continue,
                    _ if field.tag == "textarea" => field.text.clone(),
                    _ => field.attr("value").unwrap_or_default().to_string(),
                },
            };
            pairs.push((name.to_string(), value));
        }
        self.navigate(form.method, form.action.as_str(), Some(pairs))
            .await
    }
}

#[async_trait]
impl PageDriver for HttpPage {
    fn current_url(&self) -> String {
        self.current_url.clone()
    }

    async fn open(&mut self, url: &str) -> Result<VisitRecord> {
        self.navigate(Method::GET, url, None).await
    }

    async fn reload(&mut self) -> Result<VisitRecord> {
        if self.document.is_none() {
            return Err(ScanError::Driver("nothing to reload".to_string()));
        }
        let url = self.current_url.clone();
        self.navigate(Method::GET, &url, None).await
    }

    async fn content(&mut self) -> Result<String> {
        Ok(self.document()?.html.clone())
    }

    async fn query_all_elements(&mut self) -> Result<Vec<ElementRef>> {
        let count = self.document()?.elements.len();
        Ok((0..count as u64).map(ElementRef).collect())
    }

    async fn evaluate(&mut self, element: &ElementRef, probe: &Probe) -> Result<serde_json::Value> {
        let base = Url::parse(&self.current_url).ok();
        let el = self.element(element)?;
        Ok(match probe {
            Probe::Fingerprint => json!({
                "tag": el.tag.to_uppercase(),
                "role": el.attr("role"),
                "text": if el.hidden { String::new() } else { el.text.clone() },
                "src": el.attr("src").and_then(|s| base.as_ref().and_then(|b| resolve(b, s))).map(|u| u.to_string()),
                "images": el.images,
            }),
            Probe::OuterHtml => json!(el.outer_html),
            Probe::Traits => json!({
                "tag": el.tag,
                "role": el.attr("role"),
                "visible": !el.hidden,
                "navigable": el.link.is_some() || el.tag == "a",
                "disabled": el.attr("disabled").is_some(),
                "input_type": el.input_type(),
            }),
            Probe::Attribute(name) => json!(el.attr(name)),
        })
    }

    async fn click(&mut self, element: &ElementRef, _timeout: Duration) -> Result<VisitRecord> {
        let el = self.element(element)?.clone();
        if let Some(link) = el.link {
            return self.navigate(Method::GET, &link, None).await;
        }
        if let Some(form) = el.form
            && el.is_submit_control()
        {
            return self.submit_form(form).await;
        }
        Ok(self.unchanged_record())
    }

    async fn press_enter(
        &mut self,
        element: &ElementRef,
        _timeout: Duration,
    ) -> Result<VisitRecord> {
        match self.element(element)?.form {
            Some(form) => self.submit_form(form).await,
            None => Ok(self.unchanged_record()),
        }
    }

    async fn fill(&mut self, element: &ElementRef, text: &str) -> Result<()> {
        if !self.element(element)?.is_fillable() {
            return Err(ScanError::Driver(format!(
                "element {} cannot be filled",
                element.0
            )));
        }
        self.values.insert(element.0 as usize, text.to_string());
        Ok(())
    }

    async fn screenshot(&mut self, _full_page: bool) -> Result<Vec<u8>> {
        Err(ScanError::Driver(
            "screenshots need a rendering browser driver".to_string(),
        ))
    }

    async fn clone_context(&self) -> Result<Box<dyn PageDriver>> {
        Ok(Box::new(HttpPage::new(self.client.clone())))
    }

    async fn close(&mut self) -> Result<()> {
        self.document = None;
        self.values.clear();
        self.current_url = "about:blank".to_string();
        Ok(())
    }
}
