use crate::driver::PageDriver;
use crate::error::Result;
use scraper::{Html, Selector};
use std::collections::HashSet;
use tracing::debug;
use url::Url;

fn resolve_url(base: &Url, href: &str) -> Option<String> {
    let href = href.trim();
    // Skip empty, javascript:, mailto:, tel:, and bare anchors
    if href.is_empty()
        || href == "#"
        || href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
    {
        return None;
    }
    base.join(href).ok().map(|u| u.to_string())
}

/// Absolute targets of every `a[href]`, in document order.
pub fn href_links(html: &str, page_url: &str) -> Vec<String> {
    let Ok(base) = Url::parse(page_url) else {
        return Vec::new();
    };
    let document = Html::parse_document(html);
    let link_selector = Selector::parse("a[href]").unwrap();

    document
        .select(&link_selector)
        .filter_map(|element| element.value().attr("href"))
        .filter_map(|href| resolve_url(&base, href))
        .collect()
}

/// Absolute `img` sources, including every candidate of a `srcset`.
pub fn image_links(html: &str, page_url: &str) -> Vec<String> {
    let Ok(base) = Url::parse(page_url) else {
        return Vec::new();
    };
    let document = Html::parse_document(html);
    let img_selector = Selector::parse("img").unwrap();

    let mut links = Vec::new();
    for img in document.select(&img_selector) {
        if let Some(src) = img.value().attr("src")
            && let Some(url) = resolve_url(&base, src)
        {
            links.push(url);
        }
        if let Some(srcset) = img.value().attr("srcset") {
            // Each candidate is "url [descriptor]"
            links.extend(
                srcset
                    .split(',')
                    .filter_map(|candidate| candidate.split_whitespace().next())
                    .filter_map(|src| resolve_url(&base, src)),
            );
        }
    }
    links
}

/// Links then images, first occurrence wins.
pub fn extract_links(html: &str, page_url: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    href_links(html, page_url)
        .into_iter()
        .chain(image_links(html, page_url))
        .filter(|link| seen.insert(link.clone()))
        .collect()
}

/// Harvests links from the page's current document.
pub async fn harvest_links(page: &mut dyn PageDriver) -> Result<Vec<String>> {
    let html = page.content().await?;
    let url = page.current_url();
    let links = extract_links(&html, &url);
    debug!("Harvested {} links from {}", links.len(), url);
    Ok(links)
}
