use crate::record::VisitRecord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScreenshotRecord {
    pub path: Option<String>,
    pub error: Option<String>,
}

impl ScreenshotRecord {
    pub fn saved(path: String) -> Self {
        Self {
            path: Some(path),
            error: None,
        }
    }

    pub fn failed(error: String) -> Self {
        Self {
            path: None,
            error: Some(error),
        }
    }
}

/// A form filled with random values and submitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisitedForm {
    pub field_values: BTreeMap<String, String>,
    pub visit: VisitRecord,
}

/// Everything recorded while visiting one URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisitedPage {
    pub url: String,
    pub open_visit: VisitRecord,
    #[serde(default)]
    pub urls_on_page: Vec<String>,
    #[serde(default)]
    pub forms: Vec<VisitedForm>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<ScreenshotRecord>,
    #[serde(default)]
    pub dynamic_visits: Vec<VisitRecord>,
}

impl VisitedPage {
    pub fn new(url: String, open_visit: VisitRecord) -> Self {
        Self {
            url,
            open_visit,
            urls_on_page: Vec::new(),
            forms: Vec::new(),
            screenshot: None,
            dynamic_visits: Vec::new(),
        }
    }

    /// The open visit first, then form submissions, then explored sequences.
    pub fn visit_records(&self) -> Vec<&VisitRecord> {
        std::iter::once(&self.open_visit)
            .chain(self.forms.iter().map(|f| &f.visit))
            .chain(self.dynamic_visits.iter())
            .collect()
    }

    pub fn truncate_response_bodies(&mut self, max_length: usize) {
        self.open_visit.truncate_response_bodies(max_length);
        for form in &mut self.forms {
            form.visit.truncate_response_bodies(max_length);
        }
        for visit in &mut self.dynamic_visits {
            visit.truncate_response_bodies(max_length);
        }
    }
}

/// Hex digest used to name persisted artifacts.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = DefaultHasher::new();
    bytes.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

/// URL bookkeeping of one finished crawl, each list sorted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrawlSummary {
    pub visited: Vec<String>,
    pub skipped: Vec<String>,
    pub assets: Vec<String>,
    /// URLs whose visit raised and were dropped.
    pub failed: Vec<String>,
    pub enqueued_count: usize,
}
