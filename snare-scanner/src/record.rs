use crate::signature::SignatureSequence;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One network response observed while a visit was recorded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseRecord {
    pub url: String,
    pub method: String,
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_text: Option<String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body_length: Option<usize>,
}

/// The action that produced a [`VisitRecord`], kept so the visit can be replayed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "function", rename_all = "snake_case")]
pub enum CallingContext {
    OpenUrl {
        url: String,
    },
    FillForm {
        url: String,
        form_input: BTreeMap<String, String>,
    },
    ClickSignatureSequence {
        url: String,
        signature_sequence: SignatureSequence,
        min_elements: usize,
        num_reloads: usize,
    },
}

impl CallingContext {
    pub fn url(&self) -> &str {
        match self {
            CallingContext::OpenUrl { url }
            | CallingContext::FillForm { url, .. }
            | CallingContext::ClickSignatureSequence { url, .. } => url,
        }
    }

    pub fn function_name(&self) -> &'static str {
        match self {
            CallingContext::OpenUrl { .. } => "open_url",
            CallingContext::FillForm { .. } => "fill_form",
            CallingContext::ClickSignatureSequence { .. } => "click_signature_sequence",
        }
    }
}

/// Everything observed across one browser action: page state before and after,
/// the responses, dialogs and console errors in between.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VisitRecord {
    pub timestamp: Option<i64>,
    pub starting_url: Option<String>,
    pub ending_url: Option<String>,
    pub starting_html: Option<String>,
    pub ending_html: Option<String>,
    #[serde(default)]
    pub response_log: Vec<ResponseRecord>,
    #[serde(default)]
    pub dialog_message_log: Vec<String>,
    #[serde(default)]
    pub console_error_message_log: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calling_context: Option<CallingContext>,
}

impl VisitRecord {
    pub fn started(url: &str, html: Option<String>) -> Self {
        Self {
            timestamp: Some(Utc::now().timestamp()),
            starting_url: Some(url.to_string()),
            starting_html: html,
            ..Default::default()
        }
    }

    /// A page-load failure. The URL still counts as visited.
    pub fn failed(url: &str, error: String) -> Self {
        Self {
            error: Some(error),
            ..Self::started(url, None)
        }
    }

    pub fn with_context(mut self, context: CallingContext) -> Self {
        self.calling_context = Some(context);
        self
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn ending_status(&self) -> Option<u16> {
        let ending = self.ending_url.as_deref()?;
        self.response_log
            .iter()
            .rev()
            .find(|r| r.url == ending)
            .or_else(|| self.response_log.last())
            .map(|r| r.status)
    }

    /// Cut every response body down to `max_length` characters.
    pub fn truncate_response_bodies(&mut self, max_length: usize) {
        for response in &mut self.response_log {
            if let Some(ref mut body) = response.body
                && body.chars().count() > max_length
            {
                *body = body.chars().take(max_length).collect();
            }
        }
    }
}
