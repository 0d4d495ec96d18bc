// Form probing: fill every text field with a throwaway address and submit.

use crate::driver::{CallTimeouts, ElementRef, PageDriver, Probe, TimedPage};
use crate::error::{Result, ScanError};
use crate::fingerprint::fillable_elements;
use crate::record::{CallingContext, VisitRecord};
use crate::result::VisitedForm;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

const FIELD_KEY_ATTRIBUTES: &[&str] = &["name", "id", "placeholder", "aria-label"];

#[derive(Debug, Clone)]
pub struct FormField {
    pub element: ElementRef,
    /// First non-empty of name, id, placeholder, aria-label; else the stable signature.
    pub key: String,
}

/// `<uuid>@<uuid>.com`, which also passes email validation.
pub fn random_value() -> String {
    format!("{}@{}.com", Uuid::new_v4(), Uuid::new_v4())
}

/// Visible text fields on the page, in document order.
pub async fn form_fields(page: &mut dyn PageDriver) -> Result<Vec<FormField>> {
    let mut fields = Vec::new();
    for fillable in fillable_elements(page).await? {
        let mut key = None;
        for attribute in FIELD_KEY_ATTRIBUTES {
            let value = page
                .evaluate(&fillable.element, &Probe::Attribute(attribute.to_string()))
                .await?;
            if let Some(v) = value.as_str().filter(|v| !v.trim().is_empty()) {
                key = Some(v.to_string());
                break;
            }
        }
        fields.push(FormField {
            element: fillable.element,
            key: key.unwrap_or_else(|| fillable.stable.to_string()),
        });
    }
    Ok(fields)
}

/// Fills the fields named in `form_input` and presses Enter in the last one.
pub async fn fill_form(
    page: &mut dyn PageDriver,
    form_input: &BTreeMap<String, String>,
    timeout: Duration,
) -> Result<VisitRecord> {
    let mut last = None;
    for field in form_fields(page).await? {
        if let Some(value) = form_input.get(&field.key) {
            page.fill(&field.element, value).await?;
            last = Some(field.element);
        }
    }
    let Some(last) = last else {
        return Err(ScanError::ElementNotFound {
            signature: form_input.keys().cloned().collect::<Vec<_>>().join(", "),
        });
    };
    page.press_enter(&last, timeout).await
}

async fn submit_on(
    page: &mut dyn PageDriver,
    url: &str,
    timeout: Duration,
) -> Result<Option<VisitedForm>> {
    page.open(url).await?;
    let fields = form_fields(page).await?;
    if fields.is_empty() {
        debug!("No form fields on {}", url);
        return Ok(None);
    }

    let field_values: BTreeMap<String, String> = fields
        .iter()
        .map(|f| (f.key.clone(), random_value()))
        .collect();
    info!("Submitting {} form fields on {}", field_values.len(), url);

    let visit = fill_form(page, &field_values, timeout)
        .await?
        .with_context(CallingContext::FillForm {
            url: url.to_string(),
            form_input: field_values.clone(),
        });
    Ok(Some(VisitedForm {
        field_values,
        visit,
    }))
}

/// Opens `url` on a clone of `base`, fills its text fields and submits.
/// `None` when the page has no text fields.
pub async fn submit_form(
    base: &dyn PageDriver,
    url: &str,
    timeouts: CallTimeouts,
) -> Result<Option<VisitedForm>> {
    let mut page = TimedPage::new(base.clone_context().await?, timeouts);
    let result = submit_on(&mut page, url, timeouts.action).await;
    if let Err(e) = page.close().await {
        debug!("Failed to close form page: {}", e);
    }
    result
}
