use crate::driver::{CallTimeouts, PageDriver, TimedPage};
use crate::error::{Result, ScanError};
use crate::explorer::{Explorer, ExplorerConfig};
use crate::forms::fill_form;
use crate::record::{CallingContext, VisitRecord};
use tracing::{debug, info};

/// Re-runs the action that produced `record` on a clone of `base`.
pub async fn replay(
    base: &dyn PageDriver,
    record: &VisitRecord,
    timeouts: CallTimeouts,
) -> Result<VisitRecord> {
    let context = record.calling_context.clone().ok_or_else(|| {
        ScanError::Other("visit record has no calling context to replay".to_string())
    })?;
    info!("Replaying {} on {}", context.function_name(), context.url());

    match &context {
        CallingContext::ClickSignatureSequence {
            url,
            signature_sequence,
            min_elements,
            num_reloads,
        } => {
            // A zero length limit replays the sequence without expanding it
            let explorer = Explorer::new(ExplorerConfig {
                max_sequence_length: 0,
                min_elements: *min_elements,
                num_reloads: *num_reloads,
                timeouts,
                ..Default::default()
            })?;
            explorer
                .explore_sequence(base, url, signature_sequence)
                .await?
                .visit
                .ok_or_else(|| ScanError::Other("empty signature sequence".to_string()))
        }
        CallingContext::OpenUrl { url } | CallingContext::FillForm { url, .. } => {
            let mut page = TimedPage::new(base.clone_context().await?, timeouts);
            let result = match &context {
                CallingContext::FillForm { form_input, .. } => match page.open(url).await {
                    Ok(_) => fill_form(&mut page, form_input, timeouts.action).await,
                    Err(e) => Err(e),
                },
                _ => page.open(url).await,
            };
            if let Err(e) = page.close().await {
                debug!("Failed to close replay page: {}", e);
            }
            Ok(result?.with_context(context.clone()))
        }
    }
}
