use anyhow::Result;

use super::context::{FailedItems, FirstError};

/// Check run result: if strict and a first error was recorded, return it; otherwise warn about failed items.
/// Call after joining every stage.
pub fn check_for_first_error_or_failed_items(
    strict: bool,
    first_error: &FirstError,
    failed_items: &FailedItems,
) -> Result<()> {
    if strict && let Some(msg) = first_error.lock().unwrap().take() {
        return Err(anyhow::anyhow!("{}", msg));
    }
    let failed = failed_items.lock().unwrap();
    if !failed.is_empty() {
        log::warn!(
            "Skipped {} items because the work function failed",
            failed.len()
        );
        for (item, msg) in failed.iter() {
            log::debug!("  failed: {} ({})", item, msg);
        }
    }
    Ok(())
}
