use tracing::info;

use crate::cascade::{self, PurgeSummary};
use crate::error::AppResult;
use crate::identity::Identity;
use crate::state::AppState;

/// Physically remove every record the caller owns, soft-deleted ones
/// included, and report what was removed.
pub async fn clear_user_data(state: &AppState, caller: &Identity) -> AppResult<PurgeSummary> {
    let summary = cascade::purge_owned(state.store.as_ref(), &caller.user_id).await?;
    info!(owner = %caller.user_id, removed = summary.total(), "user data cleared");
    Ok(summary)
}
