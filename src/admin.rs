use serde::Deserialize;
use tracing::info;

use crate::error::AppResult;
use crate::identity::Identity;
use crate::state::AppState;
use crate::validate;

const MSG_USERNAME_REQUIRED: &str = "username is required";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InvalidateSession {
    #[serde(default)]
    pub username: Option<String>,
}

/// Force a global sign-out of one named user. Admin only; a directory
/// failure surfaces as 401.
pub async fn admin_invalidate_session(
    state: &AppState,
    caller: &Identity,
    req: InvalidateSession,
) -> AppResult<()> {
    validate::require_admin(caller)?;
    let username = validate::required(req.username.as_deref(), MSG_USERNAME_REQUIRED)?;
    state.directory.global_sign_out(username).await?;
    info!(username = %username, admin = %caller.user_id, "session invalidated");
    Ok(())
}
