use crate::error::{AppError, AppResult};
use crate::identity::Identity;
use crate::model::{Entity, Room};

/// Require a non-blank value for a mandatory create field.
pub fn required<'a>(value: Option<&'a str>, message: &str) -> AppResult<&'a str> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(AppError::validation(message)),
    }
}

/// Batch payloads must carry at least one element.
pub fn required_batch<T>(elements: &[T], message: &str) -> AppResult<()> {
    if elements.is_empty() {
        return Err(AppError::validation(message));
    }
    Ok(())
}

/// Ownership gate for reads and mutations of an existing record. A missing
/// record and a foreign record produce the same 404.
pub fn require_owned<T: Entity>(record: Option<T>, caller: &Identity) -> AppResult<T> {
    match record {
        Some(record) if record.owner_id() == caller.user_id => Ok(record),
        _ => Err(AppError::not_found(T::KIND)),
    }
}

/// Parent reference gate for creates. Unlike [`require_owned`] this is a
/// validation failure, and the parent must still be active.
pub fn require_parent<T: Entity>(
    record: Option<T>,
    caller: &Identity,
    message: &str,
) -> AppResult<T> {
    match record {
        Some(record) if record.owner_id() == caller.user_id && !record.deleted() => Ok(record),
        _ => Err(AppError::validation(message)),
    }
}

/// The system-generated Misc room refuses normal room operations.
pub fn require_unprotected(room: &Room, action: &str) -> AppResult<()> {
    if room.protected {
        return Err(AppError::forbidden(format!(
            "Misc room is not allowed to be {action}"
        )));
    }
    Ok(())
}

pub fn require_admin(caller: &Identity) -> AppResult<()> {
    if !caller.is_admin() {
        return Err(AppError::forbidden("admin access required"));
    }
    Ok(())
}

/// Search text must carry at least three characters before the index is
/// consulted.
pub fn require_search_text(text: &str) -> AppResult<&str> {
    if text.chars().count() < 3 {
        return Err(AppError::validation(
            "search text must be at least 3 characters",
        ));
    }
    Ok(text)
}
