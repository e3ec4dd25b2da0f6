use serde::Serialize;
use serde_json::{json, Value};

use crate::error::{AppError, AppResult};

/// Wire form every operation resolves to: an HTTP-style status carrying
/// either the resulting payload or an error message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope {
    pub status: u16,
    pub body: Value,
}

impl Envelope {
    pub fn ok<T: Serialize>(payload: &T) -> Envelope {
        match serde_json::to_value(payload) {
            Ok(body) => Envelope { status: 200, body },
            Err(err) => Envelope::error(&AppError::from(err)),
        }
    }

    pub fn error(err: &AppError) -> Envelope {
        Envelope {
            status: err.status(),
            body: json!({ "message": err.to_string() }),
        }
    }

    pub fn message(&self) -> Option<&str> {
        self.body.get("message").and_then(Value::as_str)
    }
}

/// Collapse a handler result into its wire form.
pub fn envelope<T: Serialize>(result: AppResult<T>) -> Envelope {
    match result {
        Ok(payload) => Envelope::ok(&payload),
        Err(err) => Envelope::error(&err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EntityKind;

    #[test]
    fn success_carries_the_payload() {
        let env = envelope(Ok(vec!["a", "b"]));
        assert_eq!(env.status, 200);
        assert_eq!(env.body, json!(["a", "b"]));
        assert!(env.message().is_none());
    }

    #[test]
    fn errors_carry_status_and_message() {
        let env = envelope::<()>(Err(AppError::not_found(EntityKind::Room)));
        assert_eq!(env.status, 404);
        assert_eq!(env.message(), Some("room not found"));
    }
}
