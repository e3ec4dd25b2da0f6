use chrono::Utc;

/// Epoch milliseconds, the timestamp unit on every stored record.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}
