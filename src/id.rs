use uuid::Uuid;

/// Time-ordered record id. Sorting by id approximates creation order, which
/// keeps store iteration stable for aggregate carry-through.
pub fn new_uuid_v7() -> String {
    Uuid::now_v7().to_string()
}
