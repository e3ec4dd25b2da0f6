use tracing::debug;

use crate::index::{IndexDirective, IndexError, SearchIndex, DOC_FIELD_KIND, DOC_FIELD_OWNER};
use crate::model::{Attributes, EntityKind, ATTR_OWNER_ID};
use crate::store::{attr_str, is_deleted, ChangeRecord};

const DWELLING_SEARCH_FIELDS: &[&str] = &[
    "name",
    "type",
    "address_line1",
    "address_line2",
    "city",
    "post_code",
];
const ROOM_SEARCH_FIELDS: &[&str] = &["name", "type"];
const ITEM_SEARCH_FIELDS: &[&str] = &[
    "description",
    "brand",
    "model",
    "serial_number",
    "retailer",
];

/// The human-searchable text fields indexed for a kind. Ids, flags and
/// timestamps never reach the index.
pub fn searchable_fields(kind: EntityKind) -> &'static [&'static str] {
    match kind {
        EntityKind::Dwelling => DWELLING_SEARCH_FIELDS,
        EntityKind::Room => ROOM_SEARCH_FIELDS,
        EntityKind::Item => ITEM_SEARCH_FIELDS,
    }
}

/// Index document field name for a record attribute, `{kind}_{field}`.
pub fn namespaced_field(kind: EntityKind, field: &str) -> String {
    format!("{}_{}", kind.as_str(), field)
}

/// Project one store mutation into an index directive. A removed record or
/// one whose soft-delete flag is set becomes a delete; everything else is an
/// add carrying only the allow-listed fields.
pub fn project_change(change: &ChangeRecord) -> IndexDirective {
    let Some(image) = change.new_image.as_ref().filter(|image| !is_deleted(image)) else {
        return IndexDirective::Delete {
            id: change.id.clone(),
        };
    };

    let mut fields = Attributes::new();
    fields.insert(DOC_FIELD_KIND.into(), change.kind.as_str().into());
    if let Some(owner) = attr_str(image, ATTR_OWNER_ID) {
        fields.insert(DOC_FIELD_OWNER.into(), owner.into());
    }
    for field in searchable_fields(change.kind) {
        if let Some(value) = attr_str(image, field).filter(|v| !v.is_empty()) {
            fields.insert(namespaced_field(change.kind, field), value.into());
        }
    }

    IndexDirective::Add {
        id: change.id.clone(),
        fields,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub adds: usize,
    pub deletes: usize,
}

/// Drain a batch of store mutations into the index, in commit order.
pub async fn apply_changes(
    index: &dyn SearchIndex,
    changes: Vec<ChangeRecord>,
) -> Result<SyncSummary, IndexError> {
    let mut summary = SyncSummary::default();
    let directives: Vec<IndexDirective> = changes
        .iter()
        .map(|change| {
            let directive = project_change(change);
            match directive {
                IndexDirective::Add { .. } => summary.adds += 1,
                IndexDirective::Delete { .. } => summary.deletes += 1,
            }
            directive
        })
        .collect();
    if !directives.is_empty() {
        index.upload(directives).await?;
    }
    debug!(
        adds = summary.adds,
        deletes = summary.deletes,
        "synchronized store changes into the search index"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::MemoryIndex;
    use crate::model::ATTR_DELETED;
    use serde_json::json;

    fn room_image(owner: &str, name: &str, deleted: bool) -> Attributes {
        let mut image = Attributes::new();
        image.insert("id".into(), json!("r-1"));
        image.insert(ATTR_OWNER_ID.into(), json!(owner));
        image.insert("dwelling_id".into(), json!("d-1"));
        image.insert("name".into(), json!(name));
        image.insert("type".into(), json!("Lounge"));
        image.insert(ATTR_DELETED.into(), json!(deleted));
        image.insert("created_at".into(), json!(1_700_000_000_000_i64));
        image
    }

    #[test]
    fn removed_records_project_to_deletes() {
        let change = ChangeRecord {
            kind: EntityKind::Room,
            id: "r-1".into(),
            new_image: None,
        };
        assert_eq!(
            project_change(&change),
            IndexDirective::Delete { id: "r-1".into() }
        );
    }

    #[test]
    fn soft_deleted_records_project_to_deletes() {
        let change = ChangeRecord {
            kind: EntityKind::Room,
            id: "r-1".into(),
            new_image: Some(room_image("u-1", "Lounge", true)),
        };
        assert_eq!(
            project_change(&change),
            IndexDirective::Delete { id: "r-1".into() }
        );
    }

    #[test]
    fn adds_carry_only_namespaced_text_fields() {
        let change = ChangeRecord {
            kind: EntityKind::Room,
            id: "r-1".into(),
            new_image: Some(room_image("u-1", "Front lounge", false)),
        };
        let IndexDirective::Add { id, fields } = project_change(&change) else {
            panic!("expected an add directive");
        };
        assert_eq!(id, "r-1");
        assert_eq!(fields.get(DOC_FIELD_KIND), Some(&json!("room")));
        assert_eq!(fields.get(DOC_FIELD_OWNER), Some(&json!("u-1")));
        assert_eq!(fields.get("room_name"), Some(&json!("Front lounge")));
        assert_eq!(fields.get("room_type"), Some(&json!("Lounge")));
        // ids, flags and timestamps stay out of the document
        assert_eq!(fields.len(), 4);
    }

    #[tokio::test]
    async fn apply_changes_updates_the_index_and_counts() -> anyhow::Result<()> {
        let index = MemoryIndex::new();
        let summary = apply_changes(
            &index,
            vec![
                ChangeRecord {
                    kind: EntityKind::Room,
                    id: "r-1".into(),
                    new_image: Some(room_image("u-1", "Lounge", false)),
                },
                ChangeRecord {
                    kind: EntityKind::Room,
                    id: "r-2".into(),
                    new_image: None,
                },
            ],
        )
        .await?;
        assert_eq!(summary, SyncSummary { adds: 1, deletes: 1 });
        assert!(index.document("r-1").is_some());
        assert!(index.document("r-2").is_none());
        Ok(())
    }
}
