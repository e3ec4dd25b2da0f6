use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::error::AppResult;
use crate::identity::Identity;
use crate::index::{IndexHit, IndexQuery, MatchMode};
use crate::model::{Attributes, EntityKind, ATTR_ID};
use crate::state::AppState;
use crate::store::EntityStore;
use crate::sync;
use crate::validate;

/// One ranked result, hydrated from the primary store. `record` is absent
/// when the indexed document outlived its record.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub kind: EntityKind,
    pub id: String,
    pub score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<Value>,
}

/// One suggestion: preview attributes plus the field and snippet that
/// matched the text.
#[derive(Debug, Clone, Serialize)]
pub struct Suggestion {
    pub kind: EntityKind,
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub matching_field: String,
    pub matching_value: String,
}

/// Single-word text matches as exact term or prefix; text with whitespace
/// matches as a phrase.
fn build_query(state: &AppState, caller: &Identity, text: &str) -> AppResult<IndexQuery> {
    let text = validate::require_search_text(text)?;
    let mode = if text.contains(char::is_whitespace) {
        MatchMode::Phrase
    } else {
        MatchMode::TermOrPrefix
    };
    Ok(IndexQuery {
        text: text.to_string(),
        mode,
        owner_id: caller.user_id.clone(),
        size: state.config.search_size,
    })
}

/// Batch-fetch the hit records from the primary store, grouped by kind,
/// keyed by id. Ids the store no longer knows are simply absent.
async fn hydrate(
    store: &dyn EntityStore,
    hits: &[IndexHit],
) -> AppResult<HashMap<String, Attributes>> {
    let mut by_kind: BTreeMap<EntityKind, Vec<String>> = BTreeMap::new();
    for hit in hits {
        by_kind.entry(hit.kind).or_default().push(hit.id.clone());
    }

    let mut records = HashMap::new();
    for (kind, ids) in by_kind {
        for row in store.batch_get(kind, &ids).await? {
            if let Some(id) = row.get(ATTR_ID).and_then(Value::as_str) {
                records.insert(id.to_string(), row);
            }
        }
    }
    Ok(records)
}

pub async fn search(state: &AppState, caller: &Identity, text: &str) -> AppResult<Vec<SearchHit>> {
    let query = build_query(state, caller, text)?;
    let started = Instant::now();

    let hits = state.index.search(&query).await?;
    let mut records = hydrate(state.store.as_ref(), &hits).await?;

    let results: Vec<SearchHit> = hits
        .into_iter()
        .map(|hit| {
            let record = records.remove(&hit.id).map(Value::Object);
            SearchHit {
                kind: hit.kind,
                id: hit.id,
                score: hit.score,
                record,
            }
        })
        .collect();

    info!(
        elapsed_ms = started.elapsed().as_millis() as u64,
        hits = results.len(),
        "search completed"
    );
    Ok(results)
}

/// Hits whose record is gone or no longer contains the text are suppressed.
pub async fn suggest(state: &AppState, caller: &Identity, text: &str) -> AppResult<Vec<Suggestion>> {
    let query = build_query(state, caller, text)?;
    let needle = query.text.to_lowercase();

    let hits = state.index.search(&query).await?;
    let mut records = hydrate(state.store.as_ref(), &hits).await?;

    let mut suggestions = Vec::new();
    for hit in hits {
        let Some(record) = records.remove(&hit.id) else {
            continue;
        };
        if let Some(suggestion) = to_suggestion(hit.kind, &record, &needle) {
            suggestions.push(suggestion);
        }
    }

    info!(count = suggestions.len(), "suggest completed");
    Ok(suggestions)
}

fn to_suggestion(kind: EntityKind, record: &Attributes, needle: &str) -> Option<Suggestion> {
    let (field, value) = find_match(kind, record, needle)?;
    let matching_value = snippet(value, needle)?;
    let id = record.get(ATTR_ID).and_then(Value::as_str)?.to_string();

    let name = match kind {
        EntityKind::Dwelling | EntityKind::Room => preview_attr(record, "name"),
        EntityKind::Item => None,
    };
    let description = match kind {
        EntityKind::Item => preview_attr(record, "description"),
        _ => None,
    };

    Some(Suggestion {
        kind,
        id,
        name,
        description,
        matching_field: field.to_string(),
        matching_value,
    })
}

fn preview_attr(record: &Attributes, field: &str) -> Option<String> {
    record.get(field).and_then(Value::as_str).map(str::to_string)
}

/// First searchable field whose value contains the text, in allow-list
/// order.
fn find_match<'a>(
    kind: EntityKind,
    record: &'a Attributes,
    needle: &str,
) -> Option<(&'static str, &'a str)> {
    for field in sync::searchable_fields(kind) {
        let Some(value) = record.get(*field).and_then(Value::as_str) else {
            continue;
        };
        if value.to_lowercase().contains(needle) {
            return Some((field, value));
        }
    }
    None
}

/// First word containing the text plus up to two following words. A match
/// that spans words yields no snippet.
fn snippet(value: &str, needle: &str) -> Option<String> {
    let words: Vec<&str> = value
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .collect();
    let position = words
        .iter()
        .position(|word| word.to_lowercase().contains(needle))?;
    let end = (position + 3).min(words.len());
    Some(words[position..end].join(" "))
}
