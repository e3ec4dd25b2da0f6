use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{Attributes, EntityKind};

/// Document field carrying the entity kind, used to hydrate hits.
pub const DOC_FIELD_KIND: &str = "kind";
/// Document field carrying the owner id, the mandatory query filter.
pub const DOC_FIELD_OWNER: &str = "owner_id";

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("search index error: {0}")]
    Backend(String),
}

/// One CDC projection result bound for the index.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexDirective {
    Add { id: String, fields: Attributes },
    Delete { id: String },
}

impl IndexDirective {
    pub fn id(&self) -> &str {
        match self {
            IndexDirective::Add { id, .. } => id,
            IndexDirective::Delete { id } => id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// Single token: exact term OR prefix match.
    TermOrPrefix,
    /// Multi-word text: case-insensitive phrase containment.
    Phrase,
}

#[derive(Debug, Clone)]
pub struct IndexQuery {
    pub text: String,
    pub mode: MatchMode,
    pub owner_id: String,
    pub size: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexHit {
    pub id: String,
    pub kind: EntityKind,
    pub score: f64,
}

/// Secondary search index fed by the CDC pipeline and queried by the
/// search handlers.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Apply directives in order.
    async fn upload(&self, directives: Vec<IndexDirective>) -> Result<(), IndexError>;

    /// Ranked owner-filtered hits, score descending, capped at `size`.
    async fn search(&self, query: &IndexQuery) -> Result<Vec<IndexHit>, IndexError>;
}

/// In-memory index with a deliberately small scorer: exact word 2.0, word
/// prefix 1.0, phrase containment 1.0 per field. Good enough to rank and
/// stable across runs; ties break on document id.
#[derive(Default)]
pub struct MemoryIndex {
    docs: RwLock<BTreeMap<String, Attributes>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.docs.read().expect("index lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn document(&self, id: &str) -> Option<Attributes> {
        self.docs.read().expect("index lock").get(id).cloned()
    }
}

fn score_document(fields: &Attributes, needle: &str, mode: MatchMode) -> f64 {
    let mut score = 0.0;
    for (name, value) in fields {
        if name == DOC_FIELD_KIND || name == DOC_FIELD_OWNER {
            continue;
        }
        let Some(text) = value.as_str() else {
            continue;
        };
        let lower = text.to_lowercase();
        match mode {
            MatchMode::Phrase => {
                if lower.contains(needle) {
                    score += 1.0;
                }
            }
            MatchMode::TermOrPrefix => {
                for word in lower
                    .split(|c: char| !c.is_alphanumeric())
                    .filter(|w| !w.is_empty())
                {
                    if word == needle {
                        score += 2.0;
                    } else if word.starts_with(needle) {
                        score += 1.0;
                    }
                }
            }
        }
    }
    score
}

#[async_trait]
impl SearchIndex for MemoryIndex {
    async fn upload(&self, directives: Vec<IndexDirective>) -> Result<(), IndexError> {
        let mut docs = self.docs.write().expect("index lock");
        for directive in directives {
            match directive {
                IndexDirective::Add { id, fields } => {
                    docs.insert(id, fields);
                }
                IndexDirective::Delete { id } => {
                    docs.remove(&id);
                }
            }
        }
        Ok(())
    }

    async fn search(&self, query: &IndexQuery) -> Result<Vec<IndexHit>, IndexError> {
        let needle = query.text.to_lowercase();
        let docs = self.docs.read().expect("index lock");
        let mut hits = Vec::new();
        for (id, fields) in docs.iter() {
            let owner = fields.get(DOC_FIELD_OWNER).and_then(|v| v.as_str());
            if owner != Some(query.owner_id.as_str()) {
                continue;
            }
            let Some(kind) = fields
                .get(DOC_FIELD_KIND)
                .and_then(|v| v.as_str())
                .and_then(EntityKind::parse)
            else {
                continue;
            };
            let score = score_document(fields, &needle, query.mode);
            if score > 0.0 {
                hits.push(IndexHit {
                    id: id.clone(),
                    kind,
                    score,
                });
            }
        }
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        hits.truncate(query.size);
        Ok(hits)
    }
}
