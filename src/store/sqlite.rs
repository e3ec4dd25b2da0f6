use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use crate::model::{Attributes, EntityKind, ATTR_OWNER_ID};

use super::{
    attr_str, is_deleted, require_id, ChangeListener, ChangeRecord, EntityStore, PutCondition,
    QueryKey, StoreError, Visibility,
};

/// SQLite-backed entity store. All kinds share one `records` table keyed by
/// `(kind, id)` with the full attribute map in a JSON column; owner and
/// parent ids are lifted into indexed columns for the two query paths.
pub struct SqliteStore {
    pool: SqlitePool,
    listener: Option<Arc<dyn ChangeListener>>,
}

impl SqliteStore {
    pub async fn open(pool: SqlitePool) -> Result<Self, StoreError> {
        ensure_schema(&pool).await?;
        Ok(SqliteStore {
            pool,
            listener: None,
        })
    }

    pub fn with_listener(mut self, listener: Arc<dyn ChangeListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn emit(&self, change: ChangeRecord) {
        if let Some(listener) = &self.listener {
            listener.notify(change);
        }
    }
}

async fn ensure_schema(pool: &SqlitePool) -> Result<(), StoreError> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS records (\n\
            kind TEXT NOT NULL,\n\
            id TEXT NOT NULL,\n\
            owner_id TEXT NOT NULL,\n\
            parent_id TEXT,\n\
            deleted INTEGER NOT NULL DEFAULT 0,\n\
            attrs TEXT NOT NULL,\n\
            PRIMARY KEY (kind, id)\n\
        )",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS records_owner_idx ON records (kind, owner_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS records_parent_idx ON records (kind, parent_id)")
        .execute(pool)
        .await?;
    Ok(())
}

struct RowShape {
    id: String,
    owner_id: String,
    parent_id: Option<String>,
    deleted: bool,
    attrs_json: String,
}

fn shape_row(kind: EntityKind, attrs: &Attributes) -> Result<RowShape, StoreError> {
    let id = require_id(kind, attrs)?;
    let owner_id = attr_str(attrs, ATTR_OWNER_ID)
        .map(str::to_string)
        .ok_or_else(|| {
            StoreError::Decode(format!("{kind} record {id} without an owner attribute"))
        })?;
    let parent_id = kind
        .parent_attr()
        .and_then(|attr| attr_str(attrs, attr))
        .map(str::to_string);
    Ok(RowShape {
        id,
        owner_id,
        parent_id,
        deleted: is_deleted(attrs),
        attrs_json: serde_json::to_string(attrs)?,
    })
}

fn parse_attrs(json: &str) -> Result<Attributes, StoreError> {
    Ok(serde_json::from_str(json)?)
}

fn rows_to_attrs(rows: Vec<sqlx::sqlite::SqliteRow>) -> Result<Vec<Attributes>, StoreError> {
    rows.into_iter()
        .map(|row| {
            let json: String = row.try_get("attrs")?;
            parse_attrs(&json)
        })
        .collect()
}

#[async_trait]
impl EntityStore for SqliteStore {
    async fn get(&self, kind: EntityKind, id: &str) -> Result<Option<Attributes>, StoreError> {
        let row = sqlx::query("SELECT attrs FROM records WHERE kind = ? AND id = ?")
            .bind(kind.as_str())
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => {
                let json: String = row.try_get("attrs")?;
                Ok(Some(parse_attrs(&json)?))
            }
            None => Ok(None),
        }
    }

    async fn batch_get(
        &self,
        kind: EntityKind,
        ids: &[String],
    ) -> Result<Vec<Attributes>, StoreError> {
        let mut rows = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(attrs) = self.get(kind, id).await? {
                rows.push(attrs);
            }
        }
        Ok(rows)
    }

    async fn query(
        &self,
        kind: EntityKind,
        key: QueryKey<'_>,
        vis: Visibility,
    ) -> Result<Vec<Attributes>, StoreError> {
        let (column, value) = match key {
            QueryKey::Owner(owner) => ("owner_id", owner),
            QueryKey::Parent(parent) => {
                if kind.parent_attr().is_none() {
                    return Err(StoreError::UnsupportedIndex {
                        kind,
                        index: "parent",
                    });
                }
                ("parent_id", parent)
            }
        };
        let mut sql =
            format!("SELECT attrs FROM records WHERE kind = ? AND {column} = ?");
        if vis == Visibility::Active {
            sql.push_str(" AND deleted = 0");
        }
        sql.push_str(" ORDER BY id");
        let rows = sqlx::query(&sql)
            .bind(kind.as_str())
            .bind(value)
            .fetch_all(&self.pool)
            .await?;
        rows_to_attrs(rows)
    }

    async fn scan(
        &self,
        kind: EntityKind,
        vis: Visibility,
    ) -> Result<Vec<Attributes>, StoreError> {
        let mut sql = String::from("SELECT attrs FROM records WHERE kind = ?");
        if vis == Visibility::Active {
            sql.push_str(" AND deleted = 0");
        }
        sql.push_str(" ORDER BY id");
        let rows = sqlx::query(&sql)
            .bind(kind.as_str())
            .fetch_all(&self.pool)
            .await?;
        rows_to_attrs(rows)
    }

    async fn put(
        &self,
        kind: EntityKind,
        attrs: Attributes,
        cond: PutCondition,
    ) -> Result<(), StoreError> {
        let shaped = shape_row(kind, &attrs)?;
        let sql = match cond {
            PutCondition::Overwrite => {
                "INSERT OR REPLACE INTO records (kind, id, owner_id, parent_id, deleted, attrs) \
                 VALUES (?, ?, ?, ?, ?, ?)"
            }
            PutCondition::IfAbsent => {
                "INSERT INTO records (kind, id, owner_id, parent_id, deleted, attrs) \
                 VALUES (?, ?, ?, ?, ?, ?)"
            }
        };
        let result = sqlx::query(sql)
            .bind(kind.as_str())
            .bind(&shaped.id)
            .bind(&shaped.owner_id)
            .bind(&shaped.parent_id)
            .bind(shaped.deleted)
            .bind(&shaped.attrs_json)
            .execute(&self.pool)
            .await;
        if let Err(err) = result {
            if let sqlx::Error::Database(db) = &err {
                if db.is_unique_violation() {
                    return Err(StoreError::Conflict {
                        kind,
                        id: shaped.id,
                    });
                }
            }
            return Err(err.into());
        }
        self.emit(ChangeRecord {
            kind,
            id: shaped.id,
            new_image: Some(attrs),
        });
        Ok(())
    }

    async fn update(
        &self,
        kind: EntityKind,
        id: &str,
        patch: Attributes,
    ) -> Result<Attributes, StoreError> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query("SELECT attrs FROM records WHERE kind = ? AND id = ?")
            .bind(kind.as_str())
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        let json: String = match row {
            Some(row) => row.try_get("attrs")?,
            None => {
                return Err(StoreError::Missing {
                    kind,
                    id: id.to_string(),
                })
            }
        };
        let mut attrs = parse_attrs(&json)?;
        for (key, value) in patch {
            attrs.insert(key, value);
        }
        let shaped = shape_row(kind, &attrs)?;
        sqlx::query(
            "UPDATE records SET owner_id = ?, parent_id = ?, deleted = ?, attrs = ? \
             WHERE kind = ? AND id = ?",
        )
        .bind(&shaped.owner_id)
        .bind(&shaped.parent_id)
        .bind(shaped.deleted)
        .bind(&shaped.attrs_json)
        .bind(kind.as_str())
        .bind(id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        self.emit(ChangeRecord {
            kind,
            id: id.to_string(),
            new_image: Some(attrs.clone()),
        });
        Ok(attrs)
    }

    async fn delete(&self, kind: EntityKind, id: &str) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM records WHERE kind = ? AND id = ?")
            .bind(kind.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() > 0 {
            self.emit(ChangeRecord {
                kind,
                id: id.to_string(),
                new_image: None,
            });
        }
        Ok(())
    }
}
