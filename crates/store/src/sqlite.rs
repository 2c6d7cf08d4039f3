//! Document store persisted in SQLite.
//!
//! Each document is one row of the `documents` table holding its JSON body.
//! Scalar equality filters, ordering, cursor and limit are pushed into SQL
//! through `json_type`/`json_extract`; the rows that come back still pass
//! through the shared [`Query`] evaluator.

use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use duo_config::StoreConfig;
use serde_json::{Map, Value};
use sqlx::sqlite::{Sqlite, SqliteArguments, SqliteRow};
use sqlx::{Row, SqlitePool};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::clock::ServerClock;
use crate::connection::prepare_database;
use crate::document::{Document, NewDocument};
use crate::live::{Subscription, SubscriptionHub};
use crate::migrations::run_migrations;
use crate::patch::Patch;
use crate::query::{Direction, Filter, Query};
use crate::store::DocumentStore;
use crate::types::{StoreError, StoreResult};

pub struct SqliteStore {
    pool: SqlitePool,
    hub: Arc<SubscriptionHub>,
    clock: ServerClock,
    /// Serializes writes with their subscription fan-out.
    write_gate: Mutex<()>,
}

impl SqliteStore {
    /// Wrap an already migrated pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            hub: SubscriptionHub::new(),
            clock: ServerClock::new(),
            write_gate: Mutex::new(()),
        }
    }

    /// Connect, apply migrations and wrap the pool.
    pub async fn open(config: &StoreConfig) -> StoreResult<Self> {
        let pool = prepare_database(config)
            .await
            .map_err(|e| StoreError::ConnectionError(format!("{e:#}")))?;

        run_migrations(&pool)
            .await
            .map_err(|e| StoreError::MigrationError(format!("{e:#}")))?;

        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn subscriber_count(&self) -> usize {
        self.hub.len()
    }

    /// Re-read every watched collection and push changed results.
    ///
    /// Picks up writes committed by other processes sharing the database file.
    pub async fn refresh(&self) {
        let _gate = self.write_gate.lock().await;
        for collection in self.hub.watched_collections() {
            self.publish(&collection).await;
        }
    }

    /// Call [`SqliteStore::refresh`] every `interval` until the store is dropped.
    pub fn spawn_refresh(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let store: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let Some(store) = store.upgrade() else {
                    break;
                };
                store.refresh().await;
            }
            debug!("sqlite refresh task stopped");
        })
    }

    async fn load(&self, collection: &str) -> StoreResult<Vec<Document>> {
        let rows = sqlx::query("SELECT id, data FROM documents WHERE collection = ?")
            .bind(collection)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(decode_row).collect()
    }

    /// Rows that can satisfy `query`, as narrowed by SQL.
    async fn select(&self, query: &Query) -> StoreResult<Vec<Document>> {
        let select = Select::plan(query);
        let rows = select.query().fetch_all(&self.pool).await?;
        rows.into_iter().map(decode_row).collect()
    }

    /// Fan out the current state of `collection`. Caller holds the write gate.
    async fn publish(&self, collection: &str) {
        if !self.hub.is_watching(collection) {
            return;
        }

        match self.load(collection).await {
            Ok(documents) => self.hub.publish(collection, &documents),
            Err(error) => {
                warn!(collection, %error, "failed to refresh live queries");
                let message = error.to_string();
                self.hub
                    .publish_error(collection, || StoreError::QueryError(message.clone()));
            }
        }
    }
}

fn decode_row(row: SqliteRow) -> StoreResult<Document> {
    let id: String = row.try_get("id")?;
    let data: String = row.try_get("data")?;
    let fields: Map<String, Value> = serde_json::from_str(&data)?;
    Ok(Document::new(id, fields))
}

enum Bind {
    Text(String),
    Integer(i64),
    Real(f64),
}

impl Bind {
    /// Sort rank and SQL value of a scalar, matching `compare_values`.
    /// Arrays and objects have no SQL counterpart.
    fn sort_key(value: &Value) -> Option<(i64, Bind)> {
        match value {
            Value::Null => Some((0, Bind::Integer(0))),
            Value::Bool(flag) => Some((1, Bind::Integer(i64::from(*flag)))),
            Value::Number(number) => match number.as_i64() {
                Some(integer) => Some((2, Bind::Integer(integer))),
                None => number.as_f64().map(|real| (2, Bind::Real(real))),
            },
            Value::String(text) => Some((3, Bind::Text(text.clone()))),
            Value::Array(_) | Value::Object(_) => None,
        }
    }
}

/// Rank of the order-by value: null, bool, number, text, then everything else.
const SORT_RANK: &str = "CASE json_type(data, ?) \
    WHEN 'null' THEN 0 WHEN 'true' THEN 1 WHEN 'false' THEN 1 \
    WHEN 'integer' THEN 2 WHEN 'real' THEN 2 WHEN 'text' THEN 3 ELSE 4 END";

/// `$.field` for plain top-level keys.
fn json_path(field: &str) -> Option<String> {
    let plain = !field.is_empty() && field.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    plain.then(|| format!("$.{field}"))
}

/// Exact SQL form of `field == value` for strings, integers and booleans.
fn equality(field: &str, value: &Value) -> Option<(String, Vec<Bind>)> {
    let path = json_path(field)?;
    match value {
        Value::Bool(flag) => Some((
            format!("json_type(data, ?) = '{flag}'"),
            vec![Bind::Text(path)],
        )),
        Value::String(text) => Some((
            "(json_type(data, ?) = 'text' AND json_extract(data, ?) = ?)".to_string(),
            vec![Bind::Text(path.clone()), Bind::Text(path), Bind::Text(text.clone())],
        )),
        Value::Number(number) => {
            let integer = number.as_i64()?;
            Some((
                "(json_type(data, ?) = 'integer' AND json_extract(data, ?) = ?)".to_string(),
                vec![Bind::Text(path.clone()), Bind::Text(path), Bind::Integer(integer)],
            ))
        }
        _ => None,
    }
}

fn predicate(filter: &Filter) -> Option<(String, Vec<Bind>)> {
    match filter {
        Filter::Eq(field, value) => equality(field, value),
        Filter::AnyOf(alternatives) => {
            if alternatives.is_empty() {
                return None;
            }
            let mut clauses = Vec::with_capacity(alternatives.len());
            let mut binds = Vec::new();
            for (field, value) in alternatives {
                let (clause, mut extra) = equality(field, value)?;
                clauses.push(clause);
                binds.append(&mut extra);
            }
            Some((format!("({})", clauses.join(" OR ")), binds))
        }
    }
}

/// SQL text with its positional arguments.
struct Select {
    sql: String,
    binds: Vec<Bind>,
}

impl Select {
    /// Translate what SQLite can evaluate exactly. Filters it cannot express
    /// are left out, which only widens the result.
    ///
    /// Ordered queries page over `(rank, value, id)` keys. Array and object
    /// order values compare differently in SQL, so those rows are returned
    /// in full next to the page.
    fn plan(query: &Query) -> Self {
        let mut conditions = vec!["collection = ?".to_string()];
        let mut binds = vec![Bind::Text(query.collection.clone())];
        for (clause, mut extra) in query.filters.iter().filter_map(predicate) {
            conditions.push(clause);
            binds.append(&mut extra);
        }
        let matched = conditions.join(" AND ");

        let Some((order, path)) = query
            .order_by
            .as_ref()
            .and_then(|order| json_path(&order.field).map(|path| (order, path)))
        else {
            return Self {
                sql: format!("SELECT id, data FROM documents WHERE {matched}"),
                binds,
            };
        };

        let cursor = match &query.start_after {
            Some(cursor) => match Bind::sort_key(&cursor.value) {
                Some(key) => Some((key, cursor.id.clone())),
                None => {
                    return Self {
                        sql: format!(
                            "SELECT id, data FROM documents WHERE {matched} AND json_type(data, ?) IS NOT NULL"
                        ),
                        binds: binds.into_iter().chain([Bind::Text(path)]).collect(),
                    };
                }
            },
            None => None,
        };

        let (direction, after) = match order.direction {
            Direction::Ascending => ("ASC", ">"),
            Direction::Descending => ("DESC", "<"),
        };

        let mut sql = format!(
            "WITH matched AS (\
             SELECT id, data, {SORT_RANK} AS sort_rank, COALESCE(json_extract(data, ?), 0) AS sort_value \
             FROM documents WHERE {matched} AND json_type(data, ?) IS NOT NULL) \
             SELECT id, data FROM (SELECT id, data FROM matched WHERE sort_rank < 4"
        );
        let mut all = vec![Bind::Text(path.clone()), Bind::Text(path.clone())];
        all.append(&mut binds);
        all.push(Bind::Text(path));

        if let Some(((rank, value), id)) = cursor {
            sql.push_str(&format!(" AND (sort_rank, sort_value, id) {after} (?, ?, ?)"));
            all.extend([Bind::Integer(rank), value, Bind::Text(id)]);
        }
        sql.push_str(&format!(
            " ORDER BY sort_rank {direction}, sort_value {direction}, id {direction}"
        ));
        if let Some(limit) = query.limit {
            sql.push_str(" LIMIT ?");
            all.push(Bind::Integer(i64::try_from(limit).unwrap_or(i64::MAX)));
        }
        sql.push_str(") UNION ALL SELECT id, data FROM matched WHERE sort_rank = 4");

        Self { sql, binds: all }
    }

    fn query(&self) -> sqlx::query::Query<'_, Sqlite, SqliteArguments<'_>> {
        self.binds
            .iter()
            .fold(sqlx::query(&self.sql), |query, bind| match bind {
                Bind::Text(text) => query.bind(text.as_str()),
                Bind::Integer(integer) => query.bind(*integer),
                Bind::Real(real) => query.bind(*real),
            })
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn query(&self, query: &Query) -> StoreResult<Vec<Document>> {
        let results = query.run(self.select(query).await?);
        debug!(collection = %query.collection, results = results.len(), "ran query");
        Ok(results)
    }

    async fn subscribe(&self, query: Query) -> StoreResult<Subscription> {
        let _gate = self.write_gate.lock().await;
        let initial = query.run(self.select(&query).await?);
        Ok(self.hub.register(query, initial))
    }

    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Document>> {
        let row = sqlx::query("SELECT data FROM documents WHERE collection = ? AND id = ?")
            .bind(collection)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let data: String = row.try_get("data")?;
                Ok(Some(Document::new(id, serde_json::from_str(&data)?)))
            }
            None => Ok(None),
        }
    }

    async fn insert(&self, collection: &str, document: NewDocument) -> StoreResult<Document> {
        let _gate = self.write_gate.lock().await;

        let id = cuid2::create_id();
        let document = document.into_document(id.clone(), self.clock.now_micros());
        let data = serde_json::to_string(&document.fields)?;
        let now = chrono::Utc::now().to_rfc3339();

        sqlx::query(
            "INSERT INTO documents (collection, id, data, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(collection)
        .bind(&id)
        .bind(&data)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        info!(collection, document_id = %id, "inserted document");
        self.publish(collection).await;
        Ok(document)
    }

    async fn update(&self, collection: &str, id: &str, patch: Patch) -> StoreResult<()> {
        let _gate = self.write_gate.lock().await;
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT data FROM documents WHERE collection = ? AND id = ?")
            .bind(collection)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| StoreError::not_found(collection, id))?;

        let data: String = row.try_get("data")?;
        let mut fields: Map<String, Value> = serde_json::from_str(&data)?;
        if !patch.apply(&mut fields) {
            return Ok(());
        }

        sqlx::query("UPDATE documents SET data = ?, updated_at = ? WHERE collection = ? AND id = ?")
            .bind(serde_json::to_string(&fields)?)
            .bind(chrono::Utc::now().to_rfc3339())
            .bind(collection)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        debug!(collection, document_id = id, "updated document");
        self.publish(collection).await;
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> StoreResult<()> {
        let _gate = self.write_gate.lock().await;

        let result = sqlx::query("DELETE FROM documents WHERE collection = ? AND id = ?")
            .bind(collection)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() > 0 {
            info!(collection, document_id = id, "deleted document");
            self.publish(collection).await;
        }
        Ok(())
    }
}
