use std::sync::Arc;

use depot_core::{page_limit, to_rfc3339, ListResult, ServiceError};
use depot_sql::{Row, SQLStore, Value};
use serde::de::DeserializeOwned;

use crate::model::{BatchListQuery, BatchProduct, BatchStatus, RmaBatch};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS rma_batches (
    id            TEXT PRIMARY KEY,
    data          TEXT NOT NULL,
    batch_number  TEXT NOT NULL UNIQUE,
    supplier_id   TEXT NOT NULL,
    status        TEXT NOT NULL,
    create_at     TEXT NOT NULL,
    update_at     TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS rma_batch_products (
    id             TEXT PRIMARY KEY,
    data           TEXT NOT NULL,
    batch_id       TEXT NOT NULL REFERENCES rma_batches(id),
    serial_number  TEXT NOT NULL,
    added_at       TEXT NOT NULL,
    UNIQUE (batch_id, serial_number)
);
CREATE INDEX IF NOT EXISTS idx_rma_status ON rma_batches(status);
CREATE INDEX IF NOT EXISTS idx_rma_supplier ON rma_batches(supplier_id);
CREATE INDEX IF NOT EXISTS idx_rma_products_batch ON rma_batch_products(batch_id);
";

/// Persistent storage for RMA batches and their product entries.
///
/// Every mutation is one statement guarded on the batch row, so a write
/// either lands against the snapshot the caller decided on or not at all.
pub struct RmaStore {
    db: Arc<dyn SQLStore>,
}

impl RmaStore {
    pub fn new(db: Arc<dyn SQLStore>) -> Result<Self, ServiceError> {
        db.exec_batch(SCHEMA)
            .map_err(|e| ServiceError::Storage(format!("rma schema init: {e}")))?;
        Ok(Self { db })
    }

    // -----------------------------------------------------------------------
    // Batches
    // -----------------------------------------------------------------------

    /// Insert a new batch. `Conflict` if the batch number is taken.
    pub fn create_batch(&self, batch: &RmaBatch) -> Result<(), ServiceError> {
        self.db
            .exec(
                "INSERT INTO rma_batches \
                 (id, data, batch_number, supplier_id, status, create_at, update_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                &[
                    Value::Text(batch.id.clone()),
                    Value::Text(to_json(batch)?),
                    Value::Text(batch.batch_number.clone()),
                    Value::Text(batch.supplier_id.clone()),
                    Value::Text(batch.status.as_str().to_string()),
                    Value::Text(to_rfc3339(&batch.create_at)),
                    Value::Text(to_rfc3339(&batch.update_at)),
                ],
            )
            .map_err(|e| {
                if e.is_unique_violation() {
                    ServiceError::Conflict(format!("batch number {} is taken", batch.batch_number))
                } else {
                    ServiceError::Storage(e.to_string())
                }
            })?;
        Ok(())
    }

    pub fn get_batch(&self, id: &str) -> Result<Option<RmaBatch>, ServiceError> {
        self.query_one(
            "SELECT data FROM rma_batches WHERE id = ?1",
            &[Value::Text(id.to_string())],
        )
    }

    /// Highest batch number starting with `prefix`, if any.
    pub fn last_number_with_prefix(&self, prefix: &str) -> Result<Option<String>, ServiceError> {
        let rows = self
            .db
            .query(
                "SELECT batch_number FROM rma_batches \
                 WHERE substr(batch_number, 1, length(?1)) = ?1 \
                 ORDER BY batch_number DESC LIMIT 1",
                &[Value::Text(prefix.to_string())],
            )
            .map_err(|e| ServiceError::Storage(e.to_string()))?;
        Ok(rows
            .first()
            .and_then(|r| r.get_str("batch_number"))
            .map(String::from))
    }

    /// Write `next` only if the stored row still matches `current`
    /// (same status, same `update_at`).
    pub fn update_batch_if_current(
        &self,
        next: &RmaBatch,
        current: &RmaBatch,
    ) -> Result<bool, ServiceError> {
        self.exec_count(
            "UPDATE rma_batches SET data = ?1, status = ?2, update_at = ?3 \
             WHERE id = ?4 AND status = ?5 AND update_at = ?6",
            &guarded_params(next, current)?,
        )
        .map(|n| n > 0)
    }

    /// Like [`update_batch_if_current`](Self::update_batch_if_current), but
    /// also requires the batch to hold at least one product.
    pub fn finalize_if_nonempty(
        &self,
        next: &RmaBatch,
        current: &RmaBatch,
    ) -> Result<bool, ServiceError> {
        self.exec_count(
            "UPDATE rma_batches SET data = ?1, status = ?2, update_at = ?3 \
             WHERE id = ?4 AND status = ?5 AND update_at = ?6 \
             AND EXISTS (SELECT 1 FROM rma_batch_products WHERE batch_id = ?4)",
            &guarded_params(next, current)?,
        )
        .map(|n| n > 0)
    }

    pub fn list_batches(&self, query: &BatchListQuery) -> Result<ListResult<RmaBatch>, ServiceError> {
        let limit = page_limit(query.limit);
        let offset = query.offset.unwrap_or(0);

        let mut where_clauses: Vec<String> = Vec::new();
        let mut params: Vec<Value> = Vec::new();
        let mut idx = 1;

        if let Some(status) = query.status {
            where_clauses.push(format!("status = ?{idx}"));
            params.push(Value::Text(status.as_str().to_string()));
            idx += 1;
        }
        if let Some(ref supplier) = query.supplier_id {
            where_clauses.push(format!("supplier_id = ?{idx}"));
            params.push(Value::Text(supplier.clone()));
            idx += 1;
        }

        let where_sql = if where_clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", where_clauses.join(" AND "))
        };

        let count_rows = self
            .db
            .query(&format!("SELECT COUNT(*) as cnt FROM rma_batches {where_sql}"), &params)
            .map_err(|e| ServiceError::Storage(e.to_string()))?;
        let total = count_rows
            .first()
            .and_then(|r| r.get_i64("cnt"))
            .unwrap_or(0) as usize;

        let select_sql = format!(
            "SELECT data FROM rma_batches {where_sql} \
             ORDER BY create_at DESC, batch_number DESC LIMIT ?{idx} OFFSET ?{}",
            idx + 1
        );
        params.push(Value::Integer(limit as i64));
        params.push(Value::Integer(offset as i64));

        let rows = self
            .db
            .query(&select_sql, &params)
            .map_err(|e| ServiceError::Storage(e.to_string()))?;
        let items = rows
            .iter()
            .map(row_to_record)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ListResult { items, total })
    }

    // -----------------------------------------------------------------------
    // Product entries
    // -----------------------------------------------------------------------

    /// Insert `product` only while its batch is in draft.
    ///
    /// Returns `false` if the batch is missing or no longer draft, and
    /// `Conflict` if the serial is already in the batch.
    pub fn add_product_if_draft(&self, product: &BatchProduct) -> Result<bool, ServiceError> {
        self.db
            .exec(
                "INSERT INTO rma_batch_products (id, data, batch_id, serial_number, added_at) \
                 SELECT ?1, ?2, ?3, ?4, ?5 \
                 WHERE EXISTS (SELECT 1 FROM rma_batches WHERE id = ?3 AND status = ?6)",
                &[
                    Value::Text(product.id.clone()),
                    Value::Text(to_json(product)?),
                    Value::Text(product.batch_id.clone()),
                    Value::Text(product.serial_number.clone()),
                    Value::Text(to_rfc3339(&product.added_at)),
                    Value::Text(BatchStatus::Draft.as_str().to_string()),
                ],
            )
            .map(|n| n > 0)
            .map_err(|e| {
                if e.is_unique_violation() {
                    ServiceError::Conflict(format!(
                        "serial {} already in batch {}",
                        product.serial_number, product.batch_id
                    ))
                } else {
                    ServiceError::Storage(e.to_string())
                }
            })
    }

    /// Delete an entry only while its batch is in draft.
    pub fn remove_product_if_draft(&self, batch_id: &str, entry_id: &str) -> Result<bool, ServiceError> {
        self.exec_count(
            "DELETE FROM rma_batch_products WHERE id = ?1 AND batch_id = ?2 \
             AND EXISTS (SELECT 1 FROM rma_batches WHERE id = ?2 AND status = ?3)",
            &[
                Value::Text(entry_id.to_string()),
                Value::Text(batch_id.to_string()),
                Value::Text(BatchStatus::Draft.as_str().to_string()),
            ],
        )
        .map(|n| n > 0)
    }

    /// Look up an entry by its id or by serial number.
    pub fn find_product(&self, batch_id: &str, entry: &str) -> Result<Option<BatchProduct>, ServiceError> {
        self.query_one(
            "SELECT data FROM rma_batch_products \
             WHERE batch_id = ?1 AND (id = ?2 OR serial_number = ?2) \
             ORDER BY (id = ?2) DESC LIMIT 1",
            &[Value::Text(batch_id.to_string()), Value::Text(entry.to_string())],
        )
    }

    /// Entries of a batch in insertion order.
    pub fn products(&self, batch_id: &str) -> Result<Vec<BatchProduct>, ServiceError> {
        let rows = self
            .db
            .query(
                "SELECT data FROM rma_batch_products WHERE batch_id = ?1 ORDER BY rowid ASC",
                &[Value::Text(batch_id.to_string())],
            )
            .map_err(|e| ServiceError::Storage(e.to_string()))?;
        rows.iter().map(row_to_record).collect()
    }

    pub fn count_products(&self, batch_id: &str) -> Result<usize, ServiceError> {
        let rows = self
            .db
            .query(
                "SELECT COUNT(*) as cnt FROM rma_batch_products WHERE batch_id = ?1",
                &[Value::Text(batch_id.to_string())],
            )
            .map_err(|e| ServiceError::Storage(e.to_string()))?;
        Ok(rows.first().and_then(|r| r.get_i64("cnt")).unwrap_or(0) as usize)
    }

    fn exec_count(&self, sql: &str, params: &[Value]) -> Result<u64, ServiceError> {
        self.db
            .exec(sql, params)
            .map_err(|e| ServiceError::Storage(e.to_string()))
    }

    fn query_one<T: DeserializeOwned>(
        &self,
        sql: &str,
        params: &[Value],
    ) -> Result<Option<T>, ServiceError> {
        let rows = self
            .db
            .query(sql, params)
            .map_err(|e| ServiceError::Storage(e.to_string()))?;
        rows.first().map(row_to_record).transpose()
    }
}

fn guarded_params(next: &RmaBatch, current: &RmaBatch) -> Result<Vec<Value>, ServiceError> {
    Ok(vec![
        Value::Text(to_json(next)?),
        Value::Text(next.status.as_str().to_string()),
        Value::Text(to_rfc3339(&next.update_at)),
        Value::Text(current.id.clone()),
        Value::Text(current.status.as_str().to_string()),
        Value::Text(to_rfc3339(&current.update_at)),
    ])
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, ServiceError> {
    serde_json::to_string(value).map_err(|e| ServiceError::Internal(e.to_string()))
}

fn row_to_record<T: DeserializeOwned>(row: &Row) -> Result<T, ServiceError> {
    let json = row
        .get_str("data")
        .ok_or_else(|| ServiceError::Storage("missing data column".into()))?;
    serde_json::from_str(json).map_err(|e| ServiceError::Storage(format!("bad record json: {e}")))
}
