//! PostgreSQL executor
//!
//! Rows are decoded dynamically by column type so any SELECT can be answered.
//! Fixed-point NUMERIC values leave this module as plain f64.

use super::QueryExecutor;
use crate::error::OrchestrationError;
use crate::models::Row;
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Column, Row as _, TypeInfo, ValueRef};
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

const QUERY_TIMEOUT: Duration = Duration::from_secs(30);

/// First statement of every transaction. `SELECT ... INTO` and writable CTEs fail under it.
const READ_ONLY_GUARD: &str = "SET TRANSACTION READ ONLY";

pub struct PostgresExecutor {
    pool: PgPool,
}

impl PostgresExecutor {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Build a pool that connects on first use.
    pub fn connect_lazy(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect_lazy(database_url)
            .map_err(|e| {
                OrchestrationError::DatabaseError(format!("Failed to configure pool: {}", e))
            })?;
        Ok(Self::new(pool))
    }

    /// Run one statement inside a read-only transaction that is always rolled back.
    async fn fetch_read_only(&self, query: &str) -> std::result::Result<Vec<PgRow>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(READ_ONLY_GUARD).execute(&mut *tx).await?;
        let rows = sqlx::query(query).fetch_all(&mut *tx).await?;
        tx.rollback().await?;
        Ok(rows)
    }
}

#[async_trait]
impl QueryExecutor for PostgresExecutor {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn execute(&self, query: &str) -> Result<Vec<Row>> {
        let rows = tokio::time::timeout(QUERY_TIMEOUT, self.fetch_read_only(query))
            .await
            .map_err(|_| {
                OrchestrationError::DatabaseError(format!(
                    "query timed out after {}s",
                    QUERY_TIMEOUT.as_secs()
                ))
            })?
            .map_err(|e| OrchestrationError::DatabaseError(e.to_string()))?;

        debug!(rows = rows.len(), "Read-only query finished");
        Ok(rows.iter().map(row_to_json).collect())
    }
}

fn row_to_json(row: &PgRow) -> Row {
    let mut out = Row::new();
    for (index, column) in row.columns().iter().enumerate() {
        let value = decode_column(row, index, column.type_info().name());
        out.insert(column.name().to_string(), value);
    }
    out
}

fn decode_column(row: &PgRow, index: usize, type_name: &str) -> Value {
    match row.try_get_raw(index) {
        Ok(raw) if raw.is_null() => return Value::Null,
        Ok(_) => {}
        Err(_) => return Value::Null,
    }

    let decoded: std::result::Result<Value, sqlx::Error> = match type_name {
        "BOOL" => row.try_get::<bool, _>(index).map(Value::from),
        "INT2" => row.try_get::<i16, _>(index).map(Value::from),
        "INT4" => row.try_get::<i32, _>(index).map(Value::from),
        "INT8" => row.try_get::<i64, _>(index).map(Value::from),
        "FLOAT4" => row.try_get::<f32, _>(index).map(|v| Value::from(v as f64)),
        "FLOAT8" => row.try_get::<f64, _>(index).map(Value::from),
        "NUMERIC" => row.try_get::<Decimal, _>(index).map(decimal_to_json),
        "DATE" => row.try_get::<NaiveDate, _>(index).map(|v| Value::from(v.to_string())),
        "TIME" => row.try_get::<NaiveTime, _>(index).map(|v| Value::from(v.to_string())),
        "TIMESTAMP" => row
            .try_get::<NaiveDateTime, _>(index)
            .map(|v| Value::from(v.to_string())),
        "TIMESTAMPTZ" => row
            .try_get::<DateTime<Utc>, _>(index)
            .map(|v| Value::from(v.to_rfc3339())),
        "UUID" => row.try_get::<Uuid, _>(index).map(|v| Value::from(v.to_string())),
        "JSON" | "JSONB" => row.try_get::<Value, _>(index),
        _ => row.try_get::<String, _>(index).map(Value::from),
    };

    decoded.unwrap_or_else(|e| {
        debug!(column = index, type_name, error = %e, "Column could not be decoded");
        Value::Null
    })
}

/// Fixed-point → JSON number. Non-finite results become null.
pub fn decimal_to_json(value: Decimal) -> Value {
    value.to_f64().map(Value::from).unwrap_or(Value::Null)
}
