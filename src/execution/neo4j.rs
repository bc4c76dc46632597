//! Neo4j executor over the transactional HTTP endpoint

use super::QueryExecutor;
use crate::error::OrchestrationError;
use crate::models::Row;
use crate::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::error;

pub struct Neo4jExecutor {
    client: Client,
    endpoint: String,
    user: String,
    password: String,
}

impl Neo4jExecutor {
    pub fn new(
        uri: &str,
        database: &str,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(8)
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            endpoint: format!("{}/db/{}/tx/commit", uri.trim_end_matches('/'), database),
            user: user.into(),
            password: password.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl QueryExecutor for Neo4jExecutor {
    fn backend(&self) -> &'static str {
        "neo4j"
    }

    async fn execute(&self, query: &str) -> Result<Vec<Row>> {
        let body = json!({
            "statements": [{
                "statement": query,
                "resultDataContents": ["row"]
            }]
        });

        let response = self
            .client
            .post(&self.endpoint)
            .basic_auth(&self.user, Some(&self.password))
            .json(&body)
            .send()
            .await
            .map_err(|e| OrchestrationError::GraphError(format!("Neo4j request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            error!(%status, "Neo4j returned an error status");
            return Err(OrchestrationError::GraphError(format!(
                "Neo4j returned {}: {}",
                status, text
            )));
        }

        let parsed: TxResponse = response
            .json()
            .await
            .map_err(|e| OrchestrationError::GraphError(format!("Invalid Neo4j response: {}", e)))?;

        rows_from_response(parsed)
    }
}

fn rows_from_response(response: TxResponse) -> Result<Vec<Row>> {
    if let Some(first) = response.errors.first() {
        return Err(OrchestrationError::GraphError(format!(
            "{}: {}",
            first.code, first.message
        )));
    }

    let mut rows = Vec::new();
    for result in response.results {
        for entry in result.data {
            let row: Row = result
                .columns
                .iter()
                .cloned()
                .zip(entry.row.into_iter().chain(std::iter::repeat(Value::Null)))
                .collect();
            rows.push(row);
        }
    }
    Ok(rows)
}

#[derive(Debug, Deserialize)]
struct TxResponse {
    #[serde(default)]
    results: Vec<StatementResult>,
    #[serde(default)]
    errors: Vec<TxError>,
}

#[derive(Debug, Deserialize)]
struct StatementResult {
    #[serde(default)]
    columns: Vec<String>,
    #[serde(default)]
    data: Vec<DataEntry>,
}

#[derive(Debug, Deserialize)]
struct DataEntry {
    #[serde(default)]
    row: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct TxError {
    code: String,
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_layout() {
        let executor = Neo4jExecutor::new("http://localhost:7474/", "neo4j", "neo4j", "pw").unwrap();
        assert_eq!(executor.endpoint(), "http://localhost:7474/db/neo4j/tx/commit");
    }

    #[test]
    fn test_rows_zip_columns() {
        let response: TxResponse = serde_json::from_value(json!({
            "results": [{
                "columns": ["merchant", "visits"],
                "data": [
                    {"row": ["M-001", 12], "meta": [null, null]},
                    {"row": ["M-002", 3], "meta": [null, null]}
                ]
            }],
            "errors": []
        }))
        .unwrap();

        let rows = rows_from_response(response).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["merchant"], json!("M-001"));
        assert_eq!(rows[1]["visits"], json!(3));
    }

    #[test]
    fn test_errors_become_failures() {
        let response: TxResponse = serde_json::from_value(json!({
            "results": [],
            "errors": [{"code": "Neo.ClientError.Statement.SyntaxError", "message": "Invalid input"}]
        }))
        .unwrap();

        let err = rows_from_response(response).unwrap_err();
        assert!(err.to_string().contains("SyntaxError"));
    }
}
