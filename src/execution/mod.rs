//! Backend execution
//!
//! Generated queries become rows here. The model is NOT called from this
//! module; it only runs text that already went through the gates.

use crate::error::OrchestrationError;
use crate::models::{ErrorKind, PipelineError, RequestState, Route, Row};
use crate::verification::{create_graph_security_validator, SecurityValidator};
use crate::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, info, warn};

pub mod neo4j;
pub mod postgres;

pub use neo4j::Neo4jExecutor;
pub use postgres::PostgresExecutor;

/// Longest backend error message kept on the request state.
const MAX_ERROR_DISPLAY_CHARS: usize = 300;

/// A store that runs query text and returns JSON-safe rows.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    fn backend(&self) -> &'static str;

    async fn execute(&self, query: &str) -> Result<Vec<Row>>;
}

/// Runs the query held on the request state against the right backend.
pub struct ExecutionEngine {
    relational: Arc<dyn QueryExecutor>,
    graph: Arc<dyn QueryExecutor>,
    graph_gate: SecurityValidator,
}

impl ExecutionEngine {
    pub fn new(relational: Arc<dyn QueryExecutor>, graph: Arc<dyn QueryExecutor>) -> Self {
        Self {
            relational,
            graph,
            graph_gate: create_graph_security_validator(),
        }
    }

    /// Execute `state.query_text` for `route`.
    ///
    /// Never fails: `result_rows` is always reset to a sequence, and backend
    /// problems land in `last_error` as `EXEC_ERROR`. Nothing runs while a
    /// validation error is pending or the query is empty.
    pub async fn execute(&self, route: Route, state: &mut RequestState) {
        state.result_rows = Vec::new();

        let query = state.query_text.trim().to_string();
        if query.is_empty() {
            debug!("No query to execute");
            return;
        }

        if let Some(pending) = &state.last_error {
            warn!(
                error = %pending,
                retry_count = state.retry_count,
                "Skipping execution: query did not pass validation"
            );
            return;
        }

        let executor = match route {
            Route::Sql => &self.relational,
            Route::Graph => {
                if let Err(violation) = self.graph_gate.check(&query) {
                    state.last_error = Some(violation);
                    return;
                }
                &self.graph
            }
            Route::General => return,
        };

        let start = Instant::now();
        match executor.execute(&query).await {
            Ok(rows) => {
                info!(
                    backend = executor.backend(),
                    row_count = rows.len(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Query executed"
                );
                state.result_rows = rows;
            }
            Err(e) => {
                warn!(backend = executor.backend(), error = %e, "Query execution failed");
                state.last_error = Some(PipelineError::new(
                    ErrorKind::ExecError,
                    truncate_for_display(&e.to_string(), MAX_ERROR_DISPLAY_CHARS),
                ));
            }
        }
    }
}

/// Cut `message` to at most `max_chars` characters, marking the cut.
pub fn truncate_for_display(message: &str, max_chars: usize) -> String {
    if message.chars().count() <= max_chars {
        return message.to_string();
    }
    let mut out: String = message.chars().take(max_chars).collect();
    out.push_str("...");
    out
}

/// Mock executor for development & testing
pub struct MockExecutor {
    outcome: std::result::Result<Vec<Row>, String>,
    calls: AtomicUsize,
    queries: Mutex<Vec<String>>,
}

impl MockExecutor {
    pub fn returning(rows: Vec<Row>) -> Self {
        Self {
            outcome: Ok(rows),
            calls: AtomicUsize::new(0),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            outcome: Err(message.into()),
            calls: AtomicUsize::new(0),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().map(|q| q.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl QueryExecutor for MockExecutor {
    fn backend(&self) -> &'static str {
        "mock"
    }

    async fn execute(&self, query: &str) -> Result<Vec<Row>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut queries) = self.queries.lock() {
            queries.push(query.to_string());
        }

        match &self.outcome {
            Ok(rows) => Ok(rows.clone()),
            Err(message) => Err(OrchestrationError::DatabaseError(message.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ConversationTurn;
    use serde_json::json;

    fn row(value: serde_json::Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    fn state_with_query(query: &str) -> RequestState {
        let mut state = RequestState::new("u1", "s1", vec![ConversationTurn::user("q")]);
        state.query_text = query.to_string();
        state
    }

    fn engine(relational: Arc<MockExecutor>, graph: Arc<MockExecutor>) -> ExecutionEngine {
        ExecutionEngine::new(relational, graph)
    }

    #[tokio::test]
    async fn test_sql_rows_are_returned() {
        let sql = Arc::new(MockExecutor::returning(vec![row(json!({"total": 5000.0}))]));
        let graph = Arc::new(MockExecutor::returning(vec![]));
        let engine = engine(sql.clone(), graph.clone());

        let mut state = state_with_query("SELECT SUM(amount) AS total FROM transactions");
        engine.execute(Route::Sql, &mut state).await;

        assert_eq!(state.result_rows.len(), 1);
        assert_eq!(state.result_rows[0]["total"], json!(5000.0));
        assert!(state.last_error.is_none());
        assert_eq!(sql.calls(), 1);
        assert_eq!(graph.calls(), 0);
    }

    #[tokio::test]
    async fn test_failure_yields_empty_rows_and_exec_error() {
        let long = "relation \"transactionz\" does not exist ".repeat(20);
        let sql = Arc::new(MockExecutor::failing(long));
        let engine = engine(sql, Arc::new(MockExecutor::returning(vec![])));

        let mut state = state_with_query("SELECT * FROM transactionz");
        state.result_rows = vec![row(json!({"stale": true}))];
        engine.execute(Route::Sql, &mut state).await;

        assert!(state.result_rows.is_empty());
        let err = state.last_error.unwrap();
        assert_eq!(err.kind, ErrorKind::ExecError);
        assert!(err.message.ends_with("..."));
        assert!(err.message.chars().count() <= MAX_ERROR_DISPLAY_CHARS + 3);
    }

    #[tokio::test]
    async fn test_pending_error_blocks_execution() {
        let sql = Arc::new(MockExecutor::returning(vec![row(json!({"x": 1}))]));
        let engine = engine(sql.clone(), Arc::new(MockExecutor::returning(vec![])));

        let mut state = state_with_query("DROP TABLE accounts");
        state.last_error = Some(PipelineError::new(ErrorKind::SecurityViolation, "denied"));
        engine.execute(Route::Sql, &mut state).await;

        assert_eq!(sql.calls(), 0);
        assert!(state.result_rows.is_empty());
        assert_eq!(state.last_error.unwrap().kind, ErrorKind::SecurityViolation);
    }

    #[tokio::test]
    async fn test_empty_query_is_noop() {
        let sql = Arc::new(MockExecutor::returning(vec![]));
        let engine = engine(sql.clone(), Arc::new(MockExecutor::returning(vec![])));

        let mut state = state_with_query("   ");
        engine.execute(Route::Sql, &mut state).await;
        assert_eq!(sql.calls(), 0);
        assert!(state.last_error.is_none());
    }

    #[tokio::test]
    async fn test_graph_write_clause_is_blocked() {
        let graph = Arc::new(MockExecutor::returning(vec![]));
        let engine = engine(Arc::new(MockExecutor::returning(vec![])), graph.clone());

        let mut state = state_with_query("MATCH (n) DETACH DELETE n");
        engine.execute(Route::Graph, &mut state).await;

        assert_eq!(graph.calls(), 0);
        assert_eq!(state.last_error.unwrap().kind, ErrorKind::SecurityViolation);
    }

    #[tokio::test]
    async fn test_graph_query_runs_on_graph_backend() {
        let graph = Arc::new(MockExecutor::returning(vec![row(json!({"merchant": "M1", "visits": 3}))]));
        let engine = engine(Arc::new(MockExecutor::returning(vec![])), graph.clone());

        let mut state = state_with_query("MATCH (m:Merchant) RETURN m.merchant_id AS merchant");
        engine.execute(Route::Graph, &mut state).await;

        assert_eq!(graph.calls(), 1);
        assert_eq!(state.result_rows[0]["visits"], json!(3));
    }

    #[test]
    fn test_truncate_for_display_counts_chars() {
        assert_eq!(truncate_for_display("짧은", 10), "짧은");
        assert_eq!(truncate_for_display("가나다라마", 2), "가나...");
    }
}
