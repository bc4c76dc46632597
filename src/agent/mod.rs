//! Orchestration engine
//!
//! REFINE → ROUTE → (SQL_GEN ⇄ VALIDATE | GRAPH_GEN) → EXECUTE → SYNTHESIZE → RECORD_HISTORY → DONE
//!
//! GENERAL questions go straight from ROUTE to SYNTHESIZE. The SQL retry is a
//! bounded loop: after [`SQL_RETRY_CAP`] failed validations the engine moves on
//! to EXECUTE, where the pending error keeps the statement from running.

use crate::classifier::IntentClassifier;
use crate::execution::ExecutionEngine;
use crate::llm::TextGenerator;
use crate::memory::{summarize_exchange, HistoryStore, ResultCache};
use crate::models::{AnalyzeOutcome, AnalyzeRequest, RequestState, Route, Stage};
use crate::query::{GraphQueryGenerator, SqlQueryGenerator};
use crate::refiner::QueryRefiner;
use crate::schema::SchemaDescriptor;
use crate::synthesis::ResponseSynthesizer;
use crate::verification::{create_sql_security_validator, SecurityValidator, SqlValidator};
use crate::Result;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Validation attempts on the SQL path before execution is forced.
pub const SQL_RETRY_CAP: u32 = 2;

/// Drives one request through the state machine
pub struct Orchestrator {
    llm: Arc<dyn TextGenerator>,
    schema: SchemaDescriptor,
    sql_security: SecurityValidator,
    execution_engine: ExecutionEngine,
    history: Arc<dyn HistoryStore>,
    cache: Option<ResultCache>,
}

impl Orchestrator {
    pub fn new(
        llm: Arc<dyn TextGenerator>,
        schema: SchemaDescriptor,
        execution_engine: ExecutionEngine,
        history: Arc<dyn HistoryStore>,
    ) -> Self {
        Self {
            llm,
            schema,
            sql_security: create_sql_security_validator(),
            execution_engine,
            history,
            cache: None,
        }
    }

    /// Enable the result cache short-circuit.
    pub fn with_cache(mut self, cache: ResultCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn history(&self) -> &Arc<dyn HistoryStore> {
        &self.history
    }

    /// Analyze operation: one question plus prior turns in, final outcome out.
    pub async fn analyze(&self, request: AnalyzeRequest) -> Result<AnalyzeOutcome> {
        let state = self.run(request.into_state()).await?;
        Ok(AnalyzeOutcome::from(state))
    }

    /// Run the state machine to DONE.
    ///
    /// Validation and execution failures stay on `state.last_error`; only
    /// upstream failures (model calls) abort the run.
    pub async fn run(&self, mut state: RequestState) -> Result<RequestState> {
        let start_time = Instant::now();

        info!(
            user_id = %state.user_id,
            session_id = %state.session_id,
            turns = state.turns.len(),
            "Orchestrator: starting run"
        );

        if !self.try_cache_hit(&mut state).await {
            self.answer_from_backends(&mut state).await?;
        }

        // === SYNTHESIZE ===
        state.enter(Stage::Synthesize);
        let (answer, chart) = ResponseSynthesizer::new(self.llm.as_ref())
            .synthesize(&state)
            .await?;
        state.answer_text = answer;
        state.chart_payload = chart;

        // === RECORD_HISTORY ===
        state.enter(Stage::RecordHistory);
        self.record_history(&state).await;

        state.enter(Stage::Done);
        info!(
            session_id = %state.session_id,
            route = ?state.route,
            retry_count = state.retry_count,
            error = ?state.last_error.as_ref().map(|e| e.kind),
            elapsed_ms = start_time.elapsed().as_millis() as u64,
            "Orchestrator: run complete"
        );

        Ok(state)
    }

    /// REFINE through EXECUTE.
    async fn answer_from_backends(&self, state: &mut RequestState) -> Result<()> {
        // === REFINE ===
        state.enter(Stage::Refine);
        state.refined_question = QueryRefiner::new(self.llm.as_ref())
            .refine(&state.turns)
            .await?;
        debug!(refined_question = %state.refined_question, "Question refined");

        // === ROUTE ===
        state.enter(Stage::Route);
        let route = IntentClassifier::new(self.llm.as_ref())
            .classify(&state.refined_question)
            .await?;
        state.route = Some(route);
        info!(session_id = %state.session_id, route = ?route, "Question routed");

        match route {
            Route::Sql => self.generate_validated_sql(state).await?,
            Route::Graph => {
                // === GRAPH_GEN ===
                state.enter(Stage::GraphGen);
                state.query_text = GraphQueryGenerator::new(self.llm.as_ref())
                    .generate(&state.refined_question)
                    .await?;
            }
            Route::General => return Ok(()),
        }

        // === EXECUTE ===
        state.enter(Stage::Execute);
        self.execution_engine.execute(route, state).await;

        if route == Route::Sql && state.last_error.is_none() && !state.result_rows.is_empty() {
            self.store_in_cache(state).await;
        }

        Ok(())
    }

    /// SQL_GEN ⇄ VALIDATE, at most [`SQL_RETRY_CAP`] rounds.
    async fn generate_validated_sql(&self, state: &mut RequestState) -> Result<()> {
        let generator = SqlQueryGenerator::new(self.llm.as_ref(), &self.schema);
        let validator = SqlValidator::new(self.llm.as_ref(), &self.sql_security);

        for attempt in 1..=SQL_RETRY_CAP {
            // === SQL_GEN ===
            state.enter(Stage::SqlGen);
            let previous_error = state.last_error.take();
            state.query_text = generator
                .generate(&state.refined_question, previous_error.as_ref())
                .await?;

            // === VALIDATE ===
            state.enter(Stage::Validate);
            match validator.validate(&state.query_text).await? {
                None => {
                    debug!(attempt, "SQL passed validation");
                    return Ok(());
                }
                Some(failure) => {
                    state.retry_count = (state.retry_count + 1).min(SQL_RETRY_CAP);
                    warn!(
                        attempt,
                        retry_count = state.retry_count,
                        error = %failure,
                        "SQL failed validation"
                    );
                    state.last_error = Some(failure);
                }
            }
        }

        warn!(
            retry_count = state.retry_count,
            "Retry cap reached, moving on with the last statement"
        );
        Ok(())
    }

    /// CACHE_HIT when the cache holds rows for this user and question.
    async fn try_cache_hit(&self, state: &mut RequestState) -> bool {
        let Some(cache) = &self.cache else {
            return false;
        };
        let Some(question) = state.current_question().map(str::to_string) else {
            return false;
        };

        match cache.lookup_rows(&state.user_id, &question).await {
            Ok(Some(rows)) => {
                state.enter(Stage::CacheHit);
                info!(session_id = %state.session_id, rows = rows.len(), "Answering from cache");
                state.route = Some(Route::Sql);
                state.refined_question = question;
                state.result_rows = rows;
                true
            }
            Ok(None) => false,
            Err(e) => {
                warn!(error = %e, "Cache lookup failed, continuing without cache");
                false
            }
        }
    }

    async fn store_in_cache(&self, state: &RequestState) {
        let (Some(cache), Some(question)) = (&self.cache, state.current_question()) else {
            return;
        };
        if let Err(e) = cache
            .store_rows(&state.user_id, question, &state.result_rows)
            .await
        {
            warn!(error = %e, "Failed to cache query result");
        }
    }

    async fn record_history(&self, state: &RequestState) {
        let entry = summarize_exchange(&state.refined_question, &state.answer_text);
        if let Err(e) = self.history.append(&state.session_id, entry).await {
            warn!(session_id = %state.session_id, error = %e, "Failed to record history");
        }
    }
}
