use household_ledger_agent::{
    agent::Orchestrator,
    execution::{ExecutionEngine, Neo4jExecutor, PostgresExecutor},
    llm,
    memory::{stores_from_settings, ResultCache},
    models::{ConversationTurn, RequestState},
    schema::SchemaDescriptor,
    Settings,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let question = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    if question.trim().is_empty() {
        eprintln!("usage: ledger <question>");
        std::process::exit(2);
    }

    let settings = Settings::from_env()?;

    // Create components
    let generator = llm::from_settings(&settings)?;
    let relational = Arc::new(PostgresExecutor::connect_lazy(
        &settings.database_url,
        settings.db_max_connections,
    )?);
    let graph = Arc::new(Neo4jExecutor::new(
        &settings.neo4j_uri,
        &settings.neo4j_database,
        settings.neo4j_user.clone(),
        settings.neo4j_password.clone(),
    )?);
    let (history, cache_store) = stores_from_settings(&settings).await?;

    let mut orchestrator = Orchestrator::new(
        generator,
        SchemaDescriptor::ledger(),
        ExecutionEngine::new(relational, graph),
        history,
    );
    if settings.cache_enabled {
        orchestrator = orchestrator.with_cache(ResultCache::new(cache_store));
    }

    let session_id = std::env::var("LEDGER_SESSION_ID").unwrap_or_else(|_| Uuid::new_v4().to_string());
    let user_id = std::env::var("LEDGER_USER_ID").unwrap_or_else(|_| "cli".to_string());
    info!(session_id = %session_id, "Running question");

    let state = RequestState::new(user_id, session_id, vec![ConversationTurn::user(question)]);

    match orchestrator.run(state).await {
        Ok(result) => {
            println!("\n=== LEDGER ANSWER ===");
            println!("Question: {}", result.refined_question);
            if let Some(route) = result.route {
                println!("Route: {}", route);
            }
            if !result.query_text.is_empty() {
                println!("Query: {}", result.query_text);
            }
            if let Some(err) = &result.last_error {
                println!("Error: {}", err);
            }
            println!("\n{}", result.answer_text);
            if let Some(chart) = &result.chart_payload {
                println!("\nChart: {}", serde_json::to_string_pretty(chart)?);
            }
            println!("\nTrace: {:?}", result.trace);
            Ok(())
        }
        Err(e) => {
            eprintln!("Analysis failed: {}", e);
            Err(Box::new(e) as Box<dyn std::error::Error>)
        }
    }
}
